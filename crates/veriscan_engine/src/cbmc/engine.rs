//! The verification-condition engine loop.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tracing::{debug, info, warn};
use z3::ast::Dynamic;

use veriscan_ir::Program;
use veriscan_smt::{AssumptionOutcome, Smt};
use veriscan_testgen::{TestCase, TestSuite, TestValue};

use crate::cbmc::executor::{block_name, join_block_name, VcContext, VcExecutor};
use crate::cbmc::state::VcState;
use crate::config::{Configuration, EngineMode};
use crate::context::{Frame, Vertex};
use crate::engine::{EngineStatus, DEFAULT_CYCLE_BOUND};
use crate::error::{EngineError, Result};
use crate::explorer::{Explorer, Prioritized};
use crate::interface::FlatInterface;
use crate::merger::{collect_points, predecessor_count, MergePoint};

/// The outcome of a VC run.
#[derive(Debug)]
pub struct VcReport {
    /// Why the run ended.
    pub status: EngineStatus,
    /// Fully explored cycles.
    pub cycles_completed: u32,
    /// Whether the final cycle's exit block was reachable.
    pub exit_reachable: bool,
    /// One scenario per reachable final context.
    pub test_suite: TestSuite,
}

/// The verification-condition engine.
///
/// Branches split into literal-guarded successor blocks instead of
/// solver-checked forks; joins fuse blocks by disjoining predecessor
/// literals. At the cycle bound, reachability of the exit block is a
/// single check under its assumption literal, and the model of a
/// reachable exit yields the test scenario.
pub struct VcEngine<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    config: Configuration,
}

impl<'a, 'ctx> VcEngine<'a, 'ctx> {
    /// Create a VC engine.
    pub fn new(smt: &'a Smt<'ctx>, config: Configuration) -> Result<Self> {
        if config.engine_mode != EngineMode::Cbmc {
            return Err(EngineError::unsupported_configuration(
                "vc engine requires engine mode cbmc",
            ));
        }
        Ok(Self { smt, config })
    }

    /// Explore `program` to the cycle bound and check exit reachability.
    pub fn run(&self, program: &Program) -> Result<VcReport> {
        let interface = FlatInterface::new(program);
        let executor = VcExecutor::new(self.smt, program, &interface, &self.config);
        let mut explorer: Explorer<VcContext<'ctx>> = Explorer::new(&self.config, program);
        let mut merger = VcMerger::new(&self.config, program);
        let mut suite = TestSuite::new();
        let cycle_bound = self.config.cycle_bound.unwrap_or(DEFAULT_CYCLE_BOUND);
        let begin = Instant::now();
        let mut cycle = 0u32;
        let mut finals: Vec<VcContext<'ctx>> = Vec::new();

        if cycle_bound > 0 {
            explorer.push(self.initial_context(program, &interface)?);
        }

        let status = loop {
            if cycle >= cycle_bound {
                break EngineStatus::CycleBoundReached;
            }
            if self.timed_out(begin) {
                break EngineStatus::TimeOutReached;
            }

            info!(cycle, "encoding cycle");
            let mut survivors: Vec<VcContext<'ctx>> = Vec::new();
            while !explorer.is_empty() || !merger.is_empty() {
                if explorer.is_empty() {
                    for merged in merger.drain(self.smt, &interface) {
                        explorer.push(merged);
                    }
                    continue;
                }
                let context = explorer.pop().expect("explorer checked non-empty");
                let origin = context.state().vertex().clone();
                let (first, second) = executor.execute(context)?;
                for successor in std::iter::once(first).chain(second) {
                    explorer.update_coverage(&origin, successor.vertex());
                    if successor.cycle() == cycle {
                        if merger.reached_merge_point(&successor) {
                            merger.push(successor);
                            for merged in merger.merge_ready(self.smt, &interface) {
                                explorer.push(merged);
                            }
                        } else {
                            explorer.push(successor);
                        }
                    } else {
                        survivors.push(successor);
                    }
                }
            }
            cycle += 1;
            debug!(cycle, survivors = survivors.len(), "cycle encoded");

            if cycle >= cycle_bound {
                finals = survivors;
                break EngineStatus::CycleBoundReached;
            }
            if survivors.is_empty() {
                break EngineStatus::Exhausted;
            }
            for survivor in survivors {
                explorer.push(survivor);
            }
        };

        let mut exit_reachable = false;
        for context in &finals {
            match self.derive(&interface, context)? {
                Some(test_case) => {
                    exit_reachable = true;
                    suite.push(test_case);
                }
                None => {}
            }
        }

        if let Some(directory) = &self.config.generate_test_suite {
            suite
                .write_xml(directory)
                .map_err(|error| EngineError::test_suite_output(error.to_string()))?;
        }

        info!(cycles = cycle, exit_reachable, "vc run finished");
        Ok(VcReport { status, cycles_completed: cycle, exit_reachable, test_suite: suite })
    }

    /// Check reachability of the context's current block and extract a
    /// scenario from the model.
    fn derive(
        &self,
        interface: &FlatInterface,
        context: &VcContext<'ctx>,
    ) -> Result<Option<TestCase>> {
        let system = context.state().system(self.smt);
        let literal = context.state().assumption_literal().clone();
        match self.smt.check_under_assumptions(&system, &[literal])? {
            AssumptionOutcome::Sat(model) => {
                let mut test_case = TestCase::new();
                for variable in interface.state_variables() {
                    let contextualized_name = format!("{}_0__0", variable.name);
                    if let Some(term) =
                        context.state().initial_valuations().get(&contextualized_name)
                    {
                        if let Some(value) = term_value(term) {
                            test_case.set_initial_state(variable.name.clone(), value);
                        }
                    }
                }
                for cycle in 0..context.cycle() {
                    test_case.touch_cycle(cycle);
                    for input in interface.whole_program_inputs() {
                        let data_type = interface
                            .data_type(input)
                            .ok_or_else(|| EngineError::unresolved(input.to_string()))?;
                        let contextualized_name = format!("{}_0__{}", input, cycle);
                        let constant =
                            self.smt.constant(&contextualized_name, data_type)?;
                        let term = match self.smt.model_value(&model, &constant) {
                            Some(term) => term,
                            None => self.smt.default_value(data_type)?,
                        };
                        if let Some(value) = term_value(&term) {
                            test_case.set_cycle_input(cycle, input.to_string(), value);
                        }
                    }
                }
                Ok(Some(test_case))
            }
            AssumptionOutcome::Unsat { core } => {
                let names: Vec<String> =
                    core.iter().map(|literal| literal.to_string()).collect();
                warn!(core = names.join(", "), "block unreachable");
                Ok(None)
            }
        }
    }

    fn initial_context(
        &self,
        program: &Program,
        interface: &FlatInterface,
    ) -> Result<VcContext<'ctx>> {
        let main = program.main();
        let mut initial_valuations = BTreeMap::new();
        let mut versions = BTreeMap::new();
        for variable in interface.variables() {
            versions.insert(variable.name.clone(), 0);
            let contextualized_name = format!("{}_0__0", variable.name);
            let term = if interface.is_whole_program_input(&variable.name) {
                self.smt.constant(&contextualized_name, &variable.data_type)?
            } else {
                match &variable.initializer {
                    Some(literal) => self.smt.literal_value(literal),
                    None => self.smt.default_value(&variable.data_type)?,
                }
            };
            initial_valuations.insert(contextualized_name, term);
        }
        let state = VcState::new(
            self.smt,
            Vertex::new(main.name(), main.entry()),
            initial_valuations,
            versions,
            block_name(main.name(), main.entry(), 0),
        );
        let call_stack = vec![Frame::new(main.name(), main.name(), main.exit())];
        Ok(VcContext::new(0, state, call_stack))
    }

    fn timed_out(&self, begin: Instant) -> bool {
        match self.config.time_out {
            Some(time_out) => begin.elapsed() >= time_out,
            None => false,
        }
    }
}

fn term_value(term: &Dynamic<'_>) -> Option<TestValue> {
    if let Some(value) = Smt::bool_from(term) {
        return Some(TestValue::Bool(value));
    }
    Smt::int_from(term).map(TestValue::Int)
}

/// Join-point buffering for VC contexts.
struct VcMerger<'ctx> {
    merge_points: BTreeSet<MergePoint>,
    expected: BTreeMap<MergePoint, usize>,
    pending: BTreeMap<MergePoint, Vec<VcContext<'ctx>>>,
}

impl<'ctx> VcMerger<'ctx> {
    fn new(config: &Configuration, program: &Program) -> Self {
        let mut merge_points = BTreeSet::new();
        let mut expected = BTreeMap::new();
        let main = program.main();
        match config.merge_strategy {
            crate::config::MergeStrategy::OnlyAtCycleEnd => {
                let point = (main.name().to_string(), main.exit(), main.exit());
                expected.insert(point.clone(), predecessor_count(program, main, main.exit()));
                merge_points.insert(point);
            }
            crate::config::MergeStrategy::AtAllJoinPoints => {
                collect_points(
                    program,
                    main,
                    main.name().to_string(),
                    main.exit(),
                    &mut merge_points,
                    &mut expected,
                );
            }
        }
        Self { merge_points, expected, pending: BTreeMap::new() }
    }

    fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }

    fn reached_merge_point(&self, context: &VcContext<'ctx>) -> bool {
        let frame = context.frame();
        self.merge_points.contains(&(
            frame.scope().to_string(),
            frame.return_label(),
            context.state().vertex().label,
        ))
    }

    fn push(&mut self, context: VcContext<'ctx>) {
        let frame = context.frame();
        let point = (
            frame.scope().to_string(),
            frame.return_label(),
            context.state().vertex().label,
        );
        self.pending.entry(point).or_default().push(context);
    }

    fn merge_ready(
        &mut self,
        smt: &Smt<'ctx>,
        interface: &FlatInterface,
    ) -> Vec<VcContext<'ctx>> {
        let ready: Vec<MergePoint> = self
            .pending
            .iter()
            .filter(|(point, contexts)| {
                !contexts.is_empty()
                    && contexts.len() >= self.expected.get(*point).copied().unwrap_or(usize::MAX)
            })
            .map(|(point, _)| point.clone())
            .collect();
        let mut merged = Vec::new();
        for point in ready {
            if let Some(contexts) = self.pending.remove(&point) {
                merged.extend(merge_group(smt, interface, contexts));
            }
        }
        merged
    }

    fn drain(&mut self, smt: &Smt<'ctx>, interface: &FlatInterface) -> Vec<VcContext<'ctx>> {
        let pending = std::mem::take(&mut self.pending);
        let mut merged = Vec::new();
        for (_, contexts) in pending {
            if contexts.is_empty() {
                continue;
            }
            merged.extend(merge_group(smt, interface, contexts));
        }
        merged
    }
}

fn merge_group<'ctx>(
    smt: &Smt<'ctx>,
    interface: &FlatInterface,
    contexts: Vec<VcContext<'ctx>>,
) -> Vec<VcContext<'ctx>> {
    let mut groups: Vec<Vec<VcContext<'ctx>>> = Vec::new();
    for context in contexts {
        match groups.iter_mut().find(|members| {
            let representative = &members[0];
            representative.cycle() == context.cycle()
                && representative.call_stack() == context.call_stack()
        }) {
            Some(members) => members.push(context),
            None => groups.push(vec![context]),
        }
    }
    groups
        .into_iter()
        .map(|members| {
            let mut members = members.into_iter();
            let mut merged = members.next().expect("groups are non-empty");
            for next in members {
                let vertex = merged.state().vertex().clone();
                let cycle = merged.cycle();
                let join = join_block_name(&vertex.graph, vertex.label, cycle);
                let sort_of = |flattened_name: &str| {
                    interface
                        .data_type(flattened_name)
                        .and_then(|data_type| smt.default_value(data_type).ok())
                };
                let next_state = next.state().clone();
                merged.state_mut().merge(smt, next_state, join, sort_of, cycle);
            }
            merged
        })
        .collect()
}
