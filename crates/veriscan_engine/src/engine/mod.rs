//! The concolic engine loop.
//!
//! Drives cycle-by-cycle exploration for the baseline, compositional,
//! and over-approximating flavors. One iteration of the outer loop
//! explores a whole scan cycle: the explorer and the merger are drained,
//! successors that cross the cycle boundary are collected as the next
//! cycle's seeds, and test cases are derived from the seeds that survive
//! to the final cycle.
//!
//! Termination is cooperative and checked at step boundaries: the cycle
//! bound, the wall-clock time-out, and full statement plus branch
//! coverage (within an epsilon of 0.01). Reaching a budget is normal
//! termination and yields the accumulated suite and coverage report.

use std::fmt;
use std::time::Instant;

use tracing::{debug, info, warn};

use veriscan_ir::Program;
use veriscan_smt::Smt;
use veriscan_testgen::TestSuite;

use crate::config::{Configuration, EngineMode, StepSize, SummarizationMode};
use crate::context::{Context, Frame, State, Vertex};
use crate::derive::derive_test_case;
use crate::error::{EngineError, Result};
use crate::executor::Executor;
use crate::explorer::Explorer;
use crate::interface::FlatInterface;
use crate::merger::Merger;

/// Cycles explored when the configuration leaves the bound unset.
pub const DEFAULT_CYCLE_BOUND: u32 = 10;

/// Tolerance under which coverage counts as complete.
pub const COVERAGE_EPSILON: f64 = 0.01;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// The configured cycle bound was reached.
    CycleBoundReached,
    /// The wall-clock budget was exhausted.
    TimeOutReached,
    /// Statement and branch coverage both reached 1.0.
    CoverageReached,
    /// Every context was discarded before the bound; nothing is left to
    /// explore.
    Exhausted,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::CycleBoundReached => write!(f, "cycle bound reached"),
            EngineStatus::TimeOutReached => write!(f, "time-out reached"),
            EngineStatus::CoverageReached => write!(f, "coverage reached"),
            EngineStatus::Exhausted => write!(f, "exploration exhausted"),
        }
    }
}

/// The outcome of a run: termination status, progress counters, and the
/// generated suite.
#[derive(Debug)]
pub struct RunReport {
    /// Why the run ended.
    pub status: EngineStatus,
    /// Fully explored cycles.
    pub cycles_completed: u32,
    /// Fraction of reachable statements covered.
    pub statement_coverage: f64,
    /// Fraction of reachable branch sides covered.
    pub branch_coverage: f64,
    /// The generated test suite, in emission order.
    pub test_suite: TestSuite,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} cycles, statement coverage {:.2}, branch coverage {:.2}, {} test cases",
            self.status,
            self.cycles_completed,
            self.statement_coverage,
            self.branch_coverage,
            self.test_suite.len()
        )
    }
}

/// The concolic symbolic execution engine.
///
/// ```no_run
/// use veriscan_engine::config::Configuration;
/// use veriscan_engine::engine::Engine;
/// use veriscan_smt::Smt;
/// # fn program() -> veriscan_ir::Program { unimplemented!() }
///
/// let z3_config = z3::Config::new();
/// let z3_context = z3::Context::new(&z3_config);
/// let smt = Smt::new(&z3_context);
/// let engine = Engine::new(&smt, Configuration::default().with_cycle_bound(2)).unwrap();
/// let report = engine.run(&program()).unwrap();
/// println!("{}", report);
/// ```
pub struct Engine<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    config: Configuration,
}

impl<'a, 'ctx> Engine<'a, 'ctx> {
    /// Create an engine over the facade with the given configuration.
    pub fn new(smt: &'a Smt<'ctx>, config: Configuration) -> Result<Self> {
        match config.engine_mode {
            EngineMode::Baseline | EngineMode::Compositional | EngineMode::OverApproximating => {}
            EngineMode::Shadow => {
                return Err(EngineError::unsupported_configuration(
                    "shadow mode runs through ShadowEngine",
                ));
            }
            EngineMode::Cbmc => {
                return Err(EngineError::unsupported_configuration(
                    "cbmc mode runs through VcEngine",
                ));
            }
        }
        if config.summarization_mode == SummarizationMode::FunctionBlock {
            return Err(EngineError::unsupported_configuration(
                "function-block summarization",
            ));
        }
        Ok(Self { smt, config })
    }

    /// Explore `program` until a termination criterion fires.
    pub fn run(&self, program: &Program) -> Result<RunReport> {
        let interface = FlatInterface::new(program);
        let executor = Executor::new(self.smt, program, &interface, &self.config);
        let mut explorer: Explorer<Context<'ctx>> = Explorer::new(&self.config, program);
        // The baseline flavor never merges; every explored path stays
        // its own context.
        let mut merger = match self.config.engine_mode {
            EngineMode::Baseline => Merger::disabled(),
            _ => Merger::new(&self.config, program),
        };
        let mut suite = TestSuite::new();
        let cycle_bound = self.config.cycle_bound.unwrap_or(DEFAULT_CYCLE_BOUND);
        let begin = Instant::now();
        let mut cycle = 0u32;

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

            info!(cycle, "exploring cycle");
            let (survivors, early) =
                self.step_cycle(&executor, &mut explorer, &mut merger, cycle, begin)?;
            cycle += 1;
            debug!(
                cycle,
                statement_coverage = explorer.statement_coverage(),
                branch_coverage = explorer.branch_coverage(),
                survivors = survivors.len(),
                "cycle complete"
            );

            let finished = early.is_some()
                || cycle >= cycle_bound
                || self.coverage_met(&explorer)
                || self.timed_out(begin);
            if finished {
                self.emit(&interface, &survivors, &mut suite);
                if let Some(status) = early {
                    break status;
                }
                if cycle >= cycle_bound {
                    break EngineStatus::CycleBoundReached;
                }
                if self.coverage_met(&explorer) {
                    break EngineStatus::CoverageReached;
                }
                break EngineStatus::TimeOutReached;
            }
            if survivors.is_empty() {
                break EngineStatus::Exhausted;
            }
            for survivor in survivors {
                explorer.push(survivor);
            }
        };

        if let Some(directory) = &self.config.generate_test_suite {
            suite
                .write_xml(directory)
                .map_err(|error| EngineError::test_suite_output(error.to_string()))?;
        }

        let report = RunReport {
            status,
            cycles_completed: cycle,
            statement_coverage: explorer.statement_coverage(),
            branch_coverage: explorer.branch_coverage(),
            test_suite: suite,
        };
        info!(%report, "run finished");
        Ok(report)
    }

    /// Drain the explorer and merger for one cycle. Returns the contexts
    /// that crossed into the next cycle and, when a local termination
    /// criterion fired mid-cycle, its status.
    fn step_cycle(
        &self,
        executor: &Executor<'_, 'ctx>,
        explorer: &mut Explorer<Context<'ctx>>,
        merger: &mut Merger<'ctx>,
        cycle: u32,
        begin: Instant,
    ) -> Result<(Vec<Context<'ctx>>, Option<EngineStatus>)> {
        let mut survivors = Vec::new();
        while !explorer.is_empty() || !merger.is_empty() {
            if self.config.step_size == StepSize::Instruction {
                if self.timed_out(begin) {
                    return Ok((survivors, Some(EngineStatus::TimeOutReached)));
                }
                if self.coverage_met(explorer) {
                    return Ok((survivors, Some(EngineStatus::CoverageReached)));
                }
            }
            if explorer.is_empty() {
                // Exploration starved; fire pending merges with whatever
                // arrived.
                for merged in merger.drain(self.smt) {
                    explorer.push(merged);
                }
                continue;
            }
            let context = explorer.pop().expect("explorer checked non-empty");
            let origin = context.state().vertex().clone();
            match executor.execute(context) {
                Ok(successors) => {
                    for successor in successors.into_vec() {
                        let (new_statement, new_branch) =
                            explorer.update_coverage(&origin, successor.state().vertex());
                        if new_statement || new_branch {
                            debug!(
                                vertex = %origin,
                                new_statement,
                                new_branch,
                                "coverage grew"
                            );
                        }
                        if successor.cycle() == cycle {
                            if merger.reached_merge_point(&successor) {
                                merger.push(successor);
                                for merged in merger.merge_ready(self.smt) {
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
                Err(error) if error.is_solver_unknown() => {
                    warn!(%error, vertex = %origin, "discarding context");
                }
                Err(error) => return Err(error),
            }
        }
        Ok((survivors, None))
    }

    fn emit(
        &self,
        interface: &FlatInterface,
        survivors: &[Context<'ctx>],
        suite: &mut TestSuite,
    ) {
        for survivor in survivors {
            match derive_test_case(self.smt, interface, survivor) {
                Ok(Some(test_case)) => {
                    suite.push(test_case);
                }
                Ok(None) => {
                    warn!("terminated context had an unsatisfiable path constraint");
                }
                Err(error) => {
                    warn!(%error, "discarding terminated context");
                }
            }
        }
    }

    /// Build the context every run starts from: one frame for the main
    /// graph, concrete valuations from initializers and defaults, and
    /// fresh symbols for whatever the engine mode treats as symbolic.
    pub fn initial_context(
        &self,
        program: &Program,
        interface: &FlatInterface,
    ) -> Result<Context<'ctx>> {
        let main = program.main();
        let mut state = State::new(Vertex::new(main.name(), main.entry()));
        for variable in interface.variables() {
            let contextualized_name = format!("{}_0__0", variable.name);
            let concrete = match &variable.initializer {
                Some(literal) => self.smt.literal_value(literal),
                None => self.smt.default_value(&variable.data_type)?,
            };
            // In the over-approximating mode everything is truly
            // symbolic; otherwise only whole-program inputs are.
            let truly_symbolic = self.config.engine_mode == EngineMode::OverApproximating
                || interface.is_whole_program_input(&variable.name);
            if truly_symbolic {
                let symbol = self.smt.constant(&contextualized_name, &variable.data_type)?;
                state.set_symbolic(contextualized_name.clone(), symbol);
            } else {
                state.set_symbolic(contextualized_name.clone(), concrete.clone());
            }
            state.set_concrete(contextualized_name, concrete);
        }
        let call_stack = vec![Frame::new(main.name(), main.name(), main.exit())];
        Ok(Context::new(0, state, call_stack))
    }

    fn coverage_met(&self, explorer: &Explorer<Context<'ctx>>) -> bool {
        (1.0 - explorer.statement_coverage()).abs() <= COVERAGE_EPSILON
            && (1.0 - explorer.branch_coverage()).abs() <= COVERAGE_EPSILON
    }

    fn timed_out(&self, begin: Instant) -> bool {
        match self.config.time_out {
            Some(time_out) => begin.elapsed() >= time_out,
            None => false,
        }
    }
}
