//! The shadow engine loop.

use std::fmt;
use std::time::Instant;

use tracing::{debug, info, warn};

use veriscan_ir::Program;
use veriscan_smt::Smt;
use veriscan_testgen::TestSuite;

use crate::config::{Configuration, EngineMode, ShadowProcessingMode};
use crate::context::{Frame, State, Vertex};
use crate::derive::derive_from_state;
use crate::engine::{EngineStatus, DEFAULT_CYCLE_BOUND};
use crate::error::{EngineError, Result};
use crate::explorer::{Explorer, Prioritized};
use crate::interface::FlatInterface;
use crate::shadow::executor::{ShadowContext, ShadowExecutor};
use crate::shadow::state::DivergentState;

/// What shadow execution concluded about the two revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowVerdict {
    /// No change expression influenced any explored behavior.
    ExpectedBehavior,
    /// Change expressions were carried but no input forcing a divergence
    /// was found within the explored bound.
    PotentialDivergentBehavior,
    /// At least one input forces the revisions down different branches.
    DivergentBehavior,
}

impl fmt::Display for ShadowVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShadowVerdict::ExpectedBehavior => write!(f, "expected behavior"),
            ShadowVerdict::PotentialDivergentBehavior => {
                write!(f, "potential divergent behavior")
            }
            ShadowVerdict::DivergentBehavior => write!(f, "divergent behavior"),
        }
    }
}

/// The outcome of a shadow run.
#[derive(Debug)]
pub struct ShadowReport {
    /// The divergence verdict.
    pub verdict: ShadowVerdict,
    /// Why the run ended.
    pub status: EngineStatus,
    /// Fully explored cycles.
    pub cycles_completed: u32,
    /// Number of forced divergences found.
    pub divergences: usize,
    /// Divergence witnesses first, then surviving-path scenarios.
    pub test_suite: TestSuite,
}

/// The divergence-detecting engine.
///
/// Runs the shadow executor over a program whose changed expressions are
/// marked with `change(old, new)`. Every forced divergence contributes a
/// witness test case; the split contexts keep progressing as ordinary
/// single-revision contexts and never merge again.
pub struct ShadowEngine<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    config: Configuration,
}

impl<'a, 'ctx> ShadowEngine<'a, 'ctx> {
    /// Create a shadow engine. The configured processing mode applies to
    /// the initial context; `None` defaults to BOTH.
    pub fn new(smt: &'a Smt<'ctx>, config: Configuration) -> Result<Self> {
        if config.engine_mode != EngineMode::Shadow {
            return Err(EngineError::unsupported_configuration(
                "shadow engine requires engine mode shadow",
            ));
        }
        Ok(Self { smt, config })
    }

    fn initial_mode(&self) -> ShadowProcessingMode {
        match self.config.shadow_processing_mode {
            ShadowProcessingMode::None => ShadowProcessingMode::Both,
            mode => mode,
        }
    }

    /// Explore `program` until a termination criterion fires.
    pub fn run(&self, program: &Program) -> Result<ShadowReport> {
        let interface = FlatInterface::new(program);
        let executor = ShadowExecutor::new(self.smt, program, &interface);
        let mut explorer: Explorer<ShadowContext<'ctx>> =
            Explorer::new(&self.config, program);
        let mut suite = TestSuite::new();
        let cycle_bound = self.config.cycle_bound.unwrap_or(DEFAULT_CYCLE_BOUND);
        let begin = Instant::now();
        let mut cycle = 0u32;
        let mut divergences = 0usize;
        let mut saw_shadows = false;

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

            info!(cycle, "exploring cycle under shadow execution");
            let mut survivors: Vec<ShadowContext<'ctx>> = Vec::new();
            while let Some(context) = explorer.pop() {
                let origin = context.state().state().vertex().clone();
                match executor.execute(context) {
                    Ok(successors) => {
                        for pair in successors.divergences {
                            divergences += 1;
                            debug!(vertex = %origin, "recording divergence witness");
                            match derive_from_state(
                                self.smt,
                                &interface,
                                pair.old.state().state(),
                                cycle + 1,
                            ) {
                                Ok(Some(test_case)) => {
                                    suite.push(test_case);
                                }
                                Ok(None) => warn!("divergence witness was unsatisfiable"),
                                Err(error) => warn!(%error, "discarding divergence witness"),
                            }
                            for continuation in [pair.old, pair.new] {
                                explorer.update_coverage(&origin, continuation.vertex());
                                self.route(
                                    continuation,
                                    cycle,
                                    &mut explorer,
                                    &mut survivors,
                                );
                            }
                        }
                        for successor in successors.contexts {
                            saw_shadows =
                                saw_shadows || successor.state().has_shadows();
                            explorer.update_coverage(&origin, successor.vertex());
                            self.route(successor, cycle, &mut explorer, &mut survivors);
                        }
                    }
                    Err(error) if error.is_solver_unknown() => {
                        warn!(%error, vertex = %origin, "discarding context");
                    }
                    Err(error) => return Err(error),
                }
            }
            cycle += 1;

            let finished =
                cycle >= cycle_bound || self.timed_out(begin) || survivors.is_empty();
            if finished {
                for survivor in &survivors {
                    match derive_from_state(
                        self.smt,
                        &interface,
                        survivor.state().state(),
                        survivor.cycle(),
                    ) {
                        Ok(Some(test_case)) => {
                            suite.push(test_case);
                        }
                        Ok(None) => {
                            warn!("surviving context had an unsatisfiable path constraint")
                        }
                        Err(error) => warn!(%error, "discarding surviving context"),
                    }
                }
                if cycle >= cycle_bound {
                    break EngineStatus::CycleBoundReached;
                }
                if survivors.is_empty() {
                    break EngineStatus::Exhausted;
                }
                break EngineStatus::TimeOutReached;
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

        let verdict = if divergences > 0 {
            ShadowVerdict::DivergentBehavior
        } else if saw_shadows {
            ShadowVerdict::PotentialDivergentBehavior
        } else {
            ShadowVerdict::ExpectedBehavior
        };
        info!(%verdict, divergences, cycles = cycle, "shadow run finished");
        Ok(ShadowReport {
            verdict,
            status,
            cycles_completed: cycle,
            divergences,
            test_suite: suite,
        })
    }

    fn route(
        &self,
        context: ShadowContext<'ctx>,
        cycle: u32,
        explorer: &mut Explorer<ShadowContext<'ctx>>,
        survivors: &mut Vec<ShadowContext<'ctx>>,
    ) {
        if context.cycle() == cycle {
            explorer.push(context);
        } else {
            survivors.push(context);
        }
    }

    fn initial_context(
        &self,
        program: &Program,
        interface: &FlatInterface,
    ) -> Result<ShadowContext<'ctx>> {
        let main = program.main();
        let mut state = State::new(Vertex::new(main.name(), main.entry()));
        for variable in interface.variables() {
            let contextualized_name = format!("{}_0__0", variable.name);
            let concrete = match &variable.initializer {
                Some(literal) => self.smt.literal_value(literal),
                None => self.smt.default_value(&variable.data_type)?,
            };
            if interface.is_whole_program_input(&variable.name) {
                let symbol = self.smt.constant(&contextualized_name, &variable.data_type)?;
                state.set_symbolic(contextualized_name.clone(), symbol);
            } else {
                state.set_symbolic(contextualized_name.clone(), concrete.clone());
            }
            state.set_concrete(contextualized_name, concrete);
        }
        let call_stack = vec![Frame::new(main.name(), main.name(), main.exit())];
        Ok(ShadowContext::new(
            0,
            DivergentState::new(state),
            call_stack,
            self.initial_mode(),
        ))
    }

    fn timed_out(&self, begin: Instant) -> bool {
        match self.config.time_out {
            Some(time_out) => begin.elapsed() >= time_out,
            None => false,
        }
    }
}
