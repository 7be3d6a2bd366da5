//! Engine configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which engine flavor drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Concolic exploration: dual stores, fork at feasible branches.
    Baseline,
    /// Like `Baseline`, but every state variable starts truly symbolic
    /// and reachability hints from a preceding abstract-interpretation
    /// pass prune the explored branch sides.
    OverApproximating,
    /// Compositional exploration with state merging at join points.
    Compositional,
    /// Divergence detection between two revisions carried in one state.
    Shadow,
    /// Verification-condition generation with assumption literals
    /// instead of forking.
    Cbmc,
}

/// Granularity at which the engine loop re-checks its local termination
/// criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSize {
    /// After every executed instruction.
    Instruction,
    /// Only at cycle boundaries.
    Cycle,
}

/// Worklist ordering of the explorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorationHeuristic {
    /// Prefer the context latest in execution: higher cycle, deeper call
    /// stack, higher label.
    DepthFirst,
    /// The inverse of depth-first.
    BreadthFirst,
}

/// How call sites are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Inline callees by pushing frames.
    Compositional,
    /// Divergence-aware execution of `change` expressions.
    Shadow,
}

/// Whether branch semantics are reified as verification conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMode {
    /// Plain path constraints.
    None,
    /// Named assumption literals with guarded assumptions.
    VcGeneration,
}

/// Callee summarization. Recognized for configuration compatibility;
/// only `None` is currently executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizationMode {
    /// Inline every invocation.
    None,
    /// Reuse per-function-block summaries.
    FunctionBlock,
}

/// Block granularity of the verification-condition encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEncoding {
    /// One assumption literal per jump target.
    Single,
    /// One assumption literal per basic block.
    Basic,
}

/// When buffered contexts are fused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Buffer and fuse at every join vertex of every graph.
    AtAllJoinPoints,
    /// Fuse only at the main graph's exit.
    OnlyAtCycleEnd,
}

/// How `change(old, new)` expressions are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowProcessingMode {
    /// Reject change expressions.
    None,
    /// Project every change expression to its old half.
    Old,
    /// Project every change expression to its new half.
    New,
    /// Carry both halves and watch for divergence.
    Both,
}

impl fmt::Display for ShadowProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShadowProcessingMode::None => write!(f, "NONE"),
            ShadowProcessingMode::Old => write!(f, "OLD"),
            ShadowProcessingMode::New => write!(f, "NEW"),
            ShadowProcessingMode::Both => write!(f, "BOTH"),
        }
    }
}

/// Full engine configuration.
///
/// `Default` gives a depth-first baseline run that merges only at cycle
/// end, with the engine-default cycle bound and no time-out.
///
/// ```
/// use veriscan_engine::config::{Configuration, ExplorationHeuristic};
///
/// let config = Configuration::default()
///     .with_cycle_bound(2)
///     .with_exploration_heuristic(ExplorationHeuristic::DepthFirst);
/// assert_eq!(config.cycle_bound, Some(2));
/// ```
#[derive(Debug, Clone)]
pub struct Configuration {
    /// The engine flavor.
    pub engine_mode: EngineMode,
    /// Local termination-check granularity.
    pub step_size: StepSize,
    /// Worklist ordering.
    pub exploration_heuristic: ExplorationHeuristic,
    /// Call-site execution mode.
    pub execution_mode: ExecutionMode,
    /// Verification-condition reification.
    pub encoding_mode: EncodingMode,
    /// Callee summarization.
    pub summarization_mode: SummarizationMode,
    /// Block granularity of the VC encoding.
    pub block_encoding: BlockEncoding,
    /// Merge policy.
    pub merge_strategy: MergeStrategy,
    /// Change-expression processing.
    pub shadow_processing_mode: ShadowProcessingMode,
    /// Number of cycles to explore. `None` uses the engine default.
    pub cycle_bound: Option<u32>,
    /// Wall-clock budget. `None` means unbounded.
    pub time_out: Option<Duration>,
    /// Directory to write the generated suite into, one XML file per
    /// test case.
    pub generate_test_suite: Option<PathBuf>,
    /// Labels a preceding abstract-interpretation pass proved
    /// unreachable, keyed by graph name. Excluded from coverage and
    /// never explored.
    pub unreachable_labels: Option<BTreeSet<(String, usize)>>,
    /// Branch feasibility hints: `(graph, label)` to
    /// `(then-feasible, else-feasible)`. An infeasible side is neither
    /// forked into nor counted for coverage.
    pub unreachable_branches: Option<BTreeMap<(String, usize), (bool, bool)>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            engine_mode: EngineMode::Baseline,
            step_size: StepSize::Cycle,
            exploration_heuristic: ExplorationHeuristic::DepthFirst,
            execution_mode: ExecutionMode::Compositional,
            encoding_mode: EncodingMode::None,
            summarization_mode: SummarizationMode::None,
            block_encoding: BlockEncoding::Single,
            merge_strategy: MergeStrategy::OnlyAtCycleEnd,
            shadow_processing_mode: ShadowProcessingMode::None,
            cycle_bound: None,
            time_out: None,
            generate_test_suite: None,
            unreachable_labels: None,
            unreachable_branches: None,
        }
    }
}

impl Configuration {
    /// Select the engine flavor.
    pub fn with_engine_mode(mut self, engine_mode: EngineMode) -> Self {
        self.engine_mode = engine_mode;
        self
    }

    /// Select the termination-check granularity.
    pub fn with_step_size(mut self, step_size: StepSize) -> Self {
        self.step_size = step_size;
        self
    }

    /// Select the worklist ordering.
    pub fn with_exploration_heuristic(mut self, heuristic: ExplorationHeuristic) -> Self {
        self.exploration_heuristic = heuristic;
        self
    }

    /// Select the merge policy.
    pub fn with_merge_strategy(mut self, merge_strategy: MergeStrategy) -> Self {
        self.merge_strategy = merge_strategy;
        self
    }

    /// Select the change-expression processing mode.
    pub fn with_shadow_processing_mode(mut self, mode: ShadowProcessingMode) -> Self {
        self.shadow_processing_mode = mode;
        self
    }

    /// Bound the number of explored cycles.
    pub fn with_cycle_bound(mut self, cycle_bound: u32) -> Self {
        self.cycle_bound = Some(cycle_bound);
        self
    }

    /// Bound the wall-clock time.
    pub fn with_time_out(mut self, time_out: Duration) -> Self {
        self.time_out = Some(time_out);
        self
    }

    /// Write the generated suite into `path`.
    pub fn with_test_suite_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.generate_test_suite = Some(path.into());
        self
    }

    /// Provide unreachable-label hints.
    pub fn with_unreachable_labels(mut self, labels: BTreeSet<(String, usize)>) -> Self {
        self.unreachable_labels = Some(labels);
        self
    }

    /// Provide branch feasibility hints.
    pub fn with_unreachable_branches(
        mut self,
        branches: BTreeMap<(String, usize), (bool, bool)>,
    ) -> Self {
        self.unreachable_branches = Some(branches);
        self
    }

    /// Whether a label was hinted unreachable.
    pub fn is_label_unreachable(&self, graph: &str, label: usize) -> bool {
        self.unreachable_labels
            .as_ref()
            .map(|labels| labels.contains(&(graph.to_string(), label)))
            .unwrap_or(false)
    }

    /// The feasibility hint for a branch, `(then, else)`. Defaults to
    /// both feasible.
    pub fn branch_feasibility(&self, graph: &str, label: usize) -> (bool, bool) {
        self.unreachable_branches
            .as_ref()
            .and_then(|branches| branches.get(&(graph.to_string(), label)).copied())
            .unwrap_or((true, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_feasibility_defaults_to_feasible() {
        let config = Configuration::default();
        assert_eq!(config.branch_feasibility("P", 0), (true, true));
    }

    #[test]
    fn hints_are_consulted() {
        let mut branches = BTreeMap::new();
        branches.insert(("P".to_string(), 0), (true, false));
        let config = Configuration::default().with_unreachable_branches(branches);
        assert_eq!(config.branch_feasibility("P", 0), (true, false));
        assert_eq!(config.branch_feasibility("P", 1), (true, true));
    }
}
