//! Verification-condition states.

use std::collections::BTreeMap;
use std::fmt;

use z3::ast::{Ast, Bool, Dynamic};

use veriscan_smt::Smt;

use crate::context::Vertex;
use crate::encoder::VersionLookup;

/// The reified control-flow state of the verification-condition flavor.
///
/// Instead of a path constraint, the state carries three maps keyed by
/// assumption-literal name:
///
/// - `assumption_literals`: the predecessor literals of each block; the
///   block is reachable when one of them is,
/// - `assumptions`: the branch guards that must hold for control to
///   enter the block,
/// - `hard_constraints`: the SSA definitions `name = term` established
///   inside the block.
///
/// There is no concrete store; concrete witnesses come from models of
/// reachability queries.
#[derive(Debug, Clone)]
pub struct VcState<'ctx> {
    vertex: Vertex,
    initial_valuations: BTreeMap<String, Dynamic<'ctx>>,
    versions: BTreeMap<String, u32>,
    assumption_literal_name: String,
    assumption_literal: Bool<'ctx>,
    assumption_literals: BTreeMap<String, Vec<Bool<'ctx>>>,
    assumptions: BTreeMap<String, Vec<Bool<'ctx>>>,
    hard_constraints: BTreeMap<String, BTreeMap<String, Dynamic<'ctx>>>,
}

impl<'ctx> VcState<'ctx> {
    /// Create the initial state of a run. The entry block's literal is
    /// unconditionally reachable.
    pub fn new(
        smt: &Smt<'ctx>,
        vertex: Vertex,
        initial_valuations: BTreeMap<String, Dynamic<'ctx>>,
        versions: BTreeMap<String, u32>,
        assumption_literal_name: String,
    ) -> Self {
        let assumption_literal = smt.bool_constant(&assumption_literal_name);
        let mut assumption_literals = BTreeMap::new();
        assumption_literals
            .insert(assumption_literal_name.clone(), vec![smt.bool_value(true)]);
        Self {
            vertex,
            initial_valuations,
            versions,
            assumption_literal_name,
            assumption_literal,
            assumption_literals,
            assumptions: BTreeMap::new(),
            hard_constraints: BTreeMap::new(),
        }
    }

    /// The current vertex.
    pub fn vertex(&self) -> &Vertex {
        &self.vertex
    }

    /// Move to another vertex within the current block.
    pub fn set_vertex(&mut self, vertex: Vertex) {
        self.vertex = vertex;
    }

    /// The current block's assumption literal.
    pub fn assumption_literal(&self) -> &Bool<'ctx> {
        &self.assumption_literal
    }

    /// The current block's assumption-literal name.
    pub fn assumption_literal_name(&self) -> &str {
        &self.assumption_literal_name
    }

    /// The recorded initial valuations, contextualized name to term.
    pub fn initial_valuations(&self) -> &BTreeMap<String, Dynamic<'ctx>> {
        &self.initial_valuations
    }

    /// Bump and return the new version of a flattened name.
    pub fn bump_version(&mut self, flattened_name: &str) -> u32 {
        let version = self.versions.entry(flattened_name.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    /// Reset every version to zero at a cycle boundary.
    pub fn reset_versions(&mut self) {
        self.versions.clear();
    }

    /// The version map entries in name order.
    pub fn versions(&self) -> impl Iterator<Item = (&String, u32)> {
        self.versions.iter().map(|(name, version)| (name, *version))
    }

    /// Force a flattened name to a version at least `target`.
    pub fn raise_version(&mut self, flattened_name: &str, target: u32) {
        let version = self.versions.entry(flattened_name.to_string()).or_insert(0);
        if *version < target {
            *version = target;
        }
    }

    /// Record a predecessor literal of a block, deduplicating
    /// structurally equal entries.
    pub fn push_assumption_literal(&mut self, block_name: impl Into<String>, literal: Bool<'ctx>) {
        let entry = self.assumption_literals.entry(block_name.into()).or_default();
        if !entry.contains(&literal) {
            entry.push(literal);
        }
    }

    /// Record a guarded assumption of a block.
    pub fn push_assumption(&mut self, block_name: impl Into<String>, assumption: Bool<'ctx>) {
        let entry = self.assumptions.entry(block_name.into()).or_default();
        if !entry.contains(&assumption) {
            entry.push(assumption);
        }
    }

    /// Record an SSA definition established inside a block.
    pub fn push_hard_constraint(
        &mut self,
        block_name: impl Into<String>,
        contextualized_name: impl Into<String>,
        term: Dynamic<'ctx>,
    ) {
        self.hard_constraints
            .entry(block_name.into())
            .or_default()
            .insert(contextualized_name.into(), term);
    }

    /// Enter a new block unconditionally: the new literal's only
    /// predecessor is the current block.
    pub fn advance_block(
        &mut self,
        smt: &Smt<'ctx>,
        vertex: Vertex,
        block_name: impl Into<String>,
    ) {
        let block_name = block_name.into();
        let literal = smt.bool_constant(&block_name);
        self.push_assumption_literal(block_name.clone(), self.assumption_literal.clone());
        self.assumption_literal_name = block_name;
        self.assumption_literal = literal;
        self.vertex = vertex;
    }

    /// Enter a branch successor block: the guard becomes a guarded
    /// assumption of the successor, whose predecessor is the current
    /// block.
    pub fn branch_child(
        &self,
        smt: &Smt<'ctx>,
        vertex: Vertex,
        block_name: impl Into<String>,
        guard: Bool<'ctx>,
    ) -> VcState<'ctx> {
        let block_name = block_name.into();
        let mut child = self.clone();
        child.push_assumption_literal(block_name.clone(), self.assumption_literal.clone());
        child.push_assumption(block_name.clone(), guard);
        child.assumption_literal = smt.bool_constant(&block_name);
        child.assumption_literal_name = block_name;
        child.vertex = vertex;
        child
    }

    /// The full verification-condition system of this state:
    /// reachability implications, guarded assumptions, SSA definitions,
    /// and the initial valuations.
    pub fn system(&self, smt: &Smt<'ctx>) -> Vec<Bool<'ctx>> {
        let mut system = Vec::new();
        for (block_name, predecessors) in &self.assumption_literals {
            let literal = smt.bool_constant(block_name);
            system.push(literal.implies(&smt.disjoin(predecessors)));
        }
        for (block_name, assumptions) in &self.assumptions {
            let literal = smt.bool_constant(block_name);
            for assumption in assumptions {
                system.push(literal.implies(assumption));
            }
        }
        for (block_name, constraints) in &self.hard_constraints {
            let literal = smt.bool_constant(block_name);
            for (contextualized_name, term) in constraints {
                let constant = constant_like(smt, contextualized_name, term);
                system.push(literal.implies(&constant._eq(term)));
            }
        }
        for (contextualized_name, term) in &self.initial_valuations {
            // Value entries pin the initial state; input entries are the
            // free symbols themselves and stay unconstrained.
            if Smt::is_value(term) {
                let constant = constant_like(smt, contextualized_name, term);
                system.push(constant._eq(term));
            }
        }
        system
    }

    /// Fuse another state arriving at the same vertex into this one.
    ///
    /// The union of the three maps is taken with structural
    /// deduplication; the join block's predecessors are both sides'
    /// current literals. Where the two sides left a flattened name at
    /// different versions, a fresh version is minted and each side's
    /// block assumes the corresponding equality.
    pub fn merge(
        &mut self,
        smt: &Smt<'ctx>,
        other: VcState<'ctx>,
        join_block_name: String,
        sort_of: impl Fn(&str) -> Option<Dynamic<'ctx>>,
        cycle: u32,
    ) {
        let left_literal = self.assumption_literal.clone();
        let left_block = self.assumption_literal_name.clone();
        let right_literal = other.assumption_literal.clone();
        let right_block = other.assumption_literal_name.clone();

        for (block_name, predecessors) in other.assumption_literals {
            for predecessor in predecessors {
                self.push_assumption_literal(block_name.clone(), predecessor);
            }
        }
        for (block_name, assumptions) in other.assumptions {
            for assumption in assumptions {
                self.push_assumption(block_name.clone(), assumption);
            }
        }
        for (block_name, constraints) in other.hard_constraints {
            for (contextualized_name, term) in constraints {
                self.push_hard_constraint(block_name.clone(), contextualized_name, term);
            }
        }

        // Reconcile diverged versions with guarded phi equalities.
        let right_versions: BTreeMap<String, u32> = other
            .versions
            .iter()
            .map(|(name, version)| (name.clone(), *version))
            .collect();
        let mut names: Vec<String> = self.versions.keys().cloned().collect();
        names.extend(right_versions.keys().cloned());
        names.sort();
        names.dedup();
        for flattened_name in names {
            let left_version = self.versions.get(&flattened_name).copied().unwrap_or(0);
            let right_version = right_versions.get(&flattened_name).copied().unwrap_or(0);
            if left_version == right_version {
                continue;
            }
            let merged_version = left_version.max(right_version) + 1;
            self.raise_version(&flattened_name, merged_version);
            if let Some(template) = sort_of(&flattened_name) {
                let merged_name =
                    format!("{}_{}__{}", flattened_name, merged_version, cycle);
                let merged_constant = constant_like(smt, &merged_name, &template);
                let left_name = format!("{}_{}__{}", flattened_name, left_version, cycle);
                let right_name = format!("{}_{}__{}", flattened_name, right_version, cycle);
                self.push_assumption(
                    left_block.clone(),
                    merged_constant._eq(&constant_like(smt, &left_name, &template)),
                );
                self.push_assumption(
                    right_block.clone(),
                    merged_constant._eq(&constant_like(smt, &right_name, &template)),
                );
            }
        }

        self.push_assumption_literal(join_block_name.clone(), left_literal);
        self.push_assumption_literal(join_block_name.clone(), right_literal);
        self.assumption_literal = smt.bool_constant(&join_block_name);
        self.assumption_literal_name = join_block_name;
    }
}

impl VersionLookup for VcState<'_> {
    fn version(&self, flattened_name: &str) -> u32 {
        self.versions.get(flattened_name).copied().unwrap_or(0)
    }
}

/// A free constant named `name` with the sort of `template`.
fn constant_like<'ctx>(smt: &Smt<'ctx>, name: &str, template: &Dynamic<'ctx>) -> Dynamic<'ctx> {
    if template.as_bool().is_some() {
        Dynamic::from_ast(&smt.bool_constant(name))
    } else {
        Dynamic::from_ast(&smt.int_constant(name))
    }
}

impl fmt::Display for VcState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "vertex: {}", self.vertex)?;
        writeln!(f, "block: {}", self.assumption_literal_name)?;
        writeln!(f, "predecessors: {{")?;
        for (block_name, predecessors) in &self.assumption_literals {
            write!(f, "  {}: [", block_name)?;
            for (position, predecessor) in predecessors.iter().enumerate() {
                if position > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", predecessor)?;
            }
            writeln!(f, "]")?;
        }
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_smt(run: impl FnOnce(&Smt)) {
        let config = z3::Config::new();
        let context = z3::Context::new(&config);
        run(&Smt::new(&context));
    }

    #[test]
    fn predecessor_literals_deduplicate_structurally() {
        with_smt(|smt| {
            let mut state = VcState::new(
                smt,
                Vertex::new("P", 0),
                BTreeMap::new(),
                BTreeMap::new(),
                "b_P_0__0".to_string(),
            );
            let predecessor = smt.bool_constant("b_P_1__0");
            state.push_assumption_literal("b_P_2__0", predecessor.clone());
            state.push_assumption_literal("b_P_2__0", predecessor);
            assert_eq!(state.assumption_literals["b_P_2__0"].len(), 1);
        });
    }

    #[test]
    fn branch_children_share_the_prefix() {
        with_smt(|smt| {
            let mut versions = BTreeMap::new();
            versions.insert("P.x".to_string(), 0);
            let state = VcState::new(
                smt,
                Vertex::new("P", 0),
                BTreeMap::new(),
                versions,
                "b_P_0__0".to_string(),
            );
            let guard = smt.bool_constant("P.x_0__0");
            let child =
                state.branch_child(smt, Vertex::new("P", 1), "b_P_1__0", guard.clone());
            assert_eq!(child.assumption_literal_name(), "b_P_1__0");
            assert_eq!(child.assumptions["b_P_1__0"], vec![guard]);
            assert_eq!(
                child.assumption_literals["b_P_1__0"],
                vec![state.assumption_literal().clone()]
            );
        });
    }

    #[test]
    fn the_system_is_checkable_under_the_exit_literal() {
        with_smt(|smt| {
            // entry: x := 1; exit. The exit block must be reachable and
            // force x_1 = 1.
            let mut state = VcState::new(
                smt,
                Vertex::new("P", 0),
                BTreeMap::new(),
                BTreeMap::new(),
                "b_P_0__0".to_string(),
            );
            state.bump_version("P.x");
            state.push_hard_constraint(
                "b_P_0__0",
                "P.x_1__0",
                Dynamic::from_ast(&smt.int_value(1)),
            );
            state.advance_block(smt, Vertex::new("P", 1), "b_P_1__0");

            let system = state.system(smt);
            let exit = state.assumption_literal().clone();
            match smt.check_under_assumptions(&system, &[exit]).unwrap() {
                veriscan_smt::AssumptionOutcome::Sat(model) => {
                    let x = Dynamic::from_ast(&smt.int_constant("P.x_1__0"));
                    assert_eq!(
                        smt.model_value(&model, &x).and_then(|term| Smt::int_from(&term)),
                        Some(1)
                    );
                }
                veriscan_smt::AssumptionOutcome::Unsat { .. } => {
                    panic!("exit should be reachable")
                }
            }
        });
    }
}
