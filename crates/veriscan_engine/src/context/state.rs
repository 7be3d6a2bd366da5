//! Per-context execution state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use z3::ast::{Ast, Bool, Dynamic};
use z3::Model;

use veriscan_smt::Smt;

/// A program point: a graph name and a label within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Vertex {
    /// The graph containing the label.
    pub graph: String,
    /// The label within the graph.
    pub label: usize,
}

impl Vertex {
    /// Create a vertex.
    pub fn new(graph: impl Into<String>, label: usize) -> Self {
        Self { graph: graph.into(), label }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.graph, self.label)
    }
}

/// The mutable half of a context: the current vertex, the dual stores,
/// the path constraint, and the local version map.
///
/// Both stores map contextualized names `<flat>_<version>__<cycle>` to
/// terms. Every write bumps the flattened name's version, so the store is
/// functional: nothing is ever overwritten within a cycle, and the cycle
/// suffix keeps names unique across cycle boundaries after versions reset.
///
/// The symbolic store holds the defining term of each version; the
/// concrete store holds a witness value. The concrete store is always a
/// model of the path constraint.
#[derive(Debug, Clone)]
pub struct State<'ctx> {
    vertex: Vertex,
    concrete: BTreeMap<String, Dynamic<'ctx>>,
    symbolic: BTreeMap<String, Dynamic<'ctx>>,
    path_constraint: Vec<Bool<'ctx>>,
    versions: BTreeMap<String, u32>,
}

impl<'ctx> State<'ctx> {
    /// Create a state at `vertex` with empty stores and an empty (that
    /// is, trivially true) path constraint.
    pub fn new(vertex: Vertex) -> Self {
        Self {
            vertex,
            concrete: BTreeMap::new(),
            symbolic: BTreeMap::new(),
            path_constraint: Vec::new(),
            versions: BTreeMap::new(),
        }
    }

    /// The current vertex.
    pub fn vertex(&self) -> &Vertex {
        &self.vertex
    }

    /// Move to another vertex.
    pub fn set_vertex(&mut self, vertex: Vertex) {
        self.vertex = vertex;
    }

    // ---- Versioning ----

    /// The current version of a flattened name. Unwritten names are at
    /// version zero.
    pub fn version(&self, flattened_name: &str) -> u32 {
        self.versions.get(flattened_name).copied().unwrap_or(0)
    }

    /// Bump and return the new version of a flattened name.
    pub fn bump_version(&mut self, flattened_name: &str) -> u32 {
        let version = self.versions.entry(flattened_name.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    /// Reset every version to zero. Used at cycle boundaries, where the
    /// incremented cycle suffix keeps contextualized names unique.
    pub fn reset_versions(&mut self) {
        self.versions.clear();
    }

    /// The version map entries in name order.
    pub fn versions(&self) -> impl Iterator<Item = (&String, u32)> {
        self.versions.iter().map(|(name, version)| (name, *version))
    }

    /// The contextualized name of the current version of a flattened
    /// name in `cycle`.
    pub fn current_name(&self, flattened_name: &str, cycle: u32) -> String {
        format!("{}_{}__{}", flattened_name, self.version(flattened_name), cycle)
    }

    // ---- Stores ----

    /// The concrete value stored under a contextualized name.
    pub fn concrete_value(&self, contextualized_name: &str) -> Option<&Dynamic<'ctx>> {
        self.concrete.get(contextualized_name)
    }

    /// Store a concrete valuation.
    pub fn set_concrete(&mut self, contextualized_name: impl Into<String>, term: Dynamic<'ctx>) {
        self.concrete.insert(contextualized_name.into(), term);
    }

    /// The symbolic term stored under a contextualized name.
    pub fn symbolic_value(&self, contextualized_name: &str) -> Option<&Dynamic<'ctx>> {
        self.symbolic.get(contextualized_name)
    }

    /// Store a symbolic valuation.
    pub fn set_symbolic(&mut self, contextualized_name: impl Into<String>, term: Dynamic<'ctx>) {
        self.symbolic.insert(contextualized_name.into(), term);
    }

    /// The symbolic store entries in name order.
    pub fn symbolic_entries(&self) -> impl Iterator<Item = (&String, &Dynamic<'ctx>)> {
        self.symbolic.iter()
    }

    /// The concrete store entries in name order.
    pub fn concrete_entries(&self) -> impl Iterator<Item = (&String, &Dynamic<'ctx>)> {
        self.concrete.iter()
    }

    // ---- Path constraint ----

    /// The path constraint clauses in the order they were appended.
    pub fn path_constraint(&self) -> &[Bool<'ctx>] {
        &self.path_constraint
    }

    /// Append a clause to the path constraint.
    pub fn push_path_constraint(&mut self, clause: Bool<'ctx>) {
        self.path_constraint.push(clause);
    }

    /// The defining equalities of every symbol transitively reachable
    /// from `seeds` through the symbolic store.
    ///
    /// A check of the path constraint alone would leave intermediate
    /// versions uninterpreted; conjoining `sym = def` for every reachable
    /// non-self definition closes the chains down to the free input
    /// symbols. Self-defined symbols (inputs and havocs) contribute
    /// nothing.
    pub fn definitional_closure(&self, smt: &Smt<'ctx>, seeds: &[Bool<'ctx>]) -> Vec<Bool<'ctx>> {
        let mut closure = Vec::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut worklist: Vec<Dynamic<'ctx>> = Vec::new();
        for seed in seeds {
            worklist.extend(smt.uninterpreted_constants(&Dynamic::from_ast(seed)));
        }
        while let Some(constant) = worklist.pop() {
            let name = Smt::constant_name(&constant);
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(definition) = self.symbolic.get(&name) {
                if *definition == constant {
                    continue;
                }
                closure.push(constant._eq(definition));
                worklist.extend(smt.uninterpreted_constants(definition));
            }
        }
        closure
    }

    /// The path constraint plus its definitional closure, ready to check.
    pub fn closed_path_constraint(&self, smt: &Smt<'ctx>) -> Vec<Bool<'ctx>> {
        let mut assertions = self.path_constraint.clone();
        assertions.extend(self.definitional_closure(smt, &self.path_constraint));
        assertions
    }

    // ---- Forking ----

    /// Update every concrete valuation the model interprets; names the
    /// model does not mention keep their previous values (they were
    /// "don't care" for the satisfiability that produced the model).
    pub fn refresh_concrete(&mut self, smt: &Smt<'ctx>, model: &Model<'ctx>) {
        for (name, value) in self.concrete.iter_mut() {
            let constant = if value.as_bool().is_some() {
                Dynamic::from_ast(&smt.bool_constant(name))
            } else {
                Dynamic::from_ast(&smt.int_constant(name))
            };
            if let Some(interpretation) = smt.model_value(model, &constant) {
                *value = interpretation;
            }
        }
    }

    /// Fork this state at a branch.
    ///
    /// The forked state sits at `vertex` with `constraint` appended to
    /// the path constraint. Its concrete store is a copy refreshed from
    /// the model under the don't-care preservation rule. The symbolic
    /// store and version map are shared by value.
    pub fn fork(
        &self,
        smt: &Smt<'ctx>,
        vertex: Vertex,
        model: &Model<'ctx>,
        constraint: Bool<'ctx>,
    ) -> State<'ctx> {
        let mut forked = self.clone();
        forked.vertex = vertex;
        forked.refresh_concrete(smt, model);
        forked.path_constraint.push(constraint);
        forked
    }
}

impl fmt::Display for State<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "vertex: {}", self.vertex)?;
        writeln!(f, "concrete: {{")?;
        for (name, value) in &self.concrete {
            writeln!(f, "  {} -> {}", name, value)?;
        }
        writeln!(f, "}}")?;
        writeln!(f, "symbolic: {{")?;
        for (name, value) in &self.symbolic {
            writeln!(f, "  {} -> {}", name, value)?;
        }
        writeln!(f, "}}")?;
        write!(f, "path constraint: [")?;
        for (position, clause) in self.path_constraint.iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", clause)?;
        }
        write!(f, "]")
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
    fn versions_start_at_zero_and_bump() {
        let mut state = State::new(Vertex::new("P", 0));
        assert_eq!(state.version("P.x"), 0);
        assert_eq!(state.bump_version("P.x"), 1);
        assert_eq!(state.bump_version("P.x"), 2);
        assert_eq!(state.current_name("P.x", 3), "P.x_2__3");
        state.reset_versions();
        assert_eq!(state.current_name("P.x", 4), "P.x_0__4");
    }

    #[test]
    fn closure_chains_through_definitions() {
        with_smt(|smt| {
            let mut state = State::new(Vertex::new("P", 0));
            // x is an input (self-defined), y := x + 1.
            let x = smt.int_constant("P.x_0__0");
            state.set_symbolic("P.x_0__0", Dynamic::from_ast(&x));
            let y_def = Dynamic::from_ast(&z3::ast::Int::add(
                smt.context(),
                &[&x, &smt.int_value(1)],
            ));
            state.set_symbolic("P.y_1__0", y_def);
            let y = smt.int_constant("P.y_1__0");
            let seed = y.gt(&smt.int_value(0));
            let closure = state.definitional_closure(smt, &[seed.clone()]);
            // Exactly the definition of y; x defines itself.
            assert_eq!(closure.len(), 1);
            // The closed constraint is satisfiable and binds x.
            let mut assertions = vec![seed];
            assertions.extend(closure);
            let model = smt.check(&assertions).unwrap().expect("satisfiable");
            let bound = smt
                .model_value(&model, &Dynamic::from_ast(&x))
                .and_then(|term| Smt::int_from(&term))
                .expect("x is bound through the closure");
            assert!(bound >= 0);
        });
    }

    #[test]
    fn fork_preserves_dont_cares() {
        with_smt(|smt| {
            let mut state = State::new(Vertex::new("P", 0));
            let x = smt.int_constant("P.x_0__0");
            state.set_symbolic("P.x_0__0", Dynamic::from_ast(&x));
            state.set_concrete("P.x_0__0", Dynamic::from_ast(&smt.int_value(1)));
            state.set_concrete("P.y_0__0", Dynamic::from_ast(&smt.int_value(9)));

            let constraint = x.gt(&smt.int_value(100));
            let model = smt.check(&[constraint.clone()]).unwrap().expect("satisfiable");
            let forked = state.fork(smt, Vertex::new("P", 2), &model, constraint);

            let forked_x =
                Smt::int_from(forked.concrete_value("P.x_0__0").unwrap()).unwrap();
            assert!(forked_x > 100);
            // y was irrelevant to the fork; its witness survives.
            assert_eq!(
                Smt::int_from(forked.concrete_value("P.y_0__0").unwrap()),
                Some(9)
            );
            // The parent state is untouched.
            assert_eq!(
                Smt::int_from(state.concrete_value("P.x_0__0").unwrap()),
                Some(1)
            );
            assert_eq!(forked.path_constraint().len(), 1);
        });
    }
}
