//! Divergent states: a state plus twin shadow valuations.

use std::collections::{BTreeMap, BTreeSet};

use z3::ast::{Ast, Bool, Dynamic};
use z3::Model;

use veriscan_smt::Smt;

use crate::config::ShadowProcessingMode;
use crate::context::{State, Vertex};

/// A state extended with the two auxiliary shadow registries.
///
/// `symbolic_shadow` and `concrete_shadow` map a minted shadow name to
/// the `(old, new)` pair of terms it stands for. Ordinary store entries
/// may mention shadow symbols; resolving them against a registry
/// projects the state to one revision.
#[derive(Debug, Clone)]
pub struct DivergentState<'ctx> {
    state: State<'ctx>,
    symbolic_shadow: BTreeMap<String, (Dynamic<'ctx>, Dynamic<'ctx>)>,
    concrete_shadow: BTreeMap<String, (Dynamic<'ctx>, Dynamic<'ctx>)>,
}

impl<'ctx> DivergentState<'ctx> {
    /// Wrap a plain state with empty shadow registries.
    pub fn new(state: State<'ctx>) -> Self {
        Self { state, symbolic_shadow: BTreeMap::new(), concrete_shadow: BTreeMap::new() }
    }

    /// The wrapped state.
    pub fn state(&self) -> &State<'ctx> {
        &self.state
    }

    /// The wrapped state, mutably.
    pub fn state_mut(&mut self) -> &mut State<'ctx> {
        &mut self.state
    }

    /// Record the twin symbolic valuations of a shadow symbol.
    pub fn set_symbolic_shadow(
        &mut self,
        shadow_name: impl Into<String>,
        old: Dynamic<'ctx>,
        new: Dynamic<'ctx>,
    ) {
        self.symbolic_shadow.insert(shadow_name.into(), (old, new));
    }

    /// Record the twin concrete valuations of a shadow symbol.
    pub fn set_concrete_shadow(
        &mut self,
        shadow_name: impl Into<String>,
        old: Dynamic<'ctx>,
        new: Dynamic<'ctx>,
    ) {
        self.concrete_shadow.insert(shadow_name.into(), (old, new));
    }

    /// Whether any shadow has been recorded.
    pub fn has_shadows(&self) -> bool {
        !self.symbolic_shadow.is_empty() || !self.concrete_shadow.is_empty()
    }

    fn half<'s>(
        pair: &'s (Dynamic<'ctx>, Dynamic<'ctx>),
        mode: ShadowProcessingMode,
    ) -> &'s Dynamic<'ctx> {
        match mode {
            ShadowProcessingMode::New => &pair.1,
            _ => &pair.0,
        }
    }

    /// Substitute every registered shadow symbol in `term` by the chosen
    /// revision's half, repeatedly, until none remains.
    fn resolve_shadows(
        smt: &Smt<'ctx>,
        registry: &BTreeMap<String, (Dynamic<'ctx>, Dynamic<'ctx>)>,
        term: &Dynamic<'ctx>,
        mode: ShadowProcessingMode,
    ) -> Dynamic<'ctx> {
        let mut lowered = term.clone();
        loop {
            let mut changed = false;
            for constant in smt.uninterpreted_constants(&lowered) {
                let name = Smt::constant_name(&constant);
                if let Some(pair) = registry.get(&name) {
                    lowered = smt.substitute(&lowered, &constant, Self::half(pair, mode));
                    changed = true;
                }
            }
            if !changed {
                return lowered.simplify();
            }
        }
    }

    /// Lower a concretely evaluated term to one revision by resolving
    /// its concrete shadows.
    pub fn lower_concrete(
        &self,
        smt: &Smt<'ctx>,
        term: &Dynamic<'ctx>,
        mode: ShadowProcessingMode,
    ) -> Dynamic<'ctx> {
        Self::resolve_shadows(smt, &self.concrete_shadow, term, mode)
    }

    /// Lower a symbolically encoded term to one revision by resolving
    /// its symbolic shadows.
    pub fn lower_symbolic(
        &self,
        smt: &Smt<'ctx>,
        term: &Dynamic<'ctx>,
        mode: ShadowProcessingMode,
    ) -> Dynamic<'ctx> {
        Self::resolve_shadows(smt, &self.symbolic_shadow, term, mode)
    }

    /// Whether `term` transitively involves a symbolic shadow, chasing
    /// symbols through their symbolic-store definitions.
    pub fn involves_shadow(&self, smt: &Smt<'ctx>, term: &Dynamic<'ctx>) -> bool {
        let mut worklist = vec![term.clone()];
        let mut visited: BTreeSet<String> = BTreeSet::new();
        while let Some(current) = worklist.pop() {
            for constant in smt.uninterpreted_constants(&current) {
                let name = Smt::constant_name(&constant);
                if self.symbolic_shadow.contains_key(&name) {
                    return true;
                }
                if !visited.insert(name.clone()) {
                    continue;
                }
                if let Some(definition) = self.state.symbolic_value(&name) {
                    if *definition != constant {
                        worklist.push(definition.clone());
                    }
                }
            }
        }
        false
    }

    /// Lower an encoded term to one revision, inlining the definition of
    /// every symbol that transitively involves a shadow.
    ///
    /// Symbols whose definitions are shadow-free stay symbolic, so the
    /// result still composes with the definitional closure of the
    /// underlying state.
    pub fn lower_symbolic_deep(
        &self,
        smt: &Smt<'ctx>,
        term: &Dynamic<'ctx>,
        mode: ShadowProcessingMode,
    ) -> Dynamic<'ctx> {
        let mut lowered = term.clone();
        loop {
            let mut changed = false;
            for constant in smt.uninterpreted_constants(&lowered) {
                let name = Smt::constant_name(&constant);
                if let Some(pair) = self.symbolic_shadow.get(&name) {
                    lowered = smt.substitute(&lowered, &constant, Self::half(pair, mode));
                    changed = true;
                    continue;
                }
                if let Some(definition) = self.state.symbolic_value(&name).cloned() {
                    if definition != constant && self.involves_shadow(smt, &definition) {
                        lowered = smt.substitute(&lowered, &constant, &definition);
                        changed = true;
                    }
                }
            }
            if !changed {
                return lowered.simplify();
            }
        }
    }

    /// Project this divergent state to one revision's ordinary state.
    ///
    /// Every store entry and path-constraint clause has its shadow
    /// symbols resolved; the shadow registries are dropped.
    pub fn project(&self, smt: &Smt<'ctx>, mode: ShadowProcessingMode) -> State<'ctx> {
        let mut projected = State::new(self.state.vertex().clone());
        for (name, term) in self.state.symbolic_entries() {
            projected.set_symbolic(name.clone(), self.lower_symbolic(smt, term, mode));
        }
        for (name, term) in self.state.concrete_entries() {
            projected.set_concrete(name.clone(), self.lower_concrete(smt, term, mode));
        }
        for clause in self.state.path_constraint() {
            let clause = self
                .lower_symbolic(smt, &Dynamic::from_ast(clause), mode)
                .as_bool()
                .unwrap_or_else(|| clause.clone());
            projected.push_path_constraint(clause);
        }
        for (name, version) in self.state.versions() {
            while projected.version(name) < version {
                projected.bump_version(name);
            }
        }
        projected
    }

    /// Fork at a branch, keeping the shadow registries; see
    /// [`State::fork`].
    pub fn fork(
        &self,
        smt: &Smt<'ctx>,
        vertex: Vertex,
        model: &Model<'ctx>,
        constraint: Bool<'ctx>,
    ) -> DivergentState<'ctx> {
        DivergentState {
            state: self.state.fork(smt, vertex, model, constraint),
            symbolic_shadow: self.symbolic_shadow.clone(),
            concrete_shadow: self.concrete_shadow.clone(),
        }
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
    fn lowering_projects_the_chosen_half() {
        with_smt(|smt| {
            let mut state = DivergentState::new(State::new(Vertex::new("P", 0)));
            let x = smt.int_constant("P.x_0__0");
            let old_half = Dynamic::from_ast(&x.gt(&smt.int_value(0)));
            let new_half = Dynamic::from_ast(&x.ge(&smt.int_value(0)));
            state.set_symbolic_shadow("sshadow_0__0", old_half, new_half);

            let shadow = Dynamic::from_ast(&smt.bool_constant("sshadow_0__0"));
            let old = state.lower_symbolic(smt, &shadow, ShadowProcessingMode::Old);
            let new = state.lower_symbolic(smt, &shadow, ShadowProcessingMode::New);
            // At x = 0 the halves disagree.
            let x_is_zero =
                Dynamic::from_ast(&x._eq(&smt.int_value(0))).as_bool().unwrap();
            let old_holds =
                smt.check(&[x_is_zero.clone(), old.as_bool().unwrap()]).unwrap();
            assert!(old_holds.is_none());
            let new_holds = smt.check(&[x_is_zero, new.as_bool().unwrap()]).unwrap();
            assert!(new_holds.is_some());
        });
    }

    #[test]
    fn involvement_chases_store_definitions() {
        with_smt(|smt| {
            let mut state = DivergentState::new(State::new(Vertex::new("P", 0)));
            let shadow = Dynamic::from_ast(&smt.int_constant("sshadow_0__0"));
            state.set_symbolic_shadow(
                "sshadow_0__0",
                Dynamic::from_ast(&smt.int_value(1)),
                Dynamic::from_ast(&smt.int_value(2)),
            );
            // y is defined as the shadow symbol; z is independent.
            state.state_mut().set_symbolic("P.y_1__0", shadow);
            state
                .state_mut()
                .set_symbolic("P.z_0__0", Dynamic::from_ast(&smt.int_constant("P.z_0__0")));

            let y = Dynamic::from_ast(&smt.int_constant("P.y_1__0"));
            assert!(state.involves_shadow(smt, &y));
            let z = Dynamic::from_ast(&smt.int_constant("P.z_0__0"));
            assert!(!state.involves_shadow(smt, &z));

            // Deep lowering inlines y down to the old half.
            let lowered = state.lower_symbolic_deep(smt, &y, ShadowProcessingMode::Old);
            assert_eq!(Smt::int_from(&lowered), Some(1));
        });
    }

    #[test]
    fn projection_drops_the_registries() {
        with_smt(|smt| {
            let mut state = DivergentState::new(State::new(Vertex::new("P", 0)));
            state.set_concrete_shadow(
                "cshadow_0__0",
                Dynamic::from_ast(&smt.int_value(7)),
                Dynamic::from_ast(&smt.int_value(9)),
            );
            state.state_mut().set_concrete(
                "P.y_1__0",
                Dynamic::from_ast(&smt.int_constant("cshadow_0__0")),
            );
            let new_state = state.project(smt, ShadowProcessingMode::New);
            assert_eq!(
                Smt::int_from(new_state.concrete_value("P.y_1__0").unwrap()),
                Some(9)
            );
        });
    }
}
