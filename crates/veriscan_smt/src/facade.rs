//! The Z3 facade.
//!
//! Naming convention for free constants: the engine passes contextualized
//! names of the form `<flattened-name>_<version>__<cycle>`. The facade
//! never parses these; names are opaque symbol identities here.

use std::cell::RefCell;
use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use z3::ast::{Ast, Bool, Dynamic, Int};
use z3::{Context, Model, SatResult, Tactic};

use veriscan_ir::{DataType, Literal};

use crate::error::{Result, SmtError};

/// Seed for the don't-care value generator. Fixed so runs are reproducible.
const RNG_SEED: u64 = 108;

/// Outcome of a check under assumption literals.
#[derive(Debug)]
pub enum AssumptionOutcome<'ctx> {
    /// Satisfiable, with a model over the asserted constants.
    Sat(Model<'ctx>),
    /// Unsatisfiable, with the subset of assumption literals that proves it.
    Unsat {
        /// The unsat core, drawn from the passed assumption literals.
        core: Vec<Bool<'ctx>>,
    },
}

/// Facade over one shared solver context.
///
/// Terms are cheap, structurally shared values; contexts of the engine
/// reference the facade and exchange terms freely. The random number
/// generator sits behind a `RefCell` so factory methods take `&self` like
/// every other term constructor.
pub struct Smt<'ctx> {
    context: &'ctx Context,
    rng: RefCell<StdRng>,
}

impl<'ctx> Smt<'ctx> {
    /// Create a facade over `context`.
    pub fn new(context: &'ctx Context) -> Self {
        Self { context, rng: RefCell::new(StdRng::seed_from_u64(RNG_SEED)) }
    }

    /// The underlying solver context.
    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    // ---- Value factories ----

    /// A boolean value term.
    pub fn bool_value(&self, value: bool) -> Bool<'ctx> {
        Bool::from_bool(self.context, value)
    }

    /// An integer value term.
    pub fn int_value(&self, value: i64) -> Int<'ctx> {
        Int::from_i64(self.context, value)
    }

    /// The default value of a data type: `false` for the boolean sorts,
    /// `0` for the arithmetic ones.
    pub fn default_value(&self, data_type: &DataType) -> Result<Dynamic<'ctx>> {
        match data_type {
            DataType::Bool | DataType::SafetyBool => {
                Ok(Dynamic::from_ast(&self.bool_value(false)))
            }
            DataType::Int | DataType::Time | DataType::Enumeration { .. } => {
                Ok(Dynamic::from_ast(&self.int_value(0)))
            }
            DataType::Real | DataType::Derived { .. } => {
                Err(SmtError::unsupported_sort(data_type))
            }
        }
    }

    /// A random value of a data type, drawn from the seeded generator.
    ///
    /// Integers are drawn from -32768..=32767 and times from 0..=65535.
    /// Safety booleans default to `false` rather than a random draw.
    /// Random values populate only "don't care" entries of concrete
    /// stores; values the solver constrained always come from a model.
    pub fn random_value(&self, data_type: &DataType) -> Result<Dynamic<'ctx>> {
        let mut rng = self.rng.borrow_mut();
        match data_type {
            DataType::Bool => {
                let value = rng.gen_bool(0.5);
                Ok(Dynamic::from_ast(&self.bool_value(value)))
            }
            DataType::SafetyBool => Ok(Dynamic::from_ast(&self.bool_value(false))),
            DataType::Int => {
                let value = rng.gen_range(-32768..=32767);
                Ok(Dynamic::from_ast(&self.int_value(value)))
            }
            DataType::Time => {
                let value = rng.gen_range(0..=65535);
                Ok(Dynamic::from_ast(&self.int_value(value)))
            }
            DataType::Enumeration { values } => {
                let index = rng.gen_range(0..values.len().max(1)) as i64;
                Ok(Dynamic::from_ast(&self.int_value(index)))
            }
            DataType::Real | DataType::Derived { .. } => {
                Err(SmtError::unsupported_sort(data_type))
            }
        }
    }

    /// The value term of an IR literal.
    pub fn literal_value(&self, literal: &Literal) -> Dynamic<'ctx> {
        match literal {
            Literal::Bool(value) => Dynamic::from_ast(&self.bool_value(*value)),
            Literal::Int(value) | Literal::Time(value) => {
                Dynamic::from_ast(&self.int_value(*value))
            }
            Literal::Enumerated { index, .. } => Dynamic::from_ast(&self.int_value(*index)),
        }
    }

    // ---- Constant factories ----

    /// A boolean free constant with the given contextualized name.
    pub fn bool_constant(&self, contextualized_name: &str) -> Bool<'ctx> {
        Bool::new_const(self.context, contextualized_name)
    }

    /// An integer free constant with the given contextualized name.
    pub fn int_constant(&self, contextualized_name: &str) -> Int<'ctx> {
        Int::new_const(self.context, contextualized_name)
    }

    /// A free constant of the sort matching `data_type`.
    pub fn constant(&self, contextualized_name: &str, data_type: &DataType) -> Result<Dynamic<'ctx>> {
        match data_type {
            DataType::Bool | DataType::SafetyBool => {
                Ok(Dynamic::from_ast(&self.bool_constant(contextualized_name)))
            }
            DataType::Int | DataType::Time | DataType::Enumeration { .. } => {
                Ok(Dynamic::from_ast(&self.int_constant(contextualized_name)))
            }
            DataType::Real | DataType::Derived { .. } => {
                Err(SmtError::unsupported_sort(data_type))
            }
        }
    }

    // ---- Checks ----

    fn tactic_solver(&self) -> z3::Solver<'ctx> {
        Tactic::new(self.context, "simplify")
            .and_then(&Tactic::new(self.context, "solve-eqs"))
            .and_then(&Tactic::new(self.context, "smt"))
            .solver()
    }

    /// Check the conjunction of `assertions`.
    ///
    /// Returns `Some(model)` when satisfiable, `None` when unsatisfiable.
    /// An `unknown` verdict is an error; callers discard the querying
    /// context instead of guessing.
    pub fn check(&self, assertions: &[Bool<'ctx>]) -> Result<Option<Model<'ctx>>> {
        let solver = self.tactic_solver();
        solver.push();
        for assertion in assertions {
            solver.assert(assertion);
        }
        let outcome = match solver.check() {
            SatResult::Sat => solver.get_model().map(Some).ok_or_else(SmtError::unknown),
            SatResult::Unsat => Ok(None),
            SatResult::Unknown => Err(SmtError::unknown()),
        };
        // Drop learned clauses.
        solver.pop(1);
        outcome
    }

    /// Check `assertions` under the given assumption literals.
    ///
    /// On unsatisfiability the unsat core names the responsible literals.
    pub fn check_under_assumptions(
        &self,
        assertions: &[Bool<'ctx>],
        assumptions: &[Bool<'ctx>],
    ) -> Result<AssumptionOutcome<'ctx>> {
        let solver = self.tactic_solver();
        solver.push();
        for assertion in assertions {
            solver.assert(assertion);
        }
        let outcome = match solver.check_assumptions(assumptions) {
            SatResult::Sat => solver
                .get_model()
                .map(AssumptionOutcome::Sat)
                .ok_or_else(SmtError::unknown),
            SatResult::Unsat => Ok(AssumptionOutcome::Unsat { core: solver.get_unsat_core() }),
            SatResult::Unknown => Err(SmtError::unknown()),
        };
        solver.pop(1);
        outcome
    }

    // ---- Term inspection ----

    /// The concrete boolean behind a term, if it is the literal `true` or
    /// `false`.
    pub fn bool_from(term: &Dynamic<'ctx>) -> Option<bool> {
        term.as_bool().and_then(|value| value.as_bool())
    }

    /// The concrete integer behind a term, if it is a numeral.
    pub fn int_from(term: &Dynamic<'ctx>) -> Option<i64> {
        term.as_int().and_then(|value| value.as_i64())
    }

    /// Whether a term is a fully interpreted value.
    pub fn is_value(term: &Dynamic<'ctx>) -> bool {
        Self::bool_from(term).is_some() || Self::int_from(term).is_some()
    }

    /// The symbol name of an uninterpreted constant.
    pub fn constant_name(term: &Dynamic<'ctx>) -> String {
        term.decl().name()
    }

    /// Every distinct uninterpreted constant occurring in `term`.
    ///
    /// Walks the term structurally with an explicit worklist and a visited
    /// set keyed by term identity, so shared sub-terms are visited once.
    pub fn uninterpreted_constants(&self, term: &Dynamic<'ctx>) -> Vec<Dynamic<'ctx>> {
        let mut worklist = vec![term.clone()];
        let mut visited: HashSet<Dynamic<'ctx>> = HashSet::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut constants = Vec::new();
        while let Some(current) = worklist.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let children = current.children();
            if children.is_empty() {
                if !Self::is_value(&current) {
                    let name = Self::constant_name(&current);
                    if seen_names.insert(name) {
                        constants.push(current);
                    }
                }
            } else {
                worklist.extend(children);
            }
        }
        constants
    }

    /// Replace every occurrence of `source` in `term` by `destination`.
    pub fn substitute(
        &self,
        term: &Dynamic<'ctx>,
        source: &Dynamic<'ctx>,
        destination: &Dynamic<'ctx>,
    ) -> Dynamic<'ctx> {
        term.substitute(&[(source, destination)])
    }

    /// Evaluate `term` against `model` without model completion.
    ///
    /// Returns the interpreted value only when the model actually
    /// constrains the term. Unconstrained constants evaluate to
    /// themselves and yield `None`, which is what keeps "don't care"
    /// entries of a forked concrete store at their previous values.
    pub fn model_value(&self, model: &Model<'ctx>, term: &Dynamic<'ctx>) -> Option<Dynamic<'ctx>> {
        let evaluated = model.eval(term, false)?;
        if Self::is_value(&evaluated) {
            Some(evaluated)
        } else {
            None
        }
    }

    // ---- Connectives over collected terms ----

    /// The conjunction of `terms`, `true` when empty.
    pub fn conjoin(&self, terms: &[Bool<'ctx>]) -> Bool<'ctx> {
        let references: Vec<&Bool<'ctx>> = terms.iter().collect();
        Bool::and(self.context, &references)
    }

    /// The disjunction of `terms`, `false` when empty.
    pub fn disjoin(&self, terms: &[Bool<'ctx>]) -> Bool<'ctx> {
        let references: Vec<&Bool<'ctx>> = terms.iter().collect();
        Bool::or(self.context, &references)
    }
}
