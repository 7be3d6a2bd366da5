//! Divergence-aware concrete evaluation.

use std::cell::Cell;

use z3::ast::Dynamic;

use veriscan_ir::Expression;
use veriscan_smt::Smt;

use crate::config::ShadowProcessingMode;
use crate::encoder::{resolve_access, VersionLookup};
use crate::error::{EngineError, Result};
use crate::interface::FlatInterface;
use crate::ops;
use crate::shadow::state::DivergentState;

/// Prefix of minted concrete shadow names.
pub const CONCRETE_SHADOW_PREFIX: &str = "cshadow";

/// Like the plain evaluator, plus `change(old, new)` handling.
///
/// In the BOTH mode the twin concrete halves are recorded in the state's
/// concrete shadow registry and an opaque symbol is returned, so the
/// evaluated term stays lowerable to either revision. Terms flowing
/// through assignments may therefore mention concrete shadows; they are
/// resolved at divergence-check time.
pub struct ShadowEvaluator<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    interface: &'a FlatInterface,
    shadow_version: Cell<u32>,
}

impl<'a, 'ctx> ShadowEvaluator<'a, 'ctx> {
    /// Create a divergence-aware evaluator.
    pub fn new(smt: &'a Smt<'ctx>, interface: &'a FlatInterface) -> Self {
        Self { smt, interface, shadow_version: Cell::new(0) }
    }

    /// Evaluate `expression` against the concrete store, recording
    /// shadow pairs into `state`.
    pub fn evaluate(
        &self,
        expression: &Expression,
        scope: &str,
        state: &mut DivergentState<'ctx>,
        cycle: u32,
        mode: ShadowProcessingMode,
    ) -> Result<Dynamic<'ctx>> {
        match expression {
            Expression::BooleanConstant(value) => {
                Ok(Dynamic::from_ast(&self.smt.bool_value(*value)))
            }
            Expression::IntegerConstant(value) | Expression::TimeConstant(value) => {
                Ok(Dynamic::from_ast(&self.smt.int_value(*value)))
            }
            Expression::EnumeratedValue { index, .. } => {
                Ok(Dynamic::from_ast(&self.smt.int_value(*index)))
            }
            Expression::NondeterministicConstant => Err(EngineError::unsupported(
                "nondeterministic constant outside a sole assignment right-hand side",
            )),
            Expression::VariableAccess(_) | Expression::FieldAccess { .. } => {
                let (flattened_name, _) = resolve_access(self.interface, scope, expression)?;
                let contextualized_name = state.state().contextualized(&flattened_name, cycle);
                state
                    .state()
                    .concrete_value(&contextualized_name)
                    .cloned()
                    .ok_or_else(|| EngineError::unresolved(contextualized_name))
            }
            Expression::Unary { op, operand } => {
                let operand = self.evaluate(operand, scope, state, cycle, mode)?;
                ops::apply_unary(*op, operand)
            }
            Expression::Binary { op, left, right } => {
                let left = self.evaluate(left, scope, state, cycle, mode)?;
                let right = self.evaluate(right, scope, state, cycle, mode)?;
                ops::apply_binary(self.smt, *op, left, right)
            }
            Expression::Change { old, new } => match mode {
                ShadowProcessingMode::None => Err(EngineError::unsupported(
                    "change expression while shadow processing mode is NONE",
                )),
                ShadowProcessingMode::Old => self.evaluate(old, scope, state, cycle, mode),
                ShadowProcessingMode::New => self.evaluate(new, scope, state, cycle, mode),
                ShadowProcessingMode::Both => {
                    let old_term = self.evaluate(old, scope, state, cycle, mode)?;
                    let new_term = self.evaluate(new, scope, state, cycle, mode)?;
                    let version = self.shadow_version.get();
                    self.shadow_version.set(version + 1);
                    let shadow_name =
                        format!("{}_{}__{}", CONCRETE_SHADOW_PREFIX, version, cycle);
                    let shadow = if old_term.as_bool().is_some() && new_term.as_bool().is_some() {
                        Dynamic::from_ast(&self.smt.bool_constant(&shadow_name))
                    } else if old_term.as_int().is_some() && new_term.as_int().is_some() {
                        Dynamic::from_ast(&self.smt.int_constant(&shadow_name))
                    } else {
                        return Err(EngineError::sort_mismatch("change expression"));
                    };
                    state.set_concrete_shadow(shadow_name, old_term, new_term);
                    Ok(shadow)
                }
            },
            Expression::BooleanToIntegerCast(operand) => {
                let operand = self.evaluate(operand, scope, state, cycle, mode)?;
                ops::bool_to_int(self.smt, operand)
            }
            Expression::IntegerToBooleanCast(operand) => {
                let operand = self.evaluate(operand, scope, state, cycle, mode)?;
                ops::int_to_bool(self.smt, operand)
            }
            Expression::Phi { .. } => {
                Err(EngineError::unsupported("phi expression outside merging"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{State, Vertex};
    use std::collections::BTreeMap;
    use veriscan_ir::{DataType, Graph, GraphKind, Program, StorageClass, Variable};

    #[test]
    fn both_mode_keeps_both_concrete_halves() {
        let config = z3::Config::new();
        let z3_context = z3::Context::new(&config);
        let smt = Smt::new(&z3_context);
        let graph = Graph::new(
            "P",
            GraphKind::Program,
            vec![Variable::new("x", DataType::Int, StorageClass::Input)],
            BTreeMap::new(),
            0,
            0,
        );
        let program = Program::new(vec![graph]).unwrap();
        let flat = FlatInterface::new(&program);
        let evaluator = ShadowEvaluator::new(&smt, &flat);
        let mut state = DivergentState::new(State::new(Vertex::new("P", 0)));
        state
            .state_mut()
            .set_concrete("P.x_0__0", Dynamic::from_ast(&smt.int_value(0)));

        // change(x > 0, x >= 0) disagrees at x = 0.
        let change = Expression::change(
            Expression::gt(Expression::var("x"), Expression::int(0)),
            Expression::ge(Expression::var("x"), Expression::int(0)),
        );
        let term = evaluator
            .evaluate(&change, "P", &mut state, 0, ShadowProcessingMode::Both)
            .unwrap();
        let old = state.lower_concrete(&smt, &term, ShadowProcessingMode::Old);
        let new = state.lower_concrete(&smt, &term, ShadowProcessingMode::New);
        assert_eq!(Smt::bool_from(&old), Some(false));
        assert_eq!(Smt::bool_from(&new), Some(true));
    }
}
