//! Concrete expression evaluation.

use z3::ast::Dynamic;

use veriscan_ir::Expression;
use veriscan_smt::Smt;

use crate::context::State;
use crate::encoder::resolve_access;
use crate::error::{EngineError, Result};
use crate::interface::FlatInterface;
use crate::ops;

/// Evaluates IR expressions against the concrete store.
///
/// Same recursion as the encoder, but variable accesses read the stored
/// witness value of the current version instead of minting a symbol, so
/// simplification folds the result down to a constant.
pub struct Evaluator<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    interface: &'a FlatInterface,
}

impl<'a, 'ctx> Evaluator<'a, 'ctx> {
    /// Create an evaluator over the facade and interface.
    pub fn new(smt: &'a Smt<'ctx>, interface: &'a FlatInterface) -> Self {
        Self { smt, interface }
    }

    /// Evaluate `expression` under `scope` against the concrete store of
    /// `state` in `cycle`.
    pub fn evaluate(
        &self,
        expression: &Expression,
        scope: &str,
        state: &State<'ctx>,
        cycle: u32,
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
                let contextualized_name = state.current_name(&flattened_name, cycle);
                state
                    .concrete_value(&contextualized_name)
                    .cloned()
                    .ok_or_else(|| EngineError::unresolved(contextualized_name))
            }
            Expression::Unary { op, operand } => {
                let operand = self.evaluate(operand, scope, state, cycle)?;
                ops::apply_unary(*op, operand)
            }
            Expression::Binary { op, left, right } => {
                let left = self.evaluate(left, scope, state, cycle)?;
                let right = self.evaluate(right, scope, state, cycle)?;
                ops::apply_binary(self.smt, *op, left, right)
            }
            Expression::Change { .. } => Err(EngineError::unsupported(
                "change expression outside shadow execution",
            )),
            Expression::BooleanToIntegerCast(operand) => {
                let operand = self.evaluate(operand, scope, state, cycle)?;
                ops::bool_to_int(self.smt, operand)
            }
            Expression::IntegerToBooleanCast(operand) => {
                let operand = self.evaluate(operand, scope, state, cycle)?;
                ops::int_to_bool(self.smt, operand)
            }
            Expression::Phi { .. } => {
                Err(EngineError::unsupported("phi expression outside merging"))
            }
        }
    }
}
