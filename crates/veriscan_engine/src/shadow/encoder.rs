//! Divergence-aware symbolic lowering.

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

/// Prefix of minted symbolic shadow names.
pub const SYMBOLIC_SHADOW_PREFIX: &str = "sshadow";

/// Like the plain encoder, plus `change(old, new)` handling.
///
/// In the BOTH mode every change expression mints a fresh shadow symbol,
/// records the pair of encoded halves in the state's symbolic shadow
/// registry, and returns the symbol; in OLD or NEW the chosen half is
/// encoded directly. The shadow version counter is monotone across the
/// whole run so minted names never collide.
pub struct ShadowEncoder<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    interface: &'a FlatInterface,
    shadow_version: Cell<u32>,
}

impl<'a, 'ctx> ShadowEncoder<'a, 'ctx> {
    /// Create a divergence-aware encoder.
    pub fn new(smt: &'a Smt<'ctx>, interface: &'a FlatInterface) -> Self {
        Self { smt, interface, shadow_version: Cell::new(0) }
    }

    /// Lower `expression`, recording shadow pairs into `state`.
    pub fn encode(
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
                let (flattened_name, data_type) =
                    resolve_access(self.interface, scope, expression)?;
                let contextualized_name = state.state().contextualized(&flattened_name, cycle);
                Ok(self.smt.constant(&contextualized_name, data_type)?)
            }
            Expression::Unary { op, operand } => {
                let operand = self.encode(operand, scope, state, cycle, mode)?;
                ops::apply_unary(*op, operand)
            }
            Expression::Binary { op, left, right } => {
                let left = self.encode(left, scope, state, cycle, mode)?;
                let right = self.encode(right, scope, state, cycle, mode)?;
                ops::apply_binary(self.smt, *op, left, right)
            }
            Expression::Change { old, new } => match mode {
                ShadowProcessingMode::None => Err(EngineError::unsupported(
                    "change expression while shadow processing mode is NONE",
                )),
                ShadowProcessingMode::Old => self.encode(old, scope, state, cycle, mode),
                ShadowProcessingMode::New => self.encode(new, scope, state, cycle, mode),
                ShadowProcessingMode::Both => {
                    let old_term = self.encode(old, scope, state, cycle, mode)?;
                    let new_term = self.encode(new, scope, state, cycle, mode)?;
                    let version = self.shadow_version.get();
                    self.shadow_version.set(version + 1);
                    let shadow_name =
                        format!("{}_{}__{}", SYMBOLIC_SHADOW_PREFIX, version, cycle);
                    let shadow = if old_term.as_bool().is_some() && new_term.as_bool().is_some() {
                        Dynamic::from_ast(&self.smt.bool_constant(&shadow_name))
                    } else if old_term.as_int().is_some() && new_term.as_int().is_some() {
                        Dynamic::from_ast(&self.smt.int_constant(&shadow_name))
                    } else {
                        return Err(EngineError::sort_mismatch("change expression"));
                    };
                    state.set_symbolic_shadow(shadow_name, old_term, new_term);
                    Ok(shadow)
                }
            },
            Expression::BooleanToIntegerCast(operand) => {
                let operand = self.encode(operand, scope, state, cycle, mode)?;
                ops::bool_to_int(self.smt, operand)
            }
            Expression::IntegerToBooleanCast(operand) => {
                let operand = self.encode(operand, scope, state, cycle, mode)?;
                ops::int_to_bool(self.smt, operand)
            }
            Expression::Phi { .. } => {
                Err(EngineError::unsupported("phi expression outside merging"))
            }
        }
    }
}
