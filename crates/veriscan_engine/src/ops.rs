//! Shared term combination for the expression walkers.
//!
//! The encoder, the evaluator, and their divergence-aware counterparts
//! all recurse the same way over operators; only their leaf handling
//! differs. The combination of already-lowered operand terms lives here
//! so the four walkers agree on sort checking and on which operators are
//! executable.
//!
//! Short-circuit evaluation is deliberately absent: both operands are
//! always lowered before combination.

use z3::ast::{Ast, Bool, Dynamic, Int};

use veriscan_ir::{BinaryOperator, UnaryOperator};
use veriscan_smt::Smt;

use crate::error::{EngineError, Result};

fn as_ints<'ctx>(
    op: BinaryOperator,
    left: &Dynamic<'ctx>,
    right: &Dynamic<'ctx>,
) -> Result<(Int<'ctx>, Int<'ctx>)> {
    match (left.as_int(), right.as_int()) {
        (Some(left), Some(right)) => Ok((left, right)),
        _ => Err(EngineError::sort_mismatch(op.to_string())),
    }
}

fn as_bools<'ctx>(
    op: BinaryOperator,
    left: &Dynamic<'ctx>,
    right: &Dynamic<'ctx>,
) -> Result<(Bool<'ctx>, Bool<'ctx>)> {
    match (left.as_bool(), right.as_bool()) {
        (Some(left), Some(right)) => Ok((left, right)),
        _ => Err(EngineError::sort_mismatch(op.to_string())),
    }
}

/// Combine two lowered operands under a binary operator.
pub(crate) fn apply_binary<'ctx>(
    smt: &Smt<'ctx>,
    op: BinaryOperator,
    left: Dynamic<'ctx>,
    right: Dynamic<'ctx>,
) -> Result<Dynamic<'ctx>> {
    match op {
        BinaryOperator::Add => {
            let (left, right) = as_ints(op, &left, &right)?;
            Ok(Dynamic::from_ast(&(left + right).simplify()))
        }
        BinaryOperator::Subtract => {
            let (left, right) = as_ints(op, &left, &right)?;
            Ok(Dynamic::from_ast(&(left - right).simplify()))
        }
        BinaryOperator::Multiply => {
            let (left, right) = as_ints(op, &left, &right)?;
            Ok(Dynamic::from_ast(&(left * right).simplify()))
        }
        BinaryOperator::Divide | BinaryOperator::Modulo | BinaryOperator::Exponentiation => {
            Err(EngineError::unsupported(op.to_string()))
        }
        BinaryOperator::GreaterThan => {
            let (left, right) = as_ints(op, &left, &right)?;
            Ok(Dynamic::from_ast(&left.gt(&right).simplify()))
        }
        BinaryOperator::LessThan => {
            let (left, right) = as_ints(op, &left, &right)?;
            Ok(Dynamic::from_ast(&left.lt(&right).simplify()))
        }
        BinaryOperator::GreaterThanOrEqual => {
            let (left, right) = as_ints(op, &left, &right)?;
            Ok(Dynamic::from_ast(&left.ge(&right).simplify()))
        }
        BinaryOperator::LessThanOrEqual => {
            let (left, right) = as_ints(op, &left, &right)?;
            Ok(Dynamic::from_ast(&left.le(&right).simplify()))
        }
        BinaryOperator::Equality => {
            let same_sort = (left.as_int().is_some() && right.as_int().is_some())
                || (left.as_bool().is_some() && right.as_bool().is_some());
            if !same_sort {
                return Err(EngineError::sort_mismatch(op.to_string()));
            }
            Ok(Dynamic::from_ast(&left._eq(&right).simplify()))
        }
        BinaryOperator::Inequality => {
            let same_sort = (left.as_int().is_some() && right.as_int().is_some())
                || (left.as_bool().is_some() && right.as_bool().is_some());
            if !same_sort {
                return Err(EngineError::sort_mismatch(op.to_string()));
            }
            Ok(Dynamic::from_ast(&left._eq(&right).not().simplify()))
        }
        BinaryOperator::BooleanAnd => {
            let (left, right) = as_bools(op, &left, &right)?;
            Ok(Dynamic::from_ast(
                &Bool::and(smt.context(), &[&left, &right]).simplify(),
            ))
        }
        BinaryOperator::BooleanOr => {
            let (left, right) = as_bools(op, &left, &right)?;
            Ok(Dynamic::from_ast(
                &Bool::or(smt.context(), &[&left, &right]).simplify(),
            ))
        }
        BinaryOperator::BooleanXor => {
            let (left, right) = as_bools(op, &left, &right)?;
            Ok(Dynamic::from_ast(&left.xor(&right).simplify()))
        }
    }
}

/// Combine a lowered operand under a unary operator.
pub(crate) fn apply_unary<'ctx>(op: UnaryOperator, operand: Dynamic<'ctx>) -> Result<Dynamic<'ctx>> {
    match op {
        UnaryOperator::Negation => {
            let operand = operand
                .as_int()
                .ok_or_else(|| EngineError::sort_mismatch(op.to_string()))?;
            Ok(Dynamic::from_ast(&(-operand).simplify()))
        }
        UnaryOperator::UnaryPlus => {
            if operand.as_int().is_none() {
                return Err(EngineError::sort_mismatch(op.to_string()));
            }
            Ok(operand)
        }
        UnaryOperator::Complement => {
            let operand = operand
                .as_bool()
                .ok_or_else(|| EngineError::sort_mismatch(op.to_string()))?;
            Ok(Dynamic::from_ast(&operand.not().simplify()))
        }
    }
}

/// Lower an explicit boolean-to-integer cast.
pub(crate) fn bool_to_int<'ctx>(smt: &Smt<'ctx>, operand: Dynamic<'ctx>) -> Result<Dynamic<'ctx>> {
    let operand = operand
        .as_bool()
        .ok_or_else(|| EngineError::sort_mismatch("BOOL_TO_INT"))?;
    let cast = operand.ite(&smt.int_value(1), &smt.int_value(0));
    Ok(Dynamic::from_ast(&cast.simplify()))
}

/// Lower an explicit integer-to-boolean cast.
pub(crate) fn int_to_bool<'ctx>(smt: &Smt<'ctx>, operand: Dynamic<'ctx>) -> Result<Dynamic<'ctx>> {
    let operand = operand
        .as_int()
        .ok_or_else(|| EngineError::sort_mismatch("INT_TO_BOOL"))?;
    let cast = operand._eq(&smt.int_value(0)).not();
    Ok(Dynamic::from_ast(&cast.simplify()))
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
    fn arithmetic_folds_constants() {
        with_smt(|smt| {
            let sum = apply_binary(
                smt,
                BinaryOperator::Add,
                Dynamic::from_ast(&smt.int_value(2)),
                Dynamic::from_ast(&smt.int_value(3)),
            )
            .unwrap();
            assert_eq!(Smt::int_from(&sum), Some(5));
        });
    }

    #[test]
    fn division_is_not_executable() {
        with_smt(|smt| {
            let outcome = apply_binary(
                smt,
                BinaryOperator::Divide,
                Dynamic::from_ast(&smt.int_value(6)),
                Dynamic::from_ast(&smt.int_value(2)),
            );
            assert!(outcome.is_err());
        });
    }

    #[test]
    fn sort_mismatch_is_rejected() {
        with_smt(|smt| {
            let outcome = apply_binary(
                smt,
                BinaryOperator::Add,
                Dynamic::from_ast(&smt.int_value(1)),
                Dynamic::from_ast(&smt.bool_value(true)),
            );
            assert!(outcome.is_err());
        });
    }

    #[test]
    fn casts_round_both_ways() {
        with_smt(|smt| {
            let one = bool_to_int(smt, Dynamic::from_ast(&smt.bool_value(true))).unwrap();
            assert_eq!(Smt::int_from(&one), Some(1));
            let truthy = int_to_bool(smt, Dynamic::from_ast(&smt.int_value(-3))).unwrap();
            assert_eq!(Smt::bool_from(&truthy), Some(true));
            let falsy = int_to_bool(smt, Dynamic::from_ast(&smt.int_value(0))).unwrap();
            assert_eq!(Smt::bool_from(&falsy), Some(false));
        });
    }
}
