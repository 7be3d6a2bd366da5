//! Symbolic expression lowering.

use z3::ast::Dynamic;

use veriscan_ir::{DataType, Expression};
use veriscan_smt::Smt;

use crate::context::State;
use crate::error::{EngineError, Result};
use crate::interface::FlatInterface;
use crate::ops;

/// Version resolution for contextualized names.
///
/// Both the concolic state and the verification-condition state keep a
/// flattened-name version map; the encoder only needs this view of it.
pub trait VersionLookup {
    /// The current version of a flattened name.
    fn version(&self, flattened_name: &str) -> u32;

    /// The contextualized name of the current version in `cycle`.
    fn contextualized(&self, flattened_name: &str, cycle: u32) -> String {
        format!("{}_{}__{}", flattened_name, self.version(flattened_name), cycle)
    }
}

impl VersionLookup for State<'_> {
    fn version(&self, flattened_name: &str) -> u32 {
        State::version(self, flattened_name)
    }
}

/// Resolve an access expression to its flattened name and data type
/// under a scope prefix.
pub(crate) fn resolve_access<'a>(
    interface: &'a FlatInterface,
    scope: &str,
    expression: &Expression,
) -> Result<(String, &'a DataType)> {
    let path = expression
        .access_path()
        .ok_or_else(|| EngineError::unsupported("assignment to a non-access expression"))?;
    let flattened_name = format!("{}.{}", scope, path);
    let data_type = interface
        .data_type(&flattened_name)
        .ok_or_else(|| EngineError::unresolved(flattened_name.clone()))?;
    Ok((flattened_name, data_type))
}

/// Lowers IR expressions to symbolic terms.
///
/// Every variable access resolves to the free symbol of the variable's
/// current version under the access's scope; the returned term therefore
/// speaks about the same symbols the state's symbolic store defines.
pub struct Encoder<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    interface: &'a FlatInterface,
}

impl<'a, 'ctx> Encoder<'a, 'ctx> {
    /// Create an encoder over the facade and interface.
    pub fn new(smt: &'a Smt<'ctx>, interface: &'a FlatInterface) -> Self {
        Self { smt, interface }
    }

    /// Lower `expression` under `scope` against the current versions in
    /// `cycle`.
    pub fn encode(
        &self,
        expression: &Expression,
        scope: &str,
        versions: &impl VersionLookup,
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
                let (flattened_name, data_type) =
                    resolve_access(self.interface, scope, expression)?;
                let contextualized_name = versions.contextualized(&flattened_name, cycle);
                Ok(self.smt.constant(&contextualized_name, data_type)?)
            }
            Expression::Unary { op, operand } => {
                let operand = self.encode(operand, scope, versions, cycle)?;
                ops::apply_unary(*op, operand)
            }
            Expression::Binary { op, left, right } => {
                let left = self.encode(left, scope, versions, cycle)?;
                let right = self.encode(right, scope, versions, cycle)?;
                ops::apply_binary(self.smt, *op, left, right)
            }
            Expression::Change { .. } => Err(EngineError::unsupported(
                "change expression outside shadow execution",
            )),
            Expression::BooleanToIntegerCast(operand) => {
                let operand = self.encode(operand, scope, versions, cycle)?;
                ops::bool_to_int(self.smt, operand)
            }
            Expression::IntegerToBooleanCast(operand) => {
                let operand = self.encode(operand, scope, versions, cycle)?;
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
    use crate::context::Vertex;
    use std::collections::BTreeMap;
    use veriscan_ir::{Graph, GraphKind, Program, StorageClass, Variable};
    use veriscan_smt::Smt;

    fn single_graph_program() -> Program {
        let graph = Graph::new(
            "P",
            GraphKind::Program,
            vec![
                Variable::new("x", DataType::Int, StorageClass::Input),
                Variable::new("p", DataType::Bool, StorageClass::Local),
            ],
            BTreeMap::new(),
            0,
            0,
        );
        Program::new(vec![graph]).unwrap()
    }

    #[test]
    fn accesses_resolve_to_current_versions() {
        let config = z3::Config::new();
        let context = z3::Context::new(&config);
        let smt = Smt::new(&context);
        let program = single_graph_program();
        let interface = FlatInterface::new(&program);
        let encoder = Encoder::new(&smt, &interface);

        let mut state = State::new(Vertex::new("P", 0));
        state.bump_version("P.x");

        let term = encoder
            .encode(
                &Expression::gt(Expression::var("x"), Expression::int(0)),
                "P",
                &state,
                2,
            )
            .unwrap();
        let constants = smt.uninterpreted_constants(&term);
        let names: Vec<String> = constants.iter().map(Smt::constant_name).collect();
        assert_eq!(names, vec!["P.x_1__2"]);
    }

    #[test]
    fn unknown_variables_are_semantic_errors() {
        let config = z3::Config::new();
        let context = z3::Context::new(&config);
        let smt = Smt::new(&context);
        let program = single_graph_program();
        let interface = FlatInterface::new(&program);
        let encoder = Encoder::new(&smt, &interface);
        let state = State::new(Vertex::new("P", 0));

        let outcome = encoder.encode(&Expression::var("ghost"), "P", &state, 0);
        assert!(outcome.is_err());
    }

    #[test]
    fn change_is_rejected_outside_shadow_execution() {
        let config = z3::Config::new();
        let context = z3::Context::new(&config);
        let smt = Smt::new(&context);
        let program = single_graph_program();
        let interface = FlatInterface::new(&program);
        let encoder = Encoder::new(&smt, &interface);
        let state = State::new(Vertex::new("P", 0));

        let change = Expression::change(Expression::var("p"), Expression::bool(true));
        assert!(encoder.encode(&change, "P", &state, 0).is_err());
    }
}
