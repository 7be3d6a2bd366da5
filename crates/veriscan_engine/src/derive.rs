//! Test-case derivation from terminated contexts.

use tracing::trace;
use z3::ast::Dynamic;

use veriscan_smt::Smt;
use veriscan_testgen::{TestCase, TestValue};

use crate::context::{Context, State};
use crate::error::{EngineError, Result};
use crate::interface::FlatInterface;

fn value_of<'ctx>(term: &Dynamic<'ctx>) -> Result<TestValue> {
    if let Some(value) = Smt::bool_from(term) {
        return Ok(TestValue::Bool(value));
    }
    if let Some(value) = Smt::int_from(term) {
        return Ok(TestValue::Int(value));
    }
    Err(EngineError::unsupported(format!("non-constant valuation {}", term)))
}

/// Derive the concrete scenario that drives the program down the path of
/// a terminated context.
///
/// Solves the context's path constraint together with its definitional
/// closure. Whole-program inputs the model constrains take their model
/// values; inputs the model leaves free are "don't care" and take the
/// context's own witness values. The initial state valuations come from
/// the cycle-zero concrete store.
///
/// Returns `None` when the path constraint is unsatisfiable, which a
/// live context never is.
pub fn derive_test_case<'ctx>(
    smt: &Smt<'ctx>,
    interface: &FlatInterface,
    context: &Context<'ctx>,
) -> Result<Option<TestCase>> {
    derive_from_state(smt, interface, context.state(), context.cycle())
}

/// Derive a test case from a bare state, recording inputs for the first
/// `input_cycles` cycles.
///
/// This is the entry point for flavors with their own context types; a
/// mid-cycle divergence witness passes its current cycle plus one so the
/// inputs that force the divergence are recorded.
pub fn derive_from_state<'ctx>(
    smt: &Smt<'ctx>,
    interface: &FlatInterface,
    state: &State<'ctx>,
    input_cycles: u32,
) -> Result<Option<TestCase>> {
    let assertions = state.closed_path_constraint(smt);
    let model = match smt.check(&assertions)? {
        Some(model) => model,
        None => return Ok(None),
    };

    let mut test_case = TestCase::new();

    for variable in interface.state_variables() {
        let contextualized_name = format!("{}_0__0", variable.name);
        if let Some(term) = state.concrete_value(&contextualized_name) {
            test_case.set_initial_state(variable.name.clone(), value_of(term)?);
        }
    }

    for cycle in 0..input_cycles {
        test_case.touch_cycle(cycle);
        for input in interface.whole_program_inputs() {
            let data_type = interface
                .data_type(input)
                .ok_or_else(|| EngineError::unresolved(input.to_string()))?;
            let contextualized_name = format!("{}_0__{}", input, cycle);
            let constant = smt.constant(&contextualized_name, data_type)?;
            let term = match smt.model_value(&model, &constant) {
                Some(term) => term,
                None => match state.concrete_value(&contextualized_name) {
                    Some(witness) => witness.clone(),
                    None => continue,
                },
            };
            test_case.set_cycle_input(cycle, input.to_string(), value_of(&term)?);
        }
    }

    trace!(cycles = input_cycles, "derived test case");
    Ok(Some(test_case))
}
