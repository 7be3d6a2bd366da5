//! Concrete replay of generated test cases.
//!
//! A replay runs the program purely concretely, driven by a test case's
//! initial valuations and per-cycle inputs, and records the concrete
//! store at every cycle end. This closes the loop on generated suites:
//! re-executing a derived test case against the same program must
//! reproduce the behavior the symbolic path predicted.

use std::collections::BTreeMap;

use tracing::trace;
use z3::ast::Dynamic;

use veriscan_ir::{Expression, Instruction, Program};
use veriscan_smt::Smt;
use veriscan_testgen::{TestCase, TestValue};

use crate::context::{Frame, State, Vertex};
use crate::encoder::resolve_access;
use crate::error::{EngineError, Result};
use crate::evaluator::Evaluator;
use crate::interface::FlatInterface;

/// Safety bound on steps per cycle; a replay that exceeds it is stuck in
/// a loop the generated inputs never exit.
const STEP_BOUND: usize = 100_000;

fn to_value(term: &Dynamic<'_>) -> Result<TestValue> {
    if let Some(value) = Smt::bool_from(term) {
        return Ok(TestValue::Bool(value));
    }
    if let Some(value) = Smt::int_from(term) {
        return Ok(TestValue::Int(value));
    }
    Err(EngineError::unsupported(format!("non-constant replay value {}", term)))
}

/// Execute `test_case` concretely against `program`.
///
/// Returns, per cycle, the flattened-name valuations at the cycle's end.
/// Inputs the test case leaves unbound take the type's default value.
pub fn replay<'ctx>(
    smt: &Smt<'ctx>,
    program: &Program,
    test_case: &TestCase,
) -> Result<Vec<BTreeMap<String, TestValue>>> {
    let interface = FlatInterface::new(program);
    let evaluator = Evaluator::new(smt, &interface);
    let main = program.main();

    let mut state = State::new(Vertex::new(main.name(), main.entry()));
    for variable in interface.variables() {
        let contextualized_name = format!("{}_0__0", variable.name);
        let term = match test_case.initial_state().get(&variable.name) {
            Some(TestValue::Bool(value)) => Dynamic::from_ast(&smt.bool_value(*value)),
            Some(TestValue::Int(value)) => Dynamic::from_ast(&smt.int_value(*value)),
            None => match &variable.initializer {
                Some(literal) => smt.literal_value(literal),
                None => smt.default_value(&variable.data_type)?,
            },
        };
        state.set_concrete(contextualized_name, term);
    }
    let mut call_stack = vec![Frame::new(main.name(), main.name(), main.exit())];

    let mut cycle_end_valuations = Vec::new();
    for cycle in 0..test_case.cycle_count() {
        // Bind this cycle's inputs; unbound ones take defaults.
        let bound_inputs = test_case.cycle_inputs().get(&cycle);
        for input in interface.whole_program_inputs() {
            let contextualized_name = format!("{}_0__{}", input, cycle);
            let term = match bound_inputs.and_then(|inputs| inputs.get(input)) {
                Some(TestValue::Bool(value)) => Dynamic::from_ast(&smt.bool_value(*value)),
                Some(TestValue::Int(value)) => Dynamic::from_ast(&smt.int_value(*value)),
                None => {
                    let data_type = interface
                        .data_type(input)
                        .ok_or_else(|| EngineError::unresolved(input.to_string()))?;
                    smt.default_value(data_type)?
                }
            };
            state.set_concrete(contextualized_name, term);
        }

        for step in 0.. {
            if step >= STEP_BOUND {
                return Err(EngineError::unsupported("replay exceeded its step bound"));
            }
            let vertex = state.vertex().clone();
            let graph = program
                .graph(&vertex.graph)
                .ok_or_else(|| EngineError::unresolved(vertex.graph.clone()))?;
            if vertex.label == graph.exit() {
                if call_stack.len() > 1 {
                    let callee_frame = call_stack.pop().expect("depth checked above");
                    let caller = call_stack.last().expect("main frame remains");
                    state.set_vertex(Vertex::new(
                        caller.graph(),
                        callee_frame.return_label(),
                    ));
                    continue;
                }
                break;
            }
            let scope = call_stack.last().expect("a frame is live").scope().to_string();
            let instruction = graph
                .instruction(vertex.label)
                .ok_or_else(|| {
                    EngineError::from(veriscan_ir::IrError::new(
                        veriscan_ir::IrErrorKind::DanglingLabel { target: vertex.label },
                    ))
                    .in_graph(vertex.graph.clone())
                })?
                .clone();
            match instruction {
                Instruction::Assign { variable, expression, next, .. } => {
                    let term = if matches!(expression, Expression::NondeterministicConstant) {
                        let (_, data_type) = resolve_access(&interface, &scope, &variable)?;
                        smt.random_value(data_type)?
                    } else {
                        evaluator.evaluate(&expression, &scope, &state, cycle)?
                    };
                    let (flattened_name, _) = resolve_access(&interface, &scope, &variable)?;
                    state.bump_version(&flattened_name);
                    let contextualized_name = state.current_name(&flattened_name, cycle);
                    state.set_concrete(contextualized_name, term);
                    state.set_vertex(Vertex::new(vertex.graph.clone(), next));
                }
                Instruction::Havoc { variable, next } => {
                    let (flattened_name, data_type) =
                        resolve_access(&interface, &scope, &variable)?;
                    let term = smt.random_value(data_type)?;
                    state.bump_version(&flattened_name);
                    let contextualized_name = state.current_name(&flattened_name, cycle);
                    state.set_concrete(contextualized_name, term);
                    state.set_vertex(Vertex::new(vertex.graph.clone(), next));
                }
                Instruction::Goto { next } => {
                    state.set_vertex(Vertex::new(vertex.graph.clone(), next));
                }
                Instruction::If { condition, goto_then, goto_else } => {
                    let value = evaluator.evaluate(&condition, &scope, &state, cycle)?;
                    let taken = Smt::bool_from(&value)
                        .ok_or_else(EngineError::non_concrete_condition)?;
                    let target = if taken { goto_then } else { goto_else };
                    state.set_vertex(Vertex::new(vertex.graph.clone(), target));
                }
                Instruction::While { condition, goto_body, goto_exit } => {
                    let value = evaluator.evaluate(&condition, &scope, &state, cycle)?;
                    let taken = Smt::bool_from(&value)
                        .ok_or_else(EngineError::non_concrete_condition)?;
                    let target = if taken { goto_body } else { goto_exit };
                    state.set_vertex(Vertex::new(vertex.graph.clone(), target));
                }
                Instruction::Call { callee, goto_intraprocedural, .. } => {
                    let callee_graph = program.callee(graph, &callee)?;
                    let instance_path = callee.access_path().ok_or_else(|| {
                        EngineError::unsupported("call target is not an access")
                    })?;
                    call_stack.push(Frame::new(
                        callee_graph.name(),
                        format!("{}.{}", scope, instance_path),
                        goto_intraprocedural,
                    ));
                    state
                        .set_vertex(Vertex::new(callee_graph.name(), callee_graph.entry()));
                }
            }
        }

        // Record the cycle-end valuations and carry state forward.
        let mut valuations = BTreeMap::new();
        for variable in interface.variables() {
            let contextualized_name = state.current_name(&variable.name, cycle);
            let term = state
                .concrete_value(&contextualized_name)
                .ok_or_else(|| EngineError::unresolved(contextualized_name.clone()))?;
            valuations.insert(variable.name.clone(), to_value(term)?);
        }
        trace!(cycle, "replayed cycle");
        cycle_end_valuations.push(valuations);

        for variable in interface.variables() {
            if interface.is_whole_program_input(&variable.name) {
                continue;
            }
            let old_name = state.current_name(&variable.name, cycle);
            let carried = state
                .concrete_value(&old_name)
                .cloned()
                .ok_or_else(|| EngineError::unresolved(old_name.clone()))?;
            state.set_concrete(format!("{}_0__{}", variable.name, cycle + 1), carried);
        }
        state.reset_versions();
        state.set_vertex(Vertex::new(main.name(), main.entry()));
    }
    Ok(cycle_end_valuations)
}
