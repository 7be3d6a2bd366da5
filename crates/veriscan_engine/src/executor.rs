//! Single-step instruction interpretation.

use tracing::{trace, warn};
use z3::ast::Dynamic;

use veriscan_ir::{Expression, Instruction, Program};
use veriscan_smt::Smt;

use crate::config::Configuration;
use crate::context::{Context, Frame, Vertex};
use crate::encoder::{resolve_access, Encoder};
use crate::error::{EngineError, Result};
use crate::evaluator::Evaluator;
use crate::interface::FlatInterface;

/// The outcome of one step: usually one context, two at a forked
/// data-dependent branch, none when a reachability hint discards the
/// concretely implied direction and the other side is infeasible.
///
/// Successors are produced concrete-branch first; the fork, when
/// present, carries the opposite guard.
pub struct Successors<'ctx> {
    contexts: Vec<Context<'ctx>>,
}

impl<'ctx> Successors<'ctx> {
    fn none() -> Self {
        Self { contexts: Vec::new() }
    }

    fn single(context: Context<'ctx>) -> Self {
        Self { contexts: vec![context] }
    }

    fn pair(context: Context<'ctx>, forked: Option<Context<'ctx>>) -> Self {
        let mut contexts = vec![context];
        contexts.extend(forked);
        Self { contexts }
    }

    /// The successors in production order.
    pub fn into_vec(self) -> Vec<Context<'ctx>> {
        self.contexts
    }
}

/// The per-instruction interpreter for the concolic flavors.
pub struct Executor<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    program: &'a Program,
    interface: &'a FlatInterface,
    config: &'a Configuration,
    encoder: Encoder<'a, 'ctx>,
    evaluator: Evaluator<'a, 'ctx>,
}

impl<'a, 'ctx> Executor<'a, 'ctx> {
    /// Create an executor.
    pub fn new(
        smt: &'a Smt<'ctx>,
        program: &'a Program,
        interface: &'a FlatInterface,
        config: &'a Configuration,
    ) -> Self {
        Self {
            smt,
            program,
            interface,
            config,
            encoder: Encoder::new(smt, interface),
            evaluator: Evaluator::new(smt, interface),
        }
    }

    /// Execute the instruction at the context's current vertex.
    pub fn execute(&self, mut context: Context<'ctx>) -> Result<Successors<'ctx>> {
        let vertex = context.state().vertex().clone();
        let graph = self
            .program
            .graph(&vertex.graph)
            .ok_or_else(|| EngineError::unresolved(vertex.graph.clone()))?;

        if vertex.label == graph.exit() {
            if context.depth() > 1 {
                // Return from the callee to the stored return label.
                let callee_frame = context.pop_frame().expect("depth checked above");
                let caller_graph = context.frame().graph().to_string();
                trace!(callee = %callee_frame, "returning from callee");
                context
                    .state_mut()
                    .set_vertex(Vertex::new(caller_graph, callee_frame.return_label()));
                return Ok(Successors::single(context));
            }
            return self.finish_cycle(context);
        }

        let instruction = graph
            .instruction(vertex.label)
            .ok_or_else(|| {
                EngineError::from(veriscan_ir::IrError::new(
                    veriscan_ir::IrErrorKind::DanglingLabel { target: vertex.label },
                ))
                .in_graph(vertex.graph.clone())
            })?
            .clone();

        let outcome = match instruction {
            Instruction::Assign { variable, expression, next, .. } => {
                if matches!(expression, Expression::NondeterministicConstant) {
                    // A sole nondeterministic right-hand side havocs the
                    // assigned variable.
                    self.havoc(context, &vertex, &variable, next)
                } else {
                    self.assign(context, &vertex, &variable, &expression, next)
                }
            }
            Instruction::Havoc { variable, next } => self.havoc(context, &vertex, &variable, next),
            Instruction::Goto { next } => {
                context.state_mut().set_vertex(Vertex::new(vertex.graph.clone(), next));
                Ok(Successors::single(context))
            }
            Instruction::If { condition, goto_then, goto_else } => {
                self.branch(context, &vertex, &condition, goto_then, goto_else)
            }
            Instruction::While { condition, goto_body, goto_exit } => {
                self.branch(context, &vertex, &condition, goto_body, goto_exit)
            }
            Instruction::Call { callee, goto_intraprocedural, .. } => {
                self.call(context, &vertex, &callee, goto_intraprocedural)
            }
        };
        outcome.map_err(|error| locate(error, &vertex))
    }

    fn assign(
        &self,
        mut context: Context<'ctx>,
        vertex: &Vertex,
        variable: &Expression,
        expression: &Expression,
        next: usize,
    ) -> Result<Successors<'ctx>> {
        let scope = context.frame().scope().to_string();
        let cycle = context.cycle();
        let symbolic = self.encoder.encode(expression, &scope, context.state(), cycle)?;
        let concrete = self.evaluator.evaluate(expression, &scope, context.state(), cycle)?;
        let (flattened_name, _) = resolve_access(self.interface, &scope, variable)?;

        let state = context.state_mut();
        state.bump_version(&flattened_name);
        let contextualized_name = state.current_name(&flattened_name, cycle);
        trace!(name = %contextualized_name, value = %concrete, "assign");
        state.set_symbolic(contextualized_name.clone(), symbolic);
        state.set_concrete(contextualized_name, concrete);
        state.set_vertex(Vertex::new(vertex.graph.clone(), next));
        Ok(Successors::single(context))
    }

    fn havoc(
        &self,
        mut context: Context<'ctx>,
        vertex: &Vertex,
        variable: &Expression,
        next: usize,
    ) -> Result<Successors<'ctx>> {
        let scope = context.frame().scope().to_string();
        let cycle = context.cycle();
        let (flattened_name, data_type) = resolve_access(self.interface, &scope, variable)?;
        let data_type = data_type.clone();

        let state = context.state_mut();
        state.bump_version(&flattened_name);
        let contextualized_name = state.current_name(&flattened_name, cycle);
        let symbol = self.smt.constant(&contextualized_name, &data_type)?;
        let witness = self.smt.random_value(&data_type)?;
        trace!(name = %contextualized_name, witness = %witness, "havoc");
        state.set_symbolic(contextualized_name.clone(), symbol);
        state.set_concrete(contextualized_name, witness);
        state.set_vertex(Vertex::new(vertex.graph.clone(), next));
        Ok(Successors::single(context))
    }

    fn branch(
        &self,
        mut context: Context<'ctx>,
        vertex: &Vertex,
        condition: &Expression,
        then_label: usize,
        else_label: usize,
    ) -> Result<Successors<'ctx>> {
        let scope = context.frame().scope().to_string();
        let cycle = context.cycle();
        let encoded = self.encoder.encode(condition, &scope, context.state(), cycle)?;
        let phi = encoded
            .as_bool()
            .ok_or_else(|| EngineError::sort_mismatch("branch condition"))?;
        let value = self.evaluator.evaluate(condition, &scope, context.state(), cycle)?;
        let taken = Smt::bool_from(&value).ok_or_else(EngineError::non_concrete_condition)?;

        // The original context keeps its concrete branch so its store
        // stays a model of its path constraint; the fork takes the
        // opposite direction.
        let (concrete_label, opposite_label, positive, negative) = if taken {
            (then_label, else_label, phi.clone(), phi.not())
        } else {
            (else_label, then_label, phi.not(), phi)
        };

        let (then_feasible, else_feasible) =
            self.config.branch_feasibility(&vertex.graph, vertex.label);
        let concrete_feasible =
            if concrete_label == then_label { then_feasible } else { else_feasible };
        let opposite_feasible =
            if opposite_label == then_label { then_feasible } else { else_feasible };

        let forked = if opposite_feasible {
            let mut assertions = context.state().path_constraint().to_vec();
            assertions.push(negative.clone());
            let closure = context.state().definitional_closure(self.smt, &assertions);
            assertions.extend(closure);
            match self.smt.check(&assertions)? {
                Some(model) => {
                    trace!(vertex = %vertex, "forking opposite branch");
                    Some(context.fork(
                        self.smt,
                        Vertex::new(vertex.graph.clone(), opposite_label),
                        &model,
                        negative,
                    ))
                }
                None => None,
            }
        } else {
            trace!(vertex = %vertex, "opposite branch pruned by reachability hint");
            None
        };

        if !concrete_feasible {
            // The abstract pre-pass proved the concretely implied side
            // unreachable in the real system; only the other side, when
            // satisfiable, continues.
            warn!(vertex = %vertex, "concretely implied branch hinted infeasible");
            return Ok(match forked {
                Some(forked) => Successors::single(forked),
                None => Successors::none(),
            });
        }

        context.state_mut().push_path_constraint(positive);
        context.state_mut().set_vertex(Vertex::new(vertex.graph.clone(), concrete_label));
        Ok(Successors::pair(context, forked))
    }

    fn call(
        &self,
        mut context: Context<'ctx>,
        vertex: &Vertex,
        callee: &Expression,
        return_label: usize,
    ) -> Result<Successors<'ctx>> {
        let graph = self
            .program
            .graph(&vertex.graph)
            .ok_or_else(|| EngineError::unresolved(vertex.graph.clone()))?;
        let callee_graph = self.program.callee(graph, callee)?;
        let instance_path = callee
            .access_path()
            .ok_or_else(|| EngineError::unsupported("call target is not an access"))?;
        let scope = format!("{}.{}", context.frame().scope(), instance_path);
        trace!(callee = callee_graph.name(), scope = %scope, "entering callee");
        context.push_frame(Frame::new(callee_graph.name(), scope, return_label));
        context
            .state_mut()
            .set_vertex(Vertex::new(callee_graph.name(), callee_graph.entry()));
        Ok(Successors::single(context))
    }

    /// Cross the cycle boundary: whole-program inputs get fresh symbols
    /// and fresh witness values at the new cycle, every other variable
    /// carries its last valuation forward, and versions reset under the
    /// incremented cycle suffix.
    fn finish_cycle(&self, mut context: Context<'ctx>) -> Result<Successors<'ctx>> {
        let previous_cycle = context.cycle();
        let next_cycle = previous_cycle + 1;
        trace!(cycle = next_cycle, "crossing cycle boundary");
        for variable in self.interface.variables() {
            let old_name = context.state().current_name(&variable.name, previous_cycle);
            let new_name = format!("{}_0__{}", variable.name, next_cycle);
            if self.interface.is_whole_program_input(&variable.name) {
                let symbol = self.smt.constant(&new_name, &variable.data_type)?;
                let witness = self.smt.random_value(&variable.data_type)?;
                context.state_mut().set_symbolic(new_name.clone(), symbol);
                context.state_mut().set_concrete(new_name, witness);
            } else {
                let symbolic: Dynamic<'ctx> = context
                    .state()
                    .symbolic_value(&old_name)
                    .cloned()
                    .ok_or_else(|| EngineError::unresolved(old_name.clone()))?;
                let concrete: Dynamic<'ctx> = context
                    .state()
                    .concrete_value(&old_name)
                    .cloned()
                    .ok_or_else(|| EngineError::unresolved(old_name.clone()))?;
                context.state_mut().set_symbolic(new_name.clone(), symbolic);
                context.state_mut().set_concrete(new_name, concrete);
            }
        }
        context.state_mut().reset_versions();
        context.set_cycle(next_cycle);
        let main = self.program.main();
        context.state_mut().set_vertex(Vertex::new(main.name(), main.entry()));
        Ok(Successors::single(context))
    }
}

fn locate(error: EngineError, vertex: &Vertex) -> EngineError {
    if error.graph.is_some() {
        error
    } else {
        error.in_graph(vertex.graph.clone()).at_label(vertex.label)
    }
}
