//! Divergence-aware single-step interpretation.

use tracing::{debug, trace};
use z3::ast::Bool;
use z3::Model;

use veriscan_ir::{Expression, Instruction, Program};
use veriscan_smt::Smt;

use crate::config::ShadowProcessingMode;
use crate::context::{Frame, State, Vertex};
use crate::encoder::resolve_access;
use crate::error::{EngineError, Result};
use crate::explorer::Prioritized;
use crate::interface::FlatInterface;
use crate::shadow::encoder::ShadowEncoder;
use crate::shadow::evaluator::ShadowEvaluator;
use crate::shadow::state::DivergentState;

/// A context of the shadow flavor.
///
/// Carries its own processing mode: contexts start in the configured
/// mode (BOTH by default) and drop to OLD or NEW when a divergence
/// splits them, after which they progress as single-revision contexts.
#[derive(Debug, Clone)]
pub struct ShadowContext<'ctx> {
    cycle: u32,
    state: DivergentState<'ctx>,
    call_stack: Vec<Frame>,
    mode: ShadowProcessingMode,
}

impl<'ctx> ShadowContext<'ctx> {
    /// Create a shadow context.
    pub fn new(
        cycle: u32,
        state: DivergentState<'ctx>,
        call_stack: Vec<Frame>,
        mode: ShadowProcessingMode,
    ) -> Self {
        Self { cycle, state, call_stack, mode }
    }

    /// The current cycle.
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// The change-processing mode this context runs in.
    pub fn mode(&self) -> ShadowProcessingMode {
        self.mode
    }

    /// The divergent state.
    pub fn state(&self) -> &DivergentState<'ctx> {
        &self.state
    }

    /// The divergent state, mutably.
    pub fn state_mut(&mut self) -> &mut DivergentState<'ctx> {
        &mut self.state
    }

    /// The innermost frame.
    pub fn frame(&self) -> &Frame {
        self.call_stack.last().expect("a context always has a frame")
    }

    /// The call stack, outermost first.
    pub fn call_stack(&self) -> &[Frame] {
        &self.call_stack
    }
}

impl Prioritized for ShadowContext<'_> {
    fn cycle(&self) -> u32 {
        self.cycle
    }

    fn depth(&self) -> usize {
        self.call_stack.len()
    }

    fn vertex(&self) -> &Vertex {
        self.state.state().vertex()
    }
}

/// Two single-revision contexts born from one forced divergence.
#[derive(Debug)]
pub struct DivergencePair<'ctx> {
    /// The old revision's continuation.
    pub old: ShadowContext<'ctx>,
    /// The new revision's continuation.
    pub new: ShadowContext<'ctx>,
}

/// The outcome of one shadow step.
#[derive(Debug, Default)]
pub struct ShadowSuccessors<'ctx> {
    /// Contexts that keep progressing in their current mode.
    pub contexts: Vec<ShadowContext<'ctx>>,
    /// Divergences forced at this step; the paired contexts progress
    /// independently and never merge again.
    pub divergences: Vec<DivergencePair<'ctx>>,
}

/// The per-instruction interpreter for shadow execution.
pub struct ShadowExecutor<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    program: &'a Program,
    interface: &'a FlatInterface,
    encoder: ShadowEncoder<'a, 'ctx>,
    evaluator: ShadowEvaluator<'a, 'ctx>,
}

impl<'a, 'ctx> ShadowExecutor<'a, 'ctx> {
    /// Create a shadow executor.
    pub fn new(smt: &'a Smt<'ctx>, program: &'a Program, interface: &'a FlatInterface) -> Self {
        Self {
            smt,
            program,
            interface,
            encoder: ShadowEncoder::new(smt, interface),
            evaluator: ShadowEvaluator::new(smt, interface),
        }
    }

    /// Execute the instruction at the context's current vertex.
    pub fn execute(&self, mut context: ShadowContext<'ctx>) -> Result<ShadowSuccessors<'ctx>> {
        let vertex = context.state.state().vertex().clone();
        let graph = self
            .program
            .graph(&vertex.graph)
            .ok_or_else(|| EngineError::unresolved(vertex.graph.clone()))?;

        if vertex.label == graph.exit() {
            if context.call_stack.len() > 1 {
                let callee_frame =
                    context.call_stack.pop().expect("depth checked above");
                let caller_graph = context.frame().graph().to_string();
                context
                    .state
                    .state_mut()
                    .set_vertex(Vertex::new(caller_graph, callee_frame.return_label()));
                return Ok(single(context));
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

        match instruction {
            Instruction::Assign { variable, expression, next, .. } => {
                if matches!(expression, Expression::NondeterministicConstant) {
                    self.havoc(context, &vertex, &variable, next)
                } else {
                    self.assign(context, &vertex, &variable, &expression, next)
                }
            }
            Instruction::Havoc { variable, next } => self.havoc(context, &vertex, &variable, next),
            Instruction::Goto { next } => {
                context.state.state_mut().set_vertex(Vertex::new(vertex.graph.clone(), next));
                Ok(single(context))
            }
            Instruction::If { condition, goto_then, goto_else } => {
                self.branch(context, &vertex, &condition, goto_then, goto_else)
            }
            Instruction::While { condition, goto_body, goto_exit } => {
                self.branch(context, &vertex, &condition, goto_body, goto_exit)
            }
            Instruction::Call { callee, goto_intraprocedural, .. } => {
                let callee_graph = self.program.callee(graph, &callee)?;
                let instance_path = callee
                    .access_path()
                    .ok_or_else(|| EngineError::unsupported("call target is not an access"))?;
                let scope = format!("{}.{}", context.frame().scope(), instance_path);
                context.call_stack.push(Frame::new(
                    callee_graph.name(),
                    scope,
                    goto_intraprocedural,
                ));
                context
                    .state
                    .state_mut()
                    .set_vertex(Vertex::new(callee_graph.name(), callee_graph.entry()));
                Ok(single(context))
            }
        }
        .map_err(|error| {
            if error.graph.is_some() {
                error
            } else {
                error.in_graph(vertex.graph.clone()).at_label(vertex.label)
            }
        })
    }

    fn assign(
        &self,
        mut context: ShadowContext<'ctx>,
        vertex: &Vertex,
        variable: &Expression,
        expression: &Expression,
        next: usize,
    ) -> Result<ShadowSuccessors<'ctx>> {
        let scope = context.frame().scope().to_string();
        let cycle = context.cycle;
        let mode = context.mode;
        let symbolic =
            self.encoder.encode(expression, &scope, &mut context.state, cycle, mode)?;
        let concrete =
            self.evaluator.evaluate(expression, &scope, &mut context.state, cycle, mode)?;
        let (flattened_name, _) = resolve_access(self.interface, &scope, variable)?;

        let state = context.state.state_mut();
        state.bump_version(&flattened_name);
        let contextualized_name = state.current_name(&flattened_name, cycle);
        state.set_symbolic(contextualized_name.clone(), symbolic);
        state.set_concrete(contextualized_name, concrete);
        state.set_vertex(Vertex::new(vertex.graph.clone(), next));
        Ok(single(context))
    }

    fn havoc(
        &self,
        mut context: ShadowContext<'ctx>,
        vertex: &Vertex,
        variable: &Expression,
        next: usize,
    ) -> Result<ShadowSuccessors<'ctx>> {
        let scope = context.frame().scope().to_string();
        let cycle = context.cycle;
        let (flattened_name, data_type) = resolve_access(self.interface, &scope, variable)?;
        let data_type = data_type.clone();

        let state = context.state.state_mut();
        state.bump_version(&flattened_name);
        let contextualized_name = state.current_name(&flattened_name, cycle);
        let symbol = self.smt.constant(&contextualized_name, &data_type)?;
        let witness = self.smt.random_value(&data_type)?;
        state.set_symbolic(contextualized_name.clone(), symbol);
        state.set_concrete(contextualized_name, witness);
        state.set_vertex(Vertex::new(vertex.graph.clone(), next));
        Ok(single(context))
    }

    fn branch(
        &self,
        context: ShadowContext<'ctx>,
        vertex: &Vertex,
        condition: &Expression,
        then_label: usize,
        else_label: usize,
    ) -> Result<ShadowSuccessors<'ctx>> {
        match context.mode {
            ShadowProcessingMode::Both => {
                self.branch_both(context, vertex, condition, then_label, else_label)
            }
            _ => self.branch_projected(context, vertex, condition, then_label, else_label),
        }
    }

    /// Branch of a single-revision context: the baseline fork semantics
    /// with change expressions projected by the context's mode.
    fn branch_projected(
        &self,
        mut context: ShadowContext<'ctx>,
        vertex: &Vertex,
        condition: &Expression,
        then_label: usize,
        else_label: usize,
    ) -> Result<ShadowSuccessors<'ctx>> {
        let scope = context.frame().scope().to_string();
        let cycle = context.cycle;
        let mode = context.mode;
        let phi = self
            .encoder
            .encode(condition, &scope, &mut context.state, cycle, mode)?
            .as_bool()
            .ok_or_else(|| EngineError::sort_mismatch("branch condition"))?;
        let value =
            self.evaluator.evaluate(condition, &scope, &mut context.state, cycle, mode)?;
        let taken = Smt::bool_from(&value).ok_or_else(EngineError::non_concrete_condition)?;

        let (concrete_label, opposite_label) =
            if taken { (then_label, else_label) } else { (else_label, then_label) };
        let (positive, negative) = polarity(&phi, taken);

        let mut successors = ShadowSuccessors::default();
        if let Some(model) =
            self.check_with_closure(context.state.state(), &[negative.clone()])?
        {
            let forked_state = context.state.fork(
                self.smt,
                Vertex::new(vertex.graph.clone(), opposite_label),
                &model,
                negative,
            );
            successors.contexts.push(ShadowContext::new(
                cycle,
                forked_state,
                context.call_stack.clone(),
                mode,
            ));
        }
        context.state.state_mut().push_path_constraint(positive);
        context
            .state
            .state_mut()
            .set_vertex(Vertex::new(vertex.graph.clone(), concrete_label));
        successors.contexts.push(context);
        Ok(successors)
    }

    /// The two-phase divergence check of a BOTH-mode branch.
    ///
    /// The condition is encoded once with both revisions carried, then
    /// lowered to its old and new forms. If the two concrete truth
    /// values already disagree, the state splits immediately. Otherwise
    /// the step forks like a baseline branch under the agreed direction
    /// and additionally probes the two disagreement combinations for
    /// inputs that would force a divergence.
    fn branch_both(
        &self,
        mut context: ShadowContext<'ctx>,
        vertex: &Vertex,
        condition: &Expression,
        then_label: usize,
        else_label: usize,
    ) -> Result<ShadowSuccessors<'ctx>> {
        let scope = context.frame().scope().to_string();
        let cycle = context.cycle;
        let psi = self.encoder.encode(
            condition,
            &scope,
            &mut context.state,
            cycle,
            ShadowProcessingMode::Both,
        )?;
        let psi_old = context
            .state
            .lower_symbolic_deep(self.smt, &psi, ShadowProcessingMode::Old)
            .as_bool()
            .ok_or_else(|| EngineError::sort_mismatch("branch condition"))?;
        let psi_new = context
            .state
            .lower_symbolic_deep(self.smt, &psi, ShadowProcessingMode::New)
            .as_bool()
            .ok_or_else(|| EngineError::sort_mismatch("branch condition"))?;

        let eta = self.evaluator.evaluate(
            condition,
            &scope,
            &mut context.state,
            cycle,
            ShadowProcessingMode::Both,
        )?;
        let b_old = Smt::bool_from(
            &context.state.lower_concrete(self.smt, &eta, ShadowProcessingMode::Old),
        )
        .ok_or_else(EngineError::non_concrete_condition)?;
        let b_new = Smt::bool_from(
            &context.state.lower_concrete(self.smt, &eta, ShadowProcessingMode::New),
        )
        .ok_or_else(EngineError::non_concrete_condition)?;

        if b_old != b_new {
            // The current witness already forces the revisions apart.
            debug!(vertex = %vertex, b_old, b_new, "divergence at current witness");
            let pair = self.split(
                &context,
                vertex,
                &psi_old,
                &psi_new,
                b_old,
                b_new,
                then_label,
                else_label,
                None,
            );
            return Ok(ShadowSuccessors { contexts: Vec::new(), divergences: vec![pair] });
        }

        let taken = b_old;
        let (concrete_label, opposite_label) =
            if taken { (then_label, else_label) } else { (else_label, then_label) };
        let (pos_old, neg_old) = polarity(&psi_old, taken);
        let (pos_new, neg_new) = polarity(&psi_new, taken);

        let mut successors = ShadowSuccessors::default();

        // Both revisions flip together: an ordinary fork that keeps the
        // shadow registries alive.
        if let Some(model) = self.check_with_closure(
            context.state.state(),
            &[neg_old.clone(), neg_new.clone()],
        )? {
            let mut forked = context.state.fork(
                self.smt,
                Vertex::new(vertex.graph.clone(), opposite_label),
                &model,
                neg_old.clone(),
            );
            forked.state_mut().push_path_constraint(neg_new.clone());
            successors.contexts.push(ShadowContext::new(
                cycle,
                forked,
                context.call_stack.clone(),
                ShadowProcessingMode::Both,
            ));
        }

        // The two disagreement combinations; each satisfiable one is an
        // input that forces the first observable divergence here.
        for (old_agrees, guard_old, guard_new) in [
            (true, pos_old.clone(), neg_new.clone()),
            (false, neg_old.clone(), pos_new.clone()),
        ] {
            if let Some(model) = self
                .check_with_closure(context.state.state(), &[guard_old.clone(), guard_new.clone()])?
            {
                trace!(vertex = %vertex, old_agrees, "divergence witness found");
                let pair = self.split(
                    &context,
                    vertex,
                    &psi_old,
                    &psi_new,
                    if old_agrees { taken } else { !taken },
                    if old_agrees { !taken } else { taken },
                    then_label,
                    else_label,
                    Some(&model),
                );
                successors.divergences.push(pair);
            }
        }

        context.state.state_mut().push_path_constraint(pos_old);
        context.state.state_mut().push_path_constraint(pos_new);
        context
            .state
            .state_mut()
            .set_vertex(Vertex::new(vertex.graph.clone(), concrete_label));
        successors.contexts.push(context);
        Ok(successors)
    }

    /// Split a divergent state into its old and new continuations.
    #[allow(clippy::too_many_arguments)]
    fn split(
        &self,
        context: &ShadowContext<'ctx>,
        vertex: &Vertex,
        psi_old: &Bool<'ctx>,
        psi_new: &Bool<'ctx>,
        b_old: bool,
        b_new: bool,
        then_label: usize,
        else_label: usize,
        model: Option<&Model<'ctx>>,
    ) -> DivergencePair<'ctx> {
        let mut witness = context.state.clone();
        if let Some(model) = model {
            witness.state_mut().refresh_concrete(self.smt, model);
        }

        // Both continuations carry the combined divergence condition:
        // the old revision's guard with its polarity conjoined with the
        // new revision's. This pins the inputs to exactly the sub-space
        // where the revisions must disagree.
        let (guard_old, _) = polarity(psi_old, b_old);
        let (guard_new, _) = polarity(psi_new, b_new);

        let build = |mode: ShadowProcessingMode, taken: bool| {
            let mut projected: State<'ctx> = witness.project(self.smt, mode);
            projected.push_path_constraint(guard_old.clone());
            projected.push_path_constraint(guard_new.clone());
            let target = if taken { then_label } else { else_label };
            projected.set_vertex(Vertex::new(vertex.graph.clone(), target));
            ShadowContext::new(
                context.cycle,
                DivergentState::new(projected),
                context.call_stack.clone(),
                mode,
            )
        };

        DivergencePair {
            old: build(ShadowProcessingMode::Old, b_old),
            new: build(ShadowProcessingMode::New, b_new),
        }
    }

    fn check_with_closure(
        &self,
        state: &State<'ctx>,
        extras: &[Bool<'ctx>],
    ) -> Result<Option<Model<'ctx>>> {
        let mut assertions = state.path_constraint().to_vec();
        assertions.extend_from_slice(extras);
        let closure = state.definitional_closure(self.smt, &assertions);
        assertions.extend(closure);
        Ok(self.smt.check(&assertions)?)
    }

    /// Cross the cycle boundary; identical to the concolic executor's
    /// rule. Shadow registries persist into the next cycle.
    fn finish_cycle(&self, mut context: ShadowContext<'ctx>) -> Result<ShadowSuccessors<'ctx>> {
        let previous_cycle = context.cycle;
        let next_cycle = previous_cycle + 1;
        for variable in self.interface.variables() {
            let old_name =
                context.state.state().current_name(&variable.name, previous_cycle);
            let new_name = format!("{}_0__{}", variable.name, next_cycle);
            if self.interface.is_whole_program_input(&variable.name) {
                let symbol = self.smt.constant(&new_name, &variable.data_type)?;
                let witness = self.smt.random_value(&variable.data_type)?;
                context.state.state_mut().set_symbolic(new_name.clone(), symbol);
                context.state.state_mut().set_concrete(new_name, witness);
            } else {
                let symbolic = context
                    .state
                    .state()
                    .symbolic_value(&old_name)
                    .cloned()
                    .ok_or_else(|| EngineError::unresolved(old_name.clone()))?;
                let concrete = context
                    .state
                    .state()
                    .concrete_value(&old_name)
                    .cloned()
                    .ok_or_else(|| EngineError::unresolved(old_name.clone()))?;
                context.state.state_mut().set_symbolic(new_name.clone(), symbolic);
                context.state.state_mut().set_concrete(new_name, concrete);
            }
        }
        context.state.state_mut().reset_versions();
        context.cycle = next_cycle;
        let main = self.program.main();
        context
            .state
            .state_mut()
            .set_vertex(Vertex::new(main.name(), main.entry()));
        Ok(single(context))
    }
}

fn single(context: ShadowContext<'_>) -> ShadowSuccessors<'_> {
    ShadowSuccessors { contexts: vec![context], divergences: Vec::new() }
}

fn polarity<'ctx>(phi: &Bool<'ctx>, taken: bool) -> (Bool<'ctx>, Bool<'ctx>) {
    if taken {
        (phi.clone(), phi.not())
    } else {
        (phi.not(), phi.clone())
    }
}
