//! Non-forking instruction interpretation for the VC flavor.

use tracing::trace;

use veriscan_ir::{Expression, Instruction, Program};
use veriscan_smt::Smt;

use crate::cbmc::state::VcState;
use crate::config::Configuration;
use crate::context::{Frame, Vertex};
use crate::encoder::{resolve_access, Encoder, VersionLookup};
use crate::error::{EngineError, Result};
use crate::explorer::Prioritized;
use crate::interface::FlatInterface;

/// A context of the verification-condition flavor.
#[derive(Debug, Clone)]
pub struct VcContext<'ctx> {
    cycle: u32,
    state: VcState<'ctx>,
    call_stack: Vec<Frame>,
}

impl<'ctx> VcContext<'ctx> {
    /// Create a VC context.
    pub fn new(cycle: u32, state: VcState<'ctx>, call_stack: Vec<Frame>) -> Self {
        Self { cycle, state, call_stack }
    }

    /// The current cycle.
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// The state.
    pub fn state(&self) -> &VcState<'ctx> {
        &self.state
    }

    /// The state, mutably.
    pub fn state_mut(&mut self) -> &mut VcState<'ctx> {
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

impl Prioritized for VcContext<'_> {
    fn cycle(&self) -> u32 {
        self.cycle
    }

    fn depth(&self) -> usize {
        self.call_stack.len()
    }

    fn vertex(&self) -> &Vertex {
        self.state.vertex()
    }
}

/// Builds the assumption-literal name of a block.
pub(crate) fn block_name(graph: &str, label: usize, cycle: u32) -> String {
    format!("b_{}_{}__{}", graph, label, cycle)
}

/// Builds the assumption-literal name of a join block. Joins carry their
/// own prefix so a fused block never lists itself as a predecessor when
/// one side entered the join label through a branch edge.
pub(crate) fn join_block_name(graph: &str, label: usize, cycle: u32) -> String {
    format!("j_{}_{}__{}", graph, label, cycle)
}

/// The per-instruction interpreter of the VC flavor.
///
/// Branches never consult the solver: both successor blocks are produced
/// unconditionally (modulo feasibility hints), each guarded by its
/// assumption literal.
pub struct VcExecutor<'a, 'ctx> {
    smt: &'a Smt<'ctx>,
    program: &'a Program,
    interface: &'a FlatInterface,
    config: &'a Configuration,
    encoder: Encoder<'a, 'ctx>,
}

impl<'a, 'ctx> VcExecutor<'a, 'ctx> {
    /// Create a VC executor.
    pub fn new(
        smt: &'a Smt<'ctx>,
        program: &'a Program,
        interface: &'a FlatInterface,
        config: &'a Configuration,
    ) -> Self {
        Self { smt, program, interface, config, encoder: Encoder::new(smt, interface) }
    }

    /// Execute the instruction at the context's current vertex.
    pub fn execute(
        &self,
        mut context: VcContext<'ctx>,
    ) -> Result<(VcContext<'ctx>, Option<VcContext<'ctx>>)> {
        let vertex = context.state.vertex().clone();
        let graph = self
            .program
            .graph(&vertex.graph)
            .ok_or_else(|| EngineError::unresolved(vertex.graph.clone()))?;

        if vertex.label == graph.exit() {
            if context.call_stack.len() > 1 {
                let callee_frame = context.call_stack.pop().expect("depth checked above");
                let caller_graph = context.frame().graph().to_string();
                let return_vertex =
                    Vertex::new(caller_graph.clone(), callee_frame.return_label());
                let name =
                    block_name(&caller_graph, callee_frame.return_label(), context.cycle);
                context.state.advance_block(self.smt, return_vertex, name);
                return Ok((context, None));
            }
            return self.finish_cycle(context).map(|context| (context, None));
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
                self.assign(&mut context, &vertex, &variable, &expression, next)?;
                Ok((context, None))
            }
            Instruction::Havoc { variable, next } => {
                self.havoc(&mut context, &vertex, &variable, next)?;
                Ok((context, None))
            }
            Instruction::Goto { next } => {
                context.state.set_vertex(Vertex::new(vertex.graph.clone(), next));
                Ok((context, None))
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
                let entry_vertex = Vertex::new(callee_graph.name(), callee_graph.entry());
                let name =
                    block_name(callee_graph.name(), callee_graph.entry(), context.cycle);
                context.state.advance_block(self.smt, entry_vertex, name);
                Ok((context, None))
            }
        }
    }

    fn assign(
        &self,
        context: &mut VcContext<'ctx>,
        vertex: &Vertex,
        variable: &Expression,
        expression: &Expression,
        next: usize,
    ) -> Result<()> {
        let scope = context.frame().scope().to_string();
        let cycle = context.cycle;
        let (flattened_name, _) = resolve_access(self.interface, &scope, variable)?;
        if matches!(expression, Expression::NondeterministicConstant) {
            // Fresh unconstrained version; same effect as a havoc.
            context.state.bump_version(&flattened_name);
            context.state.set_vertex(Vertex::new(vertex.graph.clone(), next));
            return Ok(());
        }
        let encoded = self
            .encoder
            .encode(expression, &scope, &context.state, cycle)
            .map_err(|error| error.in_graph(vertex.graph.clone()).at_label(vertex.label))?;
        context.state.bump_version(&flattened_name);
        let contextualized_name = context.state.contextualized(&flattened_name, cycle);
        trace!(name = %contextualized_name, "vc assign");
        let block = context.state.assumption_literal_name().to_string();
        context.state.push_hard_constraint(block, contextualized_name, encoded);
        context.state.set_vertex(Vertex::new(vertex.graph.clone(), next));
        Ok(())
    }

    fn havoc(
        &self,
        context: &mut VcContext<'ctx>,
        vertex: &Vertex,
        variable: &Expression,
        next: usize,
    ) -> Result<()> {
        let scope = context.frame().scope().to_string();
        let (flattened_name, _) = resolve_access(self.interface, &scope, variable)?;
        context.state.bump_version(&flattened_name);
        context.state.set_vertex(Vertex::new(vertex.graph.clone(), next));
        Ok(())
    }

    fn branch(
        &self,
        context: VcContext<'ctx>,
        vertex: &Vertex,
        condition: &Expression,
        then_label: usize,
        else_label: usize,
    ) -> Result<(VcContext<'ctx>, Option<VcContext<'ctx>>)> {
        let scope = context.frame().scope().to_string();
        let cycle = context.cycle;
        let phi = self
            .encoder
            .encode(condition, &scope, &context.state, cycle)
            .map_err(|error| error.in_graph(vertex.graph.clone()).at_label(vertex.label))?
            .as_bool()
            .ok_or_else(|| EngineError::sort_mismatch("branch condition"))?;

        let (then_feasible, else_feasible) =
            self.config.branch_feasibility(&vertex.graph, vertex.label);

        let make_child = |guard: z3::ast::Bool<'ctx>, target: usize| {
            let child_state = context.state.branch_child(
                self.smt,
                Vertex::new(vertex.graph.clone(), target),
                block_name(&vertex.graph, target, cycle),
                guard,
            );
            VcContext::new(cycle, child_state, context.call_stack.clone())
        };

        match (then_feasible, else_feasible) {
            (true, true) => {
                let then_child = make_child(phi.clone(), then_label);
                let else_child = make_child(phi.not(), else_label);
                Ok((then_child, Some(else_child)))
            }
            (true, false) => Ok((make_child(phi, then_label), None)),
            (false, true) => Ok((make_child(phi.not(), else_label), None)),
            (false, false) => Err(EngineError::unsupported_configuration(
                "both branch sides hinted infeasible",
            )
            .in_graph(vertex.graph.clone())
            .at_label(vertex.label)),
        }
    }

    /// Cross the cycle boundary: every persistent variable's last
    /// version is equated with version zero of the next cycle inside the
    /// new entry block; whole-program inputs start the next cycle as
    /// fresh unconstrained symbols.
    fn finish_cycle(&self, mut context: VcContext<'ctx>) -> Result<VcContext<'ctx>> {
        let previous_cycle = context.cycle;
        let next_cycle = previous_cycle + 1;
        let main = self.program.main();
        let entry_vertex = Vertex::new(main.name(), main.entry());
        let entry_block = block_name(main.name(), main.entry(), next_cycle);
        context.state.advance_block(self.smt, entry_vertex, entry_block.clone());

        for variable in self.interface.variables() {
            if self.interface.is_whole_program_input(&variable.name) {
                continue;
            }
            let old_name = format!(
                "{}_{}__{}",
                variable.name,
                context.state.version(&variable.name),
                previous_cycle
            );
            let new_name = format!("{}_0__{}", variable.name, next_cycle);
            let carried = self.smt.constant(&old_name, &variable.data_type)?;
            context
                .state
                .push_hard_constraint(entry_block.clone(), new_name, carried);
        }
        context.state.reset_versions();
        context.cycle = next_cycle;
        Ok(context)
    }
}
