//! Execution contexts.

pub mod frame;
pub mod state;

use std::fmt;

use z3::ast::Bool;
use z3::Model;

use veriscan_smt::Smt;

pub use frame::Frame;
pub use state::{State, Vertex};

/// One unit of exploration: a cycle counter, a state, and a call stack.
///
/// Contexts are created at engine start, forked at data-dependent
/// branches, merged at join points, and destroyed when infeasible or past
/// the cycle bound. Between steps a context is exclusively owned by the
/// explorer or the merger.
#[derive(Debug, Clone)]
pub struct Context<'ctx> {
    cycle: u32,
    state: State<'ctx>,
    call_stack: Vec<Frame>,
}

impl<'ctx> Context<'ctx> {
    /// Create a context at `cycle` with the given state and call stack.
    pub fn new(cycle: u32, state: State<'ctx>, call_stack: Vec<Frame>) -> Self {
        Self { cycle, state, call_stack }
    }

    /// The current cycle.
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// Advance to the next cycle.
    pub fn set_cycle(&mut self, cycle: u32) {
        self.cycle = cycle;
    }

    /// The state.
    pub fn state(&self) -> &State<'ctx> {
        &self.state
    }

    /// The state, mutably.
    pub fn state_mut(&mut self) -> &mut State<'ctx> {
        &mut self.state
    }

    /// The innermost frame.
    pub fn frame(&self) -> &Frame {
        self.call_stack.last().expect("a context always has a frame")
    }

    /// The outermost frame, the main program's.
    pub fn main_frame(&self) -> &Frame {
        self.call_stack.first().expect("a context always has a frame")
    }

    /// The call stack, outermost first.
    pub fn call_stack(&self) -> &[Frame] {
        &self.call_stack
    }

    /// The number of live invocations.
    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Enter a callee.
    pub fn push_frame(&mut self, frame: Frame) {
        self.call_stack.push(frame);
    }

    /// Return from the innermost callee.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        if self.call_stack.len() > 1 {
            self.call_stack.pop()
        } else {
            None
        }
    }

    /// Fork this context at a branch; see [`State::fork`]. Cycle and call
    /// stack are copied.
    pub fn fork(
        &self,
        smt: &Smt<'ctx>,
        vertex: Vertex,
        model: &Model<'ctx>,
        constraint: Bool<'ctx>,
    ) -> Context<'ctx> {
        Context {
            cycle: self.cycle,
            state: self.state.fork(smt, vertex, model, constraint),
            call_stack: self.call_stack.clone(),
        }
    }
}

impl fmt::Display for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cycle: {}", self.cycle)?;
        writeln!(f, "{}", self.state)?;
        write!(f, "call stack: [")?;
        for (position, frame) in self.call_stack.iter().enumerate() {
            if position > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", frame)?;
        }
        write!(f, "]")
    }
}
