//! Verification-condition generation.
//!
//! Instead of forking, branches produce successor contexts that share
//! one reified control-flow encoding: every reached block is named by a
//! fresh boolean assumption literal `b_<graph>_<label>__<cycle>`, block
//! semantics become implications guarded by that literal, and joins fuse
//! states by disjoining the predecessor literals of the join block.
//! Reachability of a block is then a single satisfiability query under
//! its literal, with the unsat core naming the proof obligation when the
//! answer is no.

pub mod engine;
pub mod executor;
pub mod state;

pub use engine::{VcEngine, VcReport};
pub use executor::{VcContext, VcExecutor};
pub use state::VcState;
