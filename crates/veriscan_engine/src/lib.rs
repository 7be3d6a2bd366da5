//! # veriscan-engine
//!
//! Symbolic execution engines for cyclically executed control programs.
//!
//! Given a validated [`veriscan_ir::Program`], an engine explores its
//! behavior over a bounded number of scan cycles and generates a test
//! suite of concrete input scenarios, one per explored path. Four
//! flavors share the same infrastructure:
//!
//! | Flavor | Entry point | Approach |
//! |--------|-------------|----------|
//! | Baseline / compositional | [`engine::Engine`] | Concolic: dual stores, fork at feasible branches, optional state merging at joins |
//! | Over-approximating | [`engine::Engine`] | All-symbolic start, reachability hints prune branch sides |
//! | Shadow | [`shadow::ShadowEngine`] | Two revisions in one state, fork at the first forced divergence |
//! | CBMC-style | [`cbmc::VcEngine`] | Assumption-literal verification conditions instead of forking |
//!
//! The engines are single-threaded and cooperative: the only scheduler
//! is the explorer worklist, every context is exclusively owned by the
//! current step, and termination criteria are checked at step
//! boundaries.

pub mod cbmc;
pub mod config;
pub mod context;
pub mod derive;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod explorer;
pub mod interface;
pub mod merger;
mod ops;
pub mod replay;
pub mod shadow;

pub use config::Configuration;
pub use context::{Context, Frame, State, Vertex};
pub use derive::{derive_from_state, derive_test_case};
pub use encoder::{Encoder, VersionLookup};
pub use engine::{Engine, EngineStatus, RunReport};
pub use error::{EngineError, EngineErrorKind, Result};
pub use evaluator::Evaluator;
pub use executor::{Executor, Successors};
pub use explorer::Explorer;
pub use interface::FlatInterface;
pub use merger::Merger;
pub use replay::replay;
