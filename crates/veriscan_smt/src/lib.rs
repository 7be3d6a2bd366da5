//! # veriscan-smt
//!
//! A thin facade over the Z3 solver for the symbolic execution engine.
//!
//! The facade owns no solver state beyond a deterministic random number
//! generator; it borrows a single [`z3::Context`] created by the caller,
//! and every term produced by the engine lives in that context's shared,
//! immutable term universe. Checks build a fresh solver per query from the
//! `simplify`, `solve-eqs`, `smt` tactic chain and backtrack afterwards,
//! so no learned state leaks between queries.
//!
//! ```no_run
//! use veriscan_ir::DataType;
//! use veriscan_smt::Smt;
//!
//! let config = z3::Config::new();
//! let context = z3::Context::new(&config);
//! let smt = Smt::new(&context);
//!
//! let x = smt.constant("P.x_0__0", &DataType::Int).unwrap();
//! let constraint = x.as_int().unwrap().gt(&smt.int_value(5));
//! assert!(smt.check(&[constraint]).unwrap().is_some());
//! ```

pub mod error;
pub mod facade;

pub use error::{Result, SmtError, SmtErrorKind};
pub use facade::{AssumptionOutcome, Smt};
