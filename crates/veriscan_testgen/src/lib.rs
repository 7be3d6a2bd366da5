//! # veriscan-testgen
//!
//! The test-case data model produced by the symbolic execution engines,
//! and its XML serialization.
//!
//! A [`TestCase`] has two parts: the initial concrete state valuations
//! (one value per persistent state variable at cycle zero) and, per cycle,
//! the concrete input valuations that drive the program down one explored
//! path. Test cases compare structurally by those two maps, which makes
//! suites deduplicable and the XML format round-trippable.
//!
//! This crate is deliberately solver-free: values are plain booleans and
//! integers, so readers of a generated suite need no solver installed.

pub mod error;
pub mod test_case;
pub mod test_suite;
pub mod xml;

pub use error::{Result, TestGenError, TestGenErrorKind};
pub use test_case::{TestCase, TestValue};
pub use test_suite::TestSuite;
