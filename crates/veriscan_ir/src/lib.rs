//! # veriscan-ir
//!
//! Labelled program-graph representation for synchronous, cyclically
//! executed control programs.
//!
//! A [`Program`] is a set of [`Graph`]s keyed by name, exactly one of which
//! has kind [`GraphKind::Program`]. Each graph carries a typed interface,
//! an entry and an exit label, and a `label -> instruction` table. Vertices
//! and edges are implicit in instruction shape: a `goto` has one successor,
//! an `if` has two, a `call` has an intraprocedural successor and an
//! interprocedural entry edge.
//!
//! The IR is deliberately closed: expressions and instructions are tagged
//! enums, and analyses are written as pattern matches rather than visitor
//! hierarchies. All nodes are immutable once a [`Program`] has been
//! constructed; construction is where structural and typing validation
//! happens.

pub mod error;
pub mod expression;
pub mod graph;
pub mod instruction;
pub mod program;
pub mod types;
pub mod variable;

pub use error::{IrError, IrErrorKind, Result};
pub use expression::{BinaryOperator, Expression, ExpressionType, UnaryOperator};
pub use graph::{Graph, GraphKind};
pub use instruction::{AssignKind, Instruction};
pub use program::{FlattenedVariable, Program};
pub use types::{DataType, StorageClass};
pub use variable::{Literal, Variable};
