//! Errors raised while constructing or validating a program graph.
//!
//! All variants are fatal: a program that fails construction is never
//! handed to an engine. Every error renders as a single line naming the
//! offending construct and, when known, its graph and label location.

use std::fmt;

/// Result type for IR construction and validation.
pub type Result<T = ()> = std::result::Result<T, IrError>;

/// A structural, typing, or semantic defect in a program graph.
#[derive(Debug, Clone, PartialEq)]
pub struct IrError {
    /// The category of defect.
    pub kind: IrErrorKind,
    /// The graph in which the defect was found, when attributable.
    pub graph: Option<String>,
    /// The label at which the defect was found, when attributable.
    pub label: Option<usize>,
}

/// The category of IR defect.
#[derive(Debug, Clone, PartialEq)]
pub enum IrErrorKind {
    /// An instruction references a label that resolves to no instruction
    /// and is not the exit label of its graph.
    DanglingLabel {
        /// The unresolved label.
        target: usize,
    },

    /// The entry label of a graph resolves to no instruction.
    MissingEntry,

    /// No graph of kind `Program` exists.
    NoProgram,

    /// More than one graph of kind `Program` exists.
    MultiplePrograms {
        /// The names of the offending graphs.
        names: Vec<String>,
    },

    /// An interface variable has a derived type naming an unknown graph.
    UnknownGraph {
        /// The unresolved graph name.
        name: String,
    },

    /// An instance variable names a graph of kind `Program`.
    ///
    /// Programs are top-level units and cannot be instantiated.
    ProgramInstantiated {
        /// The instantiated program graph.
        name: String,
    },

    /// Sub-programs instantiate each other in a cycle.
    ///
    /// The input language forbids recursion, so the instance relation must
    /// be a DAG.
    RecursiveInstantiation {
        /// One witness cycle through the instance relation.
        cycle: Vec<String>,
    },

    /// An interface variable has a type the engine does not support.
    UnsupportedType {
        /// The rejected variable.
        variable: String,
        /// A rendering of the rejected type.
        data_type: String,
    },

    /// An initializer literal does not match the declared data type.
    InitializerMismatch {
        /// The variable with the mismatched initializer.
        variable: String,
    },

    /// An instruction is shaped in a way the engine cannot execute, for
    /// example an assignment whose left-hand side is not an access.
    MalformedInstruction {
        /// What is wrong with the instruction.
        detail: String,
    },
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IrErrorKind::DanglingLabel { target } => {
                write!(f, "dangling label {}", target)?;
            }
            IrErrorKind::MissingEntry => {
                write!(f, "entry label resolves to no instruction")?;
            }
            IrErrorKind::NoProgram => {
                write!(f, "no graph of kind 'program' exists")?;
            }
            IrErrorKind::MultiplePrograms { names } => {
                write!(f, "multiple graphs of kind 'program': {}", names.join(", "))?;
            }
            IrErrorKind::UnknownGraph { name } => {
                write!(f, "derived type names unknown graph '{}'", name)?;
            }
            IrErrorKind::ProgramInstantiated { name } => {
                write!(f, "program graph '{}' cannot be instantiated", name)?;
            }
            IrErrorKind::RecursiveInstantiation { cycle } => {
                write!(f, "recursive instantiation: {}", cycle.join(" -> "))?;
            }
            IrErrorKind::UnsupportedType { variable, data_type } => {
                write!(f, "variable '{}' has unsupported type {}", variable, data_type)?;
            }
            IrErrorKind::InitializerMismatch { variable } => {
                write!(f, "initializer of '{}' does not match its declared type", variable)?;
            }
            IrErrorKind::MalformedInstruction { detail } => {
                write!(f, "malformed instruction: {}", detail)?;
            }
        }
        if let Some(graph) = &self.graph {
            write!(f, " in graph '{}'", graph)?;
        }
        if let Some(label) = self.label {
            write!(f, " at label {}", label)?;
        }
        Ok(())
    }
}

impl std::error::Error for IrError {}

impl IrError {
    /// Create an error without location information.
    pub fn new(kind: IrErrorKind) -> Self {
        Self { kind, graph: None, label: None }
    }

    /// Attach the graph in which the defect was found.
    pub fn in_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// Attach the label at which the defect was found.
    pub fn at_label(mut self, label: usize) -> Self {
        self.label = Some(label);
        self
    }
}
