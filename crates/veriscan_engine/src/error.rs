//! Engine error types.
//!
//! Error categories and their handling:
//!
//! | Category | Variants | Handling |
//! |----------|----------|----------|
//! | Structural | `Structural` | Fatal, surfaced at engine start |
//! | Typing | `UnsupportedOperation`, `SortMismatch` | Fatal at the step that hits them |
//! | Semantic | `UnresolvedVariable` | Fatal at the step that hits them |
//! | Solver | `SolverUnknown` | The stepped context is discarded with a diagnostic |
//!
//! Reaching the cycle bound or the time-out is normal termination, not an
//! error; it is reported through the run report's status instead.

use std::fmt;

use veriscan_ir::IrError;
use veriscan_smt::{SmtError, SmtErrorKind};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A failure while executing a program symbolically.
#[derive(Debug)]
pub struct EngineError {
    /// The category of failure.
    pub kind: EngineErrorKind,
    /// The graph in which the failure occurred, when attributable.
    pub graph: Option<String>,
    /// The label at which the failure occurred, when attributable.
    pub label: Option<usize>,
}

/// The category of engine failure.
#[derive(Debug)]
pub enum EngineErrorKind {
    /// The program graph is malformed. Produced when construction-time
    /// validation is bypassed and the defect surfaces during execution.
    Structural(IrError),

    /// An operator or operand shape the engine does not execute, for
    /// example division, modulo, exponentiation, or a nondeterministic
    /// constant outside a sole assignment right-hand side.
    UnsupportedOperation {
        /// The rejected operation.
        operation: String,
    },

    /// Operand sorts do not fit the operator.
    SortMismatch {
        /// The operation whose operands mismatched.
        operation: String,
    },

    /// A variable access did not resolve against the flattened interface.
    UnresolvedVariable {
        /// The flattened name that failed to resolve.
        name: String,
    },

    /// A branch condition did not fold to a concrete truth value under
    /// the concrete store.
    NonConcreteCondition,

    /// The solver returned `unknown`. The stepped context is discarded
    /// rather than treated as satisfiable or unsatisfiable.
    SolverUnknown,

    /// The generated suite could not be written or read.
    TestSuiteOutput {
        /// The underlying serialization or I/O message.
        message: String,
    },

    /// The configuration selects a capability this engine does not
    /// provide.
    UnsupportedConfiguration {
        /// What was selected.
        selection: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EngineErrorKind::Structural(error) => write!(f, "{}", error)?,
            EngineErrorKind::UnsupportedOperation { operation } => {
                write!(f, "unsupported operation: {}", operation)?;
            }
            EngineErrorKind::SortMismatch { operation } => {
                write!(f, "operand sorts do not fit {}", operation)?;
            }
            EngineErrorKind::UnresolvedVariable { name } => {
                write!(f, "variable '{}' does not resolve against the interface", name)?;
            }
            EngineErrorKind::NonConcreteCondition => {
                write!(f, "branch condition did not evaluate to a concrete value")?;
            }
            EngineErrorKind::SolverUnknown => {
                write!(f, "solver returned unknown; context discarded")?;
            }
            EngineErrorKind::TestSuiteOutput { message } => {
                write!(f, "test suite output failed: {}", message)?;
            }
            EngineErrorKind::UnsupportedConfiguration { selection } => {
                write!(f, "unsupported configuration: {}", selection)?;
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

impl std::error::Error for EngineError {}

impl From<IrError> for EngineError {
    fn from(error: IrError) -> Self {
        let graph = error.graph.clone();
        let label = error.label;
        Self { kind: EngineErrorKind::Structural(error), graph, label }
    }
}

impl From<SmtError> for EngineError {
    fn from(error: SmtError) -> Self {
        let kind = match error.kind {
            SmtErrorKind::Unknown => EngineErrorKind::SolverUnknown,
            SmtErrorKind::UnsupportedSort { data_type } => EngineErrorKind::UnsupportedOperation {
                operation: format!("value of sort-less type {}", data_type),
            },
        };
        Self { kind, graph: None, label: None }
    }
}

impl EngineError {
    /// An operation the engine does not execute.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::UnsupportedOperation { operation: operation.into() },
            graph: None,
            label: None,
        }
    }

    /// Operand sorts that do not fit the operator.
    pub fn sort_mismatch(operation: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::SortMismatch { operation: operation.into() },
            graph: None,
            label: None,
        }
    }

    /// An unresolvable variable access.
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::UnresolvedVariable { name: name.into() },
            graph: None,
            label: None,
        }
    }

    /// A branch condition that stayed symbolic under the concrete store.
    pub fn non_concrete_condition() -> Self {
        Self { kind: EngineErrorKind::NonConcreteCondition, graph: None, label: None }
    }

    /// A failure writing or reading the generated suite.
    pub fn test_suite_output(message: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::TestSuiteOutput { message: message.into() },
            graph: None,
            label: None,
        }
    }

    /// A configuration selection this engine does not provide.
    pub fn unsupported_configuration(selection: impl Into<String>) -> Self {
        Self {
            kind: EngineErrorKind::UnsupportedConfiguration { selection: selection.into() },
            graph: None,
            label: None,
        }
    }

    /// Attach the graph in which the failure occurred.
    pub fn in_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// Attach the label at which the failure occurred.
    pub fn at_label(mut self, label: usize) -> Self {
        self.label = Some(label);
        self
    }

    /// Whether this failure is a solver `unknown` verdict.
    pub fn is_solver_unknown(&self) -> bool {
        matches!(self.kind, EngineErrorKind::SolverUnknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_locates_the_failure() {
        let error = EngineError::unsupported("division").in_graph("P").at_label(4);
        assert_eq!(
            error.to_string(),
            "unsupported operation: division in graph 'P' at label 4"
        );
    }

    #[test]
    fn solver_unknown_is_recognizable() {
        let error: EngineError = SmtError::unknown().into();
        assert!(error.is_solver_unknown());
    }
}
