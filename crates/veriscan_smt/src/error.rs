//! Facade error types.

use std::fmt;

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, SmtError>;

/// A failure inside the solver facade.
#[derive(Debug, Clone, PartialEq)]
pub struct SmtError {
    /// The category of failure.
    pub kind: SmtErrorKind,
}

/// The category of facade failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtErrorKind {
    /// The solver returned `unknown`.
    ///
    /// The caller must not interpret this as either satisfiable or
    /// unsatisfiable; the querying step is expected to discard its
    /// context with a diagnostic.
    Unknown,

    /// A data type that has no solver sort was used where a sorted value
    /// or constant was required.
    UnsupportedSort {
        /// A rendering of the rejected data type.
        data_type: String,
    },
}

impl fmt::Display for SmtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SmtErrorKind::Unknown => {
                write!(f, "solver returned unknown")
            }
            SmtErrorKind::UnsupportedSort { data_type } => {
                write!(f, "no solver sort for data type {}", data_type)
            }
        }
    }
}

impl std::error::Error for SmtError {}

impl SmtError {
    /// The solver could not decide the query.
    pub fn unknown() -> Self {
        Self { kind: SmtErrorKind::Unknown }
    }

    /// The data type cannot be represented as a solver sort.
    pub fn unsupported_sort(data_type: impl fmt::Display) -> Self {
        Self { kind: SmtErrorKind::UnsupportedSort { data_type: data_type.to_string() } }
    }
}
