//! Errors raised while reading or writing test suites.

use std::fmt;
use std::io;

/// Result type for test-suite serialization.
pub type Result<T = ()> = std::result::Result<T, TestGenError>;

/// A failure while serializing or deserializing a test suite.
#[derive(Debug)]
pub struct TestGenError {
    /// The category of failure.
    pub kind: TestGenErrorKind,
}

/// The category of serialization failure.
#[derive(Debug)]
pub enum TestGenErrorKind {
    /// The underlying file could not be read or written.
    Io(io::Error),

    /// The XML was malformed or did not match the test-case schema.
    Xml {
        /// The serializer's or deserializer's message.
        message: String,
    },

    /// A `value` attribute was neither a boolean nor an integer.
    InvalidValue {
        /// The offending attribute text.
        text: String,
    },
}

impl fmt::Display for TestGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TestGenErrorKind::Io(error) => write!(f, "test suite I/O failed: {}", error),
            TestGenErrorKind::Xml { message } => write!(f, "malformed test-case XML: {}", message),
            TestGenErrorKind::InvalidValue { text } => {
                write!(f, "'{}' is neither a boolean nor an integer", text)
            }
        }
    }
}

impl std::error::Error for TestGenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            TestGenErrorKind::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for TestGenError {
    fn from(error: io::Error) -> Self {
        Self { kind: TestGenErrorKind::Io(error) }
    }
}

impl TestGenError {
    /// An XML-level failure with the serializer's message.
    pub fn xml(message: impl Into<String>) -> Self {
        Self { kind: TestGenErrorKind::Xml { message: message.into() } }
    }

    /// A value attribute that parses as neither sort.
    pub fn invalid_value(text: impl Into<String>) -> Self {
        Self { kind: TestGenErrorKind::InvalidValue { text: text.into() } }
    }
}
