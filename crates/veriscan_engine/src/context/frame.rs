//! Call-stack frames.

use std::fmt;

/// One live invocation.
///
/// A frame holds the name of the executing graph, the scope prefix that
/// qualifies variable accesses, and the caller label to resume at when
/// the callee's exit is reached. Frames hold no references into the
/// program; the executor resolves the graph by name per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    graph: String,
    scope: String,
    return_label: usize,
}

impl Frame {
    /// Create a frame.
    pub fn new(graph: impl Into<String>, scope: impl Into<String>, return_label: usize) -> Self {
        Self { graph: graph.into(), scope: scope.into(), return_label }
    }

    /// The name of the executing graph.
    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// The scope prefix. An access `x` under scope `P.f` resolves to the
    /// flattened name `P.f.x`.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The caller label to resume at after the callee exits.
    pub fn return_label(&self) -> usize {
        self.return_label
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.scope, self.return_label)
    }
}
