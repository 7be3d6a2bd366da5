//! Sub-program graphs.

use std::collections::BTreeMap;
use std::fmt;

use crate::instruction::Instruction;
use crate::variable::Variable;

/// The kind of a translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    /// The single top-level unit driven by the scan cycle.
    Program,
    /// A stateful, instantiable unit.
    FunctionBlock,
    /// A stateless, instantiable unit.
    Function,
}

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphKind::Program => write!(f, "PROGRAM"),
            GraphKind::FunctionBlock => write!(f, "FUNCTION_BLOCK"),
            GraphKind::Function => write!(f, "FUNCTION"),
        }
    }
}

/// A sub-program graph: a typed interface plus a labelled instruction
/// table with designated entry and exit labels.
///
/// Labels are unique within a graph by construction (they key the
/// instruction table). The exit label has no instruction; reaching it
/// returns to the caller, or ends the cycle for the program graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    name: String,
    kind: GraphKind,
    interface: Vec<Variable>,
    instructions: BTreeMap<usize, Instruction>,
    entry: usize,
    exit: usize,
}

impl Graph {
    /// Create a graph. Structural validation happens when the graph is
    /// assembled into a [`crate::Program`].
    pub fn new(
        name: impl Into<String>,
        kind: GraphKind,
        interface: Vec<Variable>,
        instructions: BTreeMap<usize, Instruction>,
        entry: usize,
        exit: usize,
    ) -> Self {
        Self { name: name.into(), kind, interface, instructions, entry, exit }
    }

    /// The graph's qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The graph's kind.
    pub fn kind(&self) -> GraphKind {
        self.kind
    }

    /// The declared interface in declaration order.
    pub fn interface(&self) -> &[Variable] {
        &self.interface
    }

    /// Look up a declared variable by its unqualified name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.interface.iter().find(|variable| variable.name == name)
    }

    /// The entry label.
    pub fn entry(&self) -> usize {
        self.entry
    }

    /// The exit label.
    pub fn exit(&self) -> usize {
        self.exit
    }

    /// The instruction at `label`, if any. The exit label has none.
    pub fn instruction(&self, label: usize) -> Option<&Instruction> {
        self.instructions.get(&label)
    }

    /// All labelled instructions in ascending label order.
    pub fn instructions(&self) -> impl Iterator<Item = (usize, &Instruction)> {
        self.instructions.iter().map(|(label, instruction)| (*label, instruction))
    }

    /// Labels of this graph's branch instructions.
    pub fn branch_labels(&self) -> Vec<usize> {
        self.instructions
            .iter()
            .filter(|(_, instruction)| instruction.is_branch())
            .map(|(label, _)| *label)
            .collect()
    }

    /// Labels with more than one intraprocedural predecessor, in ascending
    /// order. These are the join vertices where forked paths can meet
    /// again; the exit label is included when it joins.
    pub fn join_labels(&self) -> Vec<usize> {
        let mut predecessor_counts: BTreeMap<usize, usize> = BTreeMap::new();
        for instruction in self.instructions.values() {
            for successor in instruction.successors() {
                *predecessor_counts.entry(successor).or_insert(0) += 1;
            }
        }
        predecessor_counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(label, _)| label)
            .collect()
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} (entry {}, exit {})", self.kind, self.name, self.entry, self.exit)?;
        for variable in &self.interface {
            writeln!(f, "  {}", variable)?;
        }
        for (label, instruction) in &self.instructions {
            writeln!(f, "  {}: {}", label, instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::types::{DataType, StorageClass};

    fn diamond() -> Graph {
        // 0: if x then 1 else 2; 1: y := 1; 2: y := 2; both goto 3 (exit)
        let mut instructions = BTreeMap::new();
        instructions.insert(
            0,
            Instruction::If { condition: Expression::var("x"), goto_then: 1, goto_else: 2 },
        );
        instructions.insert(
            1,
            Instruction::Assign {
                variable: Expression::var("y"),
                expression: Expression::int(1),
                next: 3,
                kind: crate::instruction::AssignKind::Regular,
            },
        );
        instructions.insert(
            2,
            Instruction::Assign {
                variable: Expression::var("y"),
                expression: Expression::int(2),
                next: 3,
                kind: crate::instruction::AssignKind::Regular,
            },
        );
        Graph::new(
            "P",
            GraphKind::Program,
            vec![
                Variable::new("x", DataType::Bool, StorageClass::Input),
                Variable::new("y", DataType::Int, StorageClass::Output),
            ],
            instructions,
            0,
            3,
        )
    }

    #[test]
    fn join_labels_find_the_diamond_exit() {
        assert_eq!(diamond().join_labels(), vec![3]);
    }

    #[test]
    fn branch_labels() {
        assert_eq!(diamond().branch_labels(), vec![0]);
    }

    #[test]
    fn variable_lookup() {
        let graph = diamond();
        assert_eq!(graph.variable("x").map(|v| v.storage), Some(StorageClass::Input));
        assert!(graph.variable("z").is_none());
    }
}
