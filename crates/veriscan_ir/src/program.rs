//! Whole programs and interface flattening.
//!
//! A [`Program`] owns every sub-program graph and is the unit handed to an
//! engine. Construction performs all structural and typing validation up
//! front, so engines never encounter a malformed graph:
//!
//! | Check | Failure |
//! |-------|---------|
//! | Exactly one `program`-kind graph | `NoProgram` / `MultiplePrograms` |
//! | Entry resolves, exit carries no instruction | `MissingEntry` / `MalformedInstruction` |
//! | Every successor label resolves | `DanglingLabel` |
//! | Derived types resolve to instantiable graphs | `UnknownGraph` / `ProgramInstantiated` |
//! | The instance relation is acyclic | `RecursiveInstantiation` |
//! | No `Real`-typed interface variables | `UnsupportedType` |
//! | Initializers match their declared types | `InitializerMismatch` |
//!
//! Flattening turns a graph's interface into the ordered, dotted closure
//! over its sub-program instances. For a program `P` with an instance `f`
//! of a block declaring `x`, the flattened interface contains `P.f.x`.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;

use crate::error::{IrError, IrErrorKind, Result};
use crate::expression::Expression;
use crate::graph::{Graph, GraphKind};
use crate::instruction::Instruction;
use crate::types::{DataType, StorageClass};
use crate::variable::Literal;

/// One entry of a flattened interface: a dotted leaf name with the leaf's
/// declaration record.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedVariable {
    /// The dotted name, rooted at the flattened graph's name.
    pub name: String,
    /// The leaf's data type. Never `Derived`.
    pub data_type: DataType,
    /// The leaf's storage class.
    pub storage: StorageClass,
    /// The leaf's initializer, if declared.
    pub initializer: Option<Literal>,
}

/// A validated set of sub-program graphs with a designated main program.
#[derive(Debug, Clone)]
pub struct Program {
    graphs: IndexMap<String, Graph>,
    main: String,
}

impl Program {
    /// Assemble and validate a program from its graphs.
    pub fn new(graphs: Vec<Graph>) -> Result<Self> {
        let mut graph_map = IndexMap::new();
        for graph in graphs {
            graph_map.insert(graph.name().to_string(), graph);
        }

        let program_names: Vec<String> = graph_map
            .values()
            .filter(|graph| graph.kind() == GraphKind::Program)
            .map(|graph| graph.name().to_string())
            .collect();
        let main = match program_names.as_slice() {
            [] => return Err(IrError::new(IrErrorKind::NoProgram)),
            [name] => name.clone(),
            _ => {
                return Err(IrError::new(IrErrorKind::MultiplePrograms {
                    names: program_names,
                }))
            }
        };

        let program = Self { graphs: graph_map, main };
        program.validate()?;
        Ok(program)
    }

    fn validate(&self) -> Result {
        for graph in self.graphs.values() {
            self.validate_interface(graph)?;
            self.validate_labels(graph)?;
        }
        self.validate_acyclic()?;
        Ok(())
    }

    fn validate_interface(&self, graph: &Graph) -> Result {
        for variable in graph.interface() {
            match &variable.data_type {
                DataType::Real => {
                    return Err(IrError::new(IrErrorKind::UnsupportedType {
                        variable: variable.name.clone(),
                        data_type: variable.data_type.to_string(),
                    })
                    .in_graph(graph.name()));
                }
                DataType::Derived { graph: callee } => {
                    let callee_graph = self.graphs.get(callee).ok_or_else(|| {
                        IrError::new(IrErrorKind::UnknownGraph { name: callee.clone() })
                            .in_graph(graph.name())
                    })?;
                    if callee_graph.kind() == GraphKind::Program {
                        return Err(IrError::new(IrErrorKind::ProgramInstantiated {
                            name: callee.clone(),
                        })
                        .in_graph(graph.name()));
                    }
                }
                _ => {}
            }
            if let Some(initializer) = &variable.initializer {
                if !initializer.matches(&variable.data_type) {
                    return Err(IrError::new(IrErrorKind::InitializerMismatch {
                        variable: variable.name.clone(),
                    })
                    .in_graph(graph.name()));
                }
            }
        }
        Ok(())
    }

    fn validate_labels(&self, graph: &Graph) -> Result {
        if graph.instruction(graph.entry()).is_none() && graph.entry() != graph.exit() {
            return Err(IrError::new(IrErrorKind::MissingEntry).in_graph(graph.name()));
        }
        if graph.instruction(graph.exit()).is_some() {
            return Err(IrError::new(IrErrorKind::MalformedInstruction {
                detail: "exit label carries an instruction".to_string(),
            })
            .in_graph(graph.name())
            .at_label(graph.exit()));
        }
        for (label, instruction) in graph.instructions() {
            for target in instruction.successors() {
                if graph.instruction(target).is_none() && target != graph.exit() {
                    return Err(IrError::new(IrErrorKind::DanglingLabel { target })
                        .in_graph(graph.name())
                        .at_label(label));
                }
            }
            match instruction {
                Instruction::Assign { variable, .. } | Instruction::Havoc { variable, .. } => {
                    if !variable.is_access() {
                        return Err(IrError::new(IrErrorKind::MalformedInstruction {
                            detail: "assignment target is not an access".to_string(),
                        })
                        .in_graph(graph.name())
                        .at_label(label));
                    }
                }
                Instruction::Call { callee, goto_interprocedural, .. } => {
                    let callee_graph = self.callee(graph, callee).map_err(|error| {
                        error.in_graph(graph.name()).at_label(label)
                    })?;
                    if *goto_interprocedural != callee_graph.entry() {
                        return Err(IrError::new(IrErrorKind::DanglingLabel {
                            target: *goto_interprocedural,
                        })
                        .in_graph(graph.name())
                        .at_label(label));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn validate_acyclic(&self) -> Result {
        // DFS over the instance relation; the input language forbids
        // recursion between sub-programs.
        fn visit(
            program: &Program,
            name: &str,
            trail: &mut Vec<String>,
            finished: &mut BTreeSet<String>,
        ) -> Result {
            if finished.contains(name) {
                return Ok(());
            }
            if let Some(position) = trail.iter().position(|entry| entry == name) {
                let mut cycle: Vec<String> = trail[position..].to_vec();
                cycle.push(name.to_string());
                return Err(IrError::new(IrErrorKind::RecursiveInstantiation { cycle }));
            }
            trail.push(name.to_string());
            if let Some(graph) = program.graphs.get(name) {
                for variable in graph.interface() {
                    if let DataType::Derived { graph: callee } = &variable.data_type {
                        visit(program, callee, trail, finished)?;
                    }
                }
            }
            trail.pop();
            finished.insert(name.to_string());
            Ok(())
        }

        let mut finished = BTreeSet::new();
        for name in self.graphs.keys() {
            visit(self, name, &mut Vec::new(), &mut finished)?;
        }
        Ok(())
    }

    /// The single graph of kind `Program`.
    pub fn main(&self) -> &Graph {
        &self.graphs[&self.main]
    }

    /// Look up a graph by name.
    pub fn graph(&self, name: &str) -> Option<&Graph> {
        self.graphs.get(name)
    }

    /// All graphs in insertion order.
    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.graphs.values()
    }

    /// Resolve the callee graph of a call instruction's access expression
    /// within `graph`.
    ///
    /// The access's first segment must be a declared instance variable;
    /// nested segments walk through further instances.
    pub fn callee<'a>(&'a self, graph: &'a Graph, callee: &Expression) -> Result<&'a Graph> {
        let path = callee.access_path().ok_or_else(|| {
            IrError::new(IrErrorKind::MalformedInstruction {
                detail: "call target is not an access".to_string(),
            })
        })?;
        let mut current = graph;
        for segment in path.split('.') {
            let variable = current.variable(segment).ok_or_else(|| {
                IrError::new(IrErrorKind::UnknownGraph { name: path.clone() })
            })?;
            match &variable.data_type {
                DataType::Derived { graph: callee_name } => {
                    current = self.graphs.get(callee_name).ok_or_else(|| {
                        IrError::new(IrErrorKind::UnknownGraph { name: callee_name.clone() })
                    })?;
                }
                _ => {
                    return Err(IrError::new(IrErrorKind::MalformedInstruction {
                        detail: format!("call target '{}' is not an instance", path),
                    }));
                }
            }
        }
        Ok(current)
    }

    /// The ordered flattened interface of `graph`, rooted at its name.
    pub fn flattened_interface(&self, graph: &Graph) -> Vec<FlattenedVariable> {
        let mut flattened = Vec::new();
        self.flatten_into(graph, graph.name(), &mut flattened);
        flattened
    }

    fn flatten_into(&self, graph: &Graph, prefix: &str, out: &mut Vec<FlattenedVariable>) {
        for variable in graph.interface() {
            let name = format!("{}.{}", prefix, variable.name);
            match &variable.data_type {
                DataType::Derived { graph: callee } => {
                    if let Some(callee_graph) = self.graphs.get(callee) {
                        self.flatten_into(callee_graph, &name, out);
                    }
                }
                _ => out.push(FlattenedVariable {
                    name,
                    data_type: variable.data_type.clone(),
                    storage: variable.storage,
                    initializer: variable.initializer.clone(),
                }),
            }
        }
    }

    /// The whole-program inputs: depth-one `input`-class entries of the
    /// main graph's flattened interface. Their values are unconstrained at
    /// the start of every cycle.
    pub fn whole_program_inputs(&self) -> BTreeSet<String> {
        let main = self.main();
        main.interface()
            .iter()
            .filter(|variable| {
                variable.storage == StorageClass::Input && !variable.data_type.is_derived()
            })
            .map(|variable| format!("{}.{}", main.name(), variable.name))
            .collect()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for graph in self.graphs.values() {
            write!(f, "{}", graph)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::AssignKind;
    use crate::variable::Variable;
    use std::collections::BTreeMap;

    fn block_f() -> Graph {
        // F: b := a + 1
        let mut instructions = BTreeMap::new();
        instructions.insert(
            0,
            Instruction::Assign {
                variable: Expression::var("b"),
                expression: Expression::add(Expression::var("a"), Expression::int(1)),
                next: 1,
                kind: AssignKind::Regular,
            },
        );
        Graph::new(
            "F",
            GraphKind::FunctionBlock,
            vec![
                Variable::new("a", DataType::Int, StorageClass::Input),
                Variable::new("b", DataType::Int, StorageClass::Output),
            ],
            instructions,
            0,
            1,
        )
    }

    fn program_p() -> Graph {
        // P: calls f after binding f.a := x
        let mut instructions = BTreeMap::new();
        instructions.insert(
            0,
            Instruction::Assign {
                variable: Expression::field(Expression::var("f"), "a"),
                expression: Expression::var("x"),
                next: 1,
                kind: AssignKind::ParameterIn,
            },
        );
        instructions.insert(
            1,
            Instruction::Call {
                callee: Expression::var("f"),
                goto_intraprocedural: 2,
                goto_interprocedural: 0,
            },
        );
        instructions.insert(
            2,
            Instruction::Assign {
                variable: Expression::var("y"),
                expression: Expression::field(Expression::var("f"), "b"),
                next: 3,
                kind: AssignKind::ParameterOut,
            },
        );
        Graph::new(
            "P",
            GraphKind::Program,
            vec![
                Variable::new("x", DataType::Int, StorageClass::Input),
                Variable::new("f", DataType::Derived { graph: "F".to_string() }, StorageClass::Local),
                Variable::new("y", DataType::Int, StorageClass::Output),
            ],
            instructions,
            0,
            3,
        )
    }

    #[test]
    fn flattening_crosses_instances_in_declaration_order() {
        let program = Program::new(vec![program_p(), block_f()]).unwrap();
        let names: Vec<String> = program
            .flattened_interface(program.main())
            .into_iter()
            .map(|variable| variable.name)
            .collect();
        assert_eq!(names, vec!["P.x", "P.f.a", "P.f.b", "P.y"]);
    }

    #[test]
    fn whole_program_inputs_are_depth_one_inputs() {
        let program = Program::new(vec![program_p(), block_f()]).unwrap();
        let inputs = program.whole_program_inputs();
        assert!(inputs.contains("P.x"));
        // F's input is an instance field, not a whole-program input.
        assert!(!inputs.contains("P.f.a"));
    }

    #[test]
    fn callee_resolution() {
        let program = Program::new(vec![program_p(), block_f()]).unwrap();
        let callee = program.callee(program.main(), &Expression::var("f")).unwrap();
        assert_eq!(callee.name(), "F");
    }

    #[test]
    fn dangling_label_is_fatal() {
        let mut instructions = BTreeMap::new();
        instructions.insert(0, Instruction::Goto { next: 42 });
        let graph = Graph::new("P", GraphKind::Program, vec![], instructions, 0, 1);
        let error = Program::new(vec![graph]).unwrap_err();
        assert!(matches!(error.kind, IrErrorKind::DanglingLabel { target: 42 }));
        assert_eq!(error.graph.as_deref(), Some("P"));
    }

    #[test]
    fn recursion_is_fatal() {
        let make = |name: &str, other: &str| {
            Graph::new(
                name,
                GraphKind::FunctionBlock,
                vec![Variable::new(
                    "inner",
                    DataType::Derived { graph: other.to_string() },
                    StorageClass::Local,
                )],
                BTreeMap::new(),
                0,
                0,
            )
        };
        let main = Graph::new("P", GraphKind::Program, vec![], BTreeMap::new(), 0, 0);
        let error = Program::new(vec![main, make("A", "B"), make("B", "A")]).unwrap_err();
        assert!(matches!(error.kind, IrErrorKind::RecursiveInstantiation { .. }));
    }

    #[test]
    fn real_typed_variables_are_rejected() {
        let graph = Graph::new(
            "P",
            GraphKind::Program,
            vec![Variable::new("r", DataType::Real, StorageClass::Input)],
            BTreeMap::new(),
            0,
            0,
        );
        let error = Program::new(vec![graph]).unwrap_err();
        assert!(matches!(error.kind, IrErrorKind::UnsupportedType { .. }));
    }
}
