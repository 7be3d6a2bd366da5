//! Indexed view of a program's flattened interface.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use veriscan_ir::{DataType, FlattenedVariable, Program};

/// The main graph's flattened interface, indexed by dotted name, together
/// with the whole-program input set.
///
/// Built once per run; encoders and executors resolve every variable
/// access against it.
pub struct FlatInterface {
    variables: IndexMap<String, FlattenedVariable>,
    whole_program_inputs: BTreeSet<String>,
}

impl FlatInterface {
    /// Index the flattened interface of `program`'s main graph.
    pub fn new(program: &Program) -> Self {
        let variables = program
            .flattened_interface(program.main())
            .into_iter()
            .map(|variable| (variable.name.clone(), variable))
            .collect();
        Self { variables, whole_program_inputs: program.whole_program_inputs() }
    }

    /// The flattened variables in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &FlattenedVariable> {
        self.variables.values()
    }

    /// The record for a flattened name.
    pub fn variable(&self, flattened_name: &str) -> Option<&FlattenedVariable> {
        self.variables.get(flattened_name)
    }

    /// The data type of a flattened name.
    pub fn data_type(&self, flattened_name: &str) -> Option<&DataType> {
        self.variables.get(flattened_name).map(|variable| &variable.data_type)
    }

    /// Whether `flattened_name` is a whole-program input, that is, a
    /// depth-one input of the main graph. Its value is unconstrained at
    /// the start of every cycle.
    pub fn is_whole_program_input(&self, flattened_name: &str) -> bool {
        self.whole_program_inputs.contains(flattened_name)
    }

    /// The whole-program inputs in declaration order.
    pub fn whole_program_inputs(&self) -> impl Iterator<Item = &str> {
        self.variables
            .keys()
            .filter(|name| self.whole_program_inputs.contains(*name))
            .map(String::as_str)
    }

    /// The persistent state variables in declaration order: every
    /// flattened variable that is not a whole-program input.
    pub fn state_variables(&self) -> impl Iterator<Item = &FlattenedVariable> {
        self.variables
            .values()
            .filter(|variable| !self.whole_program_inputs.contains(&variable.name))
    }
}
