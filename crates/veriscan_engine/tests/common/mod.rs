//! Scenario programs shared by the integration suites.
#![allow(dead_code)]

use std::collections::BTreeMap;

use veriscan_ir::{
    AssignKind, DataType, Expression, Graph, GraphKind, Instruction, Literal, Program,
    StorageClass, Variable,
};

fn assign(variable: Expression, expression: Expression, next: usize) -> Instruction {
    Instruction::Assign { variable, expression, next, kind: AssignKind::Regular }
}

/// `PROGRAM P: VAR_INPUT x: BOOL; VAR_OUTPUT y: INT;`
/// `if x then y := 1 else y := 2 end_if`
pub fn trivial_if() -> Program {
    let mut instructions = BTreeMap::new();
    instructions.insert(
        0,
        Instruction::If { condition: Expression::var("x"), goto_then: 1, goto_else: 2 },
    );
    instructions.insert(1, assign(Expression::var("y"), Expression::int(1), 3));
    instructions.insert(2, assign(Expression::var("y"), Expression::int(2), 3));
    let graph = Graph::new(
        "P",
        GraphKind::Program,
        vec![
            Variable::new("x", DataType::Bool, StorageClass::Input),
            Variable::new("y", DataType::Int, StorageClass::Output),
        ],
        instructions,
        0,
        3,
    );
    Program::new(vec![graph]).unwrap()
}

/// `PROGRAM P: VAR_INPUT inc: BOOL; VAR c: INT := 0;`
/// `if inc then c := c + 1 end_if`
pub fn accumulator() -> Program {
    let mut instructions = BTreeMap::new();
    instructions.insert(
        0,
        Instruction::If { condition: Expression::var("inc"), goto_then: 1, goto_else: 2 },
    );
    instructions.insert(
        1,
        assign(
            Expression::var("c"),
            Expression::add(Expression::var("c"), Expression::int(1)),
            2,
        ),
    );
    let graph = Graph::new(
        "P",
        GraphKind::Program,
        vec![
            Variable::new("inc", DataType::Bool, StorageClass::Input),
            Variable::with_initializer("c", DataType::Int, StorageClass::Local, Literal::Int(0)),
        ],
        instructions,
        0,
        2,
    );
    Program::new(vec![graph]).unwrap()
}

/// `P` calls function block `F` with input `a` bound to `P.x` and output
/// `b` read into `P.y`; `F` computes `b := a + 1`.
pub fn call_with_output() -> Program {
    let mut f_instructions = BTreeMap::new();
    f_instructions.insert(
        0,
        assign(
            Expression::var("b"),
            Expression::add(Expression::var("a"), Expression::int(1)),
            1,
        ),
    );
    let block = Graph::new(
        "F",
        GraphKind::FunctionBlock,
        vec![
            Variable::new("a", DataType::Int, StorageClass::Input),
            Variable::new("b", DataType::Int, StorageClass::Output),
        ],
        f_instructions,
        0,
        1,
    );

    let mut p_instructions = BTreeMap::new();
    p_instructions.insert(
        0,
        Instruction::Assign {
            variable: Expression::field(Expression::var("f"), "a"),
            expression: Expression::var("x"),
            next: 1,
            kind: AssignKind::ParameterIn,
        },
    );
    p_instructions.insert(
        1,
        Instruction::Call {
            callee: Expression::var("f"),
            goto_intraprocedural: 2,
            goto_interprocedural: 0,
        },
    );
    p_instructions.insert(
        2,
        Instruction::Assign {
            variable: Expression::var("y"),
            expression: Expression::field(Expression::var("f"), "b"),
            next: 3,
            kind: AssignKind::ParameterOut,
        },
    );
    let program = Graph::new(
        "P",
        GraphKind::Program,
        vec![
            Variable::new("x", DataType::Int, StorageClass::Input),
            Variable::new("f", DataType::Derived { graph: "F".to_string() }, StorageClass::Local),
            Variable::new("y", DataType::Int, StorageClass::Output),
        ],
        p_instructions,
        0,
        3,
    );
    Program::new(vec![program, block]).unwrap()
}

/// `if change(x > 0, x >= 0) then y := 1 else y := 2 end_if`; the
/// revisions disagree exactly at `x = 0`.
pub fn changed_guard() -> Program {
    let mut instructions = BTreeMap::new();
    instructions.insert(
        0,
        Instruction::If {
            condition: Expression::change(
                Expression::gt(Expression::var("x"), Expression::int(0)),
                Expression::ge(Expression::var("x"), Expression::int(0)),
            ),
            goto_then: 1,
            goto_else: 2,
        },
    );
    instructions.insert(1, assign(Expression::var("y"), Expression::int(1), 3));
    instructions.insert(2, assign(Expression::var("y"), Expression::int(2), 3));
    let graph = Graph::new(
        "P",
        GraphKind::Program,
        vec![
            Variable::new("x", DataType::Int, StorageClass::Input),
            Variable::new("y", DataType::Int, StorageClass::Output),
        ],
        instructions,
        0,
        3,
    );
    Program::new(vec![graph]).unwrap()
}

/// A program with no whole-program inputs: `c := c + 1` every cycle.
pub fn inputless_counter() -> Program {
    let mut instructions = BTreeMap::new();
    instructions.insert(
        0,
        assign(
            Expression::var("c"),
            Expression::add(Expression::var("c"), Expression::int(1)),
            1,
        ),
    );
    let graph = Graph::new(
        "P",
        GraphKind::Program,
        vec![Variable::with_initializer(
            "c",
            DataType::Int,
            StorageClass::Local,
            Literal::Int(0),
        )],
        instructions,
        0,
        1,
    );
    Program::new(vec![graph]).unwrap()
}

/// `i := 0; while i < 3 do i := i + 1 done` every cycle.
pub fn bounded_loop() -> Program {
    let mut instructions = BTreeMap::new();
    instructions.insert(0, assign(Expression::var("i"), Expression::int(0), 1));
    instructions.insert(
        1,
        Instruction::While {
            condition: Expression::lt(Expression::var("i"), Expression::int(3)),
            goto_body: 2,
            goto_exit: 3,
        },
    );
    instructions.insert(
        2,
        assign(
            Expression::var("i"),
            Expression::add(Expression::var("i"), Expression::int(1)),
            1,
        ),
    );
    let graph = Graph::new(
        "P",
        GraphKind::Program,
        vec![Variable::new("i", DataType::Int, StorageClass::Local)],
        instructions,
        0,
        3,
    );
    Program::new(vec![graph]).unwrap()
}

/// `n := ?; if n > 0 then y := 1 else y := 2 end_if`: the
/// nondeterministic assignment havocs `n`.
pub fn nondet_assign() -> Program {
    let mut instructions = BTreeMap::new();
    instructions.insert(
        0,
        assign(Expression::var("n"), Expression::NondeterministicConstant, 1),
    );
    instructions.insert(
        1,
        Instruction::If {
            condition: Expression::gt(Expression::var("n"), Expression::int(0)),
            goto_then: 2,
            goto_else: 3,
        },
    );
    instructions.insert(2, assign(Expression::var("y"), Expression::int(1), 4));
    instructions.insert(3, assign(Expression::var("y"), Expression::int(2), 4));
    let graph = Graph::new(
        "P",
        GraphKind::Program,
        vec![
            Variable::new("n", DataType::Int, StorageClass::Local),
            Variable::new("y", DataType::Int, StorageClass::Output),
        ],
        instructions,
        0,
        4,
    );
    Program::new(vec![graph]).unwrap()
}

/// A branch whose condition is constant, so one side is unsatisfiable.
pub fn constant_branch() -> Program {
    let mut instructions = BTreeMap::new();
    instructions.insert(
        0,
        Instruction::If { condition: Expression::bool(true), goto_then: 1, goto_else: 2 },
    );
    instructions.insert(1, assign(Expression::var("y"), Expression::int(1), 3));
    instructions.insert(2, assign(Expression::var("y"), Expression::int(2), 3));
    let graph = Graph::new(
        "P",
        GraphKind::Program,
        vec![Variable::new("y", DataType::Int, StorageClass::Output)],
        instructions,
        0,
        3,
    );
    Program::new(vec![graph]).unwrap()
}
