//! End-to-end scenarios for the concolic engine.

mod common;

use std::collections::BTreeMap;

use veriscan_engine::config::{
    Configuration, EngineMode, ExplorationHeuristic, MergeStrategy,
};
use veriscan_engine::engine::{Engine, EngineStatus};
use veriscan_engine::{Executor, FlatInterface};
use veriscan_smt::Smt;
use veriscan_testgen::TestValue;

fn with_smt(run: impl for<'ctx> FnOnce(&Smt<'ctx>)) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let z3_config = z3::Config::new();
    let z3_context = z3::Context::new(&z3_config);
    run(&Smt::new(&z3_context));
}

#[test]
fn trivial_if_covers_both_branches_with_two_test_cases() {
    with_smt(|smt| {
        let program = common::trivial_if();
        let engine = Engine::new(smt, Configuration::default().with_cycle_bound(1)).unwrap();
        let report = engine.run(&program).unwrap();

        assert_eq!(report.status, EngineStatus::CycleBoundReached);
        assert_eq!(report.test_suite.len(), 2);
        assert_eq!(report.branch_coverage, 1.0);
        assert_eq!(report.statement_coverage, 1.0);

        let mut inputs: Vec<TestValue> = report
            .test_suite
            .test_cases()
            .iter()
            .map(|test_case| test_case.cycle_inputs()[&0]["P.x"])
            .collect();
        inputs.sort_by_key(|value| matches!(value, TestValue::Bool(true)));
        assert_eq!(inputs, vec![TestValue::Bool(false), TestValue::Bool(true)]);
    });
}

#[test]
fn two_cycle_accumulator_covers_all_input_sequences() {
    with_smt(|smt| {
        let program = common::accumulator();
        let config = Configuration::default()
            .with_cycle_bound(2)
            .with_exploration_heuristic(ExplorationHeuristic::DepthFirst);
        let engine = Engine::new(smt, config).unwrap();
        let report = engine.run(&program).unwrap();

        // Four input sequences of length two.
        assert_eq!(report.test_suite.len(), 4);
        let mut sequences: Vec<(bool, bool)> = report
            .test_suite
            .test_cases()
            .iter()
            .map(|test_case| {
                let first = test_case.cycle_inputs()[&0]["P.inc"];
                let second = test_case.cycle_inputs()[&1]["P.inc"];
                match (first, second) {
                    (TestValue::Bool(a), TestValue::Bool(b)) => (a, b),
                    _ => panic!("boolean inputs expected"),
                }
            })
            .collect();
        sequences.sort();
        sequences.dedup();
        assert_eq!(sequences.len(), 4);

        // The counter always starts at its initializer.
        for test_case in report.test_suite.test_cases() {
            assert_eq!(test_case.initial_state()["P.c"], TestValue::Int(0));
        }
    });
}

#[test]
fn call_propagates_outputs_through_the_interface() {
    with_smt(|smt| {
        let program = common::call_with_output();
        let engine = Engine::new(smt, Configuration::default().with_cycle_bound(1)).unwrap();
        let report = engine.run(&program).unwrap();

        // No branches anywhere, so exactly one path.
        assert_eq!(report.test_suite.len(), 1);
        let test_case = &report.test_suite.test_cases()[0];
        // The input is unconstrained; the witness default is zero.
        assert_eq!(test_case.cycle_inputs()[&0]["P.x"], TestValue::Int(0));
        // The callee's state is part of the initial valuations.
        assert_eq!(test_case.initial_state()["P.f.b"], TestValue::Int(0));
    });
}

#[test]
fn call_result_lands_in_the_caller_store() {
    with_smt(|smt| {
        // Re-execute the call scenario step by step and observe the
        // cycle-end concrete store: P.y must equal P.x + 1.
        let program = common::call_with_output();
        let config = Configuration::default().with_cycle_bound(1);
        let engine = Engine::new(smt, config.clone()).unwrap();
        let interface = FlatInterface::new(&program);
        let executor = Executor::new(smt, &program, &interface, &config);

        let mut context = engine.initial_context(&program, &interface).unwrap();
        while context.cycle() == 0 {
            let mut successors = executor.execute(context).unwrap().into_vec();
            assert_eq!(successors.len(), 1);
            context = successors.pop().unwrap();
        }
        let state = context.state();
        let x = Smt::int_from(state.concrete_value("P.x_0__0").unwrap()).unwrap();
        let y = Smt::int_from(state.concrete_value("P.y_1__0").unwrap()).unwrap();
        let b = Smt::int_from(state.concrete_value("P.f.b_1__0").unwrap()).unwrap();
        assert_eq!(b, x + 1);
        assert_eq!(y, x + 1);
    });
}

#[test]
fn merging_at_cycle_end_fuses_the_diamond() {
    with_smt(|smt| {
        let program = common::trivial_if();
        let config = Configuration::default()
            .with_engine_mode(EngineMode::Compositional)
            .with_merge_strategy(MergeStrategy::OnlyAtCycleEnd)
            .with_cycle_bound(1);
        let engine = Engine::new(smt, config).unwrap();
        let report = engine.run(&program).unwrap();

        // Both branches still count as covered, but the two paths reach
        // the exit as a single merged context.
        assert_eq!(report.branch_coverage, 1.0);
        assert_eq!(report.test_suite.len(), 1);
    });
}

#[test]
fn over_approximating_mode_explores_the_fully_symbolic_state() {
    with_smt(|smt| {
        let program = common::trivial_if();
        let config = Configuration::default()
            .with_engine_mode(EngineMode::OverApproximating)
            .with_cycle_bound(1);
        let engine = Engine::new(smt, config).unwrap();
        let report = engine.run(&program).unwrap();

        // Everything starts truly symbolic and the merger is active, so
        // the branch still covers fully and the paths fuse at the exit.
        assert_eq!(report.branch_coverage, 1.0);
        assert_eq!(report.statement_coverage, 1.0);
        assert_eq!(report.test_suite.len(), 1);
    });
}

#[test]
fn unreachable_branch_hints_are_honored() {
    with_smt(|smt| {
        let program = common::trivial_if();
        let mut hints = BTreeMap::new();
        hints.insert(("P".to_string(), 0), (true, false));
        let config = Configuration::default()
            .with_cycle_bound(1)
            .with_unreachable_branches(hints);
        let engine = Engine::new(smt, config).unwrap();
        let report = engine.run(&program).unwrap();

        assert_eq!(report.test_suite.len(), 1);
        let test_case = &report.test_suite.test_cases()[0];
        assert_eq!(test_case.cycle_inputs()[&0]["P.x"], TestValue::Bool(true));
        // The pruned side left the coverage universe.
        assert_eq!(report.branch_coverage, 1.0);
    });
}

#[test]
fn zero_cycle_bound_emits_an_empty_suite() {
    with_smt(|smt| {
        let program = common::trivial_if();
        let engine = Engine::new(smt, Configuration::default().with_cycle_bound(0)).unwrap();
        let report = engine.run(&program).unwrap();
        assert_eq!(report.status, EngineStatus::CycleBoundReached);
        assert_eq!(report.cycles_completed, 0);
        assert!(report.test_suite.is_empty());
    });
}

#[test]
fn inputless_programs_still_produce_initial_valuations() {
    with_smt(|smt| {
        let program = common::inputless_counter();
        let engine = Engine::new(smt, Configuration::default().with_cycle_bound(2)).unwrap();
        let report = engine.run(&program).unwrap();

        assert_eq!(report.test_suite.len(), 1);
        let test_case = &report.test_suite.test_cases()[0];
        assert_eq!(test_case.initial_state()["P.c"], TestValue::Int(0));
        assert!(test_case.cycle_inputs()[&0].is_empty());
    });
}

#[test]
fn unsatisfiable_branch_sides_are_not_forked() {
    with_smt(|smt| {
        let program = common::constant_branch();
        let engine = Engine::new(smt, Configuration::default().with_cycle_bound(1)).unwrap();
        let report = engine.run(&program).unwrap();

        // Only the constant-true side is explorable.
        assert_eq!(report.test_suite.len(), 1);
        assert_eq!(report.branch_coverage, 0.5);
    });
}

#[test]
fn path_constraints_stay_satisfiable_and_witnessed() {
    with_smt(|smt| {
        // Step the trivial-if program manually and check, at every step,
        // that each live context's concrete store is a model of its own
        // path constraint.
        let program = common::trivial_if();
        let config = Configuration::default().with_cycle_bound(1);
        let engine = Engine::new(smt, config.clone()).unwrap();
        let interface = FlatInterface::new(&program);
        let executor = Executor::new(smt, &program, &interface, &config);

        let mut live = vec![engine.initial_context(&program, &interface).unwrap()];
        for _ in 0..8 {
            let mut next = Vec::new();
            for context in live.drain(..) {
                if context.cycle() > 0 {
                    continue;
                }
                for successor in executor.execute(context).unwrap().into_vec() {
                    let state = successor.state();
                    // Path constraint alone is satisfiable.
                    let closed = state.closed_path_constraint(smt);
                    assert!(smt.check(&closed).unwrap().is_some());
                    // The concrete store satisfies it.
                    let mut witnessed = closed;
                    for (name, value) in state.concrete_entries() {
                        let constant = if value.as_bool().is_some() {
                            z3::ast::Dynamic::from_ast(&smt.bool_constant(name))
                        } else {
                            z3::ast::Dynamic::from_ast(&smt.int_constant(name))
                        };
                        witnessed
                            .push(z3::ast::Ast::_eq(&constant, value));
                    }
                    assert!(
                        smt.check(&witnessed).unwrap().is_some(),
                        "concrete store contradicts the path constraint"
                    );
                    next.push(successor);
                }
            }
            if next.is_empty() {
                break;
            }
            live = next;
        }
    });
}

#[test]
fn bounded_loops_run_to_their_exit() {
    with_smt(|smt| {
        let program = common::bounded_loop();
        let engine = Engine::new(smt, Configuration::default().with_cycle_bound(1)).unwrap();
        let report = engine.run(&program).unwrap();

        // The loop condition is fully determined, so there is exactly
        // one path through the three iterations.
        assert_eq!(report.test_suite.len(), 1);
        let valuations =
            veriscan_engine::replay(smt, &program, &report.test_suite.test_cases()[0]).unwrap();
        assert_eq!(valuations[0]["P.i"], TestValue::Int(3));
    });
}

#[test]
fn nondeterministic_assignments_open_both_branches() {
    with_smt(|smt| {
        let program = common::nondet_assign();
        let engine = Engine::new(smt, Configuration::default().with_cycle_bound(1)).unwrap();
        let report = engine.run(&program).unwrap();

        // The havocked value drives the branch both ways, but it is not
        // part of the test-case surface, so the scenarios collapse into
        // the shared initial valuations.
        assert_eq!(report.branch_coverage, 1.0);
        assert_eq!(report.test_suite.len(), 1);
    });
}

#[test]
fn replaying_derived_cases_reproduces_the_predicted_outputs() {
    with_smt(|smt| {
        // Every generated scenario, re-executed concretely, must drive
        // the program to the outputs its path predicted.
        let program = common::trivial_if();
        let engine = Engine::new(smt, Configuration::default().with_cycle_bound(1)).unwrap();
        let report = engine.run(&program).unwrap();
        assert_eq!(report.test_suite.len(), 2);

        for test_case in report.test_suite.test_cases() {
            let valuations = veriscan_engine::replay(smt, &program, test_case).unwrap();
            assert_eq!(valuations.len(), 1);
            let expected = match test_case.cycle_inputs()[&0]["P.x"] {
                TestValue::Bool(true) => TestValue::Int(1),
                TestValue::Bool(false) => TestValue::Int(2),
                TestValue::Int(_) => panic!("boolean input expected"),
            };
            assert_eq!(valuations[0]["P.y"], expected);
        }
    });
}

#[test]
fn replaying_the_accumulator_counts_the_true_inputs() {
    with_smt(|smt| {
        let program = common::accumulator();
        let engine = Engine::new(smt, Configuration::default().with_cycle_bound(2)).unwrap();
        let report = engine.run(&program).unwrap();
        assert_eq!(report.test_suite.len(), 4);

        for test_case in report.test_suite.test_cases() {
            let valuations = veriscan_engine::replay(smt, &program, test_case).unwrap();
            assert_eq!(valuations.len(), 2);
            let trues = test_case
                .cycle_inputs()
                .values()
                .flat_map(|inputs| inputs.values())
                .filter(|value| matches!(value, TestValue::Bool(true)))
                .count() as i64;
            assert_eq!(valuations[1]["P.c"], TestValue::Int(trues));
        }
    });
}

#[test]
fn generated_suites_round_trip_through_xml() {
    with_smt(|smt| {
        let directory = tempfile::tempdir().unwrap();
        let program = common::trivial_if();
        let config = Configuration::default()
            .with_cycle_bound(1)
            .with_test_suite_output(directory.path());
        let engine = Engine::new(smt, config).unwrap();
        let report = engine.run(&program).unwrap();
        assert_eq!(report.test_suite.len(), 2);

        let recovered = veriscan_testgen::TestSuite::read_xml(directory.path()).unwrap();
        assert_eq!(recovered, report.test_suite);
    });
}

#[test]
fn versions_are_monotone_within_a_cycle() {
    with_smt(|smt| {
        let program = common::accumulator();
        let config = Configuration::default().with_cycle_bound(1);
        let engine = Engine::new(smt, config.clone()).unwrap();
        let interface = FlatInterface::new(&program);
        let executor = Executor::new(smt, &program, &interface, &config);

        let mut context = engine.initial_context(&program, &interface).unwrap();
        let mut last_version = context.state().version("P.c");
        loop {
            let mut successors = executor.execute(context).unwrap().into_vec();
            // Follow the concrete path only.
            let successor = successors.remove(0);
            if successor.cycle() > 0 {
                break;
            }
            let version = successor.state().version("P.c");
            assert!(version >= last_version);
            last_version = version;
            context = successor;
        }
    });
}
