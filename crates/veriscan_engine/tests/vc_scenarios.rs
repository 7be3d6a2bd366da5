//! End-to-end scenarios for the verification-condition engine.

mod common;

use veriscan_engine::cbmc::VcEngine;
use veriscan_engine::config::{Configuration, EngineMode, MergeStrategy};
use veriscan_engine::engine::EngineStatus;
use veriscan_smt::Smt;
use veriscan_testgen::TestValue;

fn with_smt(run: impl for<'ctx> FnOnce(&Smt<'ctx>)) {
    let z3_config = z3::Config::new();
    let z3_context = z3::Context::new(&z3_config);
    run(&Smt::new(&z3_context));
}

fn vc_config() -> Configuration {
    Configuration::default()
        .with_engine_mode(EngineMode::Cbmc)
        .with_merge_strategy(MergeStrategy::OnlyAtCycleEnd)
}

#[test]
fn trivial_if_exit_is_reachable_without_forking() {
    with_smt(|smt| {
        let program = common::trivial_if();
        let engine = VcEngine::new(smt, vc_config().with_cycle_bound(1)).unwrap();
        let report = engine.run(&program).unwrap();

        assert_eq!(report.status, EngineStatus::CycleBoundReached);
        assert!(report.exit_reachable);
        assert_eq!(report.test_suite.len(), 1);
        let test_case = &report.test_suite.test_cases()[0];
        assert_eq!(test_case.initial_state()["P.y"], TestValue::Int(0));
        assert_eq!(test_case.cycle_count(), 1);
    });
}

#[test]
fn accumulator_encodes_across_cycles() {
    with_smt(|smt| {
        let program = common::accumulator();
        let engine = VcEngine::new(smt, vc_config().with_cycle_bound(2)).unwrap();
        let report = engine.run(&program).unwrap();

        assert!(report.exit_reachable);
        assert_eq!(report.cycles_completed, 2);
        let test_case = &report.test_suite.test_cases()[0];
        assert_eq!(test_case.cycle_count(), 2);
        // Inputs exist for both cycles, whichever values the model chose.
        assert!(test_case.cycle_inputs()[&0].contains_key("P.inc"));
        assert!(test_case.cycle_inputs()[&1].contains_key("P.inc"));
    });
}

#[test]
fn joins_merge_at_all_join_points_too() {
    with_smt(|smt| {
        let program = common::trivial_if();
        let config = vc_config()
            .with_merge_strategy(MergeStrategy::AtAllJoinPoints)
            .with_cycle_bound(1);
        let engine = VcEngine::new(smt, config).unwrap();
        let report = engine.run(&program).unwrap();
        assert!(report.exit_reachable);
    });
}

#[test]
fn calls_encode_through_the_interface() {
    with_smt(|smt| {
        let program = common::call_with_output();
        let engine = VcEngine::new(smt, vc_config().with_cycle_bound(1)).unwrap();
        let report = engine.run(&program).unwrap();
        assert!(report.exit_reachable);
        assert_eq!(report.test_suite.len(), 1);
    });
}

#[test]
fn vc_engine_rejects_other_modes() {
    with_smt(|smt| {
        assert!(VcEngine::new(smt, Configuration::default()).is_err());
    });
}
