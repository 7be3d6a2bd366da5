//! End-to-end scenarios for shadow execution.

mod common;

use veriscan_engine::config::{Configuration, EngineMode, ShadowProcessingMode};
use veriscan_engine::shadow::{ShadowEngine, ShadowVerdict};
use veriscan_smt::Smt;
use veriscan_testgen::TestValue;

fn with_smt(run: impl for<'ctx> FnOnce(&Smt<'ctx>)) {
    let z3_config = z3::Config::new();
    let z3_context = z3::Context::new(&z3_config);
    run(&Smt::new(&z3_context));
}

fn shadow_config(mode: ShadowProcessingMode) -> Configuration {
    Configuration::default()
        .with_engine_mode(EngineMode::Shadow)
        .with_shadow_processing_mode(mode)
        .with_cycle_bound(1)
}

#[test]
fn changed_guard_diverges_exactly_at_zero() {
    with_smt(|smt| {
        let program = common::changed_guard();
        let engine =
            ShadowEngine::new(smt, shadow_config(ShadowProcessingMode::Both)).unwrap();
        let report = engine.run(&program).unwrap();

        assert_eq!(report.verdict, ShadowVerdict::DivergentBehavior);
        assert!(report.divergences >= 1);

        // The first recorded scenario is the divergence witness; the
        // only input separating x > 0 from x >= 0 is zero.
        let witness = &report.test_suite.test_cases()[0];
        assert_eq!(witness.cycle_inputs()[&0]["P.x"], TestValue::Int(0));
    });
}

#[test]
fn old_projection_runs_like_the_old_revision() {
    with_smt(|smt| {
        let program = common::changed_guard();
        let engine =
            ShadowEngine::new(smt, shadow_config(ShadowProcessingMode::Old)).unwrap();
        let report = engine.run(&program).unwrap();

        // The change expression is projected away; nothing can diverge.
        assert_eq!(report.verdict, ShadowVerdict::ExpectedBehavior);
        assert_eq!(report.divergences, 0);
        // Both sides of `x > 0` are explorable.
        assert_eq!(report.test_suite.len(), 2);
    });
}

#[test]
fn old_and_new_projections_partition_inputs_differently() {
    with_smt(|smt| {
        let program = common::changed_guard();

        let old_engine =
            ShadowEngine::new(smt, shadow_config(ShadowProcessingMode::Old)).unwrap();
        let old_report = old_engine.run(&program).unwrap();

        let new_engine =
            ShadowEngine::new(smt, shadow_config(ShadowProcessingMode::New)).unwrap();
        let new_report = new_engine.run(&program).unwrap();

        let inputs = |report: &veriscan_engine::shadow::ShadowReport| -> Vec<i64> {
            report
                .test_suite
                .test_cases()
                .iter()
                .map(|test_case| match test_case.cycle_inputs()[&0]["P.x"] {
                    TestValue::Int(value) => value,
                    TestValue::Bool(_) => panic!("integer input expected"),
                })
                .collect()
        };

        // Each projection explores both branch sides of its revision.
        assert_eq!(old_report.test_suite.len(), 2);
        assert_eq!(new_report.test_suite.len(), 2);

        // The new revision's then-branch admits x = 0, the old one's
        // does not: their witnesses for the then side differ in sign
        // constraints. Check the partition property on the collected
        // inputs.
        let old_inputs = inputs(&old_report);
        let new_inputs = inputs(&new_report);
        assert!(old_inputs.iter().any(|x| *x > 0));
        assert!(old_inputs.iter().any(|x| *x <= 0));
        assert!(new_inputs.iter().any(|x| *x >= 0));
        assert!(new_inputs.iter().any(|x| *x < 0));
    });
}

#[test]
fn programs_without_changes_behave_as_expected() {
    with_smt(|smt| {
        let program = common::trivial_if();
        let engine =
            ShadowEngine::new(smt, shadow_config(ShadowProcessingMode::Both)).unwrap();
        let report = engine.run(&program).unwrap();

        assert_eq!(report.verdict, ShadowVerdict::ExpectedBehavior);
        assert_eq!(report.divergences, 0);
        assert_eq!(report.test_suite.len(), 2);
    });
}

#[test]
fn shadow_engine_rejects_other_modes() {
    with_smt(|smt| {
        let config = Configuration::default();
        assert!(ShadowEngine::new(smt, config).is_err());
    });
}
