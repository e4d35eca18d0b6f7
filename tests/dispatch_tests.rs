//! Per-test lifecycle: gates, outcomes, teardown and resource release.

mod common;

use common::{argv, no_env, RunLog};
use cts_harness::api::simulated::{SimDevice, SimDeviceId, SimulatedApi};
use cts_harness::api::{Version, CL_OUT_OF_RESOURCES};
use cts_harness::harness::{Harness, HarnessOptions, RunKind};
use cts_harness::registry::{TestDefinition, TestEnv, TestOutcome, TestRegistry, TestStatus};
use cts_harness::report::RunCounters;
use pretty_assertions::assert_eq;

fn single(definition: TestDefinition<SimulatedApi>) -> TestRegistry<SimulatedApi> {
    TestRegistry::new("test_suite").with(definition).unwrap()
}

#[test]
fn test_failures_set_exit_code() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let registry = TestRegistry::new("test_suite")
        .with(log.body("one", TestOutcome::Fail(3)))
        .unwrap()
        .with(log.body("two", TestOutcome::Fail(1)))
        .unwrap()
        .with(log.body("three", TestOutcome::Pass))
        .unwrap();

    let outcome = Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    assert_eq!(outcome.counters, RunCounters { passed: 1, failed: 2 });
    assert_eq!(outcome.exit_code, 2);
}

#[test]
fn test_not_implemented_and_skip_are_not_counted() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let registry = TestRegistry::new("test_suite")
        .with(log.body("pending", TestOutcome::NotImplemented))
        .unwrap()
        .with(log.body("unsupported", TestOutcome::Skip))
        .unwrap();

    let outcome = Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    assert_eq!(outcome.counters, RunCounters::default());
    assert_eq!(outcome.exit_code, 0);
    let report = outcome.report.unwrap();
    assert_eq!(report.status_of("pending"), Some(TestStatus::Skip));
    assert_eq!(report.status_of("unsupported"), Some(TestStatus::Skip));
}

#[test]
fn test_version_gate_skips_without_resources() {
    let api = SimulatedApi::builder()
        .platform("p", vec![SimDevice::gpu("old").version(1, 2).c_version("OpenCL C 1.2 ")])
        .build();
    let log = RunLog::default();
    let registry = single(log.body("svm", TestOutcome::Pass).min_version(Version::new(2, 0)));

    let outcome = Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    assert!(log.is_empty());
    assert_eq!(api.stats().contexts_created, 0);
    assert_eq!(outcome.report.unwrap().status_of("svm"), Some(TestStatus::Skip));
}

#[test]
fn test_online_only_test_skipped_in_binary_mode() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let registry = single(log.body("compile", TestOutcome::Pass).online_compiler_only());

    let outcome = Harness::new(&api)
        .run(&argv(&["--compilation-mode", "binary"]), &no_env(), &registry)
        .unwrap();
    assert!(log.is_empty());
    assert_eq!(outcome.counters, RunCounters::default());
}

#[test]
fn test_finish_failure_fails_passing_test() {
    let api = SimulatedApi::builder()
        .platform("p", vec![SimDevice::gpu("g").fail_finish(CL_OUT_OF_RESOURCES)])
        .build();
    let log = RunLog::default();
    let registry = TestRegistry::new("test_suite")
        .with(log.body("passes", TestOutcome::Pass))
        .unwrap()
        .with(log.body("skips", TestOutcome::Skip))
        .unwrap();

    let outcome = Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    assert_eq!(outcome.counters, RunCounters { passed: 0, failed: 2 });
    assert_eq!(outcome.exit_code, 2);
    assert_eq!(api.live_contexts(), 0);
    assert_eq!(api.live_queues(), 0);
}

#[test]
fn test_release_failure_fails_passing_test() {
    let api = SimulatedApi::builder()
        .platform("p", vec![SimDevice::gpu("g").fail_release(CL_OUT_OF_RESOURCES)])
        .build();
    let log = RunLog::default();
    let registry = single(log.body("passes", TestOutcome::Pass));

    let outcome = Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    assert_eq!(log.names(), vec!["passes"]);
    assert_eq!(outcome.counters, RunCounters { passed: 0, failed: 1 });
    assert_eq!(outcome.exit_code, 1);
    assert_eq!(outcome.report.unwrap().status_of("passes"), Some(TestStatus::Fail));
    assert_eq!(api.live_contexts(), 0);
    assert_eq!(api.live_queues(), 0);
}

#[test]
fn test_context_failure_fails_without_running_body() {
    let api = SimulatedApi::builder()
        .platform("p", vec![SimDevice::gpu("g").fail_context_creation(CL_OUT_OF_RESOURCES)])
        .build();
    let log = RunLog::default();
    let registry = single(log.body("needs_context", TestOutcome::Pass));

    let outcome = Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    assert!(log.is_empty());
    assert_eq!(outcome.counters.failed, 1);
}

#[test]
fn test_queue_failure_releases_context() {
    let api = SimulatedApi::builder()
        .platform("p", vec![SimDevice::gpu("g").fail_queue_creation(CL_OUT_OF_RESOURCES)])
        .build();
    let log = RunLog::default();
    let registry = single(log.body("needs_queue", TestOutcome::Pass));

    let outcome = Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    assert_eq!(outcome.counters.failed, 1);
    assert_eq!(api.stats().contexts_created, 1);
    assert_eq!(api.live_contexts(), 0);
}

#[test]
fn test_panicking_body_fails_and_releases() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let registry = TestRegistry::new("test_suite")
        .with(TestDefinition::new("explodes", |_: &mut TestEnv<'_, SimulatedApi>| -> TestOutcome {
            panic!("body failure")
        }))
        .unwrap()
        .with(log.body("after", TestOutcome::Pass))
        .unwrap();

    let outcome = Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    assert_eq!(outcome.counters, RunCounters { passed: 1, failed: 1 });
    assert_eq!(log.names(), vec!["after"]);
    assert_eq!(api.live_contexts(), 0);
    assert_eq!(api.live_queues(), 0);
}

#[test]
fn test_every_test_gets_fresh_resources() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let registry = TestRegistry::new("test_suite")
        .with(log.body("a", TestOutcome::Pass))
        .unwrap()
        .with(log.body("b", TestOutcome::Fail(1)))
        .unwrap()
        .with(log.body("c", TestOutcome::Pass))
        .unwrap();

    Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    let stats = api.stats();
    assert_eq!(stats.contexts_created, 3);
    assert_eq!(stats.queues_created, 3);
    assert_eq!(stats.finish_calls, 3);
    assert_eq!(api.live_contexts(), 0);
}

#[test]
fn test_no_context_creation_option() {
    let api = SimulatedApi::default();
    let registry = single(TestDefinition::new("bare", |env: &mut TestEnv<'_, SimulatedApi>| {
        if env.context.is_none() && env.queue.is_none() {
            TestOutcome::Pass
        } else {
            TestOutcome::Fail(1)
        }
    }));
    let options = HarnessOptions {
        force_no_context_creation: true,
        ..Default::default()
    };

    let outcome = Harness::with_options(&api, options)
        .run(&argv(&[]), &no_env(), &registry)
        .unwrap();
    assert_eq!(outcome.counters.passed, 1);
    assert_eq!(api.stats().contexts_created, 0);
}

#[test]
fn test_device_check_failure_fails_suite() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let registry = single(log.body("a", TestOutcome::Pass));
    let options = HarnessOptions {
        device_check: Some(Box::new(|_: &SimulatedApi, _: SimDeviceId| TestStatus::Fail)),
        ..Default::default()
    };

    let outcome = Harness::with_options(&api, options)
        .run(&argv(&[]), &no_env(), &registry)
        .unwrap();
    assert_eq!(outcome.kind, RunKind::SuiteFailed);
    assert_eq!(outcome.exit_code, 1);
    assert!(log.is_empty());
    assert_eq!(outcome.report.unwrap().status_of("a"), Some(TestStatus::Fail));
}
