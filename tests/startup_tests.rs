//! Startup: argument tail, environment overrides, device resolution and
//! the capability probe.

mod common;

use common::{argv, basic_registry, element_recorder, env, no_env, RunLog};
use cts_harness::api::simulated::{QueueCreation, SimDevice, SimulatedApi};
use cts_harness::api::{DeviceType, QueueProperties};
use cts_harness::config::{ENV_DEVICE_INDEX, ENV_DEVICE_TYPE};
use cts_harness::device::SelectionSource;
use cts_harness::harness::{Harness, RunKind, Startup, FATAL_EXIT_CODE};
use cts_harness::{Error, IndexKind};
use pretty_assertions::assert_eq;

#[test]
fn test_list_prints_and_creates_nothing() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let harness = Harness::new(&api);

    for flag in ["-list", "--help", "-h"] {
        let outcome = harness.run(&argv(&[flag]), &no_env(), &basic_registry(&log)).unwrap();
        assert_eq!(outcome.kind, RunKind::Listed);
        assert_eq!(outcome.exit_code, 0);
    }
    assert!(log.is_empty());
    assert_eq!(api.stats().contexts_created, 0);
}

#[test]
fn test_element_count_reaches_body() {
    let api = SimulatedApi::default();
    let (registry, seen) = element_recorder();
    Harness::new(&api).run(&argv(&["16384"]), &no_env(), &registry).unwrap();
    assert_eq!(seen.get(), 16384);

    let (registry, seen) = element_recorder();
    Harness::new(&api).run(&argv(&["elements", "77"]), &no_env(), &registry).unwrap();
    assert_eq!(seen.get(), 77);
}

#[test]
fn test_default_element_count() {
    let api = SimulatedApi::default();
    let (registry, seen) = element_recorder();
    Harness::new(&api).run(&argv(&[]), &no_env(), &registry).unwrap();
    assert_eq!(seen.get(), cts_harness::args::DEFAULT_NUM_ELEMENTS);
}

#[test]
fn test_device_index_out_of_range() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let harness = Harness::new(&api);

    match harness.run(&argv(&["id3", "gpu"]), &no_env(), &basic_registry(&log)) {
        Err(Error::IndexOutOfRange { kind, index, count }) => {
            assert_eq!(kind, IndexKind::Device);
            assert_eq!(index, 3);
            assert_eq!(count, 1);
        }
        other => panic!("expected an index error, got {:?}", other),
    }
    assert_eq!(
        harness.run_to_exit_code(&argv(&["pid4"]), &no_env(), &basic_registry(&log)),
        FATAL_EXIT_CODE
    );
    assert!(log.is_empty());
}

#[test]
fn test_no_platforms_is_fatal() {
    let api = SimulatedApi::empty();
    let log = RunLog::default();
    let result = Harness::new(&api).run(&argv(&[]), &no_env(), &basic_registry(&log));
    assert!(matches!(result, Err(Error::NoPlatforms)));
}

#[test]
fn test_env_device_type_is_recorded_as_source() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let registry = basic_registry(&log);
    let harness = Harness::new(&api);

    let Startup::Ready(run) = harness
        .prepare(&argv(&[]), &env(&[(ENV_DEVICE_TYPE, "cpu")]), &registry)
        .unwrap()
    else {
        panic!("expected a prepared run");
    };
    assert_eq!(run.device.selection.device_type, DeviceType::Cpu);
    assert_eq!(run.device.selection.source, SelectionSource::EnvVar);
    assert!(run.session.caps.is_embedded_profile);

    // A command-line type wins over the environment.
    let Startup::Ready(run) = harness
        .prepare(&argv(&["gpu"]), &env(&[(ENV_DEVICE_TYPE, "cpu")]), &registry)
        .unwrap()
    else {
        panic!("expected a prepared run");
    };
    assert_eq!(run.device.selection.device_type, DeviceType::Gpu);
    assert_eq!(run.device.selection.source, SelectionSource::CommandLine);
}

#[test]
fn test_bad_env_device_type_is_fatal() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let result = Harness::new(&api).run(
        &argv(&[]),
        &env(&[(ENV_DEVICE_TYPE, "fpga")]),
        &basic_registry(&log),
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_env_device_index_out_of_range() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let result = Harness::new(&api).run(
        &argv(&[]),
        &env(&[(ENV_DEVICE_INDEX, "9")]),
        &basic_registry(&log),
    );
    assert!(matches!(
        result,
        Err(Error::IndexOutOfRange {
            kind: IndexKind::Device,
            index: 9,
            ..
        })
    ));
}

#[test]
fn test_unterminated_string_aborts_startup() {
    let api = SimulatedApi::builder()
        .platform("p", vec![SimDevice::cpu("bad").embedded().unterminated_extensions()])
        .build();
    let log = RunLog::default();
    let result = Harness::new(&api).run(&argv(&[]), &no_env(), &basic_registry(&log));

    assert!(matches!(result, Err(Error::Protocol { .. })));
    assert!(log.is_empty());
}

#[test]
fn test_queue_creation_follows_device_version() {
    let api = SimulatedApi::default();
    let log = RunLog::default();
    let registry = basic_registry(&log);
    let harness = Harness::new(&api);

    harness.run(&argv(&["basic_a"]), &no_env(), &registry).unwrap();
    harness.run(&argv(&["basic_a", "cpu"]), &no_env(), &registry).unwrap();

    assert_eq!(
        api.queue_log(),
        vec![
            QueueCreation::WithProperties(vec![0]),
            QueueCreation::Legacy(QueueProperties::empty()),
        ]
    );
}
