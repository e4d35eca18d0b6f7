//! Smoke suite
//!
//! A small suite that exercises the harness end to end against whichever
//! compute backend it is given. The binary runs it; integration tests use it
//! as a realistic registry.

use crate::api::query::{device_version, is_extension_available, query_string};
use crate::api::{ComputeApi, DeviceInfo, Version};
use crate::error::Result;
use crate::registry::{TestDefinition, TestEnv, TestOutcome, TestRegistry};
use rand::Rng;
use tracing::{error, info};

pub const SUITE_NAME: &str = "smoke";

/// Device version parsed again from inside a test matches the probe.
fn test_device_version<A: ComputeApi>(env: &mut TestEnv<'_, A>) -> TestOutcome {
    match device_version(env.api, env.device) {
        Ok(version) if version == env.caps.device_version => TestOutcome::Pass,
        Ok(version) => {
            error!(
                "device reports {} but the probe recorded {}",
                version, env.caps.device_version
            );
            TestOutcome::Fail(1)
        }
        Err(e) => {
            error!("{}", e);
            TestOutcome::Fail(1)
        }
    }
}

fn test_queue_finish<A: ComputeApi>(env: &mut TestEnv<'_, A>) -> TestOutcome {
    let Some(queue) = env.queue else {
        return TestOutcome::Skip;
    };
    match env.api.finish(queue) {
        Ok(()) => TestOutcome::Pass,
        Err(e) => {
            error!("clFinish failed: {}", e);
            TestOutcome::Fail(1)
        }
    }
}

/// Every string parameter obeys the size/content protocol.
fn test_device_strings<A: ComputeApi>(env: &mut TestEnv<'_, A>) -> TestOutcome {
    let params = [
        DeviceInfo::Name,
        DeviceInfo::Vendor,
        DeviceInfo::DriverVersion,
        DeviceInfo::Profile,
        DeviceInfo::Version,
        DeviceInfo::Extensions,
    ];
    let mut errors = 0;
    for param in params {
        let ok = match query_string(env.api, env.device, param) {
            Ok(_) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        };
        env.subtests.record(ok);
        if !ok {
            errors += 1;
        }
    }
    TestOutcome::from_error_count(errors)
}

/// Sum of a random buffer computed two ways.
fn test_random_fill<A: ComputeApi>(env: &mut TestEnv<'_, A>) -> TestOutcome {
    let count = env.effective_elements(16);
    let data: Vec<u32> = (0..count).map(|_| env.rng.gen_range(0..1024)).collect();

    let forward: u64 = data.iter().map(|v| u64::from(*v)).sum();
    let backward = data.iter().rev().fold(0u64, |acc, v| acc + u64::from(*v));
    let ok = forward == backward;
    env.subtests.record(ok);
    info!("random_fill checked {} elements", count);
    TestOutcome::from_error_count(u32::from(!ok))
}

fn test_int64_support<A: ComputeApi>(env: &mut TestEnv<'_, A>) -> TestOutcome {
    if !env.caps.is_embedded_profile {
        return TestOutcome::Pass;
    }
    match is_extension_available(env.api, env.device, "cles_khr_int64") {
        Ok(available) if available == env.caps.has_64bit_integer_type => TestOutcome::Pass,
        Ok(_) => TestOutcome::Fail(1),
        Err(e) => {
            error!("{}", e);
            TestOutcome::Fail(1)
        }
    }
}

fn test_subgroups<A: ComputeApi>(env: &mut TestEnv<'_, A>) -> TestOutcome {
    match is_extension_available(env.api, env.device, "cl_khr_subgroups") {
        Ok(true) => TestOutcome::Pass,
        Ok(false) if env.caps.device_version >= Version::new(2, 1) => TestOutcome::Pass,
        Ok(false) => TestOutcome::Skip,
        Err(_) => TestOutcome::Fail(1),
    }
}

fn test_program_source<A: ComputeApi>(_env: &mut TestEnv<'_, A>) -> TestOutcome {
    TestOutcome::NotImplemented
}

/// The smoke suite, in run order.
pub fn registry<A: ComputeApi + 'static>() -> Result<TestRegistry<A>> {
    TestRegistry::new(SUITE_NAME)
        .with(TestDefinition::new("device_version", test_device_version::<A>))?
        .with(TestDefinition::new("device_strings", test_device_strings::<A>))?
        .with(TestDefinition::new("queue_finish", test_queue_finish::<A>))?
        .with(TestDefinition::new("random_fill", test_random_fill::<A>))?
        .with(TestDefinition::new("int64_support", test_int64_support::<A>))?
        .with(
            TestDefinition::new("subgroups", test_subgroups::<A>).min_version(Version::new(2, 0)),
        )?
        .with(
            TestDefinition::new("program_source", test_program_source::<A>).online_compiler_only(),
        )?
        .with(TestDefinition::unimplemented("image_support"))
}
