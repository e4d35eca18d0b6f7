//! Test dispatch
//!
//! Runs the selected tests one after another, each in its own context and
//! command queue. Per test the lifecycle is
//!
//! ```text
//! NotStarted -> ContextCreated -> QueueCreated -> Running
//!            -> Passed | Failed | Skipped | NotImplemented -> TornDown
//! ```
//!
//! Pre-flight gates (minimum device version, online compiler) run before
//! anything is created. Context and queue are held by guards that release
//! them when dropped, so teardown happens on every path, including a panic
//! in the test body. Each teardown completes before the next test starts.

//! **Status:** ✅ Complete - Sequential dispatch, gates, guarded teardown

use crate::api::{ComputeApi, QueueProperties, Version, CL_QUEUE_PROPERTIES};
use crate::capabilities::CapabilitySnapshot;
use crate::config::CompilationMode;
use crate::error::Error;
use crate::registry::{TestDefinition, TestEnv, TestOutcome, TestRegistry};
use crate::report::{RunCounters, RunReport, SubTestTally};
use crate::selector::SelectionMask;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Command-queue properties requested for every test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueConfig {
    pub enable_profiling: bool,
    pub enable_out_of_order: bool,
    /// Additional key/value pairs for the property-list call.
    pub extra_properties: Vec<u64>,
}

impl QueueConfig {
    /// Bitfield for the legacy creation call.
    pub fn bits(&self) -> QueueProperties {
        let mut props = QueueProperties::empty();
        if self.enable_profiling {
            props |= QueueProperties::PROFILING_ENABLE;
        }
        if self.enable_out_of_order {
            props |= QueueProperties::OUT_OF_ORDER_EXEC_MODE_ENABLE;
        }
        props
    }

    /// Zero-terminated property list. The `CL_QUEUE_PROPERTIES` pair is
    /// only present when a bit is set.
    pub fn property_list(&self) -> Vec<u64> {
        let bits = self.bits();
        let mut list = Vec::with_capacity(self.extra_properties.len() + 3);
        if !bits.is_empty() {
            list.push(CL_QUEUE_PROPERTIES);
            list.push(bits.bits());
        }
        list.extend_from_slice(&self.extra_properties);
        list.push(0);
        list
    }
}

/// Settings shared by every test of one dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Bodies get no context or queue.
    pub force_no_context_creation: bool,
    pub num_elements: usize,
    pub queue: QueueConfig,
    pub compilation_mode: CompilationMode,
    pub wimpy: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            force_no_context_creation: false,
            num_elements: crate::args::DEFAULT_NUM_ELEMENTS,
            queue: QueueConfig::default(),
            compilation_mode: CompilationMode::Online,
            wimpy: false,
        }
    }
}

// ---------------------------------------------------------------------------
// RunSession
// ---------------------------------------------------------------------------

/// Mutable state of one harness run.
#[derive(Debug, Clone)]
pub struct RunSession {
    pub caps: CapabilitySnapshot,
    pub counters: RunCounters,
    pub subtests: SubTestTally,
    pub seed: u32,
    pub rng: StdRng,
}

impl RunSession {
    pub fn new(caps: CapabilitySnapshot, seed: u32) -> Self {
        Self {
            caps,
            counters: RunCounters::default(),
            subtests: SubTestTally::default(),
            seed,
            rng: StdRng::seed_from_u64(u64::from(seed)),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource guards
// ---------------------------------------------------------------------------

struct ContextGuard<'a, A: ComputeApi> {
    api: &'a A,
    context: Option<A::Context>,
}

impl<A: ComputeApi> Drop for ContextGuard<'_, A> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            if let Err(e) = self.api.release_context(context) {
                warn!("clReleaseContext failed: {}", e);
            }
        }
    }
}

struct QueueGuard<'a, A: ComputeApi> {
    api: &'a A,
    queue: Option<A::Queue>,
}

impl<A: ComputeApi> Drop for QueueGuard<'_, A> {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            if let Err(e) = self.api.release_queue(queue) {
                warn!("clReleaseCommandQueue failed: {}", e);
            }
        }
    }
}

/// Context and queue of one test. Fields drop in declaration order, so
/// the queue is released before its context when a test unwinds past
/// [`TestResources::release`].
struct TestResources<'a, A: ComputeApi> {
    queue: QueueGuard<'a, A>,
    context: ContextGuard<'a, A>,
}

impl<'a, A: ComputeApi> TestResources<'a, A> {
    fn create(
        api: &'a A,
        device: A::Device,
        device_version: Version,
        queue: &QueueConfig,
    ) -> crate::error::Result<Self> {
        let mut context = ContextGuard { api, context: None };
        let ctx = context.context.insert(
            api.create_context(device)
                .map_err(|e| Error::api("clCreateContext", e))?,
        );

        let created = if device_version < Version::new(2, 0) {
            api.create_command_queue(ctx, device, queue.bits())
                .map_err(|e| Error::api("clCreateCommandQueue", e))
        } else {
            api.create_command_queue_with_properties(ctx, device, &queue.property_list())
                .map_err(|e| Error::api("clCreateCommandQueueWithProperties", e))
        };

        // On failure `context` drops here and releases the context.
        let queue = QueueGuard {
            api,
            queue: Some(created?),
        };
        Ok(Self { queue, context })
    }

    /// Release the queue, then the context. Returns how many releases
    /// failed.
    fn release(mut self) -> u32 {
        let mut failures = 0;
        if let Some(queue) = self.queue.queue.take() {
            if let Err(e) = self.queue.api.release_queue(queue) {
                error!("clReleaseCommandQueue failed: {}", e.name());
                failures += 1;
            }
        }
        if let Some(context) = self.context.context.take() {
            if let Err(e) = self.context.api.release_context(context) {
                error!("clReleaseContext failed: {}", e.name());
                failures += 1;
            }
        }
        failures
    }
}

// ---------------------------------------------------------------------------
// Single test
// ---------------------------------------------------------------------------

fn log_outcome(name: &str, outcome: TestOutcome) {
    match outcome {
        TestOutcome::Pass => info!("{} passed", name),
        TestOutcome::Fail(errors) => error!("{} FAILED ({} error(s))", name, errors),
        TestOutcome::NotImplemented => info!("{} test currently not implemented", name),
        TestOutcome::Skip => info!("{} test not supported", name),
    }
}

/// Add one error for a failed teardown. A skipped body still fails.
fn with_teardown_failure(outcome: TestOutcome) -> TestOutcome {
    match outcome {
        TestOutcome::Fail(n) => TestOutcome::Fail(n.saturating_add(1)),
        TestOutcome::Pass | TestOutcome::NotImplemented | TestOutcome::Skip => TestOutcome::Fail(1),
    }
}

/// Run one test through its whole lifecycle and return the final outcome.
/// Counters are not touched here.
pub fn run_single_test<A: ComputeApi>(
    api: &A,
    device: A::Device,
    test: &TestDefinition<A>,
    session: &mut RunSession,
    config: &DispatchConfig,
) -> TestOutcome {
    let name = test.name.as_str();

    let Some(body) = test.body.as_ref() else {
        info!("{} test currently not implemented", name);
        return TestOutcome::Skip;
    };

    info!("{}...", name);

    let device_version = session.caps.device_version;
    if test.min_version > device_version {
        info!(
            "{} skipped (requires at least OpenCL version {}, but the device reports OpenCL version {})",
            name, test.min_version, device_version
        );
        return TestOutcome::Skip;
    }

    if test.online_compiler_only && config.compilation_mode.is_offline() {
        info!(
            "Subtest {} tests is not supported in offline compiler execution path!",
            name
        );
        return TestOutcome::Skip;
    }

    let resources = if config.force_no_context_creation {
        None
    } else {
        match TestResources::create(api, device, device_version, &config.queue) {
            Ok(resources) => Some(resources),
            Err(e) => {
                error!("Unable to create testing context or command queue: {}", e);
                error!("{} FAILED", name);
                return TestOutcome::Fail(1);
            }
        }
    };

    let context = resources.as_ref().and_then(|r| r.context.context.as_ref());
    let queue = resources.as_ref().and_then(|r| r.queue.queue.as_ref());

    let caps = session.caps;
    let mut env = TestEnv {
        api,
        device,
        context,
        queue,
        num_elements: config.num_elements,
        caps: &caps,
        rng: &mut session.rng,
        wimpy: config.wimpy,
        compilation_mode: config.compilation_mode,
        subtests: &mut session.subtests,
    };

    let mut outcome = match catch_unwind(AssertUnwindSafe(|| body(&mut env))) {
        Ok(TestOutcome::Fail(0)) => TestOutcome::Fail(1),
        Ok(outcome) => outcome,
        Err(_) => {
            error!("{} panicked", name);
            TestOutcome::Fail(1)
        }
    };
    log_outcome(name, outcome);

    if let Some(queue) = queue {
        if let Err(e) = api.finish(queue) {
            error!("clFinish failed: {}", e.name());
            outcome = with_teardown_failure(outcome);
        }
    }

    if let Some(resources) = resources {
        for _ in 0..resources.release() {
            outcome = with_teardown_failure(outcome);
        }
    }
    outcome
}

// ---------------------------------------------------------------------------
// Dispatch loop
// ---------------------------------------------------------------------------

/// Outcome of one dispatch loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Counts from this loop only.
    pub counters: RunCounters,
    /// Statuses of the selected tests, registration order.
    pub report: RunReport,
}

impl DispatchSummary {
    pub fn newly_failed(&self) -> u32 {
        self.counters.failed
    }
}

/// Run every selected test in registration order.
pub fn dispatch_tests<A: ComputeApi>(
    api: &A,
    device: A::Device,
    registry: &TestRegistry<A>,
    mask: &SelectionMask,
    session: &mut RunSession,
    config: &DispatchConfig,
) -> DispatchSummary {
    let mut summary = DispatchSummary {
        counters: RunCounters::default(),
        report: RunReport::new(registry.suite()),
    };

    for index in mask.selected() {
        let Some(test) = registry.get(index) else {
            continue;
        };
        let outcome = run_single_test(api, device, test, session, config);
        summary.counters.record(outcome);
        session.counters.record(outcome);
        summary.report.record(test.name.clone(), outcome.status());
    }

    summary
}
