//! Harness orchestration
//!
//! Ties the pieces together for one suite run:
//!
//! ```text
//! argv -> custom params -> tail flags -> device resolution -> capability probe
//!      -> (SPIR-V readiness, suite device check) -> selection -> dispatch
//!      -> summary -> results file -> exit code
//! ```
//!
//! [`Harness::run`] does all of it. Suites that run several dispatch loops
//! against the same device use [`Harness::prepare`] once and then
//! [`Harness::run_loop`] per loop; each loop reports how many tests it
//! newly failed.

//! **Status:** ✅ Complete - Startup, listing, suite init, dispatch loops, exit codes

use crate::api::ComputeApi;
use crate::args::{parse_args, ParsedArgs};
use crate::capabilities::{check_spirv_readiness, probe};
use crate::config::{CompilationMode, EnvOverrides, EnvSource, ENV_RESULTS_FILE};
use crate::device::{resolve_device, DeviceSelection, ResolvedDevice};
use crate::dispatch::{dispatch_tests, DispatchConfig, DispatchSummary, QueueConfig, RunSession};
use crate::error::Result;
use crate::registry::{TestRegistry, TestStatus};
use crate::report::{log_summary, RunCounters, RunReport};
use crate::selector::select_tests;
use std::fmt;
use tracing::{error, info, warn};

/// Largest exit status used for a failed-test count.
pub const MAX_FAILURE_EXIT_CODE: i32 = 125;

/// Exit status for a fatal configuration or resolution error.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Suite-level check run once against the resolved device.
pub type DeviceCheck<A> = Box<dyn Fn(&A, <A as ComputeApi>::Device) -> TestStatus>;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-suite harness settings.
pub struct HarnessOptions<A: ComputeApi> {
    /// Do not create a context and queue for each test.
    pub force_no_context_creation: bool,
    pub queue: QueueConfig,
    /// Runs before selection; a non-pass status ends the suite.
    pub device_check: Option<DeviceCheck<A>>,
}

impl<A: ComputeApi> Default for HarnessOptions<A> {
    fn default() -> Self {
        Self {
            force_no_context_creation: false,
            queue: QueueConfig::default(),
            device_check: None,
        }
    }
}

impl<A: ComputeApi> fmt::Debug for HarnessOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessOptions")
            .field("force_no_context_creation", &self.force_no_context_creation)
            .field("queue", &self.queue)
            .field("device_check", &self.device_check.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a harness run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Usage and test names were printed.
    Listed,
    /// Suite initialization reported skip.
    SuiteSkipped,
    /// Suite initialization reported failure.
    SuiteFailed,
    /// Selected tests were dispatched.
    Completed,
}

/// Result of a harness run that did not hit a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessOutcome {
    pub kind: RunKind,
    pub exit_code: i32,
    /// Tests failed by the last dispatch loop.
    pub newly_failed: u32,
    /// Counts across every loop of the run.
    pub counters: RunCounters,
    /// Per-test statuses, absent for a listing.
    pub report: Option<RunReport>,
}

impl HarnessOutcome {
    fn listed() -> Self {
        Self {
            kind: RunKind::Listed,
            exit_code: 0,
            newly_failed: 0,
            counters: RunCounters::default(),
            report: None,
        }
    }
}

/// Exit status for `failed` failed tests.
pub fn exit_code_for(failed: u32) -> i32 {
    if failed == 0 {
        0
    } else {
        i32::try_from(failed)
            .unwrap_or(MAX_FAILURE_EXIT_CODE)
            .clamp(1, MAX_FAILURE_EXIT_CODE)
    }
}

// ---------------------------------------------------------------------------
// Prepared run
// ---------------------------------------------------------------------------

/// A run that got past startup and may dispatch one or more loops.
pub struct PreparedRun<A: ComputeApi> {
    pub args: ParsedArgs,
    pub env: EnvOverrides,
    pub device: ResolvedDevice<A>,
    pub session: RunSession,
    pub dispatch: DispatchConfig,
}

impl<A: ComputeApi> fmt::Debug for PreparedRun<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRun")
            .field("args", &self.args)
            .field("env", &self.env)
            .field("device", &self.device)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

/// What [`Harness::prepare`] produced.
#[derive(Debug)]
pub enum Startup<A: ComputeApi> {
    /// Nothing left to dispatch (listing or suite-init failure).
    Finished(HarnessOutcome),
    Ready(Box<PreparedRun<A>>),
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Suite runner bound to one compute API.
pub struct Harness<'a, A: ComputeApi> {
    api: &'a A,
    options: HarnessOptions<A>,
}

impl<'a, A: ComputeApi> Harness<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self::with_options(api, HarnessOptions::default())
    }

    pub fn with_options(api: &'a A, options: HarnessOptions<A>) -> Self {
        Self { api, options }
    }

    /// Usage text and registered test names.
    pub fn usage(program: &str, registry: &TestRegistry<A>, env: &EnvOverrides) -> String {
        let mut s = String::new();
        s.push_str(&format!(
            "Usage: {} [<test name>*] [pid<num>] [id<num>] [<device type>]\n",
            program
        ));
        s.push_str("\t<test name>\tOne or more of: (wildcard character '*') (default *)\n");
        s.push_str("\tpid<num>\tIndicates platform at index <num> should be used (default 0).\n");
        s.push_str("\tid<num>\t\tIndicates device at index <num> should be used (default 0).\n");
        s.push_str("\t<device_type>\tcpu|gpu|accelerator|custom|<CL_DEVICE_TYPE_*> (default CL_DEVICE_TYPE_DEFAULT)\n");
        s.push_str("\t--compilation-mode <online|binary|spir-v>, --compilation-cache-path <dir>, --wimpy | -w\n");
        s.push('\n');
        s.push_str(&format!(
            "\tNOTE: You may pass environment variable {} (currently '{}')\n",
            ENV_RESULTS_FILE,
            env.results_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<undefined>".to_string())
        ));
        s.push_str("\t      to save results to JSON file.\n\n");
        s.push_str("Test names:\n");
        for name in registry.names() {
            s.push_str(&format!("\t{}\n", name));
        }
        s
    }

    /// Parse arguments, resolve and probe the device and run suite-level
    /// checks.
    pub fn prepare(
        &self,
        argv: &[String],
        env: &dyn EnvSource,
        registry: &TestRegistry<A>,
    ) -> Result<Startup<A>> {
        let env = EnvOverrides::from_env(env)?;
        let args = parse_args(argv)?;

        if args.list_requested {
            info!("{}", Self::usage(&args.program, registry, &env));
            return Ok(Startup::Finished(HarnessOutcome::listed()));
        }

        if args.randomize {
            info!("Random seed: {}.", args.random_seed);
        } else {
            info!(" Initializing random seed to 0.");
        }
        if args.num_elements_overridden {
            info!("Testing with num_elements of {}", args.num_elements);
        }

        let selection = DeviceSelection::merge(&args, &env);
        let device = resolve_device(self.api, selection)?;
        let caps = probe(self.api, device.device, env.legacy_version_probe)?;

        let wimpy = args.custom.wimpy || env.wimpy;
        if wimpy {
            warn!("*** WARNING: Testing in Wimpy mode! ***");
            warn!("*** Wimpy mode is not sufficient to verify correctness. ***");
        }

        if args.custom.compilation_mode == CompilationMode::SpirV {
            let status = check_spirv_readiness(self.api, device.device, caps.device_version)?;
            if status != TestStatus::Pass {
                return Ok(Startup::Finished(suite_did_not_pass_init(registry, status, &env)));
            }
        }

        if let Some(check) = &self.options.device_check {
            let status = check(self.api, device.device);
            if status != TestStatus::Pass {
                return Ok(Startup::Finished(suite_did_not_pass_init(registry, status, &env)));
            }
        }

        let dispatch = DispatchConfig {
            force_no_context_creation: self.options.force_no_context_creation,
            num_elements: args.num_elements,
            queue: self.options.queue.clone(),
            compilation_mode: args.custom.compilation_mode,
            wimpy,
        };
        let session = RunSession::new(caps, args.random_seed);

        Ok(Startup::Ready(Box::new(PreparedRun {
            args,
            env,
            device,
            session,
            dispatch,
        })))
    }

    /// Select from `registry` with `tokens` and dispatch. Selection errors
    /// are returned before any test runs.
    pub fn run_loop<S: AsRef<str>>(
        &self,
        run: &mut PreparedRun<A>,
        registry: &TestRegistry<A>,
        tokens: &[S],
    ) -> Result<DispatchSummary> {
        let mask = select_tests(registry, tokens)?;
        let before = run.session.subtests;
        let summary = dispatch_tests(
            self.api,
            run.device.device,
            registry,
            &mask,
            &mut run.session,
            &run.dispatch,
        );
        let subtests = crate::report::SubTestTally {
            count: run.session.subtests.count.saturating_sub(before.count),
            failed: run.session.subtests.failed.saturating_sub(before.failed),
        };
        log_summary(&summary.counters, &subtests);
        Ok(summary)
    }

    /// Write the results file for `summary` and compute the exit status.
    pub fn conclude(&self, run: &PreparedRun<A>, summary: DispatchSummary) -> HarnessOutcome {
        let mut exit_code = exit_code_for(run.session.counters.failed);
        if let Some(path) = &run.env.results_file {
            if summary.report.write_to(path).is_err() && exit_code == 0 {
                exit_code = FATAL_EXIT_CODE;
            }
        }

        HarnessOutcome {
            kind: RunKind::Completed,
            exit_code,
            newly_failed: summary.newly_failed(),
            counters: run.session.counters,
            report: Some(summary.report),
        }
    }

    /// Full run with the selection tokens from `argv`.
    pub fn run(
        &self,
        argv: &[String],
        env: &dyn EnvSource,
        registry: &TestRegistry<A>,
    ) -> Result<HarnessOutcome> {
        let mut run = match self.prepare(argv, env, registry)? {
            Startup::Finished(outcome) => return Ok(outcome),
            Startup::Ready(run) => run,
        };
        let tokens = run.args.selection_tokens.clone();
        let summary = self.run_loop(&mut run, registry, &tokens)?;
        Ok(self.conclude(&run, summary))
    }

    /// [`run`](Self::run) with fatal errors logged and mapped to an exit
    /// status.
    pub fn run_to_exit_code(
        &self,
        argv: &[String],
        env: &dyn EnvSource,
        registry: &TestRegistry<A>,
    ) -> i32 {
        match self.run(argv, env, registry) {
            Ok(outcome) => outcome.exit_code,
            Err(e) => {
                error!("{}", e);
                FATAL_EXIT_CODE
            }
        }
    }
}

/// Record every registered test with `status`, write the results file and
/// report the suite as skipped or failed.
fn suite_did_not_pass_init<A: ComputeApi>(
    registry: &TestRegistry<A>,
    status: TestStatus,
    env: &EnvOverrides,
) -> HarnessOutcome {
    let report = RunReport::uniform(registry.suite(), registry.names(), status);
    let write_failed = env
        .results_file
        .as_ref()
        .is_some_and(|path| report.write_to(path).is_err());

    let skipped = status == TestStatus::Skip;
    let total = registry.len();
    info!("Test {} while initialization", if skipped { "skipped" } else { "failed" });
    info!("{} {} of {} tests.", if skipped { "SKIPPED" } else { "FAILED" }, total, total);

    let (kind, exit_code) = if skipped {
        (RunKind::SuiteSkipped, 0)
    } else {
        (RunKind::SuiteFailed, FATAL_EXIT_CODE)
    };
    HarnessOutcome {
        kind,
        exit_code: if write_failed { FATAL_EXIT_CODE } else { exit_code },
        newly_failed: 0,
        counters: RunCounters::default(),
        report: Some(report),
    }
}
