//! Test registry
//!
//! A suite is an ordered table of named tests. Each test is a boxed closure
//! receiving a [`TestEnv`] with everything it may touch: the compute API,
//! the device, the per-test context and queue, the element count and the
//! run-wide capability snapshot and RNG. Entries without a body are kept in
//! the table so they show up in listings and results.

//! **Status:** ✅ Complete - Registration, outcomes, test environment

use crate::api::{ComputeApi, Version};
use crate::capabilities::CapabilitySnapshot;
use crate::config::CompilationMode;
use crate::error::{Error, Result};
use crate::report::SubTestTally;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a test body reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Pass,
    /// Failed with the given number of errors (at least one).
    Fail(u32),
    /// The body exists but does not cover this device yet.
    NotImplemented,
    /// The body decided it does not apply to this device.
    Skip,
}

impl TestOutcome {
    /// `Fail(n)` for any non-zero error count, else `Pass`.
    pub fn from_error_count(errors: u32) -> Self {
        if errors == 0 {
            TestOutcome::Pass
        } else {
            TestOutcome::Fail(errors)
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, TestOutcome::Fail(_))
    }

    /// Recorded status for the results file.
    pub fn status(self) -> TestStatus {
        match self {
            TestOutcome::Pass => TestStatus::Pass,
            TestOutcome::Fail(_) => TestStatus::Fail,
            TestOutcome::NotImplemented | TestOutcome::Skip => TestStatus::Skip,
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Pass => write!(f, "passed"),
            TestOutcome::Fail(_) => write!(f, "FAILED"),
            TestOutcome::NotImplemented => write!(f, "currently not implemented"),
            TestOutcome::Skip => write!(f, "test not supported"),
        }
    }
}

/// Per-test recorded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "pass"),
            TestStatus::Fail => write!(f, "fail"),
            TestStatus::Skip => write!(f, "skip"),
        }
    }
}

// ---------------------------------------------------------------------------
// TestEnv
// ---------------------------------------------------------------------------

/// Everything a test body may use.
pub struct TestEnv<'a, A: ComputeApi> {
    pub api: &'a A,
    pub device: A::Device,
    /// `None` when the suite disabled context creation.
    pub context: Option<&'a A::Context>,
    /// `None` when the suite disabled context creation.
    pub queue: Option<&'a A::Queue>,
    pub num_elements: usize,
    pub caps: &'a CapabilitySnapshot,
    pub rng: &'a mut StdRng,
    /// Reduced workload requested.
    pub wimpy: bool,
    pub compilation_mode: CompilationMode,
    /// Sub-check tally for bodies that count their own checks.
    pub subtests: &'a mut SubTestTally,
}

impl<'a, A: ComputeApi> TestEnv<'a, A> {
    /// Element count scaled down in wimpy mode.
    pub fn effective_elements(&self, wimpy_factor: usize) -> usize {
        if self.wimpy {
            (self.num_elements / wimpy_factor.max(1)).max(1)
        } else {
            self.num_elements
        }
    }
}

/// A test body.
pub type TestBody<A> = Box<dyn Fn(&mut TestEnv<'_, A>) -> TestOutcome>;

// ---------------------------------------------------------------------------
// TestDefinition
// ---------------------------------------------------------------------------

/// One entry of the suite table.
pub struct TestDefinition<A: ComputeApi> {
    pub name: String,
    pub body: Option<TestBody<A>>,
    /// Lowest device version the test runs on.
    pub min_version: Version,
    /// Needs the online compiler; skipped in binary and SPIR-V modes.
    pub online_compiler_only: bool,
}

impl<A: ComputeApi> TestDefinition<A> {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut TestEnv<'_, A>) -> TestOutcome + 'static,
    {
        Self {
            name: name.into(),
            body: Some(Box::new(body)),
            min_version: Version::default(),
            online_compiler_only: false,
        }
    }

    /// A named placeholder with no body.
    pub fn unimplemented(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: None,
            min_version: Version::default(),
            online_compiler_only: false,
        }
    }

    pub fn min_version(mut self, version: Version) -> Self {
        self.min_version = version;
        self
    }

    pub fn online_compiler_only(mut self) -> Self {
        self.online_compiler_only = true;
        self
    }

    pub fn implemented(&self) -> bool {
        self.body.is_some()
    }
}

impl<A: ComputeApi> fmt::Debug for TestDefinition<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDefinition")
            .field("name", &self.name)
            .field("implemented", &self.implemented())
            .field("min_version", &self.min_version)
            .field("online_compiler_only", &self.online_compiler_only)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TestRegistry
// ---------------------------------------------------------------------------

/// Ordered, name-unique table of tests for one suite.
pub struct TestRegistry<A: ComputeApi> {
    suite: String,
    tests: Vec<TestDefinition<A>>,
    names: HashSet<String>,
}

impl<A: ComputeApi> TestRegistry<A> {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            tests: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Suite name, used as `cmd` in the results file.
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// Append a test. Names must be unique within the suite.
    pub fn add(&mut self, test: TestDefinition<A>) -> Result<()> {
        if !self.names.insert(test.name.clone()) {
            return Err(Error::Registry(format!(
                "test '{}' registered twice in suite '{}'",
                test.name, self.suite
            )));
        }
        self.tests.push(test);
        Ok(())
    }

    /// Builder form of [`add`](Self::add).
    pub fn with(mut self, test: TestDefinition<A>) -> Result<Self> {
        self.add(test)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TestDefinition<A>> {
        self.tests.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestDefinition<A>> {
        self.tests.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tests.iter().map(|t| t.name.as_str())
    }
}

impl<A: ComputeApi> fmt::Debug for TestRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRegistry")
            .field("suite", &self.suite)
            .field("tests", &self.tests)
            .finish()
    }
}
