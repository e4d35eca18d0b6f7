//! Result aggregation and reporting
//!
//! Counts passed and failed tests for a run, formats the closing summary
//! lines and writes the optional machine-readable results file.

//! **Status:** ✅ Complete - Counters, summary lines, results file

use crate::error::Result;
use crate::registry::{TestOutcome, TestStatus};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Pass/fail counts for dispatched tests. Skipped and not-implemented
/// tests are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub passed: u32,
    pub failed: u32,
}

impl RunCounters {
    /// Count `outcome` once. Returns whether it was counted.
    pub fn record(&mut self, outcome: TestOutcome) -> bool {
        match outcome {
            TestOutcome::Pass => {
                self.passed += 1;
                true
            }
            TestOutcome::Fail(_) => {
                self.failed += 1;
                true
            }
            TestOutcome::NotImplemented | TestOutcome::Skip => false,
        }
    }

    pub fn total(&self) -> u32 {
        self.passed + self.failed
    }

    /// Add another loop's counts.
    pub fn merge(&mut self, other: RunCounters) {
        self.passed += other.passed;
        self.failed += other.failed;
    }
}

/// Tally of checks performed inside test bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubTestTally {
    pub count: u32,
    pub failed: u32,
}

impl SubTestTally {
    pub fn record(&mut self, passed: bool) {
        self.count += 1;
        if !passed {
            self.failed += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Summary lines
// ---------------------------------------------------------------------------

/// `PASSED n of n tests.`, `PASSED test.`, `FAILED f of n tests.` or
/// `FAILED test.`. A count below `failed` is raised to `failed`.
pub fn format_results(failed: u32, count: u32, noun: &str) -> String {
    let count = count.max(failed);
    match (failed, count > 1) {
        (0, true) => format!("PASSED {} of {} {}s.", count, count, noun),
        (0, false) => format!("PASSED {}.", noun),
        (_, true) => format!("FAILED {} of {} {}s.", failed, count, noun),
        (_, false) => format!("FAILED {}.", noun),
    }
}

/// Log the closing summary for a dispatch loop.
pub fn log_summary(counters: &RunCounters, subtests: &SubTestTally) {
    let emit = |failed: u32, line: String| {
        if failed == 0 {
            info!("{}", line);
        } else {
            error!("{}", line);
        }
    };

    if subtests.count > 0 {
        emit(
            subtests.failed,
            format_results(subtests.failed, subtests.count, "sub-test"),
        );
    }
    emit(counters.failed, format_results(counters.failed, counters.total(), "test"));
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Per-test statuses for one run, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    suite: String,
    results: Vec<(String, TestStatus)>,
}

impl RunReport {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            results: Vec::new(),
        }
    }

    /// Every listed test recorded with the same status, used when the
    /// suite does not get past initialization.
    pub fn uniform<'a>(
        suite: impl Into<String>,
        names: impl IntoIterator<Item = &'a str>,
        status: TestStatus,
    ) -> Self {
        let mut report = Self::new(suite);
        for name in names {
            report.record(name, status);
        }
        report
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn record(&mut self, name: impl Into<String>, status: TestStatus) {
        self.results.push((name.into(), status));
    }

    pub fn results(&self) -> &[(String, TestStatus)] {
        &self.results
    }

    pub fn status_of(&self, name: &str) -> Option<TestStatus> {
        self.results
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, status)| *status)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the results file to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let outcome = self.write_json(path);
        match &outcome {
            Ok(()) => info!("Saving results to {}: success!", path.display()),
            Err(e) => error!("ERROR: Failed to write results to '{}': {}", path.display(), e),
        }
        outcome
    }

    fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

struct OrderedResults<'a>(&'a [(String, TestStatus)]);

impl Serialize for OrderedResults<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, status) in self.0 {
            map.serialize_entry(name, status)?;
        }
        map.end()
    }
}

impl Serialize for RunReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("cmd", &self.suite)?;
        map.serialize_entry("results", &OrderedResults(&self.results))?;
        map.end()
    }
}
