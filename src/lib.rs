//! cts-harness: test harness core for OpenCL conformance suites
//!
//! A conformance suite is a table of named tests run against one device of
//! a third-party driver. This crate is the part every suite shares: it
//! pre-processes the command line, picks the platform and device, probes the
//! device once, selects tests, runs each selected test in a fresh context
//! and command queue, and reports pass/fail counts, a results file and an
//! exit status. Test bodies are plugged in as closures and never see any of
//! this machinery beyond their [`TestEnv`](registry::TestEnv).
//!
//! # Quick Start
//!
//! ```no_run
//! use cts_harness::prelude::*;
//!
//! fn main() -> cts_harness::Result<()> {
//!     let api = SimulatedApi::default();
//!     let registry = TestRegistry::new("example")
//!         .with(TestDefinition::new("always_passes", |_: &mut TestEnv<'_, SimulatedApi>| TestOutcome::Pass))?;
//!
//!     let argv: Vec<String> = std::env::args().collect();
//!     let outcome = Harness::new(&api).run(&argv, &ProcessEnv, &registry)?;
//!     std::process::exit(outcome.exit_code);
//! }
//! ```
//!
//! # Module Overview
//!
//! The run flows: [`args`] → [`device`] → [`capabilities`] → [`selector`] → [`dispatch`] → [`report`]
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Compute API** | [`api`], [`api::query`], [`api::simulated`] |
//! | **Startup** | [`config`], [`args`], [`device`], [`capabilities`] |
//! | **Tests** | [`registry`], [`selector`], [`dispatch`] |
//! | **Results** | [`report`], [`harness`] |
//! | **Suites** | [`smoke`] |

pub mod api;
pub mod args;
pub mod capabilities;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod harness;
pub mod prelude;
pub mod registry;
pub mod report;
pub mod selector;
pub mod smoke;

mod error;

pub use error::{Error, IndexKind, Result, SelectionErrorKind};
pub use harness::{Harness, HarnessOptions, HarnessOutcome};

/// cts-harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
