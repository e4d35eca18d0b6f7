//! Prelude module for convenient imports
//!
//! The types a suite needs to register tests and run the harness:
//!
//! ```no_run
//! use cts_harness::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let api = SimulatedApi::default();
//!     let registry = cts_harness::smoke::registry::<SimulatedApi>()?;
//!     let argv = vec!["smoke".to_string()];
//!     let outcome = Harness::new(&api).run(&argv, &ProcessEnv, &registry)?;
//!     println!("exit {}", outcome.exit_code);
//!     Ok(())
//! }
//! ```

// Compute API
pub use crate::api::simulated::{SimDevice, SimulatedApi};
pub use crate::api::{ApiError, ComputeApi, DeviceInfo, DeviceType, QueueProperties, Version};

// Error handling
pub use crate::error::{Error, Result, SelectionErrorKind};

// Configuration
pub use crate::config::{CompilationMode, EnvOverrides, EnvSource, ProcessEnv};

// Tests
pub use crate::capabilities::CapabilitySnapshot;
pub use crate::registry::{TestDefinition, TestEnv, TestOutcome, TestRegistry, TestStatus};

// Running
pub use crate::dispatch::{DispatchConfig, QueueConfig, RunSession};
pub use crate::harness::{Harness, HarnessOptions, HarnessOutcome, RunKind};
pub use crate::report::{RunCounters, RunReport, SubTestTally};
