//! Environment configuration
//!
//! The harness reads a handful of environment variables. They are read
//! through [`EnvSource`] so that tests can supply a plain map instead of
//! mutating the process environment.

//! **Status:** ✅ Complete - Device overrides, wimpy mode, results file

use crate::api::DeviceType;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_DEVICE_TYPE: &str = "CL_DEVICE_TYPE";
pub const ENV_DEVICE_INDEX: &str = "CL_DEVICE_INDEX";
pub const ENV_PLATFORM_INDEX: &str = "CL_PLATFORM_INDEX";
pub const ENV_LEGACY_VERSION: &str = "OPENCL_1_0_DEVICE";
pub const ENV_WIMPY_MODE: &str = "CL_WIMPY_MODE";
pub const ENV_RESULTS_FILE: &str = "CL_CONFORMANCE_RESULTS_FILENAME";

// ---------------------------------------------------------------------------
// EnvSource
// ---------------------------------------------------------------------------

/// Read-only view of environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// `atoi`-style parse: optional leading whitespace and sign, then as many
/// digits as are present. No digits yields 0.
pub fn leading_int(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, b| acc.saturating_mul(10).saturating_add(i64::from(b - b'0')));
    if negative {
        -value
    } else {
        value
    }
}

/// Index from an environment variable. Negative values cannot address
/// anything and are mapped to `u32::MAX` so they fail the bounds check.
pub fn parse_index(text: &str) -> u32 {
    u32::try_from(leading_int(text)).unwrap_or(u32::MAX)
}

/// Accepted values of `CL_DEVICE_TYPE`. Case-sensitive.
pub fn parse_device_type_env(value: &str) -> Result<DeviceType> {
    match value {
        "gpu" | "CL_DEVICE_TYPE_GPU" => Ok(DeviceType::Gpu),
        "cpu" | "CL_DEVICE_TYPE_CPU" => Ok(DeviceType::Cpu),
        "accelerator" | "CL_DEVICE_TYPE_ACCELERATOR" => Ok(DeviceType::Accelerator),
        "custom" | "CL_DEVICE_TYPE_CUSTOM" => Ok(DeviceType::Custom),
        "default" | "CL_DEVICE_TYPE_DEFAULT" => Ok(DeviceType::Default),
        other => Err(Error::config(format!(
            "Unknown {} env variable setting: {}",
            ENV_DEVICE_TYPE, other
        ))),
    }
}

// ---------------------------------------------------------------------------
// EnvOverrides
// ---------------------------------------------------------------------------

/// Settings taken from the environment at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `CL_DEVICE_TYPE`
    pub device_type: Option<DeviceType>,
    /// `CL_DEVICE_INDEX`
    pub device_index: Option<u32>,
    /// `CL_PLATFORM_INDEX`
    pub platform_index: Option<u32>,
    /// `OPENCL_1_0_DEVICE` is set
    pub legacy_version_probe: bool,
    /// `CL_WIMPY_MODE` is set
    pub wimpy: bool,
    /// `CL_CONFORMANCE_RESULTS_FILENAME`
    pub results_file: Option<PathBuf>,
}

impl EnvOverrides {
    /// Read every override from `env`. An unrecognized `CL_DEVICE_TYPE`
    /// value is an error.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self> {
        let device_type = env
            .var(ENV_DEVICE_TYPE)
            .map(|v| parse_device_type_env(&v))
            .transpose()?;

        Ok(Self {
            device_type,
            device_index: env.var(ENV_DEVICE_INDEX).map(|v| parse_index(&v)),
            platform_index: env.var(ENV_PLATFORM_INDEX).map(|v| parse_index(&v)),
            legacy_version_probe: env.var(ENV_LEGACY_VERSION).is_some(),
            wimpy: env.var(ENV_WIMPY_MODE).is_some(),
            results_file: env
                .var(ENV_RESULTS_FILE)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        })
    }
}

// ---------------------------------------------------------------------------
// CompilationMode
// ---------------------------------------------------------------------------

/// How test programs are expected to be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilationMode {
    /// Source compiled by the driver at run time.
    #[default]
    Online,
    /// Pre-built device binaries.
    Binary,
    /// Pre-built SPIR-V modules.
    SpirV,
}

impl CompilationMode {
    /// Whether an online compiler is bypassed.
    pub fn is_offline(self) -> bool {
        !matches!(self, CompilationMode::Online)
    }
}

impl FromStr for CompilationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "online" => Ok(CompilationMode::Online),
            "binary" => Ok(CompilationMode::Binary),
            "spir-v" => Ok(CompilationMode::SpirV),
            other => Err(Error::config(format!(
                "Compilation mode not recognized: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for CompilationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilationMode::Online => write!(f, "online"),
            CompilationMode::Binary => write!(f, "binary"),
            CompilationMode::SpirV => write!(f, "spir-v"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&'static str, &'static str)]) -> HashMap<&'static str, &'static str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_leading_int_matches_atoi() {
        assert_eq!(leading_int("12"), 12);
        assert_eq!(leading_int("  7abc"), 7);
        assert_eq!(leading_int("abc"), 0);
        assert_eq!(leading_int(""), 0);
        assert_eq!(leading_int("-3"), -3);
    }

    #[test]
    fn test_negative_index_is_unaddressable() {
        assert_eq!(parse_index("-1"), u32::MAX);
        assert_eq!(parse_index("2"), 2);
    }

    #[test]
    fn test_device_type_env_values() {
        assert_eq!(parse_device_type_env("gpu").unwrap(), DeviceType::Gpu);
        assert_eq!(parse_device_type_env("CL_DEVICE_TYPE_CUSTOM").unwrap(), DeviceType::Custom);
        assert_eq!(parse_device_type_env("default").unwrap(), DeviceType::Default);
        assert!(parse_device_type_env("GPU").is_err());
        assert!(parse_device_type_env("fpga").is_err());
    }

    #[test]
    fn test_overrides_from_env() {
        let overrides = EnvOverrides::from_env(&env(&[
            ("CL_DEVICE_TYPE", "cpu"),
            ("CL_DEVICE_INDEX", "1"),
            ("CL_WIMPY_MODE", ""),
            ("CL_CONFORMANCE_RESULTS_FILENAME", "out.json"),
        ]))
        .unwrap();
        assert_eq!(overrides.device_type, Some(DeviceType::Cpu));
        assert_eq!(overrides.device_index, Some(1));
        assert_eq!(overrides.platform_index, None);
        assert!(overrides.wimpy);
        assert!(!overrides.legacy_version_probe);
        assert_eq!(overrides.results_file, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_bad_device_type_is_config_error() {
        let err = EnvOverrides::from_env(&env(&[("CL_DEVICE_TYPE", "nope")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_compilation_mode_parse() {
        assert_eq!("spir-v".parse::<CompilationMode>().unwrap(), CompilationMode::SpirV);
        assert!("binary".parse::<CompilationMode>().unwrap().is_offline());
        assert!(!CompilationMode::Online.is_offline());
        assert!("jit".parse::<CompilationMode>().is_err());
    }
}
