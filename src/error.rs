//! Error types for the conformance harness

use crate::api::{ApiError, DeviceInfo};
use std::fmt;
use thiserror::Error;

/// Why a selection token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionErrorKind {
    /// Plain token matched no registered test name
    UnknownTest,
    /// Wildcard token matched no registered test name
    NoWildcardMatch,
    /// Token matched a test that an earlier token already selected
    DuplicateSelection,
    /// Token explicitly selected a test that has no body
    MissingImplementation,
}

impl fmt::Display for SelectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionErrorKind::UnknownTest => write!(f, "UnknownTest"),
            SelectionErrorKind::NoWildcardMatch => write!(f, "NoWildcardMatch"),
            SelectionErrorKind::DuplicateSelection => write!(f, "DuplicateSelection"),
            SelectionErrorKind::MissingImplementation => write!(f, "MissingImplementation"),
        }
    }
}

/// What an out-of-range index was pointing into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Platform,
    Device,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Platform => write!(f, "platform"),
            IndexKind::Device => write!(f, "device"),
        }
    }
}

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    /// Bad environment setting or custom parameter
    #[error("ConfigError: {0}")]
    Config(String),

    /// Test selection token could not be honored
    #[error("SelectionError: {kind}: {message}")]
    Selection {
        kind: SelectionErrorKind,
        token: String,
        message: String,
    },

    /// No compute platform is installed
    #[error("ResolutionError: no platforms found")]
    NoPlatforms,

    /// Requested platform or device index is not available
    #[error("ResolutionError: {kind} index out of range -- chosen {kind} index ({index}) >= num {kind}s ({count})")]
    IndexOutOfRange {
        kind: IndexKind,
        index: u32,
        count: usize,
    },

    /// A compute API call failed
    #[error("ApiError: {call} failed: {source}")]
    Api {
        call: &'static str,
        #[source]
        source: ApiError,
    },

    /// A device info query violated the size/content protocol
    #[error("ProtocolError: {param}: {message}")]
    Protocol { param: DeviceInfo, message: String },

    /// The device reported an unusable capability
    #[error("CapabilityError: {0}")]
    Capability(String),

    /// Test registration problem
    #[error("RegistryError: {0}")]
    Registry(String),

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Results file serialization error
    #[error("SerializationError: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Wrap a failed compute API call
    pub fn api(call: &'static str, source: ApiError) -> Self {
        Error::Api { call, source }
    }

    /// Create an "argument matched no test" error
    pub fn unknown_test(token: impl Into<String>) -> Self {
        let token = token.into();
        Error::Selection {
            kind: SelectionErrorKind::UnknownTest,
            message: format!("The argument '{}' did not match any test names.", token),
            token,
        }
    }

    /// Create a "wildcard matched no test" error
    pub fn no_wildcard_match(token: impl Into<String>) -> Self {
        let token = token.into();
        Error::Selection {
            kind: SelectionErrorKind::NoWildcardMatch,
            message: format!("Wildcard test name does not match any tests: {}", token),
            token,
        }
    }

    /// Create a "test already selected" error
    pub fn duplicate_selection(token: impl Into<String>, test_name: &str) -> Self {
        Error::Selection {
            kind: SelectionErrorKind::DuplicateSelection,
            token: token.into(),
            message: format!("Test '{}' has already been selected.", test_name),
        }
    }

    /// Create a "test has no body" error
    pub fn missing_implementation(token: impl Into<String>, test_name: &str) -> Self {
        Error::Selection {
            kind: SelectionErrorKind::MissingImplementation,
            token: token.into(),
            message: format!("Test '{}' is missing implementation.", test_name),
        }
    }

    /// Create a protocol violation error for a device info query
    pub fn protocol(param: DeviceInfo, message: impl Into<String>) -> Self {
        Error::Protocol {
            param,
            message: message.into(),
        }
    }

    /// Selection error kind, if this is a selection error
    pub fn selection_kind(&self) -> Option<SelectionErrorKind> {
        match self {
            Error::Selection { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type alias for the harness
pub type Result<T> = std::result::Result<T, Error>;
