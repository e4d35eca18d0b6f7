//! Compute API boundary
//!
//! The harness never talks to a driver directly. Everything it needs from
//! the compute API (platform/device enumeration, device info queries,
//! context and command-queue lifetime) goes through the [`ComputeApi`]
//! trait. Handle types are associated types so a real binding and the
//! in-memory [`simulated`] backend can both plug in.
//!
//! Status codes, device types and bitfields use the numeric values of the
//! OpenCL headers so that backends can pass them through unchanged.

//! **Status:** ✅ Complete - Trait boundary, status codes, simulated backend

use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

pub mod query;
pub mod simulated;

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

pub const CL_SUCCESS: i32 = 0;
pub const CL_DEVICE_NOT_FOUND: i32 = -1;
pub const CL_DEVICE_NOT_AVAILABLE: i32 = -2;
pub const CL_OUT_OF_RESOURCES: i32 = -5;
pub const CL_OUT_OF_HOST_MEMORY: i32 = -6;
pub const CL_INVALID_VALUE: i32 = -30;
pub const CL_INVALID_DEVICE_TYPE: i32 = -31;
pub const CL_INVALID_PLATFORM: i32 = -32;
pub const CL_INVALID_DEVICE: i32 = -33;
pub const CL_INVALID_CONTEXT: i32 = -34;
pub const CL_INVALID_QUEUE_PROPERTIES: i32 = -35;
pub const CL_INVALID_COMMAND_QUEUE: i32 = -36;
pub const CL_INVALID_OPERATION: i32 = -59;

/// Symbolic name for a status code, `"Unknown error"` when unrecognized.
pub fn error_string(code: i32) -> &'static str {
    match code {
        CL_SUCCESS => "CL_SUCCESS",
        CL_DEVICE_NOT_FOUND => "CL_DEVICE_NOT_FOUND",
        CL_DEVICE_NOT_AVAILABLE => "CL_DEVICE_NOT_AVAILABLE",
        CL_OUT_OF_RESOURCES => "CL_OUT_OF_RESOURCES",
        CL_OUT_OF_HOST_MEMORY => "CL_OUT_OF_HOST_MEMORY",
        CL_INVALID_VALUE => "CL_INVALID_VALUE",
        CL_INVALID_DEVICE_TYPE => "CL_INVALID_DEVICE_TYPE",
        CL_INVALID_PLATFORM => "CL_INVALID_PLATFORM",
        CL_INVALID_DEVICE => "CL_INVALID_DEVICE",
        CL_INVALID_CONTEXT => "CL_INVALID_CONTEXT",
        CL_INVALID_QUEUE_PROPERTIES => "CL_INVALID_QUEUE_PROPERTIES",
        CL_INVALID_COMMAND_QUEUE => "CL_INVALID_COMMAND_QUEUE",
        CL_INVALID_OPERATION => "CL_INVALID_OPERATION",
        _ => "Unknown error",
    }
}

/// A non-success status code returned by the compute API.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{} ({})", error_string(*.0), .0)]
pub struct ApiError(pub i32);

impl ApiError {
    pub fn code(self) -> i32 {
        self.0
    }

    pub fn name(self) -> &'static str {
        error_string(self.0)
    }
}

/// Result type for raw compute API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Device types
// ---------------------------------------------------------------------------

/// Device-type filter used for enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    #[default]
    Default,
    Cpu,
    Gpu,
    Accelerator,
    Custom,
    All,
}

impl DeviceType {
    /// `CL_DEVICE_TYPE_*` bit value.
    pub fn bits(self) -> u64 {
        match self {
            DeviceType::Default => 1 << 0,
            DeviceType::Cpu => 1 << 1,
            DeviceType::Gpu => 1 << 2,
            DeviceType::Accelerator => 1 << 3,
            DeviceType::Custom => 1 << 4,
            DeviceType::All => 0xFFFF_FFFF,
        }
    }

    /// Inverse of [`bits`](Self::bits) for single-type values.
    pub fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            0x1 => Some(DeviceType::Default),
            0x2 => Some(DeviceType::Cpu),
            0x4 => Some(DeviceType::Gpu),
            0x8 => Some(DeviceType::Accelerator),
            0x10 => Some(DeviceType::Custom),
            0xFFFF_FFFF => Some(DeviceType::All),
            _ => None,
        }
    }

    /// Human-readable label used in the "Requesting ... device" line.
    pub fn label(self) -> &'static str {
        match self {
            DeviceType::Default => "Default",
            DeviceType::Cpu => "CPU",
            DeviceType::Gpu => "GPU",
            DeviceType::Accelerator => "Accelerator",
            DeviceType::Custom => "Custom",
            DeviceType::All => "All",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Default => write!(f, "CL_DEVICE_TYPE_DEFAULT"),
            DeviceType::Cpu => write!(f, "CL_DEVICE_TYPE_CPU"),
            DeviceType::Gpu => write!(f, "CL_DEVICE_TYPE_GPU"),
            DeviceType::Accelerator => write!(f, "CL_DEVICE_TYPE_ACCELERATOR"),
            DeviceType::Custom => write!(f, "CL_DEVICE_TYPE_CUSTOM"),
            DeviceType::All => write!(f, "CL_DEVICE_TYPE_ALL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bitfields
// ---------------------------------------------------------------------------

bitflags! {
    /// `cl_device_fp_config` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FpConfig: u64 {
        const DENORM = 1 << 0;
        const INF_NAN = 1 << 1;
        const ROUND_TO_NEAREST = 1 << 2;
        const ROUND_TO_ZERO = 1 << 3;
        const ROUND_TO_INF = 1 << 4;
        const FMA = 1 << 5;
        const SOFT_FLOAT = 1 << 6;
        const CORRECTLY_ROUNDED_DIVIDE_SQRT = 1 << 7;
    }
}

bitflags! {
    /// `cl_command_queue_properties` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueProperties: u64 {
        const OUT_OF_ORDER_EXEC_MODE_ENABLE = 1 << 0;
        const PROFILING_ENABLE = 1 << 1;
    }
}

/// Property-list key announcing a `QueueProperties` bitfield.
pub const CL_QUEUE_PROPERTIES: u64 = 0x1093;

// ---------------------------------------------------------------------------
// Device info parameters
// ---------------------------------------------------------------------------

/// Device info parameters the harness queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceInfo {
    /// `u64` device type bits.
    Type,
    /// `u64` [`FpConfig`] bits for single precision.
    SingleFpConfig,
    /// `u32` address width in bits.
    AddressBits,
    Name,
    Vendor,
    DriverVersion,
    Profile,
    Version,
    Extensions,
    OpenClCVersion,
    IlVersion,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceInfo::Type => "CL_DEVICE_TYPE",
            DeviceInfo::SingleFpConfig => "CL_DEVICE_SINGLE_FP_CONFIG",
            DeviceInfo::AddressBits => "CL_DEVICE_ADDRESS_BITS",
            DeviceInfo::Name => "CL_DEVICE_NAME",
            DeviceInfo::Vendor => "CL_DEVICE_VENDOR",
            DeviceInfo::DriverVersion => "CL_DRIVER_VERSION",
            DeviceInfo::Profile => "CL_DEVICE_PROFILE",
            DeviceInfo::Version => "CL_DEVICE_VERSION",
            DeviceInfo::Extensions => "CL_DEVICE_EXTENSIONS",
            DeviceInfo::OpenClCVersion => "CL_DEVICE_OPENCL_C_VERSION",
            DeviceInfo::IlVersion => "CL_DEVICE_IL_VERSION",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// `major.minor` API version, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::new(1, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ---------------------------------------------------------------------------
// ComputeApi
// ---------------------------------------------------------------------------

/// The slice of the compute API the harness depends on.
///
/// `device_info` follows the two-call protocol of the C API: called with
/// `None` it returns the required size in bytes; called with a buffer it
/// fills it and returns the number of bytes written. Strings are
/// NUL-terminated and scalars are little-endian.
pub trait ComputeApi {
    type Platform: Copy + Eq + fmt::Debug;
    type Device: Copy + Eq + fmt::Debug;
    type Context;
    type Queue;

    fn platform_ids(&self) -> ApiResult<Vec<Self::Platform>>;

    fn device_ids(
        &self,
        platform: Self::Platform,
        device_type: DeviceType,
    ) -> ApiResult<Vec<Self::Device>>;

    fn device_info(
        &self,
        device: Self::Device,
        param: DeviceInfo,
        out: Option<&mut [u8]>,
    ) -> ApiResult<usize>;

    fn create_context(&self, device: Self::Device) -> ApiResult<Self::Context>;

    /// Pre-2.0 queue creation with a plain bitfield.
    fn create_command_queue(
        &self,
        context: &Self::Context,
        device: Self::Device,
        properties: QueueProperties,
    ) -> ApiResult<Self::Queue>;

    /// 2.0+ queue creation with a zero-terminated key/value property list.
    fn create_command_queue_with_properties(
        &self,
        context: &Self::Context,
        device: Self::Device,
        properties: &[u64],
    ) -> ApiResult<Self::Queue>;

    fn finish(&self, queue: &Self::Queue) -> ApiResult<()>;

    fn release_queue(&self, queue: Self::Queue) -> ApiResult<()>;

    fn release_context(&self, context: Self::Context) -> ApiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_string_known_and_unknown() {
        assert_eq!(error_string(CL_INVALID_VALUE), "CL_INVALID_VALUE");
        assert_eq!(error_string(-9999), "Unknown error");
        assert_eq!(
            ApiError(CL_DEVICE_NOT_FOUND).to_string(),
            "CL_DEVICE_NOT_FOUND (-1)"
        );
    }

    #[test]
    fn test_device_type_bits_roundtrip() {
        for ty in [
            DeviceType::Default,
            DeviceType::Cpu,
            DeviceType::Gpu,
            DeviceType::Accelerator,
            DeviceType::Custom,
            DeviceType::All,
        ] {
            assert_eq!(DeviceType::from_bits(ty.bits()), Some(ty));
        }
        assert_eq!(DeviceType::from_bits(0x6), None);
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(1, 2) < Version::new(2, 0));
        assert!(Version::new(2, 1) > Version::new(2, 0));
        assert_eq!(Version::new(3, 0).to_string(), "3.0");
    }

    #[test]
    fn test_queue_properties_bits() {
        let props =
            QueueProperties::PROFILING_ENABLE | QueueProperties::OUT_OF_ORDER_EXEC_MODE_ENABLE;
        assert_eq!(props.bits(), 0x3);
    }
}
