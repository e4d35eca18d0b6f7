//! Device capability probing
//!
//! Runs once per process after the device is resolved and before any test
//! is dispatched. The resulting [`CapabilitySnapshot`] is read-only for the
//! rest of the run and is handed to every test body through its
//! environment.

//! **Status:** ✅ Complete - FP config, profile, int64, legacy version, SPIR-V readiness

use crate::api::query::{
    device_version, is_extension_available, query_string, query_u32, single_fp_config,
};
use crate::api::{ComputeApi, DeviceInfo, FpConfig, Version};
use crate::error::{Error, Result};
use crate::registry::TestStatus;
use tracing::{error, info};

/// Prefix of `CL_DEVICE_OPENCL_C_VERSION` on OpenCL C 1.0 devices.
const OPENCL_C_1_0_PREFIX: &str = "OpenCL C 1.0 ";

/// Capabilities of the device under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySnapshot {
    /// Single precision denormals are not supported.
    pub flush_denorms_to_zero: bool,
    /// Infinity and NaN are supported. Always true for full profile.
    pub supports_inf_nan: bool,
    pub is_embedded_profile: bool,
    /// Device compiler is OpenCL C 1.0 (legacy probe only).
    pub is_opencl_c_1_0: bool,
    /// Legacy version probe was requested.
    pub is_opencl_1_0_device: bool,
    /// `long`/`ulong` are available. Always true for full profile.
    pub has_64bit_integer_type: bool,
    pub device_version: Version,
    pub address_bits: u32,
}

impl Default for CapabilitySnapshot {
    fn default() -> Self {
        Self {
            flush_denorms_to_zero: false,
            supports_inf_nan: true,
            is_embedded_profile: false,
            is_opencl_c_1_0: false,
            is_opencl_1_0_device: false,
            has_64bit_integer_type: true,
            device_version: Version::default(),
            address_bits: 64,
        }
    }
}

/// Log name, vendor, version and driver of the device.
pub fn print_device_header<A: ComputeApi>(api: &A, device: A::Device) -> Result<()> {
    let name = query_string(api, device, DeviceInfo::Name)?;
    let vendor = query_string(api, device, DeviceInfo::Vendor)?;
    let version = query_string(api, device, DeviceInfo::Version)?;
    let driver = query_string(api, device, DeviceInfo::DriverVersion)?;
    info!(
        "Compute Device Name = {}, Compute Device Vendor = {}, Compute Device Version = {}, Driver Version = {}",
        name, vendor, version, driver
    );
    Ok(())
}

/// Query the device and build its capability snapshot.
///
/// `legacy_version_probe` corresponds to `OPENCL_1_0_DEVICE`. Any failed
/// query aborts the probe.
pub fn probe<A: ComputeApi>(
    api: &A,
    device: A::Device,
    legacy_version_probe: bool,
) -> Result<CapabilitySnapshot> {
    let mut caps = CapabilitySnapshot::default();

    print_device_header(api, device)?;

    let fp_config = single_fp_config(api, device)?;
    caps.flush_denorms_to_zero = !fp_config.contains(FpConfig::DENORM);
    info!(
        "Supports single precision denormals: {}",
        if caps.flush_denorms_to_zero { "NO" } else { "YES" }
    );

    let profile = query_string(api, device, DeviceInfo::Profile)?;
    caps.is_embedded_profile = profile.contains("EMBEDDED_PROFILE");

    if caps.is_embedded_profile {
        caps.supports_inf_nan = fp_config.contains(FpConfig::INF_NAN);
        caps.has_64bit_integer_type = is_extension_available(api, device, "cles_khr_int64")?;
    }

    if legacy_version_probe {
        caps.is_opencl_1_0_device = true;
        let c_version = query_string(api, device, DeviceInfo::OpenClCVersion)?;
        caps.is_opencl_c_1_0 = c_version.starts_with(OPENCL_C_1_0_PREFIX);
        info!("Device compiler version: {}", c_version);
    }

    caps.device_version = device_version(api, device)?;

    caps.address_bits = query_u32(api, device, DeviceInfo::AddressBits)?;
    if caps.address_bits == 0 {
        return Err(Error::Capability(
            "Invalid device address bit size returned by device.".to_string(),
        ));
    }
    info!("sizeof( void*) = {}  (device)", caps.address_bits / 8);

    Ok(caps)
}

/// Whether the IL version string names SPIR-V. Query failures read as no.
fn spirv_reported<A: ComputeApi>(api: &A, device: A::Device) -> bool {
    match query_string(api, device, DeviceInfo::IlVersion) {
        Ok(il) if il.contains("SPIR-V") => {
            info!("This device supports SPIR-V offline compilation. IL version is {}", il);
            true
        }
        Ok(_) => {
            info!("This device does not support SPIR-V offline compilation.");
            false
        }
        Err(e) => {
            error!("clGetDeviceInfo: cannot read {}: {}", DeviceInfo::IlVersion, e);
            false
        }
    }
}

/// Suite-level readiness for running from SPIR-V modules.
pub fn check_spirv_readiness<A: ComputeApi>(
    api: &A,
    device: A::Device,
    version: Version,
) -> Result<TestStatus> {
    const CORE_IL: Version = Version::new(2, 1);
    const LAST_REQUIRED: Version = Version::new(2, 2);

    if version < CORE_IL {
        if !is_extension_available(api, device, "cl_khr_il_program")? {
            error!(
                "SPIR-V intermediate language support on OpenCL version {} requires cl_khr_il_program extension.",
                version
            );
            return Ok(TestStatus::Skip);
        }
        if !spirv_reported(api, device) {
            error!("SPIR-V intermediate language not supported !!! OpenCL {} requires support.", version);
            return Ok(TestStatus::Fail);
        }
        return Ok(TestStatus::Pass);
    }

    let supported = spirv_reported(api, device);
    if version <= LAST_REQUIRED && !supported {
        error!("SPIR-V intermediate language not supported !!! OpenCL {} requires support.", version);
        return Ok(TestStatus::Fail);
    }
    if version > LAST_REQUIRED && !supported {
        info!("SPIR-V intermediate language not supported in OpenCL {}. Test skipped.", version);
        return Ok(TestStatus::Skip);
    }
    Ok(TestStatus::Pass)
}
