//! Typed device info queries built on the raw two-call protocol.

use super::{ComputeApi, DeviceInfo, FpConfig, Version};
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Query a string parameter: size query, then content query.
///
/// The final byte of the returned buffer must be the NUL terminator; a
/// missing terminator is reported as a protocol error rather than being
/// truncated silently.
pub fn query_string<A: ComputeApi>(
    api: &A,
    device: A::Device,
    param: DeviceInfo,
) -> Result<String> {
    let size = api
        .device_info(device, param, None)
        .map_err(|e| Error::api("clGetDeviceInfo", e))?;
    if size == 0 {
        return Err(Error::protocol(param, "reported size is zero"));
    }

    let mut buf = vec![0u8; size];
    let written = api
        .device_info(device, param, Some(&mut buf))
        .map_err(|e| Error::api("clGetDeviceInfo", e))?;
    if written != size {
        return Err(Error::protocol(
            param,
            format!("size query returned {} bytes but content query wrote {}", size, written),
        ));
    }
    if buf[size - 1] != 0 {
        return Err(Error::protocol(param, "string is not NUL terminated"));
    }

    buf.truncate(size - 1);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn query_scalar<A: ComputeApi, const N: usize>(
    api: &A,
    device: A::Device,
    param: DeviceInfo,
) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    let written = api
        .device_info(device, param, Some(&mut buf))
        .map_err(|e| Error::api("clGetDeviceInfo", e))?;
    if written != N {
        return Err(Error::protocol(
            param,
            format!("expected {} bytes, device wrote {}", N, written),
        ));
    }
    Ok(buf)
}

pub fn query_u32<A: ComputeApi>(api: &A, device: A::Device, param: DeviceInfo) -> Result<u32> {
    query_scalar::<A, 4>(api, device, param).map(u32::from_le_bytes)
}

pub fn query_u64<A: ComputeApi>(api: &A, device: A::Device, param: DeviceInfo) -> Result<u64> {
    query_scalar::<A, 8>(api, device, param).map(u64::from_le_bytes)
}

/// Single-precision floating point capabilities.
pub fn single_fp_config<A: ComputeApi>(api: &A, device: A::Device) -> Result<FpConfig> {
    query_u64(api, device, DeviceInfo::SingleFpConfig).map(FpConfig::from_bits_truncate)
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"OpenCL (\d+)\.(\d+)").expect("static regex"))
}

/// Parse `"OpenCL <major>.<minor> <vendor text>"`.
pub fn parse_version_string(text: &str) -> Option<Version> {
    let caps = version_regex().captures(text)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    Some(Version::new(major, minor))
}

/// Device API version from `CL_DEVICE_VERSION`.
pub fn device_version<A: ComputeApi>(api: &A, device: A::Device) -> Result<Version> {
    let text = query_string(api, device, DeviceInfo::Version)?;
    parse_version_string(&text)
        .ok_or_else(|| Error::Capability(format!("Unknown OpenCL version: {}", text)))
}

/// Whether `name` appears as a whole word in the device extension string.
pub fn is_extension_available<A: ComputeApi>(
    api: &A,
    device: A::Device,
    name: &str,
) -> Result<bool> {
    let extensions = query_string(api, device, DeviceInfo::Extensions)?;
    Ok(extensions.split_whitespace().any(|ext| ext == name))
}
