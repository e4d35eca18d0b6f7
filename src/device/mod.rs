//! Platform and device resolution
//!
//! Merges command-line and environment choices into one
//! [`DeviceSelection`] and turns it into a concrete device handle. The
//! command line wins over the environment for each field independently.

use crate::api::{ComputeApi, DeviceType, CL_DEVICE_NOT_FOUND};
use crate::args::ParsedArgs;
use crate::config::EnvOverrides;
use crate::error::{Error, IndexKind, Result};
use std::fmt;
use tracing::info;

/// Where the device type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    EnvVar,
    CommandLine,
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionSource::EnvVar => write!(f, "environment variable"),
            SelectionSource::CommandLine => write!(f, "command line"),
        }
    }
}

/// Which platform and device a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSelection {
    pub platform_index: u32,
    pub device_index: u32,
    pub device_type: DeviceType,
    pub source: SelectionSource,
}

impl Default for DeviceSelection {
    fn default() -> Self {
        Self {
            platform_index: 0,
            device_index: 0,
            device_type: DeviceType::Default,
            source: SelectionSource::CommandLine,
        }
    }
}

impl DeviceSelection {
    /// Combine command-line and environment choices.
    ///
    /// Provenance is `EnvVar` only when `CL_DEVICE_TYPE` supplied the type
    /// and the command line did not override it.
    pub fn merge(args: &ParsedArgs, env: &EnvOverrides) -> Self {
        let (device_type, source) = match (args.device_type, env.device_type) {
            (Some(ty), _) => (ty, SelectionSource::CommandLine),
            (None, Some(ty)) => (ty, SelectionSource::EnvVar),
            (None, None) => (DeviceType::Default, SelectionSource::CommandLine),
        };

        Self {
            platform_index: args.platform_index.or(env.platform_index).unwrap_or(0),
            device_index: args.device_index.or(env.device_index).unwrap_or(0),
            device_type,
            source,
        }
    }
}

/// A device picked from the installed platforms.
pub struct ResolvedDevice<A: ComputeApi> {
    pub platform: A::Platform,
    pub device: A::Device,
    pub selection: DeviceSelection,
}

// Handles are `Copy` whether or not the backend itself is.
impl<A: ComputeApi> Clone for ResolvedDevice<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ComputeApi> Copy for ResolvedDevice<A> {}

impl<A: ComputeApi> fmt::Debug for ResolvedDevice<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedDevice")
            .field("platform", &self.platform)
            .field("device", &self.device)
            .field("selection", &self.selection)
            .finish()
    }
}

/// Enumerate platforms and devices and pick the one `selection` names.
pub fn resolve_device<A: ComputeApi>(
    api: &A,
    selection: DeviceSelection,
) -> Result<ResolvedDevice<A>> {
    info!(
        "Requesting {} device based on {} for platform index {} and device index {}",
        selection.device_type.label(),
        selection.source,
        selection.platform_index,
        selection.device_index
    );

    let platforms = api
        .platform_ids()
        .map_err(|e| Error::api("clGetPlatformIDs", e))?;
    if platforms.is_empty() {
        return Err(Error::NoPlatforms);
    }
    let platform = *platforms
        .get(selection.platform_index as usize)
        .ok_or(Error::IndexOutOfRange {
            kind: IndexKind::Platform,
            index: selection.platform_index,
            count: platforms.len(),
        })?;

    let devices = match api.device_ids(platform, selection.device_type) {
        Ok(devices) => devices,
        Err(e) if e.code() == CL_DEVICE_NOT_FOUND => Vec::new(),
        Err(e) => return Err(Error::api("clGetDeviceIDs", e)),
    };
    let device = *devices
        .get(selection.device_index as usize)
        .ok_or(Error::IndexOutOfRange {
            kind: IndexKind::Device,
            index: selection.device_index,
            count: devices.len(),
        })?;

    Ok(ResolvedDevice {
        platform,
        device,
        selection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::simulated::{SimDevice, SimDeviceId, SimulatedApi};
    use crate::args::parse_args;

    fn args(tokens: &[&str]) -> ParsedArgs {
        let argv: Vec<String> = std::iter::once("prog")
            .chain(tokens.iter().copied())
            .map(String::from)
            .collect();
        parse_args(&argv).unwrap()
    }

    fn api() -> SimulatedApi {
        SimulatedApi::builder()
            .platform("p0", vec![SimDevice::gpu("g0"), SimDevice::gpu("g1"), SimDevice::cpu("c0")])
            .platform("p1", vec![SimDevice::cpu("c1")])
            .build()
    }

    #[test]
    fn test_cli_wins_over_env() {
        let env = EnvOverrides {
            device_type: Some(DeviceType::Cpu),
            device_index: Some(3),
            ..Default::default()
        };
        let sel = DeviceSelection::merge(&args(&["id1", "gpu"]), &env);
        assert_eq!(sel.device_type, DeviceType::Gpu);
        assert_eq!(sel.device_index, 1);
        assert_eq!(sel.source, SelectionSource::CommandLine);
    }

    #[test]
    fn test_env_type_sets_provenance() {
        let env = EnvOverrides {
            device_type: Some(DeviceType::Cpu),
            platform_index: Some(1),
            ..Default::default()
        };
        let sel = DeviceSelection::merge(&args(&[]), &env);
        assert_eq!(sel.device_type, DeviceType::Cpu);
        assert_eq!(sel.platform_index, 1);
        assert_eq!(sel.source, SelectionSource::EnvVar);
    }

    #[test]
    fn test_defaults() {
        let sel = DeviceSelection::merge(&args(&[]), &EnvOverrides::default());
        assert_eq!(sel, DeviceSelection::default());
    }

    #[test]
    fn test_resolve_by_type_and_index() {
        let api = api();
        let sel = DeviceSelection {
            device_type: DeviceType::Gpu,
            device_index: 1,
            ..Default::default()
        };
        let resolved = resolve_device(&api, sel).unwrap();
        assert_eq!(resolved.device, SimDeviceId { platform: 0, index: 1 });
    }

    #[test]
    fn test_device_index_out_of_range() {
        let api = api();
        let sel = DeviceSelection {
            device_type: DeviceType::Gpu,
            device_index: 5,
            ..Default::default()
        };
        let err = resolve_device(&api, sel).unwrap_err();
        assert!(matches!(
            err,
            Error::IndexOutOfRange { kind: IndexKind::Device, index: 5, count: 2 }
        ));
    }

    #[test]
    fn test_missing_type_counts_as_zero_devices() {
        let api = api();
        let sel = DeviceSelection {
            platform_index: 1,
            device_type: DeviceType::Gpu,
            ..Default::default()
        };
        let err = resolve_device(&api, sel).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { kind: IndexKind::Device, count: 0, .. }));
    }

    #[test]
    fn test_platform_out_of_range_and_no_platforms() {
        let sel = DeviceSelection {
            platform_index: 2,
            ..Default::default()
        };
        let err = resolve_device(&api(), sel).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { kind: IndexKind::Platform, count: 2, .. }));

        let err = resolve_device(&SimulatedApi::empty(), DeviceSelection::default()).unwrap_err();
        assert!(matches!(err, Error::NoPlatforms));
    }
}
