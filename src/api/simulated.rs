//! In-memory compute backend
//!
//! Provides platforms and devices described by plain Rust values, with no
//! driver behind them. Every context and queue handed out is tracked so a
//! caller can check that the harness released everything it created.
//! Individual devices can be told to misbehave (failing queries, failing
//! context/queue creation, failing `finish` or release, unterminated
//! strings) to drive the harness down its error paths.

use super::{
    ApiError, ApiResult, ComputeApi, DeviceInfo, DeviceType, FpConfig, QueueProperties,
    CL_DEVICE_NOT_FOUND, CL_INVALID_COMMAND_QUEUE, CL_INVALID_CONTEXT, CL_INVALID_DEVICE,
    CL_INVALID_PLATFORM, CL_INVALID_VALUE,
};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Platform handle: index into the platform list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimPlatformId(pub usize);

/// Device handle: platform index plus device index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimDeviceId {
    pub platform: usize,
    pub index: usize,
}

/// Context handle. Not `Clone`, so it can only be released once.
#[derive(Debug, PartialEq, Eq)]
pub struct SimContext {
    id: u64,
    device: SimDeviceId,
}

impl SimContext {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Command queue handle.
#[derive(Debug, PartialEq, Eq)]
pub struct SimQueue {
    id: u64,
    context: u64,
    device: SimDeviceId,
}

impl SimQueue {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle of the context the queue was created on.
    pub fn context_id(&self) -> u64 {
        self.context
    }
}

/// How a queue was requested, recorded for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCreation {
    /// `clCreateCommandQueue` with a bitfield
    Legacy(QueueProperties),
    /// `clCreateCommandQueueWithProperties` with a zero-terminated list
    WithProperties(Vec<u64>),
}

// ---------------------------------------------------------------------------
// Device description
// ---------------------------------------------------------------------------

/// Description of one simulated device, built fluently.
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub name: String,
    pub vendor: String,
    pub device_type: DeviceType,
    pub is_default: bool,
    pub version: String,
    pub c_version: String,
    pub driver_version: String,
    pub profile: String,
    pub fp_config: FpConfig,
    pub extensions: String,
    pub address_bits: u32,
    pub il_version: Option<String>,
    terminate_extensions: bool,
    failing_queries: HashMap<DeviceInfo, i32>,
    context_error: Option<i32>,
    queue_error: Option<i32>,
    finish_error: Option<i32>,
    release_error: Option<i32>,
}

impl SimDevice {
    /// A full-profile OpenCL 3.0 device of the given type.
    pub fn new(name: &str, device_type: DeviceType) -> Self {
        Self {
            name: name.to_string(),
            vendor: "Simulated".to_string(),
            device_type,
            is_default: false,
            version: "OpenCL 3.0 sim".to_string(),
            c_version: "OpenCL C 3.0 ".to_string(),
            driver_version: "1.0.0".to_string(),
            profile: "FULL_PROFILE".to_string(),
            fp_config: FpConfig::DENORM
                | FpConfig::INF_NAN
                | FpConfig::ROUND_TO_NEAREST
                | FpConfig::FMA,
            extensions: "cl_khr_fp64 cl_khr_il_program".to_string(),
            address_bits: 64,
            il_version: Some("SPIR-V_1.0 SPIR-V_1.5".to_string()),
            terminate_extensions: true,
            failing_queries: HashMap::new(),
            context_error: None,
            queue_error: None,
            finish_error: None,
            release_error: None,
        }
    }

    pub fn gpu(name: &str) -> Self {
        Self::new(name, DeviceType::Gpu)
    }

    pub fn cpu(name: &str) -> Self {
        Self::new(name, DeviceType::Cpu)
    }

    pub fn accelerator(name: &str) -> Self {
        Self::new(name, DeviceType::Accelerator)
    }

    /// Report `"OpenCL <major>.<minor> sim"` as the device version.
    pub fn version(mut self, major: u32, minor: u32) -> Self {
        self.version = format!("OpenCL {}.{} sim", major, minor);
        self
    }

    /// Raw `CL_DEVICE_VERSION` string.
    pub fn version_string(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn c_version(mut self, c_version: &str) -> Self {
        self.c_version = c_version.to_string();
        self
    }

    pub fn vendor(mut self, vendor: &str) -> Self {
        self.vendor = vendor.to_string();
        self
    }

    pub fn embedded(mut self) -> Self {
        self.profile = "EMBEDDED_PROFILE".to_string();
        self
    }

    pub fn fp_config(mut self, fp_config: FpConfig) -> Self {
        self.fp_config = fp_config;
        self
    }

    pub fn extensions(mut self, extensions: &str) -> Self {
        self.extensions = extensions.to_string();
        self
    }

    pub fn address_bits(mut self, bits: u32) -> Self {
        self.address_bits = bits;
        self
    }

    pub fn il_version(mut self, il_version: Option<&str>) -> Self {
        self.il_version = il_version.map(str::to_string);
        self
    }

    /// Mark as the platform's default device.
    pub fn default_device(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Return the extension string without its NUL terminator.
    pub fn unterminated_extensions(mut self) -> Self {
        self.terminate_extensions = false;
        self
    }

    /// Make every query of `param` fail with `code`.
    pub fn failing_query(mut self, param: DeviceInfo, code: i32) -> Self {
        self.failing_queries.insert(param, code);
        self
    }

    pub fn fail_context_creation(mut self, code: i32) -> Self {
        self.context_error = Some(code);
        self
    }

    pub fn fail_queue_creation(mut self, code: i32) -> Self {
        self.queue_error = Some(code);
        self
    }

    pub fn fail_finish(mut self, code: i32) -> Self {
        self.finish_error = Some(code);
        self
    }

    /// Make queue and context releases fail with `code`. The handle is
    /// still dropped from the live set.
    pub fn fail_release(mut self, code: i32) -> Self {
        self.release_error = Some(code);
        self
    }

    fn info_bytes(&self, param: DeviceInfo) -> ApiResult<Vec<u8>> {
        if let Some(code) = self.failing_queries.get(&param) {
            return Err(ApiError(*code));
        }
        let terminated = |s: &str| {
            let mut bytes = s.as_bytes().to_vec();
            bytes.push(0);
            bytes
        };
        let bytes = match param {
            DeviceInfo::Type => self.device_type.bits().to_le_bytes().to_vec(),
            DeviceInfo::SingleFpConfig => self.fp_config.bits().to_le_bytes().to_vec(),
            DeviceInfo::AddressBits => self.address_bits.to_le_bytes().to_vec(),
            DeviceInfo::Name => terminated(&self.name),
            DeviceInfo::Vendor => terminated(&self.vendor),
            DeviceInfo::DriverVersion => terminated(&self.driver_version),
            DeviceInfo::Profile => terminated(&self.profile),
            DeviceInfo::Version => terminated(&self.version),
            DeviceInfo::OpenClCVersion => terminated(&self.c_version),
            DeviceInfo::Extensions if self.terminate_extensions => terminated(&self.extensions),
            DeviceInfo::Extensions => self.extensions.as_bytes().to_vec(),
            DeviceInfo::IlVersion => match &self.il_version {
                Some(il) => terminated(il),
                None => return Err(ApiError(CL_INVALID_VALUE)),
            },
        };
        Ok(bytes)
    }
}

#[derive(Debug, Clone)]
struct SimPlatform {
    name: String,
    devices: Vec<SimDevice>,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters describing what the backend was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub contexts_created: u64,
    pub queues_created: u64,
    pub finish_calls: u64,
    pub info_queries: u64,
}

// ---------------------------------------------------------------------------
// SimulatedApi
// ---------------------------------------------------------------------------

/// Builder for [`SimulatedApi`].
#[derive(Debug, Default)]
pub struct SimulatedApiBuilder {
    platforms: Vec<SimPlatform>,
}

impl SimulatedApiBuilder {
    pub fn platform(mut self, name: &str, devices: Vec<SimDevice>) -> Self {
        self.platforms.push(SimPlatform {
            name: name.to_string(),
            devices,
        });
        self
    }

    pub fn build(self) -> SimulatedApi {
        SimulatedApi {
            platforms: self.platforms,
            next_handle: Cell::new(1),
            live_contexts: RefCell::new(HashSet::new()),
            live_queues: RefCell::new(HashSet::new()),
            queue_log: RefCell::new(Vec::new()),
            stats: RefCell::new(SimStats::default()),
        }
    }
}

/// A compute API backed entirely by in-process state.
#[derive(Debug)]
pub struct SimulatedApi {
    platforms: Vec<SimPlatform>,
    next_handle: Cell<u64>,
    live_contexts: RefCell<HashSet<u64>>,
    live_queues: RefCell<HashSet<u64>>,
    queue_log: RefCell<Vec<QueueCreation>>,
    stats: RefCell<SimStats>,
}

impl Default for SimulatedApi {
    /// One platform with a default OpenCL 3.0 GPU and an embedded-profile
    /// OpenCL 1.2 CPU.
    fn default() -> Self {
        SimulatedApi::builder()
            .platform(
                "Simulated Platform",
                vec![
                    SimDevice::gpu("Simulated GPU").default_device(),
                    SimDevice::cpu("Simulated CPU")
                        .version(1, 2)
                        .c_version("OpenCL C 1.2 ")
                        .embedded()
                        .extensions("cles_khr_int64")
                        .il_version(None),
                ],
            )
            .build()
    }
}

impl SimulatedApi {
    pub fn builder() -> SimulatedApiBuilder {
        SimulatedApiBuilder::default()
    }

    /// A backend with no platforms at all.
    pub fn empty() -> Self {
        SimulatedApiBuilder::default().build()
    }

    /// Contexts created and not yet released.
    pub fn live_contexts(&self) -> usize {
        self.live_contexts.borrow().len()
    }

    /// Queues created and not yet released.
    pub fn live_queues(&self) -> usize {
        self.live_queues.borrow().len()
    }

    /// Every queue creation request in call order.
    pub fn queue_log(&self) -> Vec<QueueCreation> {
        self.queue_log.borrow().clone()
    }

    pub fn platform_name(&self, platform: SimPlatformId) -> Option<&str> {
        self.platforms.get(platform.0).map(|p| p.name.as_str())
    }

    pub fn stats(&self) -> SimStats {
        self.stats.borrow().clone()
    }

    fn device(&self, id: SimDeviceId) -> ApiResult<&SimDevice> {
        self.platforms
            .get(id.platform)
            .and_then(|p| p.devices.get(id.index))
            .ok_or(ApiError(CL_INVALID_DEVICE))
    }

    fn next_handle(&self) -> u64 {
        let id = self.next_handle.get();
        self.next_handle.set(id + 1);
        id
    }

    fn create_queue(
        &self,
        context: &SimContext,
        device: SimDeviceId,
        request: QueueCreation,
    ) -> ApiResult<SimQueue> {
        let dev = self.device(device)?;
        if !self.live_contexts.borrow().contains(&context.id) {
            return Err(ApiError(CL_INVALID_CONTEXT));
        }
        if context.device != device {
            return Err(ApiError(CL_INVALID_DEVICE));
        }
        self.queue_log.borrow_mut().push(request);
        if let Some(code) = dev.queue_error {
            return Err(ApiError(code));
        }

        let id = self.next_handle();
        self.live_queues.borrow_mut().insert(id);
        self.stats.borrow_mut().queues_created += 1;
        Ok(SimQueue {
            id,
            context: context.id,
            device,
        })
    }
}

impl ComputeApi for SimulatedApi {
    type Platform = SimPlatformId;
    type Device = SimDeviceId;
    type Context = SimContext;
    type Queue = SimQueue;

    fn platform_ids(&self) -> ApiResult<Vec<SimPlatformId>> {
        Ok((0..self.platforms.len()).map(SimPlatformId).collect())
    }

    fn device_ids(
        &self,
        platform: SimPlatformId,
        device_type: DeviceType,
    ) -> ApiResult<Vec<SimDeviceId>> {
        let p = self
            .platforms
            .get(platform.0)
            .ok_or(ApiError(CL_INVALID_PLATFORM))?;

        let ids = |pred: &dyn Fn(&SimDevice) -> bool| -> Vec<SimDeviceId> {
            p.devices
                .iter()
                .enumerate()
                .filter(|(_, d)| pred(d))
                .map(|(index, _)| SimDeviceId {
                    platform: platform.0,
                    index,
                })
                .collect()
        };

        let found = match device_type {
            DeviceType::All => ids(&|_| true),
            DeviceType::Default => {
                let flagged = ids(&|d| d.is_default);
                if flagged.is_empty() {
                    ids(&|_| true).into_iter().take(1).collect()
                } else {
                    flagged
                }
            }
            ty => ids(&|d| d.device_type == ty),
        };

        if found.is_empty() {
            return Err(ApiError(CL_DEVICE_NOT_FOUND));
        }
        Ok(found)
    }

    fn device_info(
        &self,
        device: SimDeviceId,
        param: DeviceInfo,
        out: Option<&mut [u8]>,
    ) -> ApiResult<usize> {
        self.stats.borrow_mut().info_queries += 1;
        let bytes = self.device(device)?.info_bytes(param)?;
        match out {
            None => Ok(bytes.len()),
            Some(buf) => {
                if buf.len() < bytes.len() {
                    return Err(ApiError(CL_INVALID_VALUE));
                }
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
        }
    }

    fn create_context(&self, device: SimDeviceId) -> ApiResult<SimContext> {
        let dev = self.device(device)?;
        if let Some(code) = dev.context_error {
            return Err(ApiError(code));
        }
        let id = self.next_handle();
        self.live_contexts.borrow_mut().insert(id);
        self.stats.borrow_mut().contexts_created += 1;
        Ok(SimContext { id, device })
    }

    fn create_command_queue(
        &self,
        context: &SimContext,
        device: SimDeviceId,
        properties: QueueProperties,
    ) -> ApiResult<SimQueue> {
        self.create_queue(context, device, QueueCreation::Legacy(properties))
    }

    fn create_command_queue_with_properties(
        &self,
        context: &SimContext,
        device: SimDeviceId,
        properties: &[u64],
    ) -> ApiResult<SimQueue> {
        if properties.last() != Some(&0) || properties.len() % 2 == 0 {
            return Err(ApiError(CL_INVALID_VALUE));
        }
        self.create_queue(
            context,
            device,
            QueueCreation::WithProperties(properties.to_vec()),
        )
    }

    fn finish(&self, queue: &SimQueue) -> ApiResult<()> {
        self.stats.borrow_mut().finish_calls += 1;
        if !self.live_queues.borrow().contains(&queue.id) {
            return Err(ApiError(CL_INVALID_COMMAND_QUEUE));
        }
        match self.device(queue.device)?.finish_error {
            Some(code) => Err(ApiError(code)),
            None => Ok(()),
        }
    }

    fn release_queue(&self, queue: SimQueue) -> ApiResult<()> {
        if !self.live_queues.borrow_mut().remove(&queue.id) {
            return Err(ApiError(CL_INVALID_COMMAND_QUEUE));
        }
        match self.device(queue.device)?.release_error {
            Some(code) => Err(ApiError(code)),
            None => Ok(()),
        }
    }

    fn release_context(&self, context: SimContext) -> ApiResult<()> {
        if !self.live_contexts.borrow_mut().remove(&context.id) {
            return Err(ApiError(CL_INVALID_CONTEXT));
        }
        match self.device(context.device)?.release_error {
            Some(code) => Err(ApiError(code)),
            None => Ok(()),
        }
    }
}
