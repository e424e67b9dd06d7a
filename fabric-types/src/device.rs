//! Device identity and static attributes (spec §3, `Device`).

use std::fmt;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFamily {
    CudaFamily,
    RocmFamily,
    MetalFamily,
    DirectMLFamily,
    VulkanCompute,
    CpuFallback,
}

impl BackendFamily {
    /// Short lowercase tag used in `device_id` strings (`"<backend>:<ordinal>"`).
    pub fn tag(self) -> &'static str {
        match self {
            BackendFamily::CudaFamily => "cuda",
            BackendFamily::RocmFamily => "rocm",
            BackendFamily::MetalFamily => "metal",
            BackendFamily::DirectMLFamily => "directml",
            BackendFamily::VulkanCompute => "vulkan",
            BackendFamily::CpuFallback => "cpu",
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Platform family a worker process runs on, used to order backend discovery (§4.2).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformTag {
    Linux,
    Windows,
    MacOs,
    Mobile,
}

impl PlatformTag {
    /// Backend probe order for this platform (§4.2).
    pub fn discovery_priority(self) -> &'static [BackendFamily] {
        use BackendFamily::*;
        match self {
            PlatformTag::Linux => &[CudaFamily, RocmFamily, VulkanCompute, CpuFallback],
            PlatformTag::Windows => &[DirectMLFamily, CudaFamily, RocmFamily, CpuFallback],
            PlatformTag::MacOs => &[MetalFamily, CpuFallback],
            PlatformTag::Mobile => &[VulkanCompute, CpuFallback],
        }
    }
}

/// A stable device identity, `"<backend>:<ordinal>"` (§3).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(family: BackendFamily, ordinal: u32) -> Self {
        DeviceId(format!("{}:{}", family.tag(), ordinal))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        DeviceId(s.to_owned())
    }
}

/// An addressable accelerator, immutable once discovered (§3).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub device_id: DeviceId,
    pub node_id: String,
    pub vendor: String,
    pub family: BackendFamily,
    pub compute_capability: String,
    pub total_memory_bytes: u64,
    pub compute_units: u32,
    pub peak_clock_mhz: u32,
    pub peak_bandwidth_gb_s: f32,
    pub tensor_unit_count: u32,
    pub mobility_flag: bool,
    pub thermal_envelope_flag: bool,
    pub supports_peer_access: bool,
    pub driver_version: String,
}

impl Device {
    /// Peak FLOPs estimate used by the compute sub-score (§4.7). A simple,
    /// deterministic model: tensor units dominate when present, otherwise
    /// compute-unit count and clock stand in for raw throughput.
    pub fn peak_flops(&self) -> f64 {
        let tensor_term = self.tensor_unit_count as f64 * 512.0;
        let cu_term = self.compute_units as f64 * 64.0;
        (tensor_term + cu_term) * self.peak_clock_mhz as f64 * 1.0e6
    }
}
