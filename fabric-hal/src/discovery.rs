//! Discovery & Inventory (§4.3): platform-ordered probe, verified-capability
//! inventory, persisted registry.

use crate::backend::Backend;
use crate::families;
use fabric_types::{BackendFamily, Device, FabricError, PlatformTag};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The verified, static half of cluster info (§4.3: "the inventory is the
/// static half... it joins the dynamic half (telemetry) only at the master").
#[derive(Debug, Clone, serde::Serialize)]
pub struct DiscoveryReport {
    pub discovered_at: String,
    pub platform: String,
    pub primary_backend: String,
    pub devices: Vec<RegistryDeviceEntry>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryDeviceEntry {
    pub device_id: String,
    pub vendor: String,
    pub name: String,
    pub memory_bytes: u64,
    pub compute_units: u32,
    pub compute_capability: String,
    pub peak_bandwidth_gbps: f32,
    pub supports_peer_access: bool,
}

/// Construct one simulated backend per family on `platform`'s discovery
/// priority list (§4.2), in priority order. `device_count` controls how
/// many devices each non-CPU family reports, letting callers model
/// single-GPU workstations or multi-GPU nodes uniformly.
pub fn backends_for_platform(
    platform: PlatformTag,
    node_id: &str,
    device_count: usize,
) -> Vec<Arc<dyn Backend>> {
    platform
        .discovery_priority()
        .iter()
        .map(|family| backend_for_family(*family, node_id, device_count))
        .collect()
}

fn backend_for_family(family: BackendFamily, node_id: &str, device_count: usize) -> Arc<dyn Backend> {
    match family {
        #[cfg(feature = "cuda")]
        BackendFamily::CudaFamily => Arc::new(families::cuda::build(node_id, device_count)),
        #[cfg(feature = "rocm")]
        BackendFamily::RocmFamily => Arc::new(families::rocm::build(node_id, device_count)),
        #[cfg(feature = "metal")]
        BackendFamily::MetalFamily => Arc::new(families::metal::build(node_id, device_count)),
        #[cfg(feature = "directml")]
        BackendFamily::DirectMLFamily => Arc::new(families::directml::build(node_id, device_count)),
        #[cfg(feature = "vulkan")]
        BackendFamily::VulkanCompute => Arc::new(families::vulkan::build(node_id, device_count)),
        BackendFamily::CpuFallback => Arc::new(families::cpu::build(node_id)),
        #[allow(unreachable_patterns)]
        _ => Arc::new(families::cpu::build(node_id)),
    }
}

/// Run discovery once: for each backend in platform priority, attempt
/// `initialize`, then verify each returned device with a 1 MiB round-trip,
/// excluding any device that fails verification with a logged warning
/// (§4.3 steps 1–2). Returns every verified device plus which family
/// produced the first non-empty, non-CPU-fallback result (the "primary
/// backend").
pub async fn discover_all(
    backends: &[Arc<dyn Backend>],
) -> (Vec<Device>, Vec<Arc<dyn Backend>>, BackendFamily) {
    let mut verified = Vec::new();
    let mut live_backends = Vec::new();
    let mut primary = BackendFamily::CpuFallback;

    for backend in backends {
        let devices = match backend.initialize().await {
            Ok(devices) => devices,
            Err(err) => {
                tracing::warn!(family = %backend.family(), error = %err, "backend unavailable");
                continue;
            }
        };
        let mut any_verified = false;
        for device in devices {
            match verify_device(backend.as_ref(), &device.device_id).await {
                Ok(()) => {
                    any_verified = true;
                    verified.push(device);
                }
                Err(err) => {
                    tracing::warn!(device_id = %device.device_id, error = %err, "device failed verification, excluded");
                }
            }
        }
        if any_verified {
            live_backends.push(backend.clone());
            if primary == BackendFamily::CpuFallback && backend.family() != BackendFamily::CpuFallback {
                primary = backend.family();
            }
        }
    }
    (verified, live_backends, primary)
}

/// 1 MiB allocate/copy/deallocate round-trip used to verify a discovered
/// device is actually usable (§4.3 step 2), expressed purely in terms of
/// the `Backend` contract so it works identically for every family.
async fn verify_device(backend: &dyn Backend, device_id: &fabric_types::DeviceId) -> Result<(), FabricError> {
    const VERIFY_BYTES: u64 = 1024 * 1024;
    let handle = backend.allocate(device_id, VERIFY_BYTES).await?;
    let pattern = vec![0xABu8; VERIFY_BYTES as usize];
    let result = async {
        backend.copy_host_to_device(&pattern, &handle, 0).await?;
        let out = backend.copy_device_to_host(&handle, 0, VERIFY_BYTES).await?;
        if out != pattern {
            return Err(FabricError::DeviceInitFailed {
                component: "discovery",
                device_id: Some(device_id.to_string()),
                message: "verification round-trip mismatch".into(),
            });
        }
        Ok(())
    }
    .await;
    backend.deallocate(&handle).await?;
    result
}

fn now_iso8601() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    // Minimal RFC3339-shaped timestamp without pulling in a datetime crate,
    // sufficient for the registry's informational `discovered_at` field.
    format!("1970-01-01T00:00:00Z+{secs}s")
}

pub fn build_report(platform: PlatformTag, primary: BackendFamily, devices: &[Device]) -> DiscoveryReport {
    DiscoveryReport {
        discovered_at: now_iso8601(),
        platform: format!("{platform:?}"),
        primary_backend: primary.to_string(),
        devices: devices
            .iter()
            .map(|d| RegistryDeviceEntry {
                device_id: d.device_id.to_string(),
                vendor: d.vendor.clone(),
                name: format!("{} {}", d.vendor, d.compute_capability),
                memory_bytes: d.total_memory_bytes,
                compute_units: d.compute_units,
                compute_capability: d.compute_capability.clone(),
                peak_bandwidth_gbps: d.peak_bandwidth_gb_s,
                supports_peer_access: d.supports_peer_access,
            })
            .collect(),
    }
}

/// Default registry path: `<config_dir>/fabric/gpu_registry.json` (§4.3, §6).
pub fn default_registry_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("fabric").join("gpu_registry.json")
}

/// Serialize the report and atomically replace whatever is at `path`
/// (§4.3: "rewritten atomically"). Writes to a sibling `.tmp` file then
/// renames over the destination.
pub fn write_registry_atomic(path: &Path, report: &DiscoveryReport) -> Result<(), FabricError> {
    let json = serde_json::to_string_pretty(report).map_err(|e| FabricError::Configuration {
        component: "discovery",
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FabricError::Configuration {
            component: "discovery",
            message: e.to_string(),
        })?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json).map_err(|e| FabricError::Configuration {
        component: "discovery",
        message: e.to_string(),
    })?;
    std::fs::rename(&tmp, path).map_err(|e| FabricError::Configuration {
        component: "discovery",
        message: e.to_string(),
    })?;
    Ok(())
}
