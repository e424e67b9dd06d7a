//! Vulkan-compute adapter: the cross-vendor fallback used on Linux-class
//! desktops without CUDA/ROCm, and the primary path on Mobile-class devices
//! (§4.2 platform priority) — hence mobility-flagged here.

use crate::simulated::{DeviceSpec, SimulatedBackend};
use fabric_types::BackendFamily;

pub fn build(node_id: impl Into<String>, device_count: usize) -> SimulatedBackend {
    let specs = (0..device_count)
        .map(|_| DeviceSpec {
            vendor: "Mixed".into(),
            compute_capability: "vulkan1.3".into(),
            total_memory_bytes: 8 * 1024 * 1024 * 1024,
            compute_units: 20,
            peak_clock_mhz: 900,
            peak_bandwidth_gb_s: 220.0,
            tensor_unit_count: 0,
            mobility_flag: true,
            thermal_envelope_flag: true,
            driver_version: "1.3.280".into(),
            supports_peer_access: false,
            reports_thermal: true,
            ambient_temp_c: 36.0,
        })
        .collect();
    SimulatedBackend::new(BackendFamily::VulkanCompute, node_id, specs)
}
