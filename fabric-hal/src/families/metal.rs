//! Metal-family adapter: Apple Silicon unified-memory GPUs. Mobility-flagged
//! since this family is the macOS-class *and* the typical thin-and-light
//! laptop chassis the thermal executor (§4.8) exists to protect.

use crate::simulated::{DeviceSpec, SimulatedBackend};
use fabric_types::BackendFamily;

pub fn build(node_id: impl Into<String>, device_count: usize) -> SimulatedBackend {
    let specs = (0..device_count)
        .map(|_| DeviceSpec {
            vendor: "Apple".into(),
            compute_capability: "metal3".into(),
            total_memory_bytes: 64 * 1024 * 1024 * 1024,
            compute_units: 40,
            peak_clock_mhz: 1400,
            peak_bandwidth_gb_s: 819.0,
            tensor_unit_count: 16,
            mobility_flag: true,
            thermal_envelope_flag: true,
            driver_version: "n/a".into(),
            supports_peer_access: false,
            reports_thermal: true,
            ambient_temp_c: 45.0,
        })
        .collect();
    SimulatedBackend::new(BackendFamily::MetalFamily, node_id, specs)
}
