//! ROCm-family adapter: AMD Instinct-class accelerators with Infinity Fabric
//! peer access.

use crate::simulated::{DeviceSpec, SimulatedBackend};
use fabric_types::BackendFamily;

pub fn build(node_id: impl Into<String>, device_count: usize) -> SimulatedBackend {
    let specs = (0..device_count)
        .map(|_| DeviceSpec {
            vendor: "AMD".into(),
            compute_capability: "gfx942".into(),
            total_memory_bytes: 192 * 1024 * 1024 * 1024,
            compute_units: 304,
            peak_clock_mhz: 1700,
            peak_bandwidth_gb_s: 5300.0,
            tensor_unit_count: 304,
            mobility_flag: false,
            thermal_envelope_flag: false,
            driver_version: "6.1.0".into(),
            supports_peer_access: true,
            reports_thermal: true,
            ambient_temp_c: 42.0,
        })
        .collect();
    SimulatedBackend::new(BackendFamily::RocmFamily, node_id, specs)
}
