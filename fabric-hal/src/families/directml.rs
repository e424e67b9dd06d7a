//! DirectML adapter: the Windows-class vendor-neutral compute path, used
//! when neither CUDA nor ROCm drivers are present (§4.2 platform priority).

use crate::simulated::{DeviceSpec, SimulatedBackend};
use fabric_types::BackendFamily;

pub fn build(node_id: impl Into<String>, device_count: usize) -> SimulatedBackend {
    let specs = (0..device_count)
        .map(|_| DeviceSpec {
            vendor: "Mixed".into(),
            compute_capability: "dml_fl_6_3".into(),
            total_memory_bytes: 16 * 1024 * 1024 * 1024,
            compute_units: 48,
            peak_clock_mhz: 2200,
            peak_bandwidth_gb_s: 560.0,
            tensor_unit_count: 48,
            mobility_flag: false,
            thermal_envelope_flag: false,
            driver_version: "31.0.101".into(),
            supports_peer_access: false,
            reports_thermal: true,
            ambient_temp_c: 38.0,
        })
        .collect();
    SimulatedBackend::new(BackendFamily::DirectMLFamily, node_id, specs)
}
