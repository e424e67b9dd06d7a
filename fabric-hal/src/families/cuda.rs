//! CUDA-family adapter: discrete datacenter/workstation GPUs with NVLink-style
//! peer access and full thermal/power/clock introspection.

use crate::simulated::{DeviceSpec, SimulatedBackend};
use fabric_types::BackendFamily;

pub fn build(node_id: impl Into<String>, device_count: usize) -> SimulatedBackend {
    let specs = (0..device_count)
        .map(|_| DeviceSpec {
            vendor: "NVIDIA".into(),
            compute_capability: "sm_90".into(),
            total_memory_bytes: 80 * 1024 * 1024 * 1024,
            compute_units: 132,
            peak_clock_mhz: 1980,
            peak_bandwidth_gb_s: 3350.0,
            tensor_unit_count: 528,
            mobility_flag: false,
            thermal_envelope_flag: false,
            driver_version: "550.54".into(),
            supports_peer_access: true,
            reports_thermal: true,
            ambient_temp_c: 40.0,
        })
        .collect();
    SimulatedBackend::new(BackendFamily::CudaFamily, node_id, specs)
}
