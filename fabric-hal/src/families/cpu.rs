//! `CpuFallback` — the terminal element of discovery (§4.2): always
//! available, modest compute, effectively-infinite memory, no thermal
//! envelope. The full contract runs against host memory.

use crate::simulated::{DeviceSpec, SimulatedBackend};
use fabric_types::BackendFamily;

/// 256 GiB stands in for "effectively infinite" relative to shard sizes.
const CPU_FALLBACK_MEMORY_BYTES: u64 = 256 * 1024 * 1024 * 1024;

pub fn build(node_id: impl Into<String>) -> SimulatedBackend {
    let spec = DeviceSpec {
        vendor: "Generic".into(),
        compute_capability: "host".into(),
        total_memory_bytes: CPU_FALLBACK_MEMORY_BYTES,
        compute_units: 16,
        peak_clock_mhz: 3500,
        peak_bandwidth_gb_s: 50.0,
        tensor_unit_count: 0,
        mobility_flag: false,
        thermal_envelope_flag: false,
        driver_version: "n/a".into(),
        supports_peer_access: false,
        reports_thermal: false,
        ambient_temp_c: 25.0,
    };
    SimulatedBackend::new(BackendFamily::CpuFallback, node_id, vec![spec])
}
