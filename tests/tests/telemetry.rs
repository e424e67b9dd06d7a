//! Telemetry overflow end-to-end scenario (spec §8, scenario 4).

use fabric_core::TelemetryCollector;
use fabric_hal::{DeviceSpec, SimulatedBackend};
use fabric_types::BackendFamily;

fn spec() -> DeviceSpec {
    DeviceSpec {
        vendor: "NVIDIA".into(),
        compute_capability: "sm_90".into(),
        total_memory_bytes: 24 * 1024 * 1024 * 1024,
        compute_units: 128,
        peak_clock_mhz: 1800,
        peak_bandwidth_gb_s: 3350.0,
        tensor_unit_count: 528,
        mobility_flag: false,
        thermal_envelope_flag: false,
        driver_version: "550.0".into(),
        supports_peer_access: true,
        reports_thermal: true,
        ambient_temp_c: 35.0,
    }
}

#[tokio::test]
async fn thousand_samples_against_depth_ten_keeps_latest_and_bounds_history() {
    let backend = SimulatedBackend::new(BackendFamily::CudaFamily, "n0", vec![spec()]);
    backend.initialize().await.unwrap();
    let device_id = fabric_types::DeviceId::new(BackendFamily::CudaFamily, 0);
    let device = backend.list_devices().into_iter().next().unwrap();

    let mut collector = TelemetryCollector::new(device, 10);
    for i in 1..=1000u64 {
        let sample = TelemetryCollector::sample(&backend, &device_id, i).await.unwrap();
        collector.record(sample);
    }

    assert_eq!(collector.history().len(), 10);
    assert_eq!(collector.history().latest().unwrap().timestamp_ms, 1000);
    assert_eq!(collector.dropped_invalid(), 0);
}
