//! Handle lifecycle end-to-end scenario (spec §8, scenario 5).

use fabric_hal::{Backend, DeviceSpec, SimulatedBackend};
use fabric_types::{BackendFamily, DeviceId, FabricError};

fn spec() -> DeviceSpec {
    DeviceSpec {
        vendor: "Acme".into(),
        compute_capability: "sm_90".into(),
        total_memory_bytes: 4 * 1024 * 1024,
        compute_units: 64,
        peak_clock_mhz: 1500,
        peak_bandwidth_gb_s: 1000.0,
        tensor_unit_count: 0,
        mobility_flag: false,
        thermal_envelope_flag: false,
        driver_version: "1.0".into(),
        supports_peer_access: false,
        reports_thermal: false,
        ambient_temp_c: 30.0,
    }
}

#[tokio::test]
async fn allocate_copy_round_trip_then_deallocate_invalidates_handle() {
    let backend = SimulatedBackend::new(BackendFamily::CudaFamily, "n0", vec![spec()]);
    backend.initialize().await.unwrap();
    let device_id = DeviceId::new(BackendFamily::CudaFamily, 0);

    const ONE_MIB: u64 = 1024 * 1024;
    let handle = backend.allocate(&device_id, ONE_MIB).await.unwrap();
    let pattern = vec![0xABu8; ONE_MIB as usize];

    backend.copy_host_to_device(&pattern, &handle, 0).await.unwrap();
    let out = backend.copy_device_to_host(&handle, 0, ONE_MIB).await.unwrap();
    assert_eq!(out, pattern);

    backend.deallocate(&handle).await.unwrap();

    let err = backend.copy_device_to_host(&handle, 0, ONE_MIB).await.unwrap_err();
    assert!(matches!(err, FabricError::InvalidHandle { .. }));
}
