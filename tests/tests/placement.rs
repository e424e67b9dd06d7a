//! End-to-end placement scenarios (spec §8, scenarios 1-3).

use fabric_core::topology::TopologyGraph;
use fabric_types::{
    BackendFamily, ClusterSnapshot, Device, DeviceId, DeviceMetrics, FabricConfig, Pipeline,
    PlacementOutcome, Shard, SolverPath,
};
use std::collections::HashSet;

fn device(tag: &str, family: BackendFamily, memory_bytes: u64, compute_units: u32, mobility: bool) -> Device {
    Device {
        device_id: DeviceId::from(tag),
        node_id: "n0".into(),
        vendor: "Acme".into(),
        family,
        compute_capability: "sm_90".into(),
        total_memory_bytes: memory_bytes,
        compute_units,
        peak_clock_mhz: 1800,
        peak_bandwidth_gb_s: 2000.0,
        tensor_unit_count: 256,
        mobility_flag: mobility,
        thermal_envelope_flag: mobility,
        supports_peer_access: false,
        driver_version: "1.0".into(),
    }
}

fn shard(ordinal: usize, memory_bytes: u64) -> Shard {
    let precisions: HashSet<String> = ["fp16", "fp32"].iter().map(|s| s.to_string()).collect();
    Shard {
        ordinal,
        compute_flops: 1.0e12,
        memory_bytes,
        input_bytes: 1024,
        output_bytes: 1024,
        supported_precisions: precisions,
    }
}

fn metrics(device_id: &DeviceId, temp_c: Option<f32>, throttling: bool) -> DeviceMetrics {
    DeviceMetrics {
        device_id: device_id.clone(),
        timestamp_ms: 0,
        memory_used_bytes: 0,
        memory_total_bytes: 24 * 1024 * 1024 * 1024,
        compute_util_pct: 0.0,
        temperature_c: temp_c,
        power_w: None,
        clock_mhz: None,
        is_throttling: throttling,
    }
}

const GIB: u64 = 1024 * 1024 * 1024;

#[test]
fn homogeneous_two_device_cluster_uses_greedy_and_splits_evenly() {
    let x0 = device("cuda:0", BackendFamily::CudaFamily, 24 * GIB, 128, false);
    let x1 = device("cuda:1", BackendFamily::CudaFamily, 24 * GIB, 128, false);
    let devices = vec![x0.clone(), x1.clone()];

    let pipeline = Pipeline {
        instance_id: "scenario-1".into(),
        shards: (0..4).map(|i| shard(i, 5 * GIB)).collect(),
    };

    let snapshot = ClusterSnapshot::default();
    let topology = TopologyGraph::new();
    let config = FabricConfig::default();

    let outcome = fabric_core::place(&pipeline, &devices, &snapshot, &topology, &config);
    let PlacementOutcome::Placed(placement) = outcome else {
        panic!("expected a placement");
    };
    assert_eq!(placement.decision_log.solver_path, SolverPath::Greedy);
    assert!(!placement.decision_log.heterogeneous);

    let on_x0 = placement.assignment.iter().filter(|(_, d)| *d == x0.device_id).count();
    let on_x1 = placement.assignment.iter().filter(|(_, d)| *d == x1.device_id).count();
    assert_eq!(on_x0, 2);
    assert_eq!(on_x1, 2);
}

#[test]
fn heterogeneous_cluster_with_memory_skew_invokes_csp() {
    let a0 = device("cuda:0", BackendFamily::CudaFamily, 24 * GIB, 128, false);
    let b0 = device("rocm:0", BackendFamily::RocmFamily, 8 * GIB, 32, true);
    let devices = vec![a0.clone(), b0.clone()];

    let pipeline = Pipeline {
        instance_id: "scenario-2".into(),
        shards: vec![shard(0, 10 * GIB), shard(1, 6 * GIB), shard(2, 6 * GIB)],
    };

    let mut snapshot = ClusterSnapshot::default();
    snapshot
        .latest_metrics
        .insert(b0.device_id.clone(), metrics(&b0.device_id, Some(60.0), false));
    let topology = TopologyGraph::new();
    let config = FabricConfig::default();

    let outcome = fabric_core::place(&pipeline, &devices, &snapshot, &topology, &config);
    let PlacementOutcome::Placed(placement) = outcome else {
        panic!("expected a placement");
    };
    assert_eq!(placement.decision_log.solver_path, SolverPath::Csp);
    assert!(placement.decision_log.heterogeneous);
    assert!(placement.decision_log.elapsed.as_millis() < 5000);
    assert_eq!(placement.device_for(0), Some(&a0.device_id));
}

#[test]
fn thermal_veto_excludes_throttling_device_and_fails_when_infeasible() {
    let a0 = device("cuda:0", BackendFamily::CudaFamily, 8 * GIB, 128, false);
    let b0 = device("rocm:0", BackendFamily::RocmFamily, 8 * GIB, 32, true);
    let devices = vec![a0.clone(), b0.clone()];

    let pipeline = Pipeline {
        instance_id: "scenario-3".into(),
        shards: vec![shard(0, 10 * GIB), shard(1, 6 * GIB), shard(2, 6 * GIB)],
    };

    let mut snapshot = ClusterSnapshot::default();
    snapshot
        .latest_metrics
        .insert(b0.device_id.clone(), metrics(&b0.device_id, Some(92.0), true));
    let topology = TopologyGraph::new();
    let config = FabricConfig::default();

    let outcome = fabric_core::place(&pipeline, &devices, &snapshot, &topology, &config);
    match outcome {
        PlacementOutcome::Failed { reason, .. } => {
            assert!(matches!(
                reason,
                fabric_types::PlacementFailureReason::NoFeasibleDevice { .. }
            ));
        }
        PlacementOutcome::Placed(_) => panic!("throttling device must be excluded from every domain"),
    }
}

proptest::proptest! {
    /// For any number of shards with any individually-fitting sizes placed
    /// across two homogeneous devices, a successful placement never assigns
    /// more bytes to a device than it has memory for (§4.7 invariant).
    #[test]
    fn successful_placement_never_overcommits_device_memory(
        shard_sizes in proptest::collection::vec(1u64..(4 * GIB), 1..8),
    ) {
        let device_bytes = 4 * GIB;
        let x0 = device("cuda:0", BackendFamily::CudaFamily, device_bytes, 128, false);
        let x1 = device("cuda:1", BackendFamily::CudaFamily, device_bytes, 128, false);
        let devices = vec![x0.clone(), x1.clone()];

        let pipeline = Pipeline {
            instance_id: "proptest-instance".into(),
            shards: shard_sizes
                .iter()
                .enumerate()
                .map(|(i, &bytes)| shard(i, bytes))
                .collect(),
        };

        let snapshot = ClusterSnapshot::default();
        let topology = TopologyGraph::new();
        let config = FabricConfig::default();

        if let PlacementOutcome::Placed(placement) = fabric_core::place(&pipeline, &devices, &snapshot, &topology, &config) {
            let mut used: std::collections::HashMap<DeviceId, u64> = std::collections::HashMap::new();
            for (ordinal, device_id) in &placement.assignment {
                *used.entry(device_id.clone()).or_insert(0) += shard_sizes[*ordinal];
            }
            for (_, bytes) in used {
                proptest::prop_assert!(bytes <= device_bytes);
            }
        }
    }
}
