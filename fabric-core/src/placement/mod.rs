//! Placement Engine (§4.7): the hardest subsystem. `place()` is the single
//! entry point; internally split into `scoring` (pure functions), `csp`
//! (backtracking solver), `greedy` (fallback), and `decision` (the
//! `DecisionLog` builder) so each is unit-testable in isolation.

pub mod csp;
pub mod decision;
pub mod greedy;
pub mod scoring;

use crate::topology::TopologyGraph;
use fabric_types::{
    ClusterSnapshot, Device, DeviceId, FabricConfig, Pipeline, Placement, PlacementOutcome,
    ShardScore, SolverPath,
};
use rustc_hash::FxHashMap;
use std::collections::HashSet;
use std::time::{Duration, Instant};

const MEMORY_SKEW_THRESHOLD: f64 = 1.2;

fn is_heterogeneous(devices: &[&Device]) -> bool {
    if devices.is_empty() {
        return false;
    }
    let min_memory = devices.iter().map(|d| d.total_memory_bytes).min().unwrap_or(1).max(1);
    let max_memory = devices.iter().map(|d| d.total_memory_bytes).max().unwrap_or(1);
    let families: HashSet<_> = devices.iter().map(|d| d.family).collect();
    (max_memory as f64 / min_memory as f64) > MEMORY_SKEW_THRESHOLD || families.len() >= 2
}

/// Solve placement for one pipeline against the current cluster snapshot
/// and topology. Never fails outright (§7: "the placement engine never
/// fails") — worst case is the greedy path's diagnostic-logged assignment,
/// or, if no device can independently hold some shard, an explicit
/// `PlacementOutcome::Failed`.
pub fn place(
    pipeline: &Pipeline,
    devices: &[Device],
    snapshot: &ClusterSnapshot,
    topology: &TopologyGraph,
    config: &FabricConfig,
) -> PlacementOutcome {
    if pipeline.is_empty() {
        return PlacementOutcome::Placed(Placement {
            instance_id: pipeline.instance_id.clone(),
            assignment: Vec::new(),
            decision_log: decision::build(SolverPath::Greedy, false, Duration::ZERO, Vec::new(), Vec::new()),
        });
    }

    let device_refs: Vec<&Device> = devices.iter().collect();
    let max_peak_flops = device_refs.iter().map(|d| d.peak_flops()).fold(0.0, f64::max);
    let heterogeneous = is_heterogeneous(&device_refs);

    let mut free_bytes: FxHashMap<DeviceId, u64> = FxHashMap::default();
    let mut current_temp: FxHashMap<DeviceId, f32> = FxHashMap::default();
    let mut throttling: HashSet<DeviceId> = HashSet::new();
    for device in devices {
        let free = match snapshot.latest_metrics.get(&device.device_id) {
            Some(m) => m.memory_total_bytes.saturating_sub(m.memory_used_bytes),
            None => device.total_memory_bytes,
        };
        free_bytes.insert(device.device_id.clone(), free);
        if let Some(m) = snapshot.latest_metrics.get(&device.device_id) {
            if let Some(t) = m.temperature_c {
                current_temp.insert(device.device_id.clone(), t);
            }
            if m.is_throttling {
                throttling.insert(device.device_id.clone());
            }
        }
    }

    let link = |a: &DeviceId, b: &DeviceId| topology.link(a, b).copied();

    let start = Instant::now();
    let (solver_path, result) = if heterogeneous {
        let input = csp::CspInput {
            shards: &pipeline.shards,
            devices: &device_refs,
            free_bytes: &free_bytes,
            throttling: &throttling,
            link: &link,
            max_hop_latency_ms: config.max_hop_latency_ms,
            max_peak_flops,
            current_temp: &current_temp,
            deadline: start + Duration::from_millis(config.csp_timeout_ms),
        };
        match csp::solve(&input) {
            Ok(ok) => (SolverPath::Csp, Ok(ok)),
            Err(fabric_types::PlacementFailureReason::NoFeasibleDevice { shard_ordinal }) => {
                return PlacementOutcome::Failed {
                    instance_id: pipeline.instance_id.clone(),
                    reason: fabric_types::PlacementFailureReason::NoFeasibleDevice { shard_ordinal },
                };
            }
            Err(_timeout_or_infeasible) => {
                let greedy_input = greedy::GreedyInput {
                    shards: &pipeline.shards,
                    devices: &device_refs,
                    free_bytes: &free_bytes,
                    throttling: &throttling,
                    link: &link,
                    max_hop_latency_ms: config.max_hop_latency_ms,
                    max_peak_flops,
                    current_temp: &current_temp,
                };
                (SolverPath::Greedy, greedy::place(&greedy_input))
            }
        }
    } else {
        let greedy_input = greedy::GreedyInput {
            shards: &pipeline.shards,
            devices: &device_refs,
            free_bytes: &free_bytes,
            throttling: &throttling,
            link: &link,
            max_hop_latency_ms: config.max_hop_latency_ms,
            max_peak_flops,
            current_temp: &current_temp,
        };
        (SolverPath::Greedy, greedy::place(&greedy_input))
    };

    let elapsed = start.elapsed();
    match result {
        Ok((assignment, violated_link_latency)) => {
            let scores = recompute_scores(pipeline, &device_refs, &assignment, &free_bytes, max_peak_flops, &current_temp, &link);
            PlacementOutcome::Placed(Placement {
                instance_id: pipeline.instance_id.clone(),
                assignment,
                decision_log: decision::build(solver_path, heterogeneous, elapsed, scores, violated_link_latency),
            })
        }
        Err(reason) => PlacementOutcome::Failed {
            instance_id: pipeline.instance_id.clone(),
            reason,
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn recompute_scores(
    pipeline: &Pipeline,
    devices: &[&Device],
    assignment: &[(usize, DeviceId)],
    free_bytes: &FxHashMap<DeviceId, u64>,
    max_peak_flops: f64,
    current_temp: &FxHashMap<DeviceId, f32>,
    link: &impl Fn(&DeviceId, &DeviceId) -> Option<fabric_types::LinkMetrics>,
) -> Vec<ShardScore> {
    let by_ordinal: FxHashMap<usize, &DeviceId> = assignment.iter().map(|(o, d)| (*o, d)).collect();
    pipeline
        .shards
        .iter()
        .filter_map(|shard| {
            let device_id = *by_ordinal.get(&shard.ordinal)?;
            let device = devices.iter().find(|d| &d.device_id == device_id)?;
            let free = free_bytes.get(device_id).copied().unwrap_or(0);
            let temp = current_temp.get(device_id).copied();
            let neighbor_ordinal = shard.ordinal.checked_sub(1).or(Some(shard.ordinal + 1));
            let neighbor = neighbor_ordinal
                .and_then(|o| by_ordinal.get(&o))
                .and_then(|n| link(device_id, n))
                .map(|l| scoring::NeighborContext {
                    link: l,
                    peer_access_supported: l.peer_access_supported,
                });
            let total = scoring::score(shard, device, free, max_peak_flops, temp, neighbor).total;
            Some(decision::score_entry(shard.ordinal, device_id.clone(), total))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_types::{BackendFamily, DeviceMetrics};
    use std::collections::HashMap;

    fn device(tag: &str, family: BackendFamily, total: u64, mobility: bool, envelope: bool) -> Device {
        Device {
            device_id: DeviceId::from(tag),
            node_id: "n0".into(),
            vendor: "Acme".into(),
            family,
            compute_capability: "v1".into(),
            total_memory_bytes: total,
            compute_units: 64,
            peak_clock_mhz: 1500,
            peak_bandwidth_gb_s: 1000.0,
            tensor_unit_count: 128,
            mobility_flag: mobility,
            thermal_envelope_flag: envelope,
            supports_peer_access: false,
            driver_version: "1.0".into(),
        }
    }

    fn shard(ordinal: usize, memory_bytes: u64) -> fabric_types::Shard {
        fabric_types::Shard {
            ordinal,
            compute_flops: 1.0e12,
            memory_bytes,
            input_bytes: 0,
            output_bytes: 1024,
            supported_precisions: HashSet::from(["fp16".to_string()]),
        }
    }

    #[test]
    fn homogeneous_cluster_uses_greedy_path() {
        let gib = 1024u64 * 1024 * 1024;
        let x0 = device("cuda:0", BackendFamily::CudaFamily, 24 * gib, false, false);
        let x1 = device("cuda:1", BackendFamily::CudaFamily, 24 * gib, false, false);
        let devices = vec![x0.clone(), x1.clone()];
        let pipeline = Pipeline {
            instance_id: "inst-0".into(),
            shards: (0..4).map(|i| shard(i, 5 * gib)).collect(),
        };
        let snapshot = ClusterSnapshot::default();
        let topology = TopologyGraph::new();
        let config = FabricConfig::default();
        let outcome = place(&pipeline, &devices, &snapshot, &topology, &config);
        match outcome {
            PlacementOutcome::Placed(p) => {
                assert_eq!(p.assignment.len(), 4);
                assert!(!p.decision_log.heterogeneous);
                assert_eq!(p.decision_log.solver_path, SolverPath::Greedy);
            }
            PlacementOutcome::Failed { reason, .. } => panic!("expected placement, got {reason:?}"),
        }
    }

    #[test]
    fn heterogeneous_cluster_uses_csp_path() {
        let gib = 1024u64 * 1024 * 1024;
        let a0 = device("cuda:0", BackendFamily::CudaFamily, 24 * gib, false, false);
        let b0 = device("vulkan:0", BackendFamily::VulkanCompute, 8 * gib, true, true);
        let devices = vec![a0.clone(), b0.clone()];
        let pipeline = Pipeline {
            instance_id: "inst-1".into(),
            shards: vec![shard(0, 10 * gib), shard(1, 6 * gib), shard(2, 6 * gib)],
        };
        let mut snapshot = ClusterSnapshot::default();
        snapshot.latest_metrics.insert(
            b0.device_id.clone(),
            DeviceMetrics {
                device_id: b0.device_id.clone(),
                timestamp_ms: 0,
                memory_used_bytes: 0,
                memory_total_bytes: b0.total_memory_bytes,
                compute_util_pct: 0.0,
                temperature_c: Some(60.0),
                power_w: None,
                clock_mhz: None,
                is_throttling: false,
            },
        );
        let mut topology = TopologyGraph::new();
        let link = fabric_types::LinkMetrics {
            latency_ms: 1.0,
            bandwidth_mbps: 50_000.0,
            peer_access_supported: false,
            peer_access_bandwidth_mbps: None,
        };
        topology.set_link(&a0.device_id, &b0.device_id, link);
        topology.set_link(&b0.device_id, &a0.device_id, link);
        let config = FabricConfig::default();
        let outcome = place(&pipeline, &devices, &snapshot, &topology, &config);
        match outcome {
            PlacementOutcome::Placed(p) => {
                assert!(p.decision_log.heterogeneous);
                assert_eq!(p.decision_log.solver_path, SolverPath::Csp);
                assert!(p.decision_log.elapsed < Duration::from_millis(5000));
                let shard0 = p.assignment.iter().find(|(o, _)| *o == 0).unwrap();
                assert_eq!(shard0.1, a0.device_id);
            }
            PlacementOutcome::Failed { reason, .. } => panic!("expected placement, got {reason:?}"),
        }
    }

    #[test]
    fn thermal_veto_excludes_throttling_device() {
        let gib = 1024u64 * 1024 * 1024;
        let a0 = device("cuda:0", BackendFamily::CudaFamily, 8 * gib, false, false);
        let b0 = device("vulkan:0", BackendFamily::VulkanCompute, 8 * gib, true, true);
        let devices = vec![a0.clone(), b0.clone()];
        let pipeline = Pipeline {
            instance_id: "inst-2".into(),
            shards: vec![shard(0, 10 * gib), shard(1, 6 * gib), shard(2, 6 * gib)],
        };
        let mut snapshot = ClusterSnapshot::default();
        snapshot.latest_metrics.insert(
            b0.device_id.clone(),
            DeviceMetrics {
                device_id: b0.device_id.clone(),
                timestamp_ms: 0,
                memory_used_bytes: 0,
                memory_total_bytes: b0.total_memory_bytes,
                compute_util_pct: 0.0,
                temperature_c: Some(90.0),
                power_w: None,
                clock_mhz: None,
                is_throttling: true,
            },
        );
        let topology = TopologyGraph::new();
        let config = FabricConfig::default();
        let outcome = place(&pipeline, &devices, &snapshot, &topology, &config);
        match outcome {
            PlacementOutcome::Failed { reason, .. } => {
                assert_eq!(reason, fabric_types::PlacementFailureReason::NoFeasibleDevice { shard_ordinal: 0 });
            }
            PlacementOutcome::Placed(_) => panic!("expected failure: total memory insufficient once B:0 is vetoed"),
        }
    }

    #[test]
    fn zero_shard_pipeline_places_immediately() {
        let pipeline = Pipeline {
            instance_id: "inst-empty".into(),
            shards: Vec::new(),
        };
        let snapshot = ClusterSnapshot::default();
        let topology = TopologyGraph::new();
        let config = FabricConfig::default();
        let devices: HashMap<DeviceId, Device> = HashMap::new();
        let outcome = place(&pipeline, &devices.into_values().collect::<Vec<_>>(), &snapshot, &topology, &config);
        assert!(matches!(outcome, PlacementOutcome::Placed(p) if p.assignment.is_empty()));
    }
}
