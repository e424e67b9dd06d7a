//! Greedy fallback placement (§4.7): assign shards in pipeline order, each
//! to the highest-scoring feasible device with residual memory after prior
//! assignments. Always succeeds if a feasible assignment exists for every
//! shard taken independently; may violate the link-latency constraint,
//! which is then logged rather than enforced.

use super::scoring::{self, NeighborContext};
use fabric_types::{Device, DeviceId, PlacementFailureReason, Shard};
use rustc_hash::FxHashMap;
use std::collections::HashSet;

pub struct GreedyInput<'a> {
    pub shards: &'a [Shard],
    pub devices: &'a [&'a Device],
    pub free_bytes: &'a FxHashMap<DeviceId, u64>,
    pub throttling: &'a HashSet<DeviceId>,
    pub link: &'a dyn Fn(&DeviceId, &DeviceId) -> Option<fabric_types::LinkMetrics>,
    pub max_hop_latency_ms: f64,
    pub max_peak_flops: f64,
    pub current_temp: &'a FxHashMap<DeviceId, f32>,
}

pub fn place(input: &GreedyInput<'_>) -> Result<(Vec<(usize, DeviceId)>, Vec<usize>), PlacementFailureReason> {
    let mut remaining: FxHashMap<DeviceId, u64> = input.free_bytes.clone();
    let mut assignment: Vec<(usize, DeviceId)> = Vec::with_capacity(input.shards.len());
    let mut violated_links = Vec::new();

    for shard in input.shards {
        let prev_device = assignment.last().map(|(_, d)| d.clone());
        let mut best: Option<(&Device, f64)> = None;
        for device in input.devices {
            if input.throttling.contains(&device.device_id) {
                continue;
            }
            let free = remaining.get(&device.device_id).copied().unwrap_or(0);
            if free < shard.memory_bytes {
                continue;
            }
            let temp = input.current_temp.get(&device.device_id).copied();
            let neighbor = prev_device.as_ref().and_then(|prev| {
                (input.link)(prev, &device.device_id).map(|link| NeighborContext {
                    link,
                    peer_access_supported: link.peer_access_supported,
                })
            });
            let s = scoring::score(shard, device, free, input.max_peak_flops, temp, neighbor).total;
            if best.map(|(_, best_score)| s > best_score).unwrap_or(true) {
                best = Some((device, s));
            }
        }

        let Some((device, _)) = best else {
            return Err(PlacementFailureReason::NoFeasibleDevice {
                shard_ordinal: shard.ordinal,
            });
        };

        if let Some(prev) = &prev_device {
            let latency_ok = (input.link)(prev, &device.device_id)
                .map(|link| link.expected_transfer_time_ms(shard.output_bytes) <= input.max_hop_latency_ms)
                .unwrap_or(false);
            if !latency_ok {
                violated_links.push(shard.ordinal);
            }
        }

        let before = *remaining.get(&device.device_id).unwrap_or(&0);
        remaining.insert(device.device_id.clone(), before - shard.memory_bytes);
        assignment.push((shard.ordinal, device.device_id.clone()));
    }

    Ok((assignment, violated_links))
}
