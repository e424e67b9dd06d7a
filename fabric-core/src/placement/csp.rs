//! Constraint-satisfaction shard-to-device assignment (§4.7 "Constraint-
//! satisfaction assignment"): backtracking with minimum-remaining-values
//! variable ordering, forward checking, and a hard wall-clock budget.

use super::scoring::{self, NeighborContext};
use fabric_types::{Device, DeviceId, PlacementFailureReason, Shard};
use rustc_hash::FxHashMap;
use std::time::Instant;

pub struct CspInput<'a> {
    pub shards: &'a [Shard],
    pub devices: &'a [&'a Device],
    pub free_bytes: &'a FxHashMap<DeviceId, u64>,
    pub throttling: &'a std::collections::HashSet<DeviceId>,
    pub link: &'a dyn Fn(&DeviceId, &DeviceId) -> Option<fabric_types::LinkMetrics>,
    pub max_hop_latency_ms: f64,
    pub max_peak_flops: f64,
    pub current_temp: &'a FxHashMap<DeviceId, f32>,
    pub deadline: Instant,
}

enum Step {
    Solved,
    Exhausted,
    TimedOut,
}

/// `Some(assignment)` on success; `None` with the failure reason otherwise
/// (§9: explicit result/sum type rather than exceptions for solver control
/// flow). The CSP path enforces both the link-latency and the precision-
/// compatibility constraints strictly, so its violated-link list is always
/// empty; it's returned anyway so callers can treat the CSP and greedy
/// paths uniformly.
pub fn solve(input: &CspInput<'_>) -> Result<(Vec<(usize, DeviceId)>, Vec<usize>), PlacementFailureReason> {
    if input.shards.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut domains: Vec<Vec<&Device>> = Vec::with_capacity(input.shards.len());
    for shard in input.shards {
        let candidates: Vec<&Device> = input
            .devices
            .iter()
            .copied()
            .filter(|d| !input.throttling.contains(&d.device_id))
            .filter(|d| {
                let free = input.free_bytes.get(&d.device_id).copied().unwrap_or(0);
                free >= shard.memory_bytes
            })
            .collect();
        if candidates.is_empty() {
            return Err(PlacementFailureReason::NoFeasibleDevice {
                shard_ordinal: shard.ordinal,
            });
        }
        domains.push(candidates);
    }

    let mut remaining: FxHashMap<DeviceId, u64> = input.free_bytes.clone();
    let mut assignment: Vec<Option<DeviceId>> = vec![None; input.shards.len()];

    let step = backtrack(input, &domains, &mut remaining, &mut assignment);
    match step {
        Step::Solved => Ok((
            assignment
                .into_iter()
                .enumerate()
                .map(|(i, d)| (input.shards[i].ordinal, d.expect("solved assignment is total")))
                .collect(),
            Vec::new(),
        )),
        Step::TimedOut => Err(PlacementFailureReason::TimedOut),
        Step::Exhausted => Err(PlacementFailureReason::Infeasible),
    }
}

fn backtrack(
    input: &CspInput<'_>,
    domains: &[Vec<&Device>],
    remaining: &mut FxHashMap<DeviceId, u64>,
    assignment: &mut Vec<Option<DeviceId>>,
) -> Step {
    if Instant::now() >= input.deadline {
        return Step::TimedOut;
    }

    let Some(next) = minimum_remaining_values(input, domains, remaining, assignment) else {
        return Step::Solved;
    };

    let shard = &input.shards[next];
    let mut candidates: Vec<(&Device, f64)> = domains[next]
        .iter()
        .filter(|d| remaining.get(&d.device_id).copied().unwrap_or(0) >= shard.memory_bytes)
        .map(|d| {
            let free = remaining.get(&d.device_id).copied().unwrap_or(0);
            let temp = input.current_temp.get(&d.device_id).copied();
            let neighbor = neighbor_context(input, assignment, next, &d.device_id);
            let s = scoring::score(shard, d, free, input.max_peak_flops, temp, neighbor);
            (*d, s.total)
        })
        .collect();
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for (device, _score) in candidates {
        if !satisfies_adjacent_constraints(input, assignment, next, &device.device_id) {
            continue;
        }
        let before = *remaining.get(&device.device_id).unwrap_or(&0);
        remaining.insert(device.device_id.clone(), before - shard.memory_bytes);
        assignment[next] = Some(device.device_id.clone());

        match backtrack(input, domains, remaining, assignment) {
            Step::Solved => return Step::Solved,
            Step::TimedOut => return Step::TimedOut,
            Step::Exhausted => {}
        }

        assignment[next] = None;
        remaining.insert(device.device_id.clone(), before);
    }
    Step::Exhausted
}

fn minimum_remaining_values(
    input: &CspInput<'_>,
    domains: &[Vec<&Device>],
    remaining: &FxHashMap<DeviceId, u64>,
    assignment: &[Option<DeviceId>],
) -> Option<usize> {
    (0..input.shards.len())
        .filter(|&i| assignment[i].is_none())
        .min_by_key(|&i| {
            domains[i]
                .iter()
                .filter(|d| remaining.get(&d.device_id).copied().unwrap_or(0) >= input.shards[i].memory_bytes)
                .count()
        })
}

fn neighbor_context(
    input: &CspInput<'_>,
    assignment: &[Option<DeviceId>],
    shard_index: usize,
    candidate: &DeviceId,
) -> Option<NeighborContext> {
    // Prefer the left neighbor (pipeline order) when both are assigned;
    // this only affects initial value ordering, not feasibility.
    let neighbor_index = if shard_index > 0 && assignment[shard_index - 1].is_some() {
        Some(shard_index - 1)
    } else if shard_index + 1 < assignment.len() && assignment[shard_index + 1].is_some() {
        Some(shard_index + 1)
    } else {
        None
    };
    let neighbor_device = neighbor_index.and_then(|i| assignment[i].as_ref())?;
    let link = (input.link)(candidate, neighbor_device).or_else(|| (input.link)(neighbor_device, candidate))?;
    Some(NeighborContext {
        link,
        peer_access_supported: link.peer_access_supported,
    })
}

fn satisfies_adjacent_constraints(
    input: &CspInput<'_>,
    assignment: &[Option<DeviceId>],
    shard_index: usize,
    candidate: &DeviceId,
) -> bool {
    let mut ok = true;
    if shard_index > 0 {
        if let Some(prev_device) = &assignment[shard_index - 1] {
            ok &= adjacent_pair_ok(
                input,
                &input.shards[shard_index - 1],
                &input.shards[shard_index],
                prev_device,
                candidate,
            );
        }
    }
    if shard_index + 1 < input.shards.len() {
        if let Some(next_device) = &assignment[shard_index + 1] {
            ok &= adjacent_pair_ok(
                input,
                &input.shards[shard_index],
                &input.shards[shard_index + 1],
                candidate,
                next_device,
            );
        }
    }
    ok
}

/// Constraint 2 (precision compatibility) and constraint 3 (link latency),
/// both evaluated for the same upstream/downstream pair. Precision is a
/// property of the shard pair, not the device, so it's checked against
/// `upstream_shard`/`downstream_shard` directly rather than the candidate
/// devices.
fn adjacent_pair_ok(
    input: &CspInput<'_>,
    upstream_shard: &Shard,
    downstream_shard: &Shard,
    upstream: &DeviceId,
    downstream: &DeviceId,
) -> bool {
    if upstream_shard
        .supported_precisions
        .is_disjoint(&downstream_shard.supported_precisions)
    {
        return false;
    }
    match (input.link)(upstream, downstream) {
        Some(link) => {
            let transfer_ms = link.expected_transfer_time_ms(upstream_shard.output_bytes);
            transfer_ms <= input.max_hop_latency_ms
        }
        None => false,
    }
}
