//! Device scoring (§4.7 "Device scoring"): a cardinal `[0, 1]` score per
//! `(shard, device)` candidate pair, pure functions so each sub-score is
//! unit-testable in isolation.

use fabric_types::{Device, DeviceId, LinkMetrics, Shard};

pub const WEIGHT_COMPUTE: f64 = 0.40;
pub const WEIGHT_MEMORY: f64 = 0.30;
pub const WEIGHT_NETWORK: f64 = 0.15;
pub const WEIGHT_THERMAL: f64 = 0.10;
pub const WEIGHT_BANDWIDTH: f64 = 0.05;

const REFERENCE_LINK_MBPS: f64 = 10_000.0;
const THROTTLE_THRESHOLD_C: f64 = 85.0;
const THERMAL_MARGIN_C: f64 = 20.0;

/// The adjacent-pipeline-neighbor context used by the network and
/// bandwidth sub-scores. `None` when the neighbor shard has no tentative
/// assignment yet (mid-search), in which case both sub-scores default to
/// `1.0` — a neutral, non-penalizing placeholder used only to order
/// candidate values, not to certify feasibility (feasibility is re-checked
/// once the neighbor actually gets assigned, via the CSP's constraints 2/3).
/// `LinkMetrics` is `Copy`, so this holds it by value rather than borrowing.
#[derive(Debug, Clone, Copy)]
pub struct NeighborContext {
    pub link: LinkMetrics,
    pub peer_access_supported: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub compute: f64,
    pub memory: f64,
    pub network: f64,
    pub thermal: f64,
    pub bandwidth: f64,
    pub total: f64,
}

pub fn compute_sub_score(device: &Device, max_peak_flops: f64) -> f64 {
    if max_peak_flops <= 0.0 {
        return 0.0;
    }
    (device.peak_flops() / max_peak_flops).clamp(0.0, 1.0)
}

/// Zero here vetoes the `(shard, device)` pair (§4.7).
pub fn memory_sub_score(shard: &Shard, free_bytes: u64) -> f64 {
    if free_bytes == 0 || (shard.memory_bytes as u64) > free_bytes {
        return 0.0;
    }
    1.0 - shard.memory_bytes as f64 / free_bytes as f64
}

pub fn network_sub_score(neighbor: Option<NeighborContext>) -> f64 {
    match neighbor {
        Some(n) => (n.link.bandwidth_mbps / REFERENCE_LINK_MBPS).min(1.0).max(0.0),
        None => 1.0,
    }
}

pub fn thermal_sub_score(device: &Device, current_temp_c: Option<f32>) -> f64 {
    if !device.thermal_envelope_flag {
        return 1.0;
    }
    match current_temp_c {
        Some(t) => ((THROTTLE_THRESHOLD_C - t as f64) / THERMAL_MARGIN_C).clamp(0.0, 1.0),
        None => 1.0,
    }
}

pub fn bandwidth_sub_score(neighbor: Option<NeighborContext>) -> f64 {
    match neighbor {
        Some(n) if n.peer_access_supported => 1.0,
        Some(_) => 0.3,
        None => 1.0,
    }
}

/// Full weighted score for one `(shard, device)` candidate pair. Weights
/// sum to `1.0` (§8 testable invariant).
pub fn score(
    shard: &Shard,
    device: &Device,
    free_bytes: u64,
    max_peak_flops: f64,
    current_temp_c: Option<f32>,
    neighbor: Option<NeighborContext>,
) -> ScoreBreakdown {
    let compute = compute_sub_score(device, max_peak_flops);
    let memory = memory_sub_score(shard, free_bytes);
    let network = network_sub_score(neighbor);
    let thermal = thermal_sub_score(device, current_temp_c);
    let bandwidth = bandwidth_sub_score(neighbor);
    let total = WEIGHT_COMPUTE * compute
        + WEIGHT_MEMORY * memory
        + WEIGHT_NETWORK * network
        + WEIGHT_THERMAL * thermal
        + WEIGHT_BANDWIDTH * bandwidth;
    ScoreBreakdown {
        compute,
        memory,
        network,
        thermal,
        bandwidth,
        total,
    }
}

/// Tie-break two equally (within `1e-3`) scored devices for the same shard:
/// prefer the one on the same node as the pipeline neighbor, then the
/// lower-ordinal device id (§4.7).
pub fn break_tie(a: &DeviceId, b: &DeviceId, a_same_node_as_neighbor: bool, b_same_node_as_neighbor: bool) -> std::cmp::Ordering {
    match (a_same_node_as_neighbor, b_same_node_as_neighbor) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    }
}

pub const SCORE_TIE_EPSILON: f64 = 1e-3;

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_types::BackendFamily;
    use std::collections::HashSet;

    fn device(peak_clock_mhz: u32, thermal_envelope: bool) -> Device {
        Device {
            device_id: DeviceId::from("cuda:0"),
            node_id: "n0".into(),
            vendor: "NVIDIA".into(),
            family: BackendFamily::CudaFamily,
            compute_capability: "sm_90".into(),
            total_memory_bytes: 24 * 1024 * 1024 * 1024,
            compute_units: 128,
            peak_clock_mhz,
            peak_bandwidth_gb_s: 3000.0,
            tensor_unit_count: 512,
            mobility_flag: false,
            thermal_envelope_flag: thermal_envelope,
            supports_peer_access: false,
            driver_version: "1.0".into(),
        }
    }

    fn shard(memory_bytes: u64) -> Shard {
        Shard {
            ordinal: 0,
            compute_flops: 1.0e12,
            memory_bytes,
            input_bytes: 0,
            output_bytes: 0,
            supported_precisions: HashSet::from(["fp16".to_string()]),
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let sum = WEIGHT_COMPUTE + WEIGHT_MEMORY + WEIGHT_NETWORK + WEIGHT_THERMAL + WEIGHT_BANDWIDTH;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn memory_score_is_zero_when_shard_does_not_fit() {
        assert_eq!(memory_sub_score(&shard(10 * 1024 * 1024 * 1024), 5 * 1024 * 1024 * 1024), 0.0);
    }

    #[test]
    fn thermal_score_is_one_without_an_envelope() {
        let d = device(1800, false);
        assert_eq!(thermal_sub_score(&d, Some(90.0)), 1.0);
    }

    #[test]
    fn thermal_score_degrades_as_temperature_rises() {
        let d = device(1800, true);
        let cool = thermal_sub_score(&d, Some(50.0));
        let hot = thermal_sub_score(&d, Some(80.0));
        assert!(cool > hot);
        assert!((0.0..=1.0).contains(&cool));
        assert!((0.0..=1.0).contains(&hot));
    }

    #[test]
    fn total_score_lies_in_unit_interval() {
        let d = device(1800, true);
        let s = shard(4 * 1024 * 1024 * 1024);
        let breakdown = score(&s, &d, 24 * 1024 * 1024 * 1024, d.peak_flops(), Some(60.0), None);
        assert!((0.0..=1.0).contains(&breakdown.total));
    }

    proptest::proptest! {
        /// For any clock speed, thermal-envelope flag, free-byte count, and
        /// current temperature, the weighted total always stays in `[0, 1]`
        /// (§4.7 invariant, generalized beyond the single fixed case above).
        #[test]
        fn total_score_lies_in_unit_interval_for_any_inputs(
            peak_clock_mhz in 100u32..5000,
            thermal_envelope in proptest::bool::ANY,
            free_bytes in 0u64..(64u64 * 1024 * 1024 * 1024),
            shard_bytes in 0u64..(64u64 * 1024 * 1024 * 1024),
            current_temp_c in proptest::option::of(-50.0f32..150.0),
        ) {
            let d = device(peak_clock_mhz, thermal_envelope);
            let s = shard(shard_bytes);
            let breakdown = score(&s, &d, free_bytes, d.peak_flops(), current_temp_c, None);
            prop_assert!((0.0..=1.0).contains(&breakdown.total));
            prop_assert!((0.0..=1.0).contains(&breakdown.compute));
            prop_assert!((0.0..=1.0).contains(&breakdown.memory));
            prop_assert!((0.0..=1.0).contains(&breakdown.thermal));
        }
    }
}
