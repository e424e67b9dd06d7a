//! Link metrics carried by topology edges (§3, §4.6). The graph itself
//! lives in `fabric-core` (it needs a graph crate); this module only
//! defines the edge payload so both `fabric-core` and telemetry producers
//! can share it without a cyclic crate dependency.

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkMetrics {
    pub latency_ms: f64,
    pub bandwidth_mbps: f64,
    pub peer_access_supported: bool,
    pub peer_access_bandwidth_mbps: Option<f64>,
}

impl LinkMetrics {
    /// Bandwidth `0` denotes unreachable (§3).
    pub fn is_reachable(&self) -> bool {
        self.bandwidth_mbps > 0.0
    }

    /// `expected_transfer_time(a, b, bytes) = latency + bytes / bandwidth` (§4.6).
    pub fn expected_transfer_time_ms(&self, bytes: u64) -> f64 {
        if !self.is_reachable() {
            return f64::INFINITY;
        }
        self.latency_ms + (bytes as f64 / 1_000_000.0) / self.bandwidth_mbps * 1000.0
    }
}
