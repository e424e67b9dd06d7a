//! Topology Model (§4.6): a directed, weighted graph of device-to-device
//! links with O(V+E) reachability and bottleneck queries.

use fabric_types::{DeviceId, LinkMetrics};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use rustc_hash::FxHashMap;
use std::collections::HashSet;

/// Small `Copy` arena index standing in for a `DeviceId` inside the graph —
/// `petgraph`'s node weight type must be `Copy + Ord + Hash`, which a
/// `String`-backed `DeviceId` is not cheaply, so the graph is keyed on this
/// index and `TopologyGraph` holds the two-way mapping (never an owning
/// reference into `ClusterSnapshot`, per the cyclic-reference redesign note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIndex(u32);

/// The live, query-optimized topology structure. Rebuilt or incrementally
/// updated from `LinkMetricsMeasured` events; the `ClusterSnapshot.edges`
/// flat list is the serializable projection of the same data (§3).
pub struct TopologyGraph {
    graph: DiGraphMap<DeviceIndex, LinkMetrics>,
    by_device: FxHashMap<DeviceId, DeviceIndex>,
    by_index: FxHashMap<DeviceIndex, DeviceId>,
    next_index: u32,
}

impl TopologyGraph {
    pub fn new() -> Self {
        TopologyGraph {
            graph: DiGraphMap::new(),
            by_device: FxHashMap::default(),
            by_index: FxHashMap::default(),
            next_index: 0,
        }
    }

    fn index_for(&mut self, device_id: &DeviceId) -> DeviceIndex {
        if let Some(idx) = self.by_device.get(device_id) {
            return *idx;
        }
        let idx = DeviceIndex(self.next_index);
        self.next_index += 1;
        self.by_device.insert(device_id.clone(), idx);
        self.by_index.insert(idx, device_id.clone());
        self.graph.add_node(idx);
        idx
    }

    /// Fold a `LinkMetricsMeasured` event (or its snapshot projection) in.
    pub fn set_link(&mut self, from: &DeviceId, to: &DeviceId, link: LinkMetrics) {
        let a = self.index_for(from);
        let b = self.index_for(to);
        self.graph.add_edge(a, b, link);
    }

    pub fn remove_device(&mut self, device_id: &DeviceId) {
        if let Some(idx) = self.by_device.remove(device_id) {
            self.graph.remove_node(idx);
            self.by_index.remove(&idx);
        }
    }

    pub fn link(&self, from: &DeviceId, to: &DeviceId) -> Option<&LinkMetrics> {
        let a = self.by_device.get(from)?;
        let b = self.by_device.get(to)?;
        self.graph.edge_weight(*a, *b)
    }

    pub fn bandwidth_mbps(&self, from: &DeviceId, to: &DeviceId) -> f64 {
        self.link(from, to).map(|l| l.bandwidth_mbps).unwrap_or(0.0)
    }

    pub fn latency_ms(&self, from: &DeviceId, to: &DeviceId) -> f64 {
        self.link(from, to).map(|l| l.latency_ms).unwrap_or(f64::INFINITY)
    }

    pub fn expected_transfer_time_ms(&self, from: &DeviceId, to: &DeviceId, bytes: u64) -> f64 {
        match self.link(from, to) {
            Some(l) => l.expected_transfer_time_ms(bytes),
            None => f64::INFINITY,
        }
    }

    /// Every device reachable from `start` via reachable (bandwidth > 0)
    /// edges, including `start` itself (§4.6 reachability query).
    pub fn reachable_set(&self, start: &DeviceId) -> HashSet<DeviceId> {
        let mut out = HashSet::new();
        out.insert(start.clone());
        let Some(start_idx) = self.by_device.get(start) else {
            return out;
        };
        let mut stack = vec![*start_idx];
        let mut visited: HashSet<DeviceIndex> = HashSet::new();
        visited.insert(*start_idx);
        while let Some(idx) = stack.pop() {
            for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if visited.contains(&neighbor) {
                    continue;
                }
                if let Some(link) = self.graph.edge_weight(idx, neighbor) {
                    if !link.is_reachable() {
                        continue;
                    }
                }
                visited.insert(neighbor);
                if let Some(device_id) = self.by_index.get(&neighbor) {
                    out.insert(device_id.clone());
                }
                stack.push(neighbor);
            }
        }
        out
    }

    /// Edges whose bandwidth falls below `threshold_mbps`, used by the
    /// placement engine's link-latency diagnostics (§4.7 Output).
    pub fn bottleneck_edges(&self, threshold_mbps: f64) -> Vec<(DeviceId, DeviceId, LinkMetrics)> {
        self.graph
            .all_edges()
            .filter(|(_, _, link)| link.bandwidth_mbps < threshold_mbps)
            .filter_map(|(a, b, link)| {
                Some((self.by_index.get(&a)?.clone(), self.by_index.get(&b)?.clone(), *link))
            })
            .collect()
    }

    pub fn edges(&self) -> Vec<(DeviceId, DeviceId, LinkMetrics)> {
        self.graph
            .all_edges()
            .filter_map(|(a, b, link)| {
                Some((self.by_index.get(&a)?.clone(), self.by_index.get(&b)?.clone(), *link))
            })
            .collect()
    }
}

impl Default for TopologyGraph {
    fn default() -> Self {
        Self::new()
    }
}
