//! The deterministic fold of the event log at some ordinal (§3 `ClusterSnapshot`,
//! §3.1 `NodeInfo`/`InstanceRecord`/`AnomalyRecord`, §4.5 instance lifecycle).

use crate::device::{Device, DeviceId, PlatformTag};
use crate::metrics::DeviceMetrics;
use crate::shard::Placement;
use crate::topology::LinkMetrics;
use std::collections::HashMap;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub node_id: String,
    pub label: String,
    pub platform: PlatformTag,
    pub joined_at_ms: u64,
}

/// Instance lifecycle state machine (§4.5):
/// `Requested -> Placing -> Active -> Retiring -> Retired`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Requested,
    Placing,
    Active,
    Retiring,
    Retired,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub requested_at_ms: u64,
    pub state: InstanceState,
    pub placement: Option<Placement>,
    pub retirement_reason: Option<String>,
}

impl InstanceRecord {
    pub fn new(instance_id: String, requested_at_ms: u64) -> Self {
        InstanceRecord {
            instance_id,
            requested_at_ms,
            state: InstanceState::Requested,
            placement: None,
            retirement_reason: None,
        }
    }
}

/// An ill-formed or unrecognized event recorded instead of crashing the
/// applier (§4.5: "no event causes a crash").
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyRecord {
    pub ordinal: u64,
    pub reason: String,
    pub raw_debug: String,
}

/// The immutable cluster view produced by folding the event log up to some
/// ordinal (§3). A new snapshot is produced for every applied event; readers
/// always see a consistent, unchanging reference (§4.5, §5).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterSnapshot {
    pub ordinal: u64,
    pub nodes: HashMap<String, NodeInfo>,
    pub devices: HashMap<DeviceId, Device>,
    pub latest_metrics: HashMap<DeviceId, DeviceMetrics>,
    /// Projection of the topology graph (§3, §4.6) as a flat edge list.
    /// The query-optimized `petgraph` structure lives in `fabric-core`;
    /// this is the snapshot-embedded view callers can read without
    /// depending on a graph crate.
    pub edges: Vec<(DeviceId, DeviceId, LinkMetrics)>,
    pub instances: HashMap<String, InstanceRecord>,
    pub anomalies: Vec<AnomalyRecord>,
}

impl ClusterSnapshot {
    pub fn devices_on_node<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Device> {
        self.devices.values().filter(move |d| d.node_id == node_id)
    }

    pub fn link(&self, from: &DeviceId, to: &DeviceId) -> Option<&LinkMetrics> {
        self.edges
            .iter()
            .find(|(a, b, _)| a == from && b == to)
            .map(|(_, _, link)| link)
    }
}
