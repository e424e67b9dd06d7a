//! The event-sourcing wire vocabulary (§3 `Event`, §6 wire format).

use crate::device::{Device, DeviceId};
use crate::metrics::DeviceMetrics;
use crate::topology::LinkMetrics;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct NodeJoined {
    pub node_id: String,
    pub label: String,
    pub platform: String,
    pub joined_at_ms: u64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLeft {
    pub node_id: String,
    pub left_at_ms: u64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDiscovered {
    pub device: Device,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMetricsUpdated {
    pub metrics: DeviceMetrics,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LinkMetricsMeasured {
    pub from: DeviceId,
    pub to: DeviceId,
    pub link: LinkMetrics,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRequested {
    pub instance_id: String,
    pub requested_at_ms: u64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ShardPlaced {
    pub instance_id: String,
    pub shard_ordinal: usize,
    pub device_id: DeviceId,
    pub pipeline_len: usize,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRetired {
    pub instance_id: String,
    pub reason: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AccessGranted {
    pub token_id: String,
    pub principal_id: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRevoked {
    pub token_id: String,
}

/// Tagged variant over every event kind the cluster emits (§3). Carries no
/// ordinal itself — the ordinal is assigned at append time by the event log
/// and stored alongside the payload (§6 wire format: `{ ordinal, kind, payload }`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "payload"))]
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    NodeJoined(NodeJoined),
    NodeLeft(NodeLeft),
    DeviceDiscovered(DeviceDiscovered),
    DeviceMetricsUpdated(DeviceMetricsUpdated),
    LinkMetricsMeasured(LinkMetricsMeasured),
    InstanceRequested(InstanceRequested),
    ShardPlaced(ShardPlaced),
    InstanceRetired(InstanceRetired),
    AccessGranted(AccessGranted),
    AccessRevoked(AccessRevoked),
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::NodeJoined(_) => "NodeJoined",
            EventKind::NodeLeft(_) => "NodeLeft",
            EventKind::DeviceDiscovered(_) => "DeviceDiscovered",
            EventKind::DeviceMetricsUpdated(_) => "DeviceMetricsUpdated",
            EventKind::LinkMetricsMeasured(_) => "LinkMetricsMeasured",
            EventKind::InstanceRequested(_) => "InstanceRequested",
            EventKind::ShardPlaced(_) => "ShardPlaced",
            EventKind::InstanceRetired(_) => "InstanceRetired",
            EventKind::AccessGranted(_) => "AccessGranted",
            EventKind::AccessRevoked(_) => "AccessRevoked",
        }
    }
}

/// A monotonic-ordinal-tagged event, as it lives in and is replayed from the
/// log (§3, §4.5).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub ordinal: u64,
    pub kind: EventKind,
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn event_round_trips_through_json_for_every_variant() {
        let samples = vec![
            EventKind::NodeJoined(NodeJoined {
                node_id: "n0".into(),
                label: "node-0".into(),
                platform: "Linux".into(),
                joined_at_ms: 1,
            }),
            EventKind::NodeLeft(NodeLeft {
                node_id: "n0".into(),
                left_at_ms: 2,
            }),
            EventKind::AccessRevoked(AccessRevoked {
                token_id: "t0".into(),
            }),
        ];
        for kind in samples {
            let event = Event { ordinal: 7, kind };
            let json = serde_json::to_string(&event).unwrap();
            let back: Event = serde_json::from_str(&json).unwrap();
            assert_eq!(event, back);
        }
    }
}
