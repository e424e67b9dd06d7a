//! Event-Sourced State (§4.5): an append-only log, a deterministic fold into
//! `ClusterSnapshot`, and copy-on-write snapshot publication.

use arc_swap::ArcSwap;
use fabric_types::{
    AnomalyRecord, ClusterSnapshot, Event, EventKind, InstanceRecord, InstanceState, NodeInfo,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Append-only store of every event the cluster has emitted, in order.
/// Mirrors `wgpu-core::registry::Registry`'s lock-guarded table idiom: one
/// `Mutex` around the backing storage, a monotonic counter for identity.
pub struct EventLog {
    events: Mutex<Vec<Event>>,
    next_ordinal: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog {
            events: Mutex::new(Vec::new()),
            next_ordinal: AtomicU64::new(0),
        }
    }

    /// Assign the next ordinal and append. Ordinals are strictly increasing
    /// and never reused, independent of how many producers call this
    /// concurrently (§3: "each event carries a strictly increasing ordinal").
    pub fn append(&self, kind: EventKind) -> Event {
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        let event = Event { ordinal, kind };
        self.events.lock().push(event.clone());
        event
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All events at or after `from_ordinal`, oldest first.
    pub fn replay_from(&self, from_ordinal: u64) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.ordinal >= from_ordinal)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds events into a `ClusterSnapshot` and publishes the result via
/// copy-on-write (§4.5, §5: "readers always see a consistent, unchanging
/// reference"). One applier owns one snapshot lineage; `apply` is meant to
/// be called from a single dedicated thread (§5), so it takes `&self` but
/// relies on the caller serializing calls — `ArcSwap` only needs to make
/// the *publish* side safe for concurrent readers, not concurrent writers.
pub struct EventApplier {
    current: ArcSwap<ClusterSnapshot>,
}

impl EventApplier {
    pub fn new() -> Self {
        EventApplier {
            current: ArcSwap::from_pointee(ClusterSnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> Arc<ClusterSnapshot> {
        self.current.load_full()
    }

    /// Fold one event into the current snapshot and publish the result.
    /// Never panics: a malformed or unresolvable event is recorded in
    /// `anomalies` instead (§4.5: "no event causes a crash").
    pub fn apply(&self, event: &Event) -> Arc<ClusterSnapshot> {
        let mut next = (*self.current.load_full()).clone();
        next.ordinal = event.ordinal;
        if let Err(reason) = apply_kind(&mut next, &event.kind) {
            next.anomalies.push(AnomalyRecord {
                ordinal: event.ordinal,
                reason,
                raw_debug: format!("{:?}", event.kind),
            });
        }
        let published = Arc::new(next);
        self.current.store(published.clone());
        published
    }
}

impl Default for EventApplier {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_kind(snapshot: &mut ClusterSnapshot, kind: &EventKind) -> Result<(), String> {
    match kind {
        EventKind::NodeJoined(e) => {
            snapshot.nodes.insert(
                e.node_id.clone(),
                NodeInfo {
                    node_id: e.node_id.clone(),
                    label: e.label.clone(),
                    platform: parse_platform(&e.platform)?,
                    joined_at_ms: e.joined_at_ms,
                },
            );
            Ok(())
        }
        EventKind::NodeLeft(e) => {
            if snapshot.nodes.remove(&e.node_id).is_none() {
                return Err(format!("NodeLeft for unknown node {}", e.node_id));
            }
            snapshot.devices.retain(|_, d| d.node_id != e.node_id);
            snapshot
                .latest_metrics
                .retain(|id, _| snapshot.devices.contains_key(id));
            snapshot
                .edges
                .retain(|(from, to, _)| snapshot.devices.contains_key(from) && snapshot.devices.contains_key(to));
            Ok(())
        }
        EventKind::DeviceDiscovered(e) => {
            snapshot.devices.insert(e.device.device_id.clone(), e.device.clone());
            Ok(())
        }
        EventKind::DeviceMetricsUpdated(e) => {
            if !snapshot.devices.contains_key(&e.metrics.device_id) {
                return Err(format!(
                    "DeviceMetricsUpdated for unknown device {}",
                    e.metrics.device_id
                ));
            }
            if !e.metrics.is_valid() {
                return Err(format!("invalid metrics sample for {}", e.metrics.device_id));
            }
            snapshot
                .latest_metrics
                .insert(e.metrics.device_id.clone(), e.metrics.clone());
            Ok(())
        }
        EventKind::LinkMetricsMeasured(e) => {
            if !snapshot.devices.contains_key(&e.from) || !snapshot.devices.contains_key(&e.to) {
                return Err(format!("LinkMetricsMeasured for unknown edge {}->{}", e.from, e.to));
            }
            if let Some(slot) = snapshot
                .edges
                .iter_mut()
                .find(|(from, to, _)| *from == e.from && *to == e.to)
            {
                slot.2 = e.link;
            } else {
                snapshot.edges.push((e.from.clone(), e.to.clone(), e.link));
            }
            Ok(())
        }
        EventKind::InstanceRequested(e) => {
            if snapshot.instances.contains_key(&e.instance_id) {
                return Err(format!("duplicate InstanceRequested for {}", e.instance_id));
            }
            let mut record = InstanceRecord::new(e.instance_id.clone(), e.requested_at_ms);
            // Requested -> Placing happens immediately: the request event is
            // itself the trigger that hands the instance to the placement
            // engine (§4.5 state machine).
            record.state = InstanceState::Placing;
            snapshot.instances.insert(e.instance_id.clone(), record);
            Ok(())
        }
        EventKind::ShardPlaced(e) => {
            let record = snapshot
                .instances
                .get_mut(&e.instance_id)
                .ok_or_else(|| format!("ShardPlaced for unknown instance {}", e.instance_id))?;
            if record.state != InstanceState::Placing && record.state != InstanceState::Active {
                return Err(format!(
                    "ShardPlaced for instance {} in state {:?}",
                    e.instance_id, record.state
                ));
            }
            let placement = record.placement.get_or_insert_with(|| fabric_types::Placement {
                instance_id: e.instance_id.clone(),
                assignment: Vec::new(),
                decision_log: fabric_types::DecisionLog {
                    solver_path: fabric_types::SolverPath::Greedy,
                    heterogeneous: false,
                    elapsed: std::time::Duration::ZERO,
                    scores: Vec::new(),
                    violated_link_latency: Vec::new(),
                },
            });
            if let Some(slot) = placement
                .assignment
                .iter_mut()
                .find(|(ord, _)| *ord == e.shard_ordinal)
            {
                slot.1 = e.device_id.clone();
            } else {
                placement.assignment.push((e.shard_ordinal, e.device_id.clone()));
            }
            if placement.assignment.len() >= e.pipeline_len {
                record.state = InstanceState::Active;
            }
            Ok(())
        }
        EventKind::InstanceRetired(e) => {
            let record = snapshot
                .instances
                .get_mut(&e.instance_id)
                .ok_or_else(|| format!("InstanceRetired for unknown instance {}", e.instance_id))?;
            // The simulated backends deallocate synchronously, so there is
            // no distinct "shards deallocated" acknowledgement event to
            // await between Retiring and Retired; both transitions happen
            // in this single apply.
            record.state = InstanceState::Retired;
            record.retirement_reason = Some(e.reason.clone());
            Ok(())
        }
        EventKind::AccessGranted(_) | EventKind::AccessRevoked(_) => {
            // Token lifecycle is owned by `access_control::AccessControl`,
            // not the cluster snapshot; these events are logged to the
            // event log for audit replay but don't fold into cluster state.
            Ok(())
        }
    }
}

fn parse_platform(s: &str) -> Result<fabric_types::PlatformTag, String> {
    match s {
        "Linux" => Ok(fabric_types::PlatformTag::Linux),
        "Windows" => Ok(fabric_types::PlatformTag::Windows),
        "MacOs" => Ok(fabric_types::PlatformTag::MacOs),
        "Mobile" => Ok(fabric_types::PlatformTag::Mobile),
        other => Err(format!("unknown platform tag {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_types::event::NodeJoined;
    use fabric_types::{BackendFamily, Device, DeviceId, DeviceMetrics};

    fn device(id: &str, node: &str) -> Device {
        Device {
            device_id: DeviceId::from(id),
            node_id: node.into(),
            vendor: "NVIDIA".into(),
            family: BackendFamily::CudaFamily,
            compute_capability: "sm_90".into(),
            total_memory_bytes: 80 * 1024 * 1024 * 1024,
            compute_units: 132,
            peak_clock_mhz: 1800,
            peak_bandwidth_gb_s: 3350.0,
            tensor_unit_count: 528,
            mobility_flag: false,
            thermal_envelope_flag: true,
            supports_peer_access: false,
            driver_version: "550.0".into(),
        }
    }

    #[test]
    fn node_left_prunes_its_devices_and_metrics() {
        let applier = EventApplier::new();
        applier.apply(&Event {
            ordinal: 0,
            kind: EventKind::NodeJoined(NodeJoined {
                node_id: "n0".into(),
                label: "node-0".into(),
                platform: "Linux".into(),
                joined_at_ms: 0,
            }),
        });
        applier.apply(&Event {
            ordinal: 1,
            kind: EventKind::DeviceDiscovered(fabric_types::event::DeviceDiscovered {
                device: device("cuda:0", "n0"),
            }),
        });
        let snapshot = applier.apply(&Event {
            ordinal: 2,
            kind: EventKind::NodeLeft(fabric_types::event::NodeLeft {
                node_id: "n0".into(),
                left_at_ms: 10,
            }),
        });
        assert!(snapshot.devices.is_empty());
        assert!(snapshot.nodes.is_empty());
        assert!(snapshot.anomalies.is_empty());
    }

    #[test]
    fn unknown_device_metrics_becomes_an_anomaly_not_a_panic() {
        let applier = EventApplier::new();
        let snapshot = applier.apply(&Event {
            ordinal: 0,
            kind: EventKind::DeviceMetricsUpdated(fabric_types::event::DeviceMetricsUpdated {
                metrics: DeviceMetrics {
                    device_id: DeviceId::from("cuda:0"),
                    timestamp_ms: 0,
                    memory_used_bytes: 0,
                    memory_total_bytes: 1,
                    compute_util_pct: 0.0,
                    temperature_c: None,
                    power_w: None,
                    clock_mhz: None,
                    is_throttling: false,
                },
            }),
        });
        assert_eq!(snapshot.anomalies.len(), 1);
        assert!(snapshot.latest_metrics.is_empty());
    }

    #[test]
    fn instance_becomes_active_once_every_shard_is_placed() {
        let applier = EventApplier::new();
        applier.apply(&Event {
            ordinal: 0,
            kind: EventKind::InstanceRequested(fabric_types::event::InstanceRequested {
                instance_id: "inst-0".into(),
                requested_at_ms: 0,
            }),
        });
        applier.apply(&Event {
            ordinal: 1,
            kind: EventKind::ShardPlaced(fabric_types::event::ShardPlaced {
                instance_id: "inst-0".into(),
                shard_ordinal: 0,
                device_id: DeviceId::from("cuda:0"),
                pipeline_len: 2,
            }),
        });
        let snapshot = applier.apply(&Event {
            ordinal: 2,
            kind: EventKind::ShardPlaced(fabric_types::event::ShardPlaced {
                instance_id: "inst-0".into(),
                shard_ordinal: 1,
                device_id: DeviceId::from("cuda:1"),
                pipeline_len: 2,
            }),
        });
        let record = snapshot.instances.get("inst-0").unwrap();
        assert_eq!(record.state, InstanceState::Active);
        assert_eq!(record.placement.as_ref().unwrap().assignment.len(), 2);
    }

    #[test]
    fn replay_from_ordinal_skips_earlier_events() {
        let log = EventLog::new();
        for i in 0..5u64 {
            log.append(EventKind::NodeLeft(fabric_types::event::NodeLeft {
                node_id: format!("n{i}"),
                left_at_ms: i,
            }));
        }
        assert_eq!(log.replay_from(3).len(), 2);
        assert_eq!(log.len(), 5);
    }
}
