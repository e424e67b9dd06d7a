//! Event-sourced cluster state end-to-end (spec §4.5, §4.6): a full
//! node-join -> discover -> link -> request -> place -> retire -> leave
//! lifecycle folds into a consistent snapshot and a consistent topology.

use fabric_core::topology::TopologyGraph;
use fabric_core::{EventApplier, EventLog};
use fabric_types::event::{
    DeviceDiscovered, InstanceRequested, InstanceRetired, LinkMetricsMeasured, NodeJoined, NodeLeft,
    ShardPlaced,
};
use fabric_types::{BackendFamily, Device, DeviceId, EventKind, InstanceState, LinkMetrics};

fn device(tag: &str, node_id: &str) -> Device {
    Device {
        device_id: DeviceId::from(tag),
        node_id: node_id.into(),
        vendor: "NVIDIA".into(),
        family: BackendFamily::CudaFamily,
        compute_capability: "sm_90".into(),
        total_memory_bytes: 24 * 1024 * 1024 * 1024,
        compute_units: 128,
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
fn full_instance_lifecycle_folds_consistently_and_topology_mirrors_links() {
    let log = EventLog::new();
    let applier = EventApplier::new();
    let mut topology = TopologyGraph::new();

    let mut apply = |kind: EventKind| {
        let event = log.append(kind.clone());
        if let EventKind::LinkMetricsMeasured(ref e) = kind {
            topology.set_link(&e.from, &e.to, e.link);
        }
        applier.apply(&event)
    };

    apply(EventKind::NodeJoined(NodeJoined {
        node_id: "n0".into(),
        label: "node-0".into(),
        platform: "Linux".into(),
        joined_at_ms: 0,
    }));
    apply(EventKind::DeviceDiscovered(DeviceDiscovered {
        device: device("cuda:0", "n0"),
    }));
    apply(EventKind::DeviceDiscovered(DeviceDiscovered {
        device: device("cuda:1", "n0"),
    }));
    apply(EventKind::LinkMetricsMeasured(LinkMetricsMeasured {
        from: DeviceId::from("cuda:0"),
        to: DeviceId::from("cuda:1"),
        link: LinkMetrics {
            latency_ms: 1.0,
            bandwidth_mbps: 50_000.0,
            peer_access_supported: true,
            peer_access_bandwidth_mbps: Some(200_000.0),
        },
    }));
    apply(EventKind::InstanceRequested(InstanceRequested {
        instance_id: "inst-0".into(),
        requested_at_ms: 10,
    }));
    apply(EventKind::ShardPlaced(ShardPlaced {
        instance_id: "inst-0".into(),
        shard_ordinal: 0,
        device_id: DeviceId::from("cuda:0"),
        pipeline_len: 2,
    }));
    let snapshot = apply(EventKind::ShardPlaced(ShardPlaced {
        instance_id: "inst-0".into(),
        shard_ordinal: 1,
        device_id: DeviceId::from("cuda:1"),
        pipeline_len: 2,
    }));

    assert!(snapshot.anomalies.is_empty());
    let instance = snapshot.instances.get("inst-0").unwrap();
    assert_eq!(instance.state, InstanceState::Active);
    assert_eq!(
        topology.link(&DeviceId::from("cuda:0"), &DeviceId::from("cuda:1")).unwrap().bandwidth_mbps,
        50_000.0
    );

    apply(EventKind::InstanceRetired(InstanceRetired {
        instance_id: "inst-0".into(),
        reason: "client disconnected".into(),
    }));
    let final_snapshot = apply(EventKind::NodeLeft(NodeLeft {
        node_id: "n0".into(),
        left_at_ms: 20,
    }));

    assert_eq!(
        final_snapshot.instances.get("inst-0").unwrap().state,
        InstanceState::Retired
    );
    assert!(final_snapshot.devices.is_empty());
    assert_eq!(log.len(), 9);
    assert_eq!(log.replay_from(0).len(), 9);
}
