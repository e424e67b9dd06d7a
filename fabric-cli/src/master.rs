//! Master process (§4.7, §6): discovers devices locally (peer-discovery
//! transport is out of scope for this crate — see SPEC_FULL.md §6), builds
//! a `RuntimeContext`, places a synthetic pipeline against the discovered
//! devices, and prints the resulting `PlacementOutcome` as JSON.

use fabric_core::{audit, RuntimeContext};
use fabric_types::event::{DeviceDiscovered, NodeJoined};
use fabric_types::{CapabilityToken, EventKind, FabricConfig, FabricError, Permission, PlatformTag, Shard};
use std::collections::HashSet;
use std::sync::Arc;

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub async fn run(
    config: FabricConfig,
    platform: PlatformTag,
    device_count: usize,
    shards: usize,
    shard_memory_bytes: u64,
) -> Result<(), FabricError> {
    let backends = fabric_hal::backends_for_platform(platform, &config.node_label, device_count);
    let (devices, live_backends, _primary) = fabric_hal::discover_all(&backends).await;

    let (ctx, audit_rx) = RuntimeContext::new(config.clone(), live_backends);
    let ctx = Arc::new(ctx);

    let audit_sink = audit::AuditSink::from(&config.audit_sink);
    let flush_handle = tokio::spawn(audit::run_flush_task(audit_rx, audit_sink, ctx.shutdown_token()));

    let self_token_id = format!("self:{}", config.node_label);
    let self_principal = format!("master:{}", config.node_label);
    ctx.access_control().grant(CapabilityToken {
        token_id: self_token_id.clone(),
        principal_id: self_principal,
        permissions: [
            Permission::List,
            Permission::Allocate,
            Permission::Deallocate,
            Permission::CopyHostToDevice,
            Permission::CopyDeviceToHost,
            Permission::CopyDeviceToDevice,
        ]
        .into_iter()
        .collect(),
        device_whitelist: None,
        memory_quota_bytes: None,
        issued_at_ms: now_ms(),
        expires_at_ms: None,
    });

    ctx.apply_event(EventKind::NodeJoined(NodeJoined {
        node_id: config.node_label.clone(),
        label: config.node_label.clone(),
        platform: format!("{platform:?}"),
        joined_at_ms: 0,
    }));
    for device in &devices {
        ctx.apply_event(EventKind::DeviceDiscovered(DeviceDiscovered {
            device: device.clone(),
        }));
        if let Err(err) = ctx.verify_device_readiness(&self_token_id, &device.device_id).await {
            tracing::warn!(device_id = %device.device_id, error = %err, "device readiness gate failed");
        }
    }

    let pipeline = synthetic_pipeline(shards, shard_memory_bytes);
    let snapshot = ctx.snapshot();
    let outcome = ctx.with_topology(|topology| {
        fabric_core::place(&pipeline, &devices, &snapshot, topology, &ctx.config)
    });

    let json = serde_json::to_string_pretty(&outcome).map_err(|e| FabricError::Configuration {
        component: "master",
        message: e.to_string(),
    })?;
    println!("{json}");

    ctx.begin_shutdown();
    let _ = flush_handle.await;

    Ok(())
}

fn synthetic_pipeline(shards: usize, shard_memory_bytes: u64) -> fabric_types::Pipeline {
    let precisions: HashSet<String> = ["fp16", "fp32"].iter().map(|s| s.to_string()).collect();
    fabric_types::Pipeline {
        instance_id: "demo-instance".into(),
        shards: (0..shards)
            .map(|ordinal| Shard {
                ordinal,
                compute_flops: 1.0e12,
                memory_bytes: shard_memory_bytes,
                input_bytes: 1024 * 1024,
                output_bytes: 1024 * 1024,
                supported_precisions: precisions.clone(),
            })
            .collect(),
    }
}
