//! Worker process (§5, §6): discovers local devices, persists the registry,
//! runs one `TelemetryCollector` per device forwarding into a
//! `RuntimeContext`, and drives a thermal executor per mobility-class
//! device, until `ctrl_c` requests a graceful shutdown.

use fabric_core::{audit, RuntimeContext, ThermalExecutor};
use fabric_types::event::{DeviceDiscovered, NodeJoined};
use fabric_types::{CapabilityToken, EventKind, FabricConfig, FabricError, Permission, PlatformTag};
use std::sync::Arc;
use std::time::Duration;

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub async fn run(config: FabricConfig, platform: PlatformTag, device_count: usize) -> Result<(), FabricError> {
    let backends = fabric_hal::backends_for_platform(platform, &config.node_label, device_count);
    let (devices, live_backends, primary) = fabric_hal::discover_all(&backends).await;

    let report = fabric_hal::build_report(platform, primary, &devices);
    let registry_path = config
        .registry_path
        .clone()
        .unwrap_or_else(fabric_hal::default_registry_path);
    if let Err(err) = fabric_hal::write_registry_atomic(&registry_path, &report) {
        tracing::warn!(error = %err, "failed to persist device registry");
    }

    let (ctx, audit_rx) = RuntimeContext::new(config.clone(), live_backends);
    let ctx = Arc::new(ctx);

    let self_token_id = format!("self:{}", config.node_label);
    let self_principal = format!("worker:{}", config.node_label);
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

    let now = now_ms();
    ctx.apply_event(EventKind::NodeJoined(NodeJoined {
        node_id: config.node_label.clone(),
        label: config.node_label.clone(),
        platform: format!("{platform:?}"),
        joined_at_ms: now,
    }));
    for device in &devices {
        ctx.apply_event(EventKind::DeviceDiscovered(DeviceDiscovered {
            device: device.clone(),
        }));
        if let Err(err) = ctx.verify_device_readiness(&self_token_id, &device.device_id).await {
            tracing::warn!(device_id = %device.device_id, error = %err, "device readiness gate failed");
        }
    }

    let audit_sink = audit::AuditSink::from(&config.audit_sink);
    let flush_handle = tokio::spawn(audit::run_flush_task(audit_rx, audit_sink, ctx.shutdown_token()));

    let telemetry_interval = Duration::from_millis(config.telemetry_interval_ms);
    let mut telemetry_handles = Vec::new();
    let mut thermal_handles = Vec::new();
    for device in &devices {
        let Some(backend) = ctx.backend_for(device.family).cloned() else {
            continue;
        };
        let collector = fabric_core::TelemetryCollector::new(device.clone(), config.history_depth);
        let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(config.history_depth.max(1));
        let cancel = ctx.shutdown_token();
        telemetry_handles.push(tokio::spawn(collector.run(backend, telemetry_interval, event_tx, cancel)));

        let ctx_for_forward = ctx.clone();
        let forward_cancel = ctx.shutdown_token();
        telemetry_handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = forward_cancel.cancelled() => break,
                    event = event_rx.recv() => match event {
                        Some(kind) => {
                            ctx_for_forward.apply_event(kind);
                        }
                        None => break,
                    },
                }
            }
        }));

        if device.mobility_flag {
            let mut executor = ThermalExecutor::new(
                device.clone(),
                config.thermal_safe_margin_c as f64,
                config.thermal_resume_margin_c as f64,
                Default::default(),
            );
            let thermal_cancel = ctx.shutdown_token();
            thermal_handles.push(tokio::spawn(async move {
                while !thermal_cancel.is_cancelled() {
                    executor
                        .before_layer(fabric_core::thermal::LayerProfile {
                            power_w: 0.0,
                            duration_s: 0.0,
                        })
                        .await;
                    tokio::select! {
                        _ = thermal_cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                    }
                }
            }));
        }
    }

    tracing::info!(node_label = %ctx.config.node_label, devices = devices.len(), "worker ready");
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining tasks");
    ctx.begin_shutdown();

    for handle in telemetry_handles {
        let _ = handle.await;
    }
    for handle in thermal_handles {
        let _ = handle.await;
    }
    let _ = flush_handle.await;

    Ok(())
}
