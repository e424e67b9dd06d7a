//! Cluster-level runtime: telemetry collection (§4.4), event-sourced state
//! (§4.5), topology (§4.6), placement (§4.7), the thermal-adaptive executor
//! (§4.8), and access control & audit (§4.9) — tied together by
//! `RuntimeContext`, the explicit context struct replacing module-level
//! singletons (§9 redesign note).

pub mod access_control;
pub mod audit;
pub mod context;
pub mod event_log;
pub mod placement;
pub mod telemetry;
pub mod thermal;
pub mod topology;

pub use access_control::AccessControl;
pub use audit::{AuditLog, AuditSink};
pub use context::RuntimeContext;
pub use event_log::{EventApplier, EventLog};
pub use placement::place;
pub use telemetry::TelemetryCollector;
pub use thermal::ThermalExecutor;
pub use topology::TopologyGraph;

/// Wall-clock milliseconds since the epoch, used wherever an event payload
/// or audit record needs a timestamp. Centralized so every component stamps
/// time the same way.
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
