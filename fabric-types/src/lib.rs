//! Data model shared by `fabric-hal`, `fabric-core`, and `fabric-cli`:
//! device identity, handles, telemetry, events, shards/placement, access
//! control, configuration, and the error taxonomy (spec §3, §6, §7).

pub mod access;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod memory;
pub mod metrics;
pub mod shard;
pub mod snapshot;
pub mod topology;

pub use access::{AuditOutcome, AuditRecord, CapabilityToken, Permission};
pub use config::{AuditSinkConfig, FabricConfig};
pub use device::{BackendFamily, Device, DeviceId, PlatformTag};
pub use error::FabricError;
pub use event::{Event, EventKind};
pub use memory::{HandleId, MemoryHandle};
pub use metrics::{DeviceMetrics, Ring, TelemetryHistory, ABSOLUTE_ZERO_C};
pub use shard::{
    DecisionLog, Pipeline, Placement, PlacementFailureReason, PlacementOutcome, Shard,
    ShardScore, SolverPath,
};
pub use snapshot::{AnomalyRecord, ClusterSnapshot, InstanceRecord, InstanceState, NodeInfo};
pub use topology::LinkMetrics;
