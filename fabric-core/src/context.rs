//! `RuntimeContext` (§9 redesign note: "replace module-level singletons
//! with an explicit context struct threaded through the call graph").
//! Bundles discovered backends, event-sourced state, topology, access
//! control, and the audit log — everything a worker or master process
//! needs, owned in one place instead of scattered statics.

use crate::access_control::AccessControl;
use crate::audit::AuditLog;
use crate::event_log::{EventApplier, EventLog};
use crate::now_ms;
use crate::topology::TopologyGraph;
use fabric_hal::Backend;
use fabric_types::{
    AuditRecord, BackendFamily, ClusterSnapshot, DeviceId, EventKind, FabricConfig, FabricError,
    MemoryHandle, Permission,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct RuntimeContext {
    pub config: FabricConfig,
    backends: Vec<Arc<dyn Backend>>,
    event_log: Arc<EventLog>,
    applier: Arc<EventApplier>,
    topology: RwLock<TopologyGraph>,
    access_control: Arc<AccessControl>,
    audit: Arc<AuditLog>,
    shutdown: CancellationToken,
}

impl RuntimeContext {
    /// Build a fresh context. Returns the audit channel's receiving end
    /// alongside it — the caller (the worker/master entry point) owns
    /// spawning `audit::run_flush_task` against it, since only the entry
    /// point knows the runtime it should run on.
    pub fn new(config: FabricConfig, backends: Vec<Arc<dyn Backend>>) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (audit, audit_rx) = AuditLog::new(config.audit_buffer_size);
        let ctx = RuntimeContext {
            config,
            backends,
            event_log: Arc::new(EventLog::new()),
            applier: Arc::new(EventApplier::new()),
            topology: RwLock::new(TopologyGraph::new()),
            access_control: Arc::new(AccessControl::new()),
            audit: Arc::new(audit),
            shutdown: CancellationToken::new(),
        };
        (ctx, audit_rx)
    }

    pub fn snapshot(&self) -> Arc<ClusterSnapshot> {
        self.applier.snapshot()
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    pub fn backend_for(&self, family: BackendFamily) -> Option<&Arc<dyn Backend>> {
        self.backends.iter().find(|b| b.family() == family)
    }

    pub fn access_control(&self) -> &Arc<AccessControl> {
        &self.access_control
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.event_log
    }

    /// Run a read-only query against the live topology graph (§4.6). Kept
    /// behind a closure rather than exposing the lock guard directly so
    /// callers can't accidentally hold it across an `.await`.
    pub fn with_topology<R>(&self, f: impl FnOnce(&TopologyGraph) -> R) -> R {
        f(&self.topology.read())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Append an event, fold it into the cluster snapshot, and mirror
    /// topology-affecting events into the live `TopologyGraph`. The
    /// snapshot's `edges` field stays the serializable projection;
    /// `TopologyGraph` is the query-optimized structure used by placement
    /// and reachability queries (§3, §4.6).
    pub fn apply_event(&self, kind: EventKind) -> Arc<ClusterSnapshot> {
        match &kind {
            EventKind::LinkMetricsMeasured(e) => {
                self.topology.write().set_link(&e.from, &e.to, e.link);
            }
            EventKind::NodeLeft(e) => {
                let snapshot = self.applier.snapshot();
                let mut topology = self.topology.write();
                for device in snapshot.devices_on_node(&e.node_id) {
                    topology.remove_device(&device.device_id);
                }
            }
            _ => {}
        }
        let event = self.event_log.append(kind);
        self.applier.apply(&event)
    }

    fn backend_owning(&self, device_id: &DeviceId) -> Option<&Arc<dyn Backend>> {
        self.backends
            .iter()
            .find(|b| b.list_devices().iter().any(|d| &d.device_id == device_id))
    }

    /// `Allocate`, then on success credit the token's quota (§4.9). The
    /// gate runs before the backend ever sees the call, so a denied request
    /// never touches device state.
    pub async fn allocate(&self, token_id: &str, device_id: &DeviceId, size: u64) -> Result<MemoryHandle, FabricError> {
        self.access_control.check(
            &self.audit,
            token_id,
            Permission::Allocate,
            Some(device_id.0.as_str()),
            Some(size),
            now_ms(),
        )?;
        let backend = self.backend_owning(device_id).ok_or_else(|| FabricError::UnknownDevice {
            component: "runtime_context",
            device_id: device_id.0.clone(),
        })?;
        let handle = backend.allocate(device_id, size).await?;
        if let Some(principal) = self.access_control.principal_for(token_id) {
            self.access_control.record_allocation(&principal, size);
        }
        Ok(handle)
    }

    /// `Deallocate`, then release the quota the matching allocation held.
    pub async fn deallocate(&self, token_id: &str, handle: &MemoryHandle) -> Result<(), FabricError> {
        self.access_control.check(
            &self.audit,
            token_id,
            Permission::Deallocate,
            Some(handle.device_id.0.as_str()),
            None,
            now_ms(),
        )?;
        let backend = self.backend_owning(&handle.device_id).ok_or_else(|| FabricError::UnknownDevice {
            component: "runtime_context",
            device_id: handle.device_id.0.clone(),
        })?;
        backend.deallocate(handle).await?;
        if let Some(principal) = self.access_control.principal_for(token_id) {
            self.access_control.release_allocation(&principal, handle.size_bytes);
        }
        Ok(())
    }

    pub async fn copy_host_to_device(&self, token_id: &str, src: &[u8], dst: &MemoryHandle, offset: u64) -> Result<(), FabricError> {
        self.access_control.check(
            &self.audit,
            token_id,
            Permission::CopyHostToDevice,
            Some(dst.device_id.0.as_str()),
            None,
            now_ms(),
        )?;
        let backend = self.backend_owning(&dst.device_id).ok_or_else(|| FabricError::UnknownDevice {
            component: "runtime_context",
            device_id: dst.device_id.0.clone(),
        })?;
        backend.copy_host_to_device(src, dst, offset).await
    }

    pub async fn copy_device_to_host(&self, token_id: &str, src: &MemoryHandle, offset: u64, size: u64) -> Result<Vec<u8>, FabricError> {
        self.access_control.check(
            &self.audit,
            token_id,
            Permission::CopyDeviceToHost,
            Some(src.device_id.0.as_str()),
            None,
            now_ms(),
        )?;
        let backend = self.backend_owning(&src.device_id).ok_or_else(|| FabricError::UnknownDevice {
            component: "runtime_context",
            device_id: src.device_id.0.clone(),
        })?;
        backend.copy_device_to_host(src, offset, size).await
    }

    /// Checked against the destination device's whitelist; the source
    /// device is implicitly covered since a cross-backend handle pair would
    /// already fail inside the backend's own copy implementation (§4.1).
    pub async fn copy_device_to_device(&self, token_id: &str, src: &MemoryHandle, dst: &MemoryHandle, size: u64) -> Result<(), FabricError> {
        self.access_control.check(
            &self.audit,
            token_id,
            Permission::CopyDeviceToDevice,
            Some(dst.device_id.0.as_str()),
            None,
            now_ms(),
        )?;
        let backend = self.backend_owning(&dst.device_id).ok_or_else(|| FabricError::UnknownDevice {
            component: "runtime_context",
            device_id: dst.device_id.0.clone(),
        })?;
        backend.copy_device_to_device(src, dst, size).await
    }

    /// Gate a `List`-permission readiness probe for `device_id`: round-trips
    /// a one-byte allocate/deallocate pair through the owning backend,
    /// verifying both the capability gate and the backend path are live
    /// before the caller relies on either.
    pub async fn verify_device_readiness(&self, token_id: &str, device_id: &DeviceId) -> Result<(), FabricError> {
        self.access_control.check(
            &self.audit,
            token_id,
            Permission::List,
            Some(device_id.0.as_str()),
            None,
            now_ms(),
        )?;
        if self.backend_owning(device_id).is_none() {
            return Err(FabricError::UnknownDevice {
                component: "runtime_context",
                device_id: device_id.0.clone(),
            });
        }
        let handle = self.allocate(token_id, device_id, 1).await?;
        self.deallocate(token_id, &handle).await
    }
}
