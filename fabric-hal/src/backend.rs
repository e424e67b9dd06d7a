//! The backend contract (§4.1): a capability set every adapter satisfies.
//! Expressed as a single object-safe trait — `fabric-core` holds
//! `Vec<Arc<dyn Backend>>`, one per discovered family, dispatched through
//! the sealed `BackendFamily` enum (§9 redesign note: replace duck-typed
//! classes with a sealed variant + interface, exhaustive match at the
//! dispatch site, no reflection). `async_trait` keeps the trait
//! object-safe with `async fn` methods, the same shape used throughout the
//! reference pack's accelerator-backend traits.

use async_trait::async_trait;
use fabric_types::{BackendFamily, Device, DeviceId, FabricError, MemoryHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryQuery {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn family(&self) -> BackendFamily;

    /// `initialize()`: probe the driver/runtime and return the devices it
    /// exposes. `BackendUnavailable` if no driver/runtime is present at all;
    /// individual device failures are reported as `DeviceInitFailed` and the
    /// device is simply absent from the returned list (§4.1).
    async fn initialize(&self) -> Result<Vec<Device>, FabricError>;

    /// Never fails; idempotent; frees all outstanding handles (§4.1).
    async fn shutdown(&self);

    fn list_devices(&self) -> Vec<Device>;

    async fn allocate(&self, device_id: &DeviceId, size: u64) -> Result<MemoryHandle, FabricError>;

    /// `InvalidHandle` is logged, not fatal (§4.1).
    async fn deallocate(&self, handle: &MemoryHandle) -> Result<(), FabricError>;

    async fn copy_host_to_device(
        &self,
        src: &[u8],
        dst: &MemoryHandle,
        offset: u64,
    ) -> Result<(), FabricError>;

    async fn copy_device_to_host(
        &self,
        src: &MemoryHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, FabricError>;

    /// Backends need not implement this; when unsupported, fail with
    /// `PeerAccessUnsupported` so the caller stages through host memory
    /// (§4.1). `supports_peer_copy` lets the placement engine see this
    /// ahead of time instead of discovering it by a failed call.
    async fn copy_device_to_device(
        &self,
        src: &MemoryHandle,
        dst: &MemoryHandle,
        size: u64,
    ) -> Result<(), FabricError>;

    async fn synchronize(&self, device_id: &DeviceId) -> Result<(), FabricError>;

    async fn query_memory(&self, device_id: &DeviceId) -> Result<MemoryQuery, FabricError>;

    /// `None` if the vendor exposes no such API — never fabricate a value
    /// (§4.2); the scorer treats `None` as "assume headroom" (§4.7).
    async fn query_thermal(&self, device_id: &DeviceId) -> Result<Option<f32>, FabricError>;

    async fn query_power(&self, device_id: &DeviceId) -> Result<Option<f32>, FabricError>;

    async fn query_clock(&self, device_id: &DeviceId) -> Result<Option<u32>, FabricError>;

    fn supports_peer_copy(&self, src: &DeviceId, dst: &DeviceId) -> bool;
}
