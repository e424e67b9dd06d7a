//! The per-backend handle table (§3 `MemoryHandle` invariant, §4.2: "a
//! process-local mapping from handle id to the vendor-native pointer/buffer
//! + owning-device ordinal + size, guarded by a lock; handle issuance uses a
//! collision-resistant random id"). Mirrors the lock-guarded, identity-keyed
//! table idiom of `wgpu-core::registry::Registry`, simplified: we have no
//! epoch/generation requirement because `HandleId` is a random UUID fresh on
//! every allocation, so reuse-after-free ambiguity (which the epoch scheme
//! in the teacher exists to resolve) cannot occur here.

use fabric_types::{DeviceId, FabricError, HandleId, MemoryHandle};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// The backend-owned storage behind a `MemoryHandle`: here, simulated
/// device memory is modeled as an actual byte buffer so host<->device
/// round trips are real and checkable (§8 round-trip law), not faked.
struct Entry {
    device_id: DeviceId,
    buffer: Vec<u8>,
}

pub struct HandleTable {
    component: &'static str,
    entries: Mutex<FxHashMap<HandleId, Entry>>,
}

impl HandleTable {
    pub fn new(component: &'static str) -> Self {
        HandleTable {
            component,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn insert(&self, device_id: DeviceId, size: u64, allocated_at_ms: u64) -> MemoryHandle {
        let id = HandleId::fresh();
        let handle = MemoryHandle {
            id,
            device_id: device_id.clone(),
            size_bytes: size,
            allocated_at_ms,
        };
        self.entries.lock().insert(
            id,
            Entry {
                device_id,
                buffer: vec![0u8; size as usize],
            },
        );
        handle
    }

    /// §3 invariant: a handle is valid iff present in the owning backend's
    /// allocation table; any other operation on it fails with `InvalidHandle`.
    pub fn remove(&self, handle: &MemoryHandle) -> Result<(), FabricError> {
        self.entries
            .lock()
            .remove(&handle.id)
            .map(|_| ())
            .ok_or_else(|| FabricError::InvalidHandle {
                component: self.component,
                device_id: Some(handle.device_id.to_string()),
            })
    }

    pub fn write(&self, handle: &MemoryHandle, src: &[u8], offset: u64) -> Result<(), FabricError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&handle.id)
            .ok_or_else(|| FabricError::InvalidHandle {
                component: self.component,
                device_id: Some(handle.device_id.to_string()),
            })?;
        let offset = offset as usize;
        let end = offset
            .checked_add(src.len())
            .filter(|&end| end <= entry.buffer.len())
            .ok_or_else(|| FabricError::RangeOverflow {
                component: self.component,
                device_id: Some(entry.device_id.to_string()),
            })?;
        entry.buffer[offset..end].copy_from_slice(src);
        Ok(())
    }

    pub fn read(&self, handle: &MemoryHandle, offset: u64, size: u64) -> Result<Vec<u8>, FabricError> {
        let entries = self.entries.lock();
        let entry = entries
            .get(&handle.id)
            .ok_or_else(|| FabricError::InvalidHandle {
                component: self.component,
                device_id: Some(handle.device_id.to_string()),
            })?;
        let offset = offset as usize;
        let end = offset
            .checked_add(size as usize)
            .filter(|&end| end <= entry.buffer.len())
            .ok_or_else(|| FabricError::RangeOverflow {
                component: self.component,
                device_id: Some(entry.device_id.to_string()),
            })?;
        Ok(entry.buffer[offset..end].to_vec())
    }

    /// Device-to-device copy staged entirely within this backend (both
    /// handles owned by the same table). Cross-backend peer copy is the
    /// caller's concern (§4.1 `PeerAccessUnsupported` policy).
    pub fn copy_within(
        &self,
        src: &MemoryHandle,
        dst: &MemoryHandle,
        size: u64,
    ) -> Result<(), FabricError> {
        let bytes = self.read(src, 0, size)?;
        self.write(dst, &bytes, 0)
    }

    pub fn contains(&self, handle: &MemoryHandle) -> bool {
        self.entries.lock().contains_key(&handle.id)
    }

    /// Total bytes currently allocated on a device, for memory accounting.
    pub fn used_bytes(&self, device_id: &DeviceId) -> u64 {
        self.entries
            .lock()
            .values()
            .filter(|e| &e.device_id == device_id)
            .map(|e| e.buffer.len() as u64)
            .sum()
    }

    /// Release every outstanding allocation (§4.2 shutdown discipline:
    /// "traversal of the handle table under lock, release each allocation,
    /// clear table"). Idempotent — an already-empty table is a no-op.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
