//! `MemoryHandle` — opaque reference to a device allocation (§3).

use crate::device::DeviceId;
use std::fmt;
use uuid::Uuid;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub Uuid);

impl HandleId {
    pub fn fresh() -> Self {
        HandleId(Uuid::new_v4())
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A handle is owned exclusively by the issuing backend; it may not cross
/// backend boundaries (§3 invariant). Validity is determined entirely by
/// presence in the owning backend's handle table, not by any field here.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryHandle {
    pub id: HandleId,
    pub device_id: DeviceId,
    pub size_bytes: u64,
    pub allocated_at_ms: u64,
}
