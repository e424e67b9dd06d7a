//! Capability tokens and the audit trail (§3 `CapabilityToken`/`AuditRecord`, §4.9).

use std::collections::HashSet;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    List,
    Allocate,
    Deallocate,
    CopyHostToDevice,
    CopyDeviceToHost,
    CopyDeviceToDevice,
}

/// A bearer credential authorizing a principal to perform specified
/// operations on specified devices, optionally bounded by a memory quota
/// and expiry (§3, glossary). Tokens are immutable; revocation removes the
/// id from the active set rather than mutating the token.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityToken {
    pub token_id: String,
    pub principal_id: String,
    pub permissions: HashSet<Permission>,
    pub device_whitelist: Option<HashSet<String>>,
    pub memory_quota_bytes: Option<u64>,
    pub issued_at_ms: u64,
    pub expires_at_ms: Option<u64>,
}

impl CapabilityToken {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|exp| now_ms >= exp)
    }

    pub fn allows_device(&self, device_id: &str) -> bool {
        match &self.device_whitelist {
            Some(set) => set.contains(device_id),
            None => true,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Allowed,
    Denied,
}

/// An append-only, never-mutated audit entry (§3, §4.9).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub principal_id: String,
    pub event_type: String,
    pub device_id: Option<String>,
    pub outcome: AuditOutcome,
    pub timestamp_ms: u64,
    pub metadata: String,
}
