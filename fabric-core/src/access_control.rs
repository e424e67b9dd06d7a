//! Access Control (§4.9): capability-token gating in front of every
//! mutating backend operation, producing an `AuditRecord` for every
//! decision (allowed or denied).

use crate::audit::AuditLog;
use fabric_types::{AuditOutcome, AuditRecord, CapabilityToken, FabricError, Permission};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Holds the active token set and each principal's outstanding allocation
/// total (§3 `CapabilityToken`, §4.9 quota check). `RwLock` since checks
/// vastly outnumber grants/revocations.
pub struct AccessControl {
    tokens: RwLock<HashMap<String, CapabilityToken>>,
    outstanding_bytes: RwLock<HashMap<String, u64>>,
}

impl AccessControl {
    pub fn new() -> Self {
        AccessControl {
            tokens: RwLock::new(HashMap::new()),
            outstanding_bytes: RwLock::new(HashMap::new()),
        }
    }

    pub fn grant(&self, token: CapabilityToken) {
        self.tokens.write().insert(token.token_id.clone(), token);
    }

    /// Revocation removes the id from the active set; the token itself is
    /// never mutated (§3).
    pub fn revoke(&self, token_id: &str) {
        self.tokens.write().remove(token_id);
    }

    /// Check a capability-gated operation (§4.9): permission set must
    /// include it, device whitelist (if any) must include the target
    /// device, and quota (if any) must not be exceeded by the requested
    /// allocation plus what's already outstanding. Always produces an
    /// `AuditRecord`, allowed or denied, appended to `audit`.
    pub fn check(
        &self,
        audit: &AuditLog,
        token_id: &str,
        permission: Permission,
        device_id: Option<&str>,
        requested_bytes: Option<u64>,
        now_ms: u64,
    ) -> Result<(), FabricError> {
        let component = "access_control";
        let tokens = self.tokens.read();
        let Some(token) = tokens.get(token_id) else {
            let err = FabricError::AccessDenied {
                component,
                principal_id: "unknown".into(),
                device_id: device_id.map(str::to_owned),
            };
            audit.record(deny_record("unknown", permission, device_id, now_ms, "token not found"));
            return Err(err);
        };

        let deny = |reason: &str| FabricError::AccessDenied {
            component,
            principal_id: token.principal_id.clone(),
            device_id: device_id.map(str::to_owned),
        }
        .tap_audit(audit, &token.principal_id, permission, device_id, now_ms, reason);

        if token.is_expired(now_ms) {
            return Err(deny("token expired"));
        }
        if !token.permissions.contains(&permission) {
            return Err(deny("permission not granted"));
        }
        if let Some(device_id) = device_id {
            if !token.allows_device(device_id) {
                return Err(deny("device not in whitelist"));
            }
        }
        if let (Some(quota), Some(requested)) = (token.memory_quota_bytes, requested_bytes) {
            let outstanding = self
                .outstanding_bytes
                .read()
                .get(&token.principal_id)
                .copied()
                .unwrap_or(0);
            if outstanding + requested > quota {
                let err = FabricError::QuotaExceeded {
                    component,
                    principal_id: token.principal_id.clone(),
                    device_id: device_id.map(str::to_owned),
                };
                audit.record(deny_record(&token.principal_id, permission, device_id, now_ms, "quota exceeded"));
                return Err(err);
            }
        }

        audit.record(AuditRecord {
            principal_id: token.principal_id.clone(),
            event_type: permission_name(permission).to_string(),
            device_id: device_id.map(str::to_owned),
            outcome: AuditOutcome::Allowed,
            timestamp_ms: now_ms,
            metadata: String::new(),
        });
        Ok(())
    }

    /// Resolve the principal behind a live token id, used by `RuntimeContext`
    /// to credit/debit quota after a gated operation without re-deriving it
    /// from the `check` call.
    pub fn principal_for(&self, token_id: &str) -> Option<String> {
        self.tokens.read().get(token_id).map(|t| t.principal_id.clone())
    }

    pub fn record_allocation(&self, principal_id: &str, bytes: u64) {
        *self.outstanding_bytes.write().entry(principal_id.to_string()).or_insert(0) += bytes;
    }

    pub fn release_allocation(&self, principal_id: &str, bytes: u64) {
        if let Some(outstanding) = self.outstanding_bytes.write().get_mut(principal_id) {
            *outstanding = outstanding.saturating_sub(bytes);
        }
    }
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::new()
    }
}

fn permission_name(permission: Permission) -> &'static str {
    match permission {
        Permission::List => "list",
        Permission::Allocate => "allocate",
        Permission::Deallocate => "deallocate",
        Permission::CopyHostToDevice => "copy_host_to_device",
        Permission::CopyDeviceToHost => "copy_device_to_host",
        Permission::CopyDeviceToDevice => "copy_device_to_device",
    }
}

fn deny_record(principal_id: &str, permission: Permission, device_id: Option<&str>, now_ms: u64, reason: &str) -> AuditRecord {
    AuditRecord {
        principal_id: principal_id.to_string(),
        event_type: permission_name(permission).to_string(),
        device_id: device_id.map(str::to_owned),
        outcome: AuditOutcome::Denied,
        timestamp_ms: now_ms,
        metadata: reason.to_string(),
    }
}

/// Small helper so `check`'s `deny` closure can both build the error and
/// record the audit entry in one expression.
trait TapAudit {
    fn tap_audit(self, audit: &AuditLog, principal_id: &str, permission: Permission, device_id: Option<&str>, now_ms: u64, reason: &str) -> Self;
}

impl TapAudit for FabricError {
    fn tap_audit(self, audit: &AuditLog, principal_id: &str, permission: Permission, device_id: Option<&str>, now_ms: u64, reason: &str) -> Self {
        audit.record(deny_record(principal_id, permission, device_id, now_ms, reason));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn token(principal: &str, permissions: &[Permission], whitelist: Option<Vec<&str>>, quota: Option<u64>) -> CapabilityToken {
        CapabilityToken {
            token_id: format!("tok-{principal}"),
            principal_id: principal.into(),
            permissions: permissions.iter().copied().collect::<HashSet<_>>(),
            device_whitelist: whitelist.map(|w| w.into_iter().map(String::from).collect()),
            memory_quota_bytes: quota,
            issued_at_ms: 0,
            expires_at_ms: None,
        }
    }

    #[test]
    fn unknown_token_is_denied() {
        let ac = AccessControl::new();
        let (audit, _rx) = AuditLog::new(10);
        let err = ac.check(&audit, "nope", Permission::Allocate, None, None, 0).unwrap_err();
        assert!(matches!(err, FabricError::AccessDenied { .. }));
        assert_eq!(audit.len(), 1);
    }

    #[test]
    fn missing_permission_is_denied() {
        let ac = AccessControl::new();
        let (audit, _rx) = AuditLog::new(10);
        ac.grant(token("alice", &[Permission::List], None, None));
        let err = ac
            .check(&audit, "tok-alice", Permission::Allocate, None, None, 0)
            .unwrap_err();
        assert!(matches!(err, FabricError::AccessDenied { .. }));
    }

    #[test]
    fn device_outside_whitelist_is_denied() {
        let ac = AccessControl::new();
        let (audit, _rx) = AuditLog::new(10);
        ac.grant(token("alice", &[Permission::Allocate], Some(vec!["cuda:0"]), None));
        let err = ac
            .check(&audit, "tok-alice", Permission::Allocate, Some("cuda:1"), None, 0)
            .unwrap_err();
        assert!(matches!(err, FabricError::AccessDenied { .. }));
    }

    #[test]
    fn quota_exceeded_by_requested_allocation_is_denied() {
        let ac = AccessControl::new();
        let (audit, _rx) = AuditLog::new(10);
        ac.grant(token("alice", &[Permission::Allocate], None, Some(1024)));
        ac.record_allocation("alice", 900);
        let err = ac
            .check(&audit, "tok-alice", Permission::Allocate, None, Some(200), 0)
            .unwrap_err();
        assert!(matches!(err, FabricError::QuotaExceeded { .. }));
    }

    #[test]
    fn allowed_operation_produces_allowed_audit_record() {
        let ac = AccessControl::new();
        let (audit, _rx) = AuditLog::new(10);
        ac.grant(token("alice", &[Permission::Allocate], None, None));
        ac.check(&audit, "tok-alice", Permission::Allocate, None, None, 0).unwrap();
        let records = audit.by_principal("alice");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Allowed);
    }

    #[test]
    fn expired_token_is_denied() {
        let ac = AccessControl::new();
        let (audit, _rx) = AuditLog::new(10);
        let mut t = token("alice", &[Permission::Allocate], None, None);
        t.expires_at_ms = Some(100);
        ac.grant(t);
        let err = ac
            .check(&audit, "tok-alice", Permission::Allocate, None, None, 200)
            .unwrap_err();
        assert!(matches!(err, FabricError::AccessDenied { .. }));
    }
}
