//! Access control end-to-end scenario (spec §8, scenario 6).

use fabric_core::{AccessControl, AuditLog};
use fabric_types::{AuditOutcome, CapabilityToken, FabricError, Permission};
use std::collections::HashSet;

#[test]
fn principal_without_allocate_permission_is_denied_and_audited() {
    let ac = AccessControl::new();
    let (audit, _rx) = AuditLog::new(10);

    ac.grant(CapabilityToken {
        token_id: "tok-p1".into(),
        principal_id: "P1".into(),
        permissions: HashSet::from([Permission::List]),
        device_whitelist: None,
        memory_quota_bytes: None,
        issued_at_ms: 0,
        expires_at_ms: None,
    });

    let err = ac
        .check(&audit, "tok-p1", Permission::Allocate, None, None, 0)
        .unwrap_err();
    assert!(matches!(err, FabricError::AccessDenied { .. }));

    let records = audit.by_principal("P1");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, AuditOutcome::Denied);
    assert_eq!(records[0].event_type, "allocate");
}
