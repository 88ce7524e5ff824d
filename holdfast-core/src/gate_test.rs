#[cfg(test)]
mod tests {
    use crate::gate::{DeleteDecision, DenyReason, RetentionGate};
    use crate::types::{BucketId, BucketRetentionPolicy, ObjectAttributes};

    const CREATED: u64 = 10_000;

    fn object(event_based_hold: bool, temporary_hold: bool) -> ObjectAttributes {
        ObjectAttributes {
            bucket: BucketId::parse("archive").unwrap(),
            name: "ledger.csv".to_string(),
            generation: 1,
            metageneration: 1,
            creation_time_ms: CREATED,
            event_based_hold,
            temporary_hold,
        }
    }

    fn policy(retention_period_secs: u64) -> BucketRetentionPolicy {
        BucketRetentionPolicy {
            retention_period_secs,
            effective_time_ms: 0,
            is_locked: false,
        }
    }

    #[test]
    fn test_unheld_object_without_policy_is_deletable() {
        let decision = RetentionGate::can_delete(&object(false, false), None, CREATED);
        assert_eq!(decision, DeleteDecision::Allow);
    }

    #[test]
    fn test_event_based_hold_denies_even_after_retention_elapsed() {
        let p = policy(5);
        let long_after = CREATED + 1_000_000;

        assert_eq!(
            RetentionGate::can_delete(&object(true, false), Some(&p), long_after),
            DeleteDecision::Deny(DenyReason::EventBasedHoldActive)
        );
        assert_eq!(
            RetentionGate::can_delete(&object(true, false), None, long_after),
            DeleteDecision::Deny(DenyReason::EventBasedHoldActive)
        );
    }

    #[test]
    fn test_temporary_hold_denies_without_policy() {
        assert_eq!(
            RetentionGate::can_delete(&object(false, true), None, CREATED),
            DeleteDecision::Deny(DenyReason::TemporaryHoldActive)
        );
    }

    #[test]
    fn test_event_based_hold_reported_before_temporary_hold() {
        assert_eq!(
            RetentionGate::can_delete(&object(true, true), Some(&policy(60)), CREATED),
            DeleteDecision::Deny(DenyReason::EventBasedHoldActive)
        );
    }

    #[test]
    fn test_retention_window_boundary() {
        let p = policy(300);
        let expiry = CREATED + 300_000;
        let obj = object(false, false);

        assert_eq!(
            RetentionGate::can_delete(&obj, Some(&p), expiry - 1),
            DeleteDecision::Deny(DenyReason::RetentionPeriodNotElapsed)
        );
        // Window is half-open: deletable exactly at creation + period
        assert_eq!(RetentionGate::can_delete(&obj, Some(&p), expiry), DeleteDecision::Allow);
        assert_eq!(RetentionGate::retention_expiry(&obj, Some(&p)), Some(expiry));
    }

    #[test]
    fn test_zero_period_policy_never_blocks() {
        let obj = object(false, false);
        assert!(RetentionGate::can_delete(&obj, Some(&policy(0)), CREATED).is_allowed());
    }

    #[test]
    fn test_allow_exactly_when_unheld_and_outside_window() {
        let times = [0, CREATED, CREATED + 59_999, CREATED + 60_000, u64::MAX];
        let policies = [None, Some(policy(0)), Some(policy(60)), Some(policy(u64::MAX))];

        for event_based in [false, true] {
            for temporary in [false, true] {
                let obj = object(event_based, temporary);
                for p in &policies {
                    for &now in &times {
                        let expected = !event_based
                            && !temporary
                            && match p {
                                None => true,
                                Some(p) => {
                                    now >= CREATED.saturating_add(p.retention_period_ms())
                                }
                            };
                        let decision = RetentionGate::can_delete(&obj, p.as_ref(), now);
                        assert_eq!(
                            decision.is_allowed(),
                            expected,
                            "holds=({}, {}) policy={:?} now={}",
                            event_based,
                            temporary,
                            p,
                            now
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_huge_period_saturates_instead_of_wrapping() {
        let obj = object(false, false);
        let p = policy(u64::MAX);
        assert_eq!(RetentionGate::retention_expiry(&obj, Some(&p)), Some(u64::MAX));
        assert!(!RetentionGate::can_delete(&obj, Some(&p), u64::MAX - 1).is_allowed());
    }

    #[test]
    fn test_decision_serializes_with_reason_code() {
        let json = serde_json::to_value(DeleteDecision::Deny(DenyReason::TemporaryHoldActive))
            .unwrap();
        assert_eq!(json["decision"], "DENY");
        assert_eq!(json["reason"], "TEMPORARY_HOLD_ACTIVE");
    }
}
