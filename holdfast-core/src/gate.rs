use serde::{Deserialize, Serialize};

use crate::types::{BucketRetentionPolicy, ObjectAttributes};

/// Why a delete or overwrite was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    EventBasedHoldActive,
    TemporaryHoldActive,
    RetentionPeriodNotElapsed,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::EventBasedHoldActive => write!(f, "EVENT_BASED_HOLD_ACTIVE"),
            DenyReason::TemporaryHoldActive => write!(f, "TEMPORARY_HOLD_ACTIVE"),
            DenyReason::RetentionPeriodNotElapsed => write!(f, "RETENTION_PERIOD_NOT_ELAPSED"),
        }
    }
}

/// Outcome of consulting the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteDecision {
    Allow,
    Deny(DenyReason),
}

impl DeleteDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, DeleteDecision::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            DeleteDecision::Allow => None,
            DeleteDecision::Deny(reason) => Some(*reason),
        }
    }
}

/// Pure allow/deny decision for deleting or overwriting an object.
///
/// Works only on snapshots the caller already holds and performs no I/O.
/// Freshness of those snapshots is the caller's concern.
pub struct RetentionGate;

impl RetentionGate {
    /// Holds are checked before retention, so a held object reports its hold
    /// even when the retention window has also not elapsed.
    pub fn can_delete(
        object: &ObjectAttributes,
        policy: Option<&BucketRetentionPolicy>,
        now_ms: u64,
    ) -> DeleteDecision {
        if object.event_based_hold {
            return DeleteDecision::Deny(DenyReason::EventBasedHoldActive);
        }
        if object.temporary_hold {
            return DeleteDecision::Deny(DenyReason::TemporaryHoldActive);
        }
        match Self::retention_expiry(object, policy) {
            Some(expires_at) if now_ms < expires_at => {
                DeleteDecision::Deny(DenyReason::RetentionPeriodNotElapsed)
            }
            _ => DeleteDecision::Allow,
        }
    }

    /// Instant the retention window of `object` ends, if a policy applies
    pub fn retention_expiry(
        object: &ObjectAttributes,
        policy: Option<&BucketRetentionPolicy>,
    ) -> Option<u64> {
        policy.map(|p| object.creation_time_ms.saturating_add(p.retention_period_ms()))
    }
}
