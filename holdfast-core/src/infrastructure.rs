use crate::error::{StoreError, StoreResult};
use crate::gate::{DeleteDecision, RetentionGate};
use crate::types::{
    BucketAttributes, BucketDelta, BucketId, BucketRetentionPolicy, Deadline, ObjectAttributes,
    ObjectDelta, ObjectKey, Preconditions, RetentionPolicyChange, WriteCondition,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Contract for the remote attribute store the controllers sit on.
///
/// Each update is a single-document compare-and-swap: it applies atomically
/// when the supplied preconditions match the stored versions at the instant of
/// application, and fails with `PreconditionFailed` otherwise. Nothing beyond
/// that is assumed about how concurrent calls are serialized.
pub trait AttributeStore: Send + Sync {
    /// Create an empty bucket at metageneration 1
    fn create_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes>;

    fn get_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes>;

    /// Apply `delta` when the bucket's metageneration matches, bumping it by one
    fn update_bucket(
        &self,
        bucket: &BucketId,
        delta: &BucketDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<BucketAttributes>;

    fn get_object(&self, key: &ObjectKey, deadline: Deadline) -> StoreResult<ObjectAttributes>;

    /// Apply `delta` when the object's metageneration (and generation, if
    /// given) match, bumping the object's metageneration by one
    fn update_object(
        &self,
        key: &ObjectKey,
        delta: &ObjectDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes>;

    /// Write a new generation of an object. New generations inherit the
    /// bucket's default event-based hold.
    fn write_object(
        &self,
        key: &ObjectKey,
        condition: WriteCondition,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes>;

    /// Delete the live generation of an object when it matches `generation`
    fn delete_object(&self, key: &ObjectKey, generation: u64, deadline: Deadline)
        -> StoreResult<()>;
}

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        now_ms()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by_ms: u64) -> u64 {
        self.now.fetch_add(by_ms, Ordering::SeqCst) + by_ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ─── Backend Semantics ──────────────────────────────────────────────────────
// Shared by the bundled stores so both model the managed backend identically.

pub fn check_bucket_preconditions(
    current: &BucketAttributes,
    preconditions: &Preconditions,
) -> StoreResult<()> {
    if current.metageneration != preconditions.metageneration_match {
        return Err(StoreError::PreconditionFailed {
            resource: format!("bucket {}", current.name),
            field: "metageneration",
            expected: preconditions.metageneration_match,
            actual: current.metageneration,
        });
    }
    Ok(())
}

pub fn check_object_preconditions(
    current: &ObjectAttributes,
    preconditions: &Preconditions,
) -> StoreResult<()> {
    if let Some(generation) = preconditions.generation_match {
        if current.generation != generation {
            return Err(StoreError::PreconditionFailed {
                resource: format!("object {}", current.key()),
                field: "generation",
                expected: generation,
                actual: current.generation,
            });
        }
    }
    if current.metageneration != preconditions.metageneration_match {
        return Err(StoreError::PreconditionFailed {
            resource: format!("object {}", current.key()),
            field: "metageneration",
            expected: preconditions.metageneration_match,
            actual: current.metageneration,
        });
    }
    Ok(())
}

/// Computes the bucket that results from applying `delta` at `now`.
pub fn apply_bucket_delta(
    current: &BucketAttributes,
    delta: &BucketDelta,
    now: u64,
) -> StoreResult<BucketAttributes> {
    let mut next = current.clone();

    match (delta.retention_policy, current.retention_policy) {
        (None, _) => {}
        (Some(RetentionPolicyChange::Set { retention_period_secs }), existing) => {
            let is_locked = existing.is_some_and(|p| p.is_locked);
            if let Some(policy) = existing.filter(|p| p.is_locked) {
                if retention_period_secs < policy.retention_period_secs {
                    return Err(StoreError::Rejected(format!(
                        "locked retention policy on bucket {} cannot be reduced",
                        current.name
                    )));
                }
            }
            next.retention_policy = Some(BucketRetentionPolicy {
                retention_period_secs,
                effective_time_ms: now,
                is_locked,
            });
        }
        (Some(RetentionPolicyChange::Clear), Some(policy)) if policy.is_locked => {
            return Err(StoreError::Rejected(format!(
                "locked retention policy on bucket {} cannot be removed",
                current.name
            )));
        }
        (Some(RetentionPolicyChange::Clear), _) => {
            next.retention_policy = None;
        }
        (Some(RetentionPolicyChange::Lock), None) => {
            return Err(StoreError::Rejected(format!(
                "bucket {} has no retention policy to lock",
                current.name
            )));
        }
        (Some(RetentionPolicyChange::Lock), Some(policy)) => {
            if !policy.is_locked {
                next.retention_policy = Some(BucketRetentionPolicy {
                    effective_time_ms: now,
                    is_locked: true,
                    ..policy
                });
            }
        }
    }

    if let Some(enabled) = delta.default_event_based_hold {
        next.default_event_based_hold = enabled;
    }

    next.metageneration = current.metageneration + 1;
    Ok(next)
}

pub fn apply_object_delta(current: &ObjectAttributes, delta: &ObjectDelta) -> ObjectAttributes {
    let mut next = current.clone();
    if let Some(held) = delta.event_based_hold {
        next.event_based_hold = held;
    }
    if let Some(held) = delta.temporary_hold {
        next.temporary_hold = held;
    }
    next.metageneration = current.metageneration + 1;
    next
}

pub fn check_write_condition(
    key: &ObjectKey,
    live: Option<&ObjectAttributes>,
    condition: WriteCondition,
) -> StoreResult<()> {
    match (condition, live) {
        (WriteCondition::DoesNotExist, None) => Ok(()),
        (WriteCondition::DoesNotExist, Some(existing)) => Err(StoreError::PreconditionFailed {
            resource: format!("object {}", key),
            field: "generation",
            expected: 0,
            actual: existing.generation,
        }),
        (WriteCondition::GenerationMatch(generation), None) => {
            Err(StoreError::PreconditionFailed {
                resource: format!("object {}", key),
                field: "generation",
                expected: generation,
                actual: 0,
            })
        }
        (WriteCondition::GenerationMatch(generation), Some(existing)) => {
            if existing.generation != generation {
                return Err(StoreError::PreconditionFailed {
                    resource: format!("object {}", key),
                    field: "generation",
                    expected: generation,
                    actual: existing.generation,
                });
            }
            Ok(())
        }
    }
}

/// A fresh object generation inheriting the bucket's default hold
pub fn new_generation(
    bucket: &BucketAttributes,
    key: &ObjectKey,
    generation: u64,
    now: u64,
) -> ObjectAttributes {
    ObjectAttributes {
        bucket: key.bucket.clone(),
        name: key.object.clone(),
        generation,
        metageneration: 1,
        creation_time_ms: now,
        event_based_hold: bucket.default_event_based_hold,
        temporary_hold: false,
    }
}

pub fn check_deadline(deadline: Deadline, now: u64, resource: impl std::fmt::Display) -> StoreResult<()> {
    if deadline.has_passed(now) {
        return Err(StoreError::DeadlineExceeded(resource.to_string()));
    }
    Ok(())
}

/// Backend-side enforcement of holds and retention on delete and overwrite
pub fn check_mutable(
    bucket: &BucketAttributes,
    live: &ObjectAttributes,
    now: u64,
) -> StoreResult<()> {
    match RetentionGate::can_delete(live, bucket.retention_policy.as_ref(), now) {
        DeleteDecision::Allow => Ok(()),
        DeleteDecision::Deny(reason) => Err(StoreError::Rejected(format!(
            "object {} is protected: {}",
            live.key(),
            reason
        ))),
    }
}
