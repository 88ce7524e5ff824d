use serde::{Deserialize, Serialize};

use super::{BucketId, ObjectKey};

/// Bucket-level retention rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRetentionPolicy {
    /// Minimum age an object must reach before it can be deleted or overwritten
    pub retention_period_secs: u64,
    /// When the backend last (re)established the policy, ms since epoch
    pub effective_time_ms: u64,
    /// Once true, never false again
    pub is_locked: bool,
}

impl BucketRetentionPolicy {
    pub fn retention_period_ms(&self) -> u64 {
        self.retention_period_secs.saturating_mul(1000)
    }
}

/// Snapshot of a bucket's metadata as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAttributes {
    pub name: BucketId,
    /// Bumped on every successful metadata mutation
    pub metageneration: u64,
    pub created_at_ms: u64,
    /// `None` when no policy is set; a zero-length policy is `Some`
    pub retention_policy: Option<BucketRetentionPolicy>,
    /// Inherited as `event_based_hold` by objects created from now on
    pub default_event_based_hold: bool,
}

impl BucketAttributes {
    pub fn preconditions(&self) -> Preconditions {
        Preconditions::metageneration(self.metageneration)
    }
}

/// Snapshot of an object's metadata as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAttributes {
    pub bucket: BucketId,
    pub name: String,
    /// Content version; changes on every overwrite
    pub generation: u64,
    /// Metadata version within the current generation
    pub metageneration: u64,
    pub creation_time_ms: u64,
    pub event_based_hold: bool,
    pub temporary_hold: bool,
}

impl ObjectAttributes {
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            bucket: self.bucket.clone(),
            object: self.name.clone(),
        }
    }

    /// Pins both the content generation and the metadata version observed
    pub fn preconditions(&self) -> Preconditions {
        Preconditions::metageneration(self.metageneration).with_generation(self.generation)
    }

    pub fn is_held(&self) -> bool {
        self.event_based_hold || self.temporary_hold
    }
}

/// Retention policy portion of a bucket update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionPolicyChange {
    Set { retention_period_secs: u64 },
    Clear,
    Lock,
}

/// Partial bucket update. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDelta {
    pub retention_policy: Option<RetentionPolicyChange>,
    pub default_event_based_hold: Option<bool>,
}

impl BucketDelta {
    pub fn retention(change: RetentionPolicyChange) -> Self {
        Self {
            retention_policy: Some(change),
            ..Self::default()
        }
    }

    pub fn default_event_based_hold(enabled: bool) -> Self {
        Self {
            default_event_based_hold: Some(enabled),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.retention_policy.is_none() && self.default_event_based_hold.is_none()
    }
}

/// Partial object update. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDelta {
    pub event_based_hold: Option<bool>,
    pub temporary_hold: Option<bool>,
}

impl ObjectDelta {
    pub fn event_based_hold(enabled: bool) -> Self {
        Self {
            event_based_hold: Some(enabled),
            ..Self::default()
        }
    }

    pub fn temporary_hold(enabled: bool) -> Self {
        Self {
            temporary_hold: Some(enabled),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event_based_hold.is_none() && self.temporary_hold.is_none()
    }
}

/// Expected versions a metadata update must match to apply.
///
/// The metageneration match is mandatory: there is no way to express an
/// unconditional metadata write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preconditions {
    pub metageneration_match: u64,
    pub generation_match: Option<u64>,
}

impl Preconditions {
    pub fn metageneration(metageneration: u64) -> Self {
        Self {
            metageneration_match: metageneration,
            generation_match: None,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation_match = Some(generation);
        self
    }
}

/// Guard for object content writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteCondition {
    /// Create only; fail if a live generation exists
    DoesNotExist,
    /// Overwrite only the given live generation
    GenerationMatch(u64),
}

/// Absolute deadline for a single store call, ms since epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline {
    pub at_ms: Option<u64>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at_ms: None }
    }

    pub fn at(at_ms: u64) -> Self {
        Self { at_ms: Some(at_ms) }
    }

    pub fn after(now_ms: u64, timeout_ms: u64) -> Self {
        Self::at(now_ms.saturating_add(timeout_ms))
    }

    pub fn has_passed(&self, now_ms: u64) -> bool {
        self.at_ms.is_some_and(|at| now_ms > at)
    }
}
