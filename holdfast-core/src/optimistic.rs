//! The read-modify-write primitive every mutation path goes through.
//!
//! A mutation reads the current snapshot, asks a delta builder what to change,
//! and submits the delta with preconditions taken from that same snapshot.
//! When the builder decides nothing needs to change, no write is issued.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{HoldfastError, HoldfastResult};
use crate::infrastructure::{AttributeStore, Clock, SystemClock};
use crate::types::{
    BucketAttributes, BucketDelta, BucketId, Deadline, ObjectAttributes, ObjectDelta, ObjectKey,
};

/// How many times a mutation is attempted when it loses a precondition race.
///
/// Every attempt starts from a fresh read. The default is a single attempt:
/// the core never retries unless the caller asks it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_attempts: 1 }
    }

    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Re-runs `op` while it fails with `PreconditionFailed`, up to the policy's
/// attempt budget. Any other error is returned immediately.
///
/// `op` must perform its own read so each attempt sees fresh versions.
pub fn retry_on_precondition<T>(
    policy: RetryPolicy,
    mut op: impl FnMut() -> HoldfastResult<T>,
) -> HoldfastResult<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_precondition_failed() && attempt < policy.max_attempts => {
                debug!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Retrying after precondition failure"
                );
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Result of an optimistic update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<T> {
    /// A write was submitted and applied
    Applied(T),
    /// The builder found nothing to change; the snapshot read is returned
    Unchanged(T),
}

impl<T> Update<T> {
    pub fn into_inner(self) -> T {
        match self {
            Update::Applied(v) | Update::Unchanged(v) => v,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Update::Applied(_))
    }
}

/// Store handle shared by the controllers: the store, the clock used for
/// deadlines and gate checks, and the per-call timeout.
#[derive(Clone)]
pub struct StoreContext {
    store: Arc<dyn AttributeStore>,
    clock: Arc<dyn Clock>,
    call_timeout_ms: Option<u64>,
}

impl StoreContext {
    pub fn new(store: Arc<dyn AttributeStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            call_timeout_ms: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_call_timeout(mut self, timeout_ms: Option<u64>) -> Self {
        self.call_timeout_ms = timeout_ms;
        self
    }

    pub fn store(&self) -> &dyn AttributeStore {
        self.store.as_ref()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Deadline for a call starting now
    pub fn deadline(&self) -> Deadline {
        match self.call_timeout_ms {
            Some(timeout) => Deadline::after(self.now_ms(), timeout),
            None => Deadline::none(),
        }
    }

    pub fn read_bucket(&self, bucket: &BucketId) -> HoldfastResult<BucketAttributes> {
        Ok(self.store.get_bucket(bucket, self.deadline())?)
    }

    pub fn read_object(&self, key: &ObjectKey) -> HoldfastResult<ObjectAttributes> {
        Ok(self.store.get_object(key, self.deadline())?)
    }

    /// Single optimistic bucket update: read, build, submit with the
    /// metageneration observed by the read.
    pub fn update_bucket<F>(
        &self,
        bucket: &BucketId,
        build: F,
    ) -> HoldfastResult<Update<BucketAttributes>>
    where
        F: FnOnce(&BucketAttributes) -> HoldfastResult<Option<BucketDelta>>,
    {
        let current = self.read_bucket(bucket)?;
        let delta = match build(&current)? {
            Some(delta) if !delta.is_empty() => delta,
            _ => {
                debug!(
                    bucket = %bucket,
                    metageneration = current.metageneration,
                    "Bucket already in requested state"
                );
                return Ok(Update::Unchanged(current));
            }
        };

        self.store
            .update_bucket(bucket, &delta, &current.preconditions(), self.deadline())
            .map(Update::Applied)
            .map_err(|e| {
                let e = HoldfastError::from(e);
                if e.is_precondition_failed() {
                    warn!(
                        bucket = %bucket,
                        observed = current.metageneration,
                        "Bucket changed since read"
                    );
                }
                e
            })
    }

    /// Single optimistic object update pinned to the observed generation and
    /// metageneration.
    pub fn update_object<F>(
        &self,
        key: &ObjectKey,
        build: F,
    ) -> HoldfastResult<Update<ObjectAttributes>>
    where
        F: FnOnce(&ObjectAttributes) -> HoldfastResult<Option<ObjectDelta>>,
    {
        let current = self.read_object(key)?;
        let delta = match build(&current)? {
            Some(delta) if !delta.is_empty() => delta,
            _ => {
                debug!(
                    object = %key,
                    metageneration = current.metageneration,
                    "Object already in requested state"
                );
                return Ok(Update::Unchanged(current));
            }
        };

        self.store
            .update_object(key, &delta, &current.preconditions(), self.deadline())
            .map(Update::Applied)
            .map_err(|e| {
                let e = HoldfastError::from(e);
                if e.is_precondition_failed() {
                    warn!(
                        object = %key,
                        generation = current.generation,
                        observed = current.metageneration,
                        "Object changed since read"
                    );
                }
                e
            })
    }
}
