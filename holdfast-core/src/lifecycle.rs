//! Guarded object delete, overwrite and move.
//!
//! Each path reads the bucket and the object, asks [`RetentionGate`] for a
//! decision on that snapshot, and only then issues a generation-preconditioned
//! write. An object that changes between read and write fails with
//! `PreconditionFailed` instead of being removed on a stale decision.

use tracing::{debug, info, warn};

use crate::error::{HoldfastError, HoldfastResult};
use crate::gate::{DeleteDecision, RetentionGate};
use crate::optimistic::{retry_on_precondition, RetryPolicy, StoreContext};
use crate::types::{BucketAttributes, ObjectAttributes, ObjectKey, WriteCondition};

#[derive(Clone)]
pub struct ObjectLifecycle {
    ctx: StoreContext,
    retry: RetryPolicy,
}

impl ObjectLifecycle {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            ctx,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create the first generation; fails if the object already exists
    pub fn create_object(&self, key: &ObjectKey) -> HoldfastResult<ObjectAttributes> {
        let attrs = self
            .ctx
            .store()
            .write_object(key, WriteCondition::DoesNotExist, self.ctx.deadline())?;
        info!(
            object = %key,
            generation = attrs.generation,
            event_based_hold = attrs.event_based_hold,
            "Object created"
        );
        Ok(attrs)
    }

    /// Evaluate the gate against freshly read attributes
    pub fn can_delete(&self, key: &ObjectKey) -> HoldfastResult<DeleteDecision> {
        let (bucket, object) = self.snapshot(key)?;
        Ok(RetentionGate::can_delete(
            &object,
            bucket.retention_policy.as_ref(),
            self.ctx.now_ms(),
        ))
    }

    /// Delete the live generation. Returns the attributes it had.
    pub fn delete_object(&self, key: &ObjectKey) -> HoldfastResult<ObjectAttributes> {
        retry_on_precondition(self.retry, || {
            let object = self.checked_snapshot(key)?;
            self.ctx
                .store()
                .delete_object(key, object.generation, self.ctx.deadline())?;
            info!(object = %key, generation = object.generation, "Object deleted");
            Ok(object)
        })
    }

    /// Replace the live generation with a new one
    pub fn overwrite_object(&self, key: &ObjectKey) -> HoldfastResult<ObjectAttributes> {
        retry_on_precondition(self.retry, || {
            let object = self.checked_snapshot(key)?;
            let attrs = self.ctx.store().write_object(
                key,
                WriteCondition::GenerationMatch(object.generation),
                self.ctx.deadline(),
            )?;
            info!(
                object = %key,
                replaced = object.generation,
                generation = attrs.generation,
                "Object overwritten"
            );
            Ok(attrs)
        })
    }

    /// Copy `source` to `destination`, then delete `source`.
    ///
    /// The destination must not exist. The source is gated before the copy.
    /// If the source delete then fails (a hold landed, the source was
    /// overwritten, the deadline passed), the copy is deleted again at its own
    /// generation and the original error is returned. When that cleanup is
    /// itself refused, for example because the bucket retains or holds new
    /// objects, both objects remain and the outcome must be treated as
    /// unknown: the caller has to re-read both keys.
    pub fn move_object(
        &self,
        source: &ObjectKey,
        destination: &ObjectKey,
    ) -> HoldfastResult<ObjectAttributes> {
        retry_on_precondition(self.retry, || {
            let object = self.checked_snapshot(source)?;
            let copied = self.ctx.store().write_object(
                destination,
                WriteCondition::DoesNotExist,
                self.ctx.deadline(),
            )?;

            if let Err(e) = self
                .ctx
                .store()
                .delete_object(source, object.generation, self.ctx.deadline())
            {
                self.undo_copy(destination, &copied);
                return Err(e.into());
            }

            info!(
                source = %source,
                destination = %destination,
                generation = copied.generation,
                "Object moved"
            );
            Ok(copied)
        })
    }

    fn undo_copy(&self, destination: &ObjectKey, copied: &ObjectAttributes) {
        match self
            .ctx
            .store()
            .delete_object(destination, copied.generation, self.ctx.deadline())
        {
            Ok(()) => debug!(
                destination = %destination,
                generation = copied.generation,
                "Move aborted, copy removed"
            ),
            Err(e) => warn!(
                destination = %destination,
                generation = copied.generation,
                error = %e,
                "Move aborted, copy could not be removed"
            ),
        }
    }

    fn snapshot(&self, key: &ObjectKey) -> HoldfastResult<(BucketAttributes, ObjectAttributes)> {
        let bucket = self.ctx.read_bucket(&key.bucket)?;
        let object = self.ctx.read_object(key)?;
        Ok((bucket, object))
    }

    fn checked_snapshot(&self, key: &ObjectKey) -> HoldfastResult<ObjectAttributes> {
        let (bucket, object) = self.snapshot(key)?;
        let now = self.ctx.now_ms();
        match RetentionGate::can_delete(&object, bucket.retention_policy.as_ref(), now) {
            DeleteDecision::Allow => Ok(object),
            DeleteDecision::Deny(reason) => {
                debug!(object = %key, %reason, "Retention gate denied mutation");
                Err(HoldfastError::DeletionDenied {
                    key: key.to_string(),
                    reason,
                })
            }
        }
    }
}
