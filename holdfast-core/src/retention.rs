//! Bucket retention policy lifecycle: `Unset -> Active -> Locked`.
//!
//! | from   | to     | allowed when                  |
//! |--------|--------|-------------------------------|
//! | Unset  | Active | always                        |
//! | Active | Active | always (any period)           |
//! | Active | Unset  | always                        |
//! | Active | Locked | always                        |
//! | Locked | Locked | new period >= locked period   |
//! | Locked | Unset  | never                         |

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HoldfastError, HoldfastResult};
use crate::optimistic::{retry_on_precondition, RetryPolicy, StoreContext, Update};
use crate::types::{
    validate_retention_period, BucketAttributes, BucketDelta, BucketId, BucketRetentionPolicy,
    RetentionPolicyChange,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyState {
    Unset,
    Active { retention_period_secs: u64 },
    Locked { retention_period_secs: u64 },
}

impl PolicyState {
    pub fn of(policy: Option<&BucketRetentionPolicy>) -> Self {
        match policy {
            None => PolicyState::Unset,
            Some(p) if p.is_locked => PolicyState::Locked {
                retention_period_secs: p.retention_period_secs,
            },
            Some(p) => PolicyState::Active {
                retention_period_secs: p.retention_period_secs,
            },
        }
    }

    /// Change needed to move to `period`, or `None` when already there
    pub fn plan_set(
        self,
        bucket: &BucketId,
        period_secs: u64,
    ) -> HoldfastResult<Option<RetentionPolicyChange>> {
        match self {
            PolicyState::Locked {
                retention_period_secs,
            } if period_secs < retention_period_secs => Err(HoldfastError::PolicyLocked {
                bucket: bucket.to_string(),
                locked_period_secs: retention_period_secs,
                attempted: format!("reduce retention period to {}s", period_secs),
            }),
            PolicyState::Active {
                retention_period_secs,
            }
            | PolicyState::Locked {
                retention_period_secs,
            } if period_secs == retention_period_secs => Ok(None),
            _ => Ok(Some(RetentionPolicyChange::Set {
                retention_period_secs: period_secs,
            })),
        }
    }

    pub fn plan_remove(self, bucket: &BucketId) -> HoldfastResult<Option<RetentionPolicyChange>> {
        match self {
            PolicyState::Unset => Ok(None),
            PolicyState::Active { .. } => Ok(Some(RetentionPolicyChange::Clear)),
            PolicyState::Locked {
                retention_period_secs,
            } => Err(HoldfastError::PolicyLocked {
                bucket: bucket.to_string(),
                locked_period_secs: retention_period_secs,
                attempted: "remove retention policy".to_string(),
            }),
        }
    }

    /// Locking an already locked policy needs no change
    pub fn plan_lock(self, bucket: &BucketId) -> HoldfastResult<Option<RetentionPolicyChange>> {
        match self {
            PolicyState::Unset => Err(HoldfastError::NoPolicySet {
                bucket: bucket.to_string(),
            }),
            PolicyState::Active { .. } => Ok(Some(RetentionPolicyChange::Lock)),
            PolicyState::Locked { .. } => Ok(None),
        }
    }
}

/// Owns the retention policy of buckets reachable through a store.
///
/// Mutations are single optimistic updates. With the default
/// [`RetryPolicy::none`] a lost race surfaces as `PreconditionFailed`; every
/// mutation here is safe to wrap in a bounded re-read-and-retry loop, which is
/// what [`with_retry`](Self::with_retry) does.
#[derive(Clone)]
pub struct RetentionPolicyController {
    ctx: StoreContext,
    retry: RetryPolicy,
}

impl RetentionPolicyController {
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

    pub fn get_retention_policy(
        &self,
        bucket: &BucketId,
    ) -> HoldfastResult<Option<BucketRetentionPolicy>> {
        let attrs = self.ctx.read_bucket(bucket)?;
        debug!(bucket = %bucket, policy = ?attrs.retention_policy, "Read retention policy");
        Ok(attrs.retention_policy)
    }

    /// Set (or, on a locked policy, extend) the retention period.
    pub fn set_retention_policy(
        &self,
        bucket: &BucketId,
        period_secs: i64,
    ) -> HoldfastResult<BucketRetentionPolicy> {
        let period_secs = validate_retention_period(period_secs)?;

        let update = retry_on_precondition(self.retry, || {
            self.ctx.update_bucket(bucket, |current| {
                let change = PolicyState::of(current.retention_policy.as_ref())
                    .plan_set(bucket, period_secs)?;
                Ok(change.map(BucketDelta::retention))
            })
        })?;

        log_applied(bucket, &update, "Retention policy set");
        policy_of(bucket, update.into_inner())
    }

    pub fn remove_retention_policy(&self, bucket: &BucketId) -> HoldfastResult<BucketAttributes> {
        let update = retry_on_precondition(self.retry, || {
            self.ctx.update_bucket(bucket, |current| {
                let change =
                    PolicyState::of(current.retention_policy.as_ref()).plan_remove(bucket)?;
                Ok(change.map(BucketDelta::retention))
            })
        })?;

        log_applied(bucket, &update, "Retention policy removed");
        Ok(update.into_inner())
    }

    /// Irreversibly lock the bucket's retention policy.
    ///
    /// Returns the policy as re-read after the lock so `effective_time_ms`
    /// reflects what the backend stamped. Locking a locked policy returns it
    /// unchanged without writing.
    pub fn lock_retention_policy(
        &self,
        bucket: &BucketId,
    ) -> HoldfastResult<BucketRetentionPolicy> {
        let update = retry_on_precondition(self.retry, || {
            self.ctx.update_bucket(bucket, |current| {
                let change = PolicyState::of(current.retention_policy.as_ref()).plan_lock(bucket)?;
                Ok(change.map(BucketDelta::retention))
            })
        })?;

        let attrs = match update {
            Update::Applied(applied) => {
                let locked = self.ctx.read_bucket(bucket)?;
                info!(
                    bucket = %bucket,
                    metageneration = applied.metageneration,
                    effective_time_ms = ?locked.retention_policy.map(|p| p.effective_time_ms),
                    "Retention policy locked"
                );
                locked
            }
            Update::Unchanged(current) => {
                debug!(bucket = %bucket, "Retention policy already locked");
                current
            }
        };

        policy_of(bucket, attrs)
    }
}

fn log_applied(bucket: &BucketId, update: &Update<BucketAttributes>, message: &str) {
    if let Update::Applied(attrs) = update {
        info!(
            bucket = %bucket,
            metageneration = attrs.metageneration,
            policy = ?attrs.retention_policy,
            "{}", message
        );
    }
}

fn policy_of(bucket: &BucketId, attrs: BucketAttributes) -> HoldfastResult<BucketRetentionPolicy> {
    attrs.retention_policy.ok_or_else(|| HoldfastError::NoPolicySet {
        bucket: bucket.to_string(),
    })
}
