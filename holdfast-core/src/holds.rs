use tracing::info;

use crate::error::HoldfastResult;
use crate::optimistic::{retry_on_precondition, RetryPolicy, StoreContext, Update};
use crate::types::{
    BucketAttributes, BucketDelta, BucketId, ObjectAttributes, ObjectDelta, ObjectKey,
};

/// Which per-object hold a setter addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldKind {
    EventBased,
    Temporary,
}

impl HoldKind {
    fn is_set(self, object: &ObjectAttributes) -> bool {
        match self {
            HoldKind::EventBased => object.event_based_hold,
            HoldKind::Temporary => object.temporary_hold,
        }
    }

    fn delta(self, enabled: bool) -> ObjectDelta {
        match self {
            HoldKind::EventBased => ObjectDelta::event_based_hold(enabled),
            HoldKind::Temporary => ObjectDelta::temporary_hold(enabled),
        }
    }
}

impl std::fmt::Display for HoldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldKind::EventBased => write!(f, "event-based"),
            HoldKind::Temporary => write!(f, "temporary"),
        }
    }
}

/// Owns the bucket default hold and the per-object hold flags.
///
/// Every setter sends a delta naming only the flag it changes, so toggling one
/// hold never resets the other.
#[derive(Clone)]
pub struct HoldController {
    ctx: StoreContext,
    retry: RetryPolicy,
}

impl HoldController {
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

    pub fn default_event_based_hold(&self, bucket: &BucketId) -> HoldfastResult<bool> {
        Ok(self.ctx.read_bucket(bucket)?.default_event_based_hold)
    }

    /// Only objects created after this call inherit the new default.
    pub fn set_default_event_based_hold(
        &self,
        bucket: &BucketId,
        enabled: bool,
    ) -> HoldfastResult<BucketAttributes> {
        let update = retry_on_precondition(self.retry, || {
            self.ctx.update_bucket(bucket, |current| {
                Ok((current.default_event_based_hold != enabled)
                    .then(|| BucketDelta::default_event_based_hold(enabled)))
            })
        })?;

        if let Update::Applied(attrs) = &update {
            info!(
                bucket = %bucket,
                enabled,
                metageneration = attrs.metageneration,
                "Default event-based hold updated"
            );
        }
        Ok(update.into_inner())
    }

    pub fn object_holds(&self, key: &ObjectKey) -> HoldfastResult<ObjectAttributes> {
        self.ctx.read_object(key)
    }

    pub fn set_object_event_based_hold(
        &self,
        key: &ObjectKey,
        enabled: bool,
    ) -> HoldfastResult<ObjectAttributes> {
        self.set_object_hold(key, HoldKind::EventBased, enabled)
    }

    pub fn set_object_temporary_hold(
        &self,
        key: &ObjectKey,
        enabled: bool,
    ) -> HoldfastResult<ObjectAttributes> {
        self.set_object_hold(key, HoldKind::Temporary, enabled)
    }

    pub fn set_object_hold(
        &self,
        key: &ObjectKey,
        kind: HoldKind,
        enabled: bool,
    ) -> HoldfastResult<ObjectAttributes> {
        let update = retry_on_precondition(self.retry, || {
            self.ctx.update_object(key, |current| {
                Ok((kind.is_set(current) != enabled).then(|| kind.delta(enabled)))
            })
        })?;

        if let Update::Applied(attrs) = &update {
            info!(
                object = %key,
                hold = %kind,
                enabled,
                generation = attrs.generation,
                metageneration = attrs.metageneration,
                "Object hold updated"
            );
        }
        Ok(update.into_inner())
    }

    /// Clear both holds in one preconditioned update
    pub fn release_all_holds(&self, key: &ObjectKey) -> HoldfastResult<ObjectAttributes> {
        let update = retry_on_precondition(self.retry, || {
            self.ctx.update_object(key, |current| {
                let delta = ObjectDelta {
                    event_based_hold: current.event_based_hold.then_some(false),
                    temporary_hold: current.temporary_hold.then_some(false),
                };
                Ok(Some(delta))
            })
        })?;

        if let Update::Applied(attrs) = &update {
            info!(
                object = %key,
                metageneration = attrs.metageneration,
                "All object holds released"
            );
        }
        Ok(update.into_inner())
    }
}
