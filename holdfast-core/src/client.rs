//! High-level client that wires the controllers to one injected store.
//! The CLI and HTTP service delegate to this.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::HoldfastResult;
use crate::gate::DeleteDecision;
use crate::holds::HoldController;
use crate::infrastructure::{AttributeStore, Clock, SystemClock};
use crate::infrastructure_in_memory::InMemoryAttributeStore;
use crate::lifecycle::ObjectLifecycle;
use crate::optimistic::{RetryPolicy, StoreContext};
use crate::retention::RetentionPolicyController;
use crate::types::*;

/// Tunables shared by every controller the client builds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Attempts per mutation when a precondition race is lost
    pub retry: RetryPolicy,
    /// Per store call timeout; `None` waits indefinitely
    pub call_timeout_ms: Option<u64>,
}

/// The main entry point. Every operation addresses resources by name and
/// validates those names before touching the store.
pub struct HoldfastClient {
    ctx: StoreContext,
    retention: RetentionPolicyController,
    holds: HoldController,
    lifecycle: ObjectLifecycle,
}

impl HoldfastClient {
    /// Client over a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryAttributeStore::new()), ClientConfig::default())
    }

    pub fn with_store(store: Arc<dyn AttributeStore>, config: ClientConfig) -> Self {
        Self::with_store_and_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_store_and_clock(
        store: Arc<dyn AttributeStore>,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        let ctx = StoreContext::new(store)
            .with_clock(clock)
            .with_call_timeout(config.call_timeout_ms);
        Self {
            retention: RetentionPolicyController::new(ctx.clone()).with_retry(config.retry),
            holds: HoldController::new(ctx.clone()).with_retry(config.retry),
            lifecycle: ObjectLifecycle::new(ctx.clone()).with_retry(config.retry),
            ctx,
        }
    }

    /// Client backed by SQLite at the given path. State persists across restarts.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(path: &str, config: ClientConfig) -> HoldfastResult<Self> {
        let store = crate::infrastructure_sqlite::SqliteAttributeStore::open(path)?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    pub fn store(&self) -> &dyn AttributeStore {
        self.ctx.store()
    }

    pub fn retention(&self) -> &RetentionPolicyController {
        &self.retention
    }

    pub fn holds(&self) -> &HoldController {
        &self.holds
    }

    pub fn lifecycle(&self) -> &ObjectLifecycle {
        &self.lifecycle
    }

    // ─── Buckets ────────────────────────────────────────────────────────────

    pub fn create_bucket(&self, bucket: &str) -> HoldfastResult<BucketAttributes> {
        let bucket = BucketId::parse(bucket)?;
        Ok(self.ctx.store().create_bucket(&bucket, self.ctx.deadline())?)
    }

    pub fn get_retention_policy(
        &self,
        bucket: &str,
    ) -> HoldfastResult<Option<BucketRetentionPolicy>> {
        self.retention.get_retention_policy(&BucketId::parse(bucket)?)
    }

    pub fn set_retention_policy(
        &self,
        bucket: &str,
        period_secs: i64,
    ) -> HoldfastResult<BucketRetentionPolicy> {
        self.retention
            .set_retention_policy(&BucketId::parse(bucket)?, period_secs)
    }

    pub fn remove_retention_policy(&self, bucket: &str) -> HoldfastResult<BucketAttributes> {
        self.retention
            .remove_retention_policy(&BucketId::parse(bucket)?)
    }

    pub fn lock_retention_policy(&self, bucket: &str) -> HoldfastResult<BucketRetentionPolicy> {
        self.retention
            .lock_retention_policy(&BucketId::parse(bucket)?)
    }

    pub fn get_default_event_based_hold(&self, bucket: &str) -> HoldfastResult<bool> {
        self.holds.default_event_based_hold(&BucketId::parse(bucket)?)
    }

    pub fn set_default_event_based_hold(
        &self,
        bucket: &str,
        enabled: bool,
    ) -> HoldfastResult<BucketAttributes> {
        self.holds
            .set_default_event_based_hold(&BucketId::parse(bucket)?, enabled)
    }

    // ─── Objects ────────────────────────────────────────────────────────────

    pub fn create_object(&self, bucket: &str, object: &str) -> HoldfastResult<ObjectAttributes> {
        self.lifecycle.create_object(&ObjectKey::parse(bucket, object)?)
    }

    pub fn get_object_holds(&self, bucket: &str, object: &str) -> HoldfastResult<ObjectAttributes> {
        self.holds.object_holds(&ObjectKey::parse(bucket, object)?)
    }

    pub fn set_object_event_based_hold(
        &self,
        bucket: &str,
        object: &str,
        enabled: bool,
    ) -> HoldfastResult<ObjectAttributes> {
        self.holds
            .set_object_event_based_hold(&ObjectKey::parse(bucket, object)?, enabled)
    }

    pub fn set_object_temporary_hold(
        &self,
        bucket: &str,
        object: &str,
        enabled: bool,
    ) -> HoldfastResult<ObjectAttributes> {
        self.holds
            .set_object_temporary_hold(&ObjectKey::parse(bucket, object)?, enabled)
    }

    pub fn release_all_holds(&self, bucket: &str, object: &str) -> HoldfastResult<ObjectAttributes> {
        self.holds.release_all_holds(&ObjectKey::parse(bucket, object)?)
    }

    pub fn can_delete(&self, bucket: &str, object: &str) -> HoldfastResult<DeleteDecision> {
        self.lifecycle.can_delete(&ObjectKey::parse(bucket, object)?)
    }

    pub fn delete_object(&self, bucket: &str, object: &str) -> HoldfastResult<ObjectAttributes> {
        self.lifecycle.delete_object(&ObjectKey::parse(bucket, object)?)
    }

    pub fn overwrite_object(&self, bucket: &str, object: &str) -> HoldfastResult<ObjectAttributes> {
        self.lifecycle
            .overwrite_object(&ObjectKey::parse(bucket, object)?)
    }

    pub fn move_object(
        &self,
        bucket: &str,
        source: &str,
        destination: &str,
    ) -> HoldfastResult<ObjectAttributes> {
        let source = ObjectKey::parse(bucket, source)?;
        let destination = ObjectKey::new(source.bucket.clone(), destination)?;
        self.lifecycle.move_object(&source, &destination)
    }
}

impl Default for HoldfastClient {
    fn default() -> Self {
        Self::new()
    }
}
