use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use crate::error::StoreResult;
use crate::infrastructure::{AttributeStore, ManualClock};
use crate::infrastructure_in_memory::InMemoryAttributeStore;
use crate::optimistic::StoreContext;
use crate::types::*;

pub const START_MS: u64 = 1_700_000_000_000;

pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryAttributeStore>,
    pub ctx: StoreContext,
}

pub fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(START_MS));
    let store = Arc::new(InMemoryAttributeStore::with_clock(clock.clone()));
    let ctx = StoreContext::new(store.clone()).with_clock(clock.clone());
    Fixture { clock, store, ctx }
}

impl Fixture {
    pub fn bucket(&self, name: &str) -> BucketId {
        let id = bucket(name);
        self.store
            .create_bucket(&id, Deadline::none())
            .expect("create bucket");
        id
    }

    pub fn object(&self, bucket: &BucketId, name: &str) -> ObjectKey {
        let key = ObjectKey::new(bucket.clone(), name).expect("valid object name");
        self.store
            .write_object(&key, WriteCondition::DoesNotExist, Deadline::none())
            .expect("create object");
        key
    }
}

pub fn bucket(name: &str) -> BucketId {
    BucketId::parse(name).expect("valid bucket name")
}

// ─── Store Wrappers ─────────────────────────────────────────────────────────

/// Counts calls that reach the wrapped store
pub struct CountingStore {
    pub inner: Arc<dyn AttributeStore>,
    pub calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn AttributeStore>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl AttributeStore for CountingStore {
    fn create_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        self.hit();
        self.inner.create_bucket(bucket, deadline)
    }

    fn get_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        self.hit();
        self.inner.get_bucket(bucket, deadline)
    }

    fn update_bucket(
        &self,
        bucket: &BucketId,
        delta: &BucketDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<BucketAttributes> {
        self.hit();
        self.inner.update_bucket(bucket, delta, preconditions, deadline)
    }

    fn get_object(&self, key: &ObjectKey, deadline: Deadline) -> StoreResult<ObjectAttributes> {
        self.hit();
        self.inner.get_object(key, deadline)
    }

    fn update_object(
        &self,
        key: &ObjectKey,
        delta: &ObjectDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        self.hit();
        self.inner.update_object(key, delta, preconditions, deadline)
    }

    fn write_object(
        &self,
        key: &ObjectKey,
        condition: WriteCondition,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        self.hit();
        self.inner.write_object(key, condition, deadline)
    }

    fn delete_object(
        &self,
        key: &ObjectKey,
        generation: u64,
        deadline: Deadline,
    ) -> StoreResult<()> {
        self.hit();
        self.inner.delete_object(key, generation, deadline)
    }
}

/// Holds the first `parties` bucket reads at a barrier until all of them have
/// read, so every one of those callers observes the same metageneration.
pub struct RendezvousStore {
    inner: Arc<dyn AttributeStore>,
    barrier: Barrier,
    pending: AtomicUsize,
}

impl RendezvousStore {
    pub fn new(inner: Arc<dyn AttributeStore>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
            pending: AtomicUsize::new(parties),
        }
    }
}

impl AttributeStore for RendezvousStore {
    fn create_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        self.inner.create_bucket(bucket, deadline)
    }

    fn get_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        let attrs = self.inner.get_bucket(bucket, deadline);
        let joined = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if joined {
            self.barrier.wait();
        }
        attrs
    }

    fn update_bucket(
        &self,
        bucket: &BucketId,
        delta: &BucketDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<BucketAttributes> {
        self.inner.update_bucket(bucket, delta, preconditions, deadline)
    }

    fn get_object(&self, key: &ObjectKey, deadline: Deadline) -> StoreResult<ObjectAttributes> {
        self.inner.get_object(key, deadline)
    }

    fn update_object(
        &self,
        key: &ObjectKey,
        delta: &ObjectDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        self.inner.update_object(key, delta, preconditions, deadline)
    }

    fn write_object(
        &self,
        key: &ObjectKey,
        condition: WriteCondition,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        self.inner.write_object(key, condition, deadline)
    }

    fn delete_object(
        &self,
        key: &ObjectKey,
        generation: u64,
        deadline: Deadline,
    ) -> StoreResult<()> {
        self.inner.delete_object(key, generation, deadline)
    }
}

/// Advances the clock before every update, simulating a slow round trip
pub struct LaggingStore {
    pub inner: Arc<dyn AttributeStore>,
    pub clock: Arc<ManualClock>,
    pub lag_ms: u64,
}

impl AttributeStore for LaggingStore {
    fn create_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        self.inner.create_bucket(bucket, deadline)
    }

    fn get_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        self.inner.get_bucket(bucket, deadline)
    }

    fn update_bucket(
        &self,
        bucket: &BucketId,
        delta: &BucketDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<BucketAttributes> {
        self.clock.advance(self.lag_ms);
        self.inner.update_bucket(bucket, delta, preconditions, deadline)
    }

    fn get_object(&self, key: &ObjectKey, deadline: Deadline) -> StoreResult<ObjectAttributes> {
        self.inner.get_object(key, deadline)
    }

    fn update_object(
        &self,
        key: &ObjectKey,
        delta: &ObjectDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        self.clock.advance(self.lag_ms);
        self.inner.update_object(key, delta, preconditions, deadline)
    }

    fn write_object(
        &self,
        key: &ObjectKey,
        condition: WriteCondition,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        self.inner.write_object(key, condition, deadline)
    }

    fn delete_object(
        &self,
        key: &ObjectKey,
        generation: u64,
        deadline: Deadline,
    ) -> StoreResult<()> {
        self.inner.delete_object(key, generation, deadline)
    }
}

/// What [`DisturbAfterWrite`] does to its target
#[derive(Debug, Clone, Copy)]
pub enum Disturbance {
    TemporaryHold,
    Overwrite,
}

/// After each of the first `times` successful writes to any key other than
/// `target`, changes `target` directly on the wrapped store. Simulates another
/// writer landing between a copy and the delete that follows it.
pub struct DisturbAfterWrite {
    inner: Arc<dyn AttributeStore>,
    target: ObjectKey,
    disturbance: Disturbance,
    remaining: AtomicUsize,
}

impl DisturbAfterWrite {
    pub fn new(
        inner: Arc<dyn AttributeStore>,
        target: ObjectKey,
        disturbance: Disturbance,
        times: usize,
    ) -> Self {
        Self {
            inner,
            target,
            disturbance,
            remaining: AtomicUsize::new(times),
        }
    }

    fn disturb(&self) {
        let current = self
            .inner
            .get_object(&self.target, Deadline::none())
            .expect("target exists");
        match self.disturbance {
            Disturbance::TemporaryHold => {
                self.inner
                    .update_object(
                        &self.target,
                        &ObjectDelta::temporary_hold(true),
                        &current.preconditions(),
                        Deadline::none(),
                    )
                    .expect("hold target");
            }
            Disturbance::Overwrite => {
                self.inner
                    .write_object(
                        &self.target,
                        WriteCondition::GenerationMatch(current.generation),
                        Deadline::none(),
                    )
                    .expect("overwrite target");
            }
        }
    }
}

impl AttributeStore for DisturbAfterWrite {
    fn create_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        self.inner.create_bucket(bucket, deadline)
    }

    fn get_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        self.inner.get_bucket(bucket, deadline)
    }

    fn update_bucket(
        &self,
        bucket: &BucketId,
        delta: &BucketDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<BucketAttributes> {
        self.inner.update_bucket(bucket, delta, preconditions, deadline)
    }

    fn get_object(&self, key: &ObjectKey, deadline: Deadline) -> StoreResult<ObjectAttributes> {
        self.inner.get_object(key, deadline)
    }

    fn update_object(
        &self,
        key: &ObjectKey,
        delta: &ObjectDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        self.inner.update_object(key, delta, preconditions, deadline)
    }

    fn write_object(
        &self,
        key: &ObjectKey,
        condition: WriteCondition,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        let attrs = self.inner.write_object(key, condition, deadline)?;
        let due = *key != self.target
            && self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if due {
            self.disturb();
        }
        Ok(attrs)
    }

    fn delete_object(
        &self,
        key: &ObjectKey,
        generation: u64,
        deadline: Deadline,
    ) -> StoreResult<()> {
        self.inner.delete_object(key, generation, deadline)
    }
}
