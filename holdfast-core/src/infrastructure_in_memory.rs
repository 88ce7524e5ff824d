use crate::error::{StoreError, StoreResult};
use crate::infrastructure::{
    apply_bucket_delta, apply_object_delta, check_bucket_preconditions, check_deadline,
    check_mutable, check_object_preconditions, check_write_condition, new_generation,
    AttributeStore, Clock, SystemClock,
};
use crate::types::{
    BucketAttributes, BucketDelta, BucketId, Deadline, ObjectAttributes, ObjectDelta, ObjectKey,
    Preconditions, WriteCondition,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    buckets: HashMap<BucketId, BucketAttributes>,
    objects: HashMap<ObjectKey, ObjectAttributes>,
    // Store-wide so a deleted-then-recreated object never reuses a generation
    last_generation: u64,
}

/// An attribute store held entirely in process memory.
///
/// A single mutex guards all documents, which makes every compare-and-swap
/// linearizable.
pub struct InMemoryAttributeStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl InMemoryAttributeStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }

    pub fn bucket_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.buckets.len())
    }

    pub fn object_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.objects.len())
    }
}

impl Default for InMemoryAttributeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeStore for InMemoryAttributeStore {
    fn create_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        let now = self.clock.now_ms();
        check_deadline(deadline, now, format!("bucket {}", bucket))?;

        let mut inner = self.lock()?;
        if inner.buckets.contains_key(bucket) {
            return Err(StoreError::AlreadyExists(format!("bucket {}", bucket)));
        }

        let attrs = BucketAttributes {
            name: bucket.clone(),
            metageneration: 1,
            created_at_ms: now,
            retention_policy: None,
            default_event_based_hold: false,
        };
        inner.buckets.insert(bucket.clone(), attrs.clone());
        Ok(attrs)
    }

    fn get_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        check_deadline(deadline, self.clock.now_ms(), format!("bucket {}", bucket))?;

        self.lock()?
            .buckets
            .get(bucket)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("bucket {}", bucket)))
    }

    fn update_bucket(
        &self,
        bucket: &BucketId,
        delta: &BucketDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<BucketAttributes> {
        let now = self.clock.now_ms();
        check_deadline(deadline, now, format!("bucket {}", bucket))?;

        let mut inner = self.lock()?;
        let current = inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NotFound(format!("bucket {}", bucket)))?;

        check_bucket_preconditions(current, preconditions)?;
        let next = apply_bucket_delta(current, delta, now)?;
        *current = next.clone();
        Ok(next)
    }

    fn get_object(&self, key: &ObjectKey, deadline: Deadline) -> StoreResult<ObjectAttributes> {
        check_deadline(deadline, self.clock.now_ms(), format!("object {}", key))?;

        self.lock()?
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("object {}", key)))
    }

    fn update_object(
        &self,
        key: &ObjectKey,
        delta: &ObjectDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        check_deadline(deadline, self.clock.now_ms(), format!("object {}", key))?;

        let mut inner = self.lock()?;
        let current = inner
            .objects
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("object {}", key)))?;

        check_object_preconditions(current, preconditions)?;
        let next = apply_object_delta(current, delta);
        *current = next.clone();
        Ok(next)
    }

    fn write_object(
        &self,
        key: &ObjectKey,
        condition: WriteCondition,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        let now = self.clock.now_ms();
        check_deadline(deadline, now, format!("object {}", key))?;

        let mut inner = self.lock()?;
        let bucket = inner
            .buckets
            .get(&key.bucket)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("bucket {}", key.bucket)))?;

        let live = inner.objects.get(key);
        check_write_condition(key, live, condition)?;
        if let Some(live) = live {
            check_mutable(&bucket, live, now)?;
        }

        inner.last_generation += 1;
        let attrs = new_generation(&bucket, key, inner.last_generation, now);
        inner.objects.insert(key.clone(), attrs.clone());
        Ok(attrs)
    }

    fn delete_object(
        &self,
        key: &ObjectKey,
        generation: u64,
        deadline: Deadline,
    ) -> StoreResult<()> {
        let now = self.clock.now_ms();
        check_deadline(deadline, now, format!("object {}", key))?;

        let mut inner = self.lock()?;
        let current = inner
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(format!("object {}", key)))?;

        if current.generation != generation {
            return Err(StoreError::PreconditionFailed {
                resource: format!("object {}", key),
                field: "generation",
                expected: generation,
                actual: current.generation,
            });
        }

        if let Some(bucket) = inner.buckets.get(&key.bucket) {
            check_mutable(bucket, current, now)?;
        }

        inner.objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisoned_lock_surfaces_as_backend_error() {
        let store = Arc::new(InMemoryAttributeStore::new());
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.inner.lock().unwrap();
            panic!("writer died while holding the store lock");
        })
        .join();

        assert!(matches!(store.bucket_count(), Err(StoreError::Backend(_))));
        assert!(matches!(store.object_count(), Err(StoreError::Backend(_))));

        let b = BucketId::parse("after-panic").unwrap();
        assert!(matches!(
            store.create_bucket(&b, Deadline::none()),
            Err(StoreError::Backend(_))
        ));
    }
}
