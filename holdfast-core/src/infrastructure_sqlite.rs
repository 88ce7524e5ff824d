//! SQLite-backed AttributeStore implementation.
//! Provides persistent bucket and object attributes across restarts.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! holdfast-core = { path = "../holdfast-core", features = ["sqlite"] }
//! ```

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{StoreError, StoreResult};
use crate::infrastructure::{
    apply_bucket_delta, apply_object_delta, check_bucket_preconditions, check_deadline,
    check_mutable, check_object_preconditions, check_write_condition, new_generation,
    AttributeStore, Clock, SystemClock,
};
use crate::types::*;

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(format!("sqlite: {}", e))
    }
}

/// A persistent attribute store backed by SQLite.
///
/// Every read-compare-write runs inside one immediate transaction, so the
/// compare-and-swap holds even with several processes on the same file.
pub struct SqliteAttributeStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteAttributeStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> StoreResult<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: &str, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // WAL for concurrent readers
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS buckets (
                name                     TEXT PRIMARY KEY,
                metageneration           INTEGER NOT NULL,
                created_at               INTEGER NOT NULL,
                retention_period_secs    INTEGER,
                retention_effective_time INTEGER,
                retention_locked         INTEGER NOT NULL DEFAULT 0,
                default_event_based_hold INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS objects (
                bucket           TEXT NOT NULL REFERENCES buckets(name),
                name             TEXT NOT NULL,
                generation       INTEGER NOT NULL,
                metageneration   INTEGER NOT NULL,
                creation_time    INTEGER NOT NULL,
                event_based_hold INTEGER NOT NULL DEFAULT 0,
                temporary_hold   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (bucket, name)
            );

            CREATE TABLE IF NOT EXISTS generation_counter (
                id   INTEGER PRIMARY KEY CHECK (id = 0),
                last INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO generation_counter (id, last) VALUES (0, 0);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".to_string()))
    }

    fn row_to_bucket(row: &rusqlite::Row) -> rusqlite::Result<BucketAttributes> {
        let name: String = row.get(0)?;
        let period: Option<u64> = row.get(3)?;
        let effective_time: Option<u64> = row.get(4)?;
        let is_locked: bool = row.get(5)?;

        let name = BucketId::parse(name).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(BucketAttributes {
            name,
            metageneration: row.get(1)?,
            created_at_ms: row.get(2)?,
            retention_policy: period.map(|retention_period_secs| BucketRetentionPolicy {
                retention_period_secs,
                effective_time_ms: effective_time.unwrap_or_default(),
                is_locked,
            }),
            default_event_based_hold: row.get(6)?,
        })
    }

    fn row_to_object(row: &rusqlite::Row) -> rusqlite::Result<ObjectAttributes> {
        let bucket: String = row.get(0)?;
        let bucket = BucketId::parse(bucket).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(ObjectAttributes {
            bucket,
            name: row.get(1)?,
            generation: row.get(2)?,
            metageneration: row.get(3)?,
            creation_time_ms: row.get(4)?,
            event_based_hold: row.get(5)?,
            temporary_hold: row.get(6)?,
        })
    }

    fn load_bucket(tx: &Transaction, bucket: &BucketId) -> StoreResult<Option<BucketAttributes>> {
        Ok(tx
            .query_row(
                "SELECT name, metageneration, created_at, retention_period_secs,
                        retention_effective_time, retention_locked, default_event_based_hold
                 FROM buckets WHERE name = ?1",
                params![bucket.as_str()],
                Self::row_to_bucket,
            )
            .optional()?)
    }

    fn load_object(tx: &Transaction, key: &ObjectKey) -> StoreResult<Option<ObjectAttributes>> {
        Ok(tx
            .query_row(
                "SELECT bucket, name, generation, metageneration, creation_time,
                        event_based_hold, temporary_hold
                 FROM objects WHERE bucket = ?1 AND name = ?2",
                params![key.bucket.as_str(), key.object],
                Self::row_to_object,
            )
            .optional()?)
    }

    fn store_object(tx: &Transaction, attrs: &ObjectAttributes) -> StoreResult<()> {
        tx.execute(
            "INSERT OR REPLACE INTO objects
                (bucket, name, generation, metageneration, creation_time, event_based_hold, temporary_hold)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                attrs.bucket.as_str(),
                attrs.name,
                attrs.generation,
                attrs.metageneration,
                attrs.creation_time_ms,
                attrs.event_based_hold,
                attrs.temporary_hold,
            ],
        )?;
        Ok(())
    }
}

impl AttributeStore for SqliteAttributeStore {
    fn create_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        let now = self.clock.now_ms();
        check_deadline(deadline, now, format!("bucket {}", bucket))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        if Self::load_bucket(&tx, bucket)?.is_some() {
            return Err(StoreError::AlreadyExists(format!("bucket {}", bucket)));
        }

        tx.execute(
            "INSERT INTO buckets (name, metageneration, created_at) VALUES (?1, 1, ?2)",
            params![bucket.as_str(), now],
        )?;
        let attrs = Self::load_bucket(&tx, bucket)?
            .ok_or_else(|| StoreError::NotFound(format!("bucket {}", bucket)))?;
        tx.commit()?;
        Ok(attrs)
    }

    fn get_bucket(&self, bucket: &BucketId, deadline: Deadline) -> StoreResult<BucketAttributes> {
        check_deadline(deadline, self.clock.now_ms(), format!("bucket {}", bucket))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::load_bucket(&tx, bucket)?
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

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let current = Self::load_bucket(&tx, bucket)?
            .ok_or_else(|| StoreError::NotFound(format!("bucket {}", bucket)))?;

        check_bucket_preconditions(&current, preconditions)?;
        let next = apply_bucket_delta(&current, delta, now)?;

        tx.execute(
            "UPDATE buckets SET metageneration = ?1, retention_period_secs = ?2,
                    retention_effective_time = ?3, retention_locked = ?4,
                    default_event_based_hold = ?5
             WHERE name = ?6 AND metageneration = ?7",
            params![
                next.metageneration,
                next.retention_policy.map(|p| p.retention_period_secs),
                next.retention_policy.map(|p| p.effective_time_ms),
                next.retention_policy.is_some_and(|p| p.is_locked),
                next.default_event_based_hold,
                bucket.as_str(),
                current.metageneration,
            ],
        )?;
        tx.commit()?;
        Ok(next)
    }

    fn get_object(&self, key: &ObjectKey, deadline: Deadline) -> StoreResult<ObjectAttributes> {
        check_deadline(deadline, self.clock.now_ms(), format!("object {}", key))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::load_object(&tx, key)?.ok_or_else(|| StoreError::NotFound(format!("object {}", key)))
    }

    fn update_object(
        &self,
        key: &ObjectKey,
        delta: &ObjectDelta,
        preconditions: &Preconditions,
        deadline: Deadline,
    ) -> StoreResult<ObjectAttributes> {
        check_deadline(deadline, self.clock.now_ms(), format!("object {}", key))?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let current = Self::load_object(&tx, key)?
            .ok_or_else(|| StoreError::NotFound(format!("object {}", key)))?;

        check_object_preconditions(&current, preconditions)?;
        let next = apply_object_delta(&current, delta);
        Self::store_object(&tx, &next)?;
        tx.commit()?;
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

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let bucket = Self::load_bucket(&tx, &key.bucket)?
            .ok_or_else(|| StoreError::NotFound(format!("bucket {}", key.bucket)))?;

        let live = Self::load_object(&tx, key)?;
        check_write_condition(key, live.as_ref(), condition)?;
        if let Some(live) = &live {
            check_mutable(&bucket, live, now)?;
        }

        let generation: u64 = tx.query_row(
            "UPDATE generation_counter SET last = last + 1 WHERE id = 0 RETURNING last",
            [],
            |row| row.get(0),
        )?;
        let attrs = new_generation(&bucket, key, generation, now);
        Self::store_object(&tx, &attrs)?;
        tx.commit()?;
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

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let current = Self::load_object(&tx, key)?
            .ok_or_else(|| StoreError::NotFound(format!("object {}", key)))?;

        if current.generation != generation {
            return Err(StoreError::PreconditionFailed {
                resource: format!("object {}", key),
                field: "generation",
                expected: generation,
                actual: current.generation,
            });
        }
        if let Some(bucket) = Self::load_bucket(&tx, &key.bucket)? {
            check_mutable(&bucket, &current, now)?;
        }

        tx.execute(
            "DELETE FROM objects WHERE bucket = ?1 AND name = ?2 AND generation = ?3",
            params![key.bucket.as_str(), key.object, generation],
        )?;
        tx.commit()?;
        Ok(())
    }
}
