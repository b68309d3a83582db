use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Counter, CounterEvent, CounterId};

use super::MIGRATION_001_INITIAL;

/// Storage-level failures. The unique-constraint case is a distinct variant
/// so the service can translate it into a domain error instead of pattern
/// matching on driver internals.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,

    #[error("invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = e {
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                return StoreError::UniqueViolation;
            }
        }
        StoreError::Database(e)
    }
}

/// Ledger statistics used for integrity checking.
#[derive(Debug, Clone)]
pub struct LedgerStats {
    pub event_count: i64,
    pub orphaned_events: i64,
    pub zero_delta_events: i64,
}

/// Repository for persisting and querying counters and their events.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION_001_INITIAL).execute(&self.pool).await?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self, StoreError> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Counter operations
    // ========================

    /// Insert a new counter. Fails with `StoreError::UniqueViolation` if an
    /// active counter with the same name (case-insensitively) exists; the
    /// partial unique index is the final authority on name collisions.
    pub async fn insert_counter(&self, counter: &Counter) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO counters (id, name, unit, value, default_amount, created_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(counter.id.to_string())
        .bind(&counter.name)
        .bind(&counter.unit)
        .bind(counter.value)
        .bind(counter.default_amount)
        .bind(counter.created_at.to_rfc3339())
        .bind(counter.deleted_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist new name/unit/default_amount for an existing counter.
    /// Never touches `value` or `created_at`. Returns false if the counter
    /// is missing or was deleted in the meantime; deleted counters accept
    /// no further writes.
    pub async fn update_counter(&self, counter: &Counter) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE counters SET name = ?, unit = ?, default_amount = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&counter.name)
        .bind(&counter.unit)
        .bind(counter.default_amount)
        .bind(counter.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get a counter by ID, deleted or not.
    pub async fn get_counter(&self, id: CounterId) -> Result<Option<Counter>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, unit, value, default_amount, created_at, deleted_at
            FROM counters
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_counter(&row)?)),
            None => Ok(None),
        }
    }

    /// Check whether an active counter with the given name exists,
    /// ignoring case. Soft-deleted counters don't reserve their name.
    pub async fn exists_by_name(&self, name: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM counters
                WHERE name = ? COLLATE NOCASE AND deleted_at IS NULL
            ) as found
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("found") != 0)
    }

    /// List all active counters, ordered by name ascending.
    /// Ordering uses SQLite's NOCASE collation (ASCII case folding), the
    /// same collation that backs the uniqueness index.
    pub async fn list_active(&self) -> Result<Vec<Counter>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, unit, value, default_amount, created_at, deleted_at
            FROM counters
            WHERE deleted_at IS NULL
            ORDER BY name COLLATE NOCASE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_counter).collect()
    }

    /// List all counters including soft-deleted ones (integrity checks and
    /// exports; deleted counters still own their history).
    pub async fn list_all(&self) -> Result<Vec<Counter>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, unit, value, default_amount, created_at, deleted_at
            FROM counters
            ORDER BY name COLLATE NOCASE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_counter).collect()
    }

    /// Mark a counter as deleted. Its events are untouched. Returns false
    /// if the counter is missing or already deleted, so a concurrent delete
    /// can never overwrite the original `deleted_at`.
    pub async fn soft_delete(
        &self,
        id: CounterId,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE counters SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(deleted_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================
    // Delta application
    // ========================

    /// Apply one delta: bump the counter's value and append the event in a
    /// single transaction, then return the committed counter snapshot.
    /// The value update is relative (`value = value + delta`) so concurrent
    /// deltas against the same counter never lose an update, and it filters
    /// on `deleted_at IS NULL` so a delta racing a delete writes nothing:
    /// `None` means the counter is missing or deleted.
    pub async fn apply_delta(&self, event: &CounterEvent) -> Result<Option<Counter>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE counters SET value = value + ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(event.delta)
        .bind(event.counter_id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            INSERT INTO counter_events (id, counter_id, delta, occurred_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.counter_id.to_string())
        .bind(event.delta)
        .bind(event.occurred_at.to_rfc3339())
        .bind(event.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT id, name, unit, value, default_amount, created_at, deleted_at
            FROM counters
            WHERE id = ?
            "#,
        )
        .bind(event.counter_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let counter = Self::row_to_counter(&row)?;

        tx.commit().await?;
        Ok(Some(counter))
    }

    // ========================
    // Event queries
    // ========================

    /// List the event ledger for a counter, newest first.
    pub async fn list_events_for_counter(
        &self,
        counter_id: CounterId,
    ) -> Result<Vec<CounterEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, counter_id, delta, occurred_at, created_at
            FROM counter_events
            WHERE counter_id = ?
            ORDER BY occurred_at DESC, created_at DESC
            "#,
        )
        .bind(counter_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    /// List every event in the ledger, oldest first.
    pub async fn list_all_events(&self) -> Result<Vec<CounterEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, counter_id, delta, occurred_at, created_at
            FROM counter_events
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    /// Sum the deltas recorded for a counter using SQL aggregation.
    pub async fn sum_events_for_counter(&self, counter_id: CounterId) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(delta), 0) as total
            FROM counter_events
            WHERE counter_id = ?
            "#,
        )
        .bind(counter_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }

    /// Count events recorded for a counter.
    pub async fn count_events_for_counter(&self, counter_id: CounterId) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM counter_events WHERE counter_id = ?")
            .bind(counter_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    /// Get the most recent `occurred_at` for a counter.
    pub async fn last_activity(
        &self,
        counter_id: CounterId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT MAX(occurred_at) as last_activity
            FROM counter_events
            WHERE counter_id = ?
            "#,
        )
        .bind(counter_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        let last_activity: Option<String> = row.get("last_activity");
        last_activity.map(|s| Self::parse_timestamp(&s)).transpose()
    }

    /// Get ledger statistics for integrity checking.
    pub async fn get_ledger_stats(&self) -> Result<LedgerStats, StoreError> {
        let event_count: i64 = sqlx::query("SELECT COUNT(*) as count FROM counter_events")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let orphaned_events: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM counter_events e
            WHERE NOT EXISTS (SELECT 1 FROM counters c WHERE c.id = e.counter_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await?
        .get("count");

        let zero_delta_events: i64 =
            sqlx::query("SELECT COUNT(*) as count FROM counter_events WHERE delta = 0")
                .fetch_one(&self.pool)
                .await?
                .get("count");

        Ok(LedgerStats {
            event_count,
            orphaned_events,
            zero_delta_events,
        })
    }

    // ========================
    // Row conversion
    // ========================

    fn row_to_counter(row: &sqlx::sqlite::SqliteRow) -> Result<Counter, StoreError> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");
        let deleted_at_str: Option<String> = row.get("deleted_at");

        Ok(Counter {
            id: Self::parse_uuid(&id_str)?,
            name: row.get("name"),
            unit: row.get("unit"),
            value: row.get("value"),
            default_amount: row.get("default_amount"),
            created_at: Self::parse_timestamp(&created_at_str)?,
            deleted_at: deleted_at_str
                .map(|s| Self::parse_timestamp(&s))
                .transpose()?,
        })
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<CounterEvent, StoreError> {
        let id_str: String = row.get("id");
        let counter_id_str: String = row.get("counter_id");
        let occurred_at_str: String = row.get("occurred_at");
        let created_at_str: String = row.get("created_at");

        Ok(CounterEvent {
            id: Self::parse_uuid(&id_str)?,
            counter_id: Self::parse_uuid(&counter_id_str)?,
            delta: row.get("delta"),
            occurred_at: Self::parse_timestamp(&occurred_at_str)?,
            created_at: Self::parse_timestamp(&created_at_str)?,
        })
    }

    fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
        Uuid::parse_str(s).map_err(|_| StoreError::InvalidRecord(format!("invalid id: {s}")))
    }

    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| StoreError::InvalidRecord(format!("invalid timestamp: {s}")))
    }
}
