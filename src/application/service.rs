use chrono::{DateTime, Utc};

use crate::domain::{
    build_integrity_report, compute_all_values, Counter, CounterEvent, CounterId, IntegrityReport,
};
use crate::storage::{Repository, StoreError};

use super::{AppError, Clock, SystemClock};

/// Application service providing high-level operations for the counter
/// ledger. This is the primary interface for any client (CLI, API, etc.),
/// and the only component allowed to mutate counters or append events.
pub struct CounterService {
    repo: Repository,
    clock: Box<dyn Clock>,
}

/// Detailed counter information
pub struct CounterInfo {
    pub counter: Counter,
    pub event_count: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl CounterService {
    /// Create a new counter service with the given repository, using the
    /// system clock.
    pub fn new(repo: Repository) -> Self {
        Self::with_clock(repo, Box::new(SystemClock))
    }

    /// Create a counter service with an explicit time source.
    pub fn with_clock(repo: Repository, clock: Box<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Counter operations
    // ========================

    /// Create a new counter with value 0. The default amount falls back to 1
    /// when omitted.
    pub async fn create_counter(
        &self,
        name: &str,
        unit: &str,
        default_amount: Option<i64>,
    ) -> Result<Counter, AppError> {
        let name = name.trim();
        let unit = unit.trim();
        let default_amount = default_amount.unwrap_or(1);
        Self::validate_fields(name, unit, default_amount)?;

        // Fast pre-check; the unique index settles concurrent races.
        if self.repo.exists_by_name(name).await? {
            return Err(AppError::DuplicateName(name.to_string()));
        }

        let counter = Counter::new(
            name.to_string(),
            unit.to_string(),
            default_amount,
            self.clock.now(),
        );

        match self.repo.insert_counter(&counter).await {
            Ok(()) => Ok(counter),
            Err(StoreError::UniqueViolation) => Err(AppError::DuplicateName(name.to_string())),
            Err(e) => Err(AppError::Storage(e)),
        }
    }

    /// List all active counters, ordered by name ascending (case-insensitive).
    pub async fn list_counters(&self) -> Result<Vec<Counter>, AppError> {
        Ok(self.repo.list_active().await?)
    }

    /// Get an active counter by id. Soft-deleted counters are reported as
    /// not found, indistinguishable from ids that never existed.
    pub async fn get_counter(&self, id: CounterId) -> Result<Counter, AppError> {
        self.load_active(id).await
    }

    /// Update a counter's name, unit and default amount. The value and
    /// creation timestamp are never touched.
    pub async fn update_counter(
        &self,
        id: CounterId,
        name: &str,
        unit: &str,
        default_amount: i64,
    ) -> Result<Counter, AppError> {
        let mut counter = self.load_active(id).await?;

        let name = name.trim();
        let unit = unit.trim();
        Self::validate_fields(name, unit, default_amount)?;

        // Renaming a counter to its own name (case-insensitively) is never a
        // collision; anything else goes through the same check-then-insert
        // discipline as creation.
        if !name.eq_ignore_ascii_case(&counter.name) && self.repo.exists_by_name(name).await? {
            return Err(AppError::DuplicateName(name.to_string()));
        }

        counter.name = name.to_string();
        counter.unit = unit.to_string();
        counter.default_amount = default_amount;

        match self.repo.update_counter(&counter).await {
            Ok(true) => Ok(counter),
            // Deleted between our load and the write; deleted counters are
            // invisible, so this is indistinguishable from a missing id.
            Ok(false) => Err(AppError::NotFound(id)),
            Err(StoreError::UniqueViolation) => Err(AppError::DuplicateName(name.to_string())),
            Err(e) => Err(AppError::Storage(e)),
        }
    }

    /// Soft-delete a counter. Its events are retained and its name becomes
    /// available for reuse.
    pub async fn delete_counter(&self, id: CounterId) -> Result<(), AppError> {
        let counter = self
            .repo
            .get_counter(id)
            .await?
            .ok_or(AppError::NotFound(id))?;

        if counter.is_deleted() {
            return Err(AppError::AlreadyDeleted(id));
        }

        // The store refuses the write if another delete won the race, so
        // `deleted_at` is only ever set once.
        if !self.repo.soft_delete(id, self.clock.now()).await? {
            return Err(AppError::AlreadyDeleted(id));
        }
        Ok(())
    }

    // ========================
    // Delta operations
    // ========================

    /// Increase a counter's value. Uses the counter's default amount when
    /// `amount` is omitted; an explicit amount of 0 is a no-op that writes
    /// nothing. `occurred_at` allows backdating the event.
    pub async fn increment(
        &self,
        id: CounterId,
        amount: Option<i64>,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<Counter, AppError> {
        let counter = self.load_active(id).await?;

        let magnitude = Self::resolve_amount(amount, counter.default_amount)?;
        if magnitude == 0 {
            return Ok(counter);
        }

        self.apply_delta(&counter, magnitude, occurred_at).await
    }

    /// Decrease a counter's value. Same amount and backdating rules as
    /// `increment`.
    pub async fn decrement(
        &self,
        id: CounterId,
        amount: Option<i64>,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<Counter, AppError> {
        let counter = self.load_active(id).await?;

        let magnitude = Self::resolve_amount(amount, counter.default_amount)?;
        if magnitude == 0 {
            return Ok(counter);
        }

        self.apply_delta(&counter, -magnitude, occurred_at).await
    }

    /// The shared delta application: one event, one value bump, one
    /// transaction. The repository commits both writes together or not at
    /// all, and the returned snapshot is the committed row. A counter
    /// deleted between our load and the write yields nothing to apply to.
    async fn apply_delta(
        &self,
        counter: &Counter,
        delta: i64,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<Counter, AppError> {
        let now = self.clock.now();
        let event = CounterEvent::new(counter.id, delta, occurred_at.unwrap_or(now), now);
        self.repo
            .apply_delta(&event)
            .await?
            .ok_or(AppError::NotFound(counter.id))
    }

    // ========================
    // Query operations
    // ========================

    /// Get the event ledger for a counter, newest first.
    pub async fn counter_history(&self, id: CounterId) -> Result<Vec<CounterEvent>, AppError> {
        self.load_active(id).await?;
        Ok(self.repo.list_events_for_counter(id).await?)
    }

    /// Get detailed counter information.
    pub async fn counter_info(&self, id: CounterId) -> Result<CounterInfo, AppError> {
        let counter = self.load_active(id).await?;
        let event_count = self.repo.count_events_for_counter(id).await?;
        let last_activity = self.repo.last_activity(id).await?;

        Ok(CounterInfo {
            counter,
            event_count,
            last_activity,
        })
    }

    /// List every counter including soft-deleted ones (used for exports,
    /// where events may reference deleted counters).
    pub async fn all_counters(&self) -> Result<Vec<Counter>, AppError> {
        Ok(self.repo.list_all().await?)
    }

    /// List every recorded event, oldest first.
    pub async fn all_events(&self) -> Result<Vec<CounterEvent>, AppError> {
        Ok(self.repo.list_all_events().await?)
    }

    // ========================
    // Integrity operations
    // ========================

    /// Cross-check every counter's cached value against the sum of its
    /// event deltas and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let counters = self.repo.list_all().await?;
        let sums = compute_all_values(&self.repo.list_all_events().await?);
        let stats = self.repo.get_ledger_stats().await?;

        Ok(build_integrity_report(
            &counters,
            &sums,
            stats.event_count,
            stats.orphaned_events,
            stats.zero_delta_events,
        ))
    }

    // ========================
    // Helpers
    // ========================

    async fn load_active(&self, id: CounterId) -> Result<Counter, AppError> {
        let counter = self
            .repo
            .get_counter(id)
            .await?
            .ok_or(AppError::NotFound(id))?;

        // Deleted counters are invisible to callers.
        if counter.is_deleted() {
            return Err(AppError::NotFound(id));
        }

        Ok(counter)
    }

    fn validate_fields(name: &str, unit: &str, default_amount: i64) -> Result<(), AppError> {
        if name.is_empty() {
            return Err(AppError::Validation("name must not be blank"));
        }
        if unit.is_empty() {
            return Err(AppError::Validation("unit must not be blank"));
        }
        if default_amount <= 0 {
            return Err(AppError::Validation("default amount must be positive"));
        }
        Ok(())
    }

    fn resolve_amount(amount: Option<i64>, default_amount: i64) -> Result<i64, AppError> {
        match amount {
            Some(a) if a < 0 => Err(AppError::Validation("amount must not be negative")),
            Some(a) => Ok(a),
            None => Ok(default_amount),
        }
    }
}
