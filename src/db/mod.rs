//! Relational recipe store.
//!
//! [`Database`] is a cheap, cloneable handle to one SQLite file. Each public
//! operation opens its own connection and runs inside exactly one
//! transaction, so handles can be shared across threads and SQLite's own
//! locking coordinates concurrent writers.

mod bundle;
mod legacy;
mod migrate;
mod models;
mod query;
mod schema;
mod writer;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use bundle::{Bundle, ImportSummary};
pub use legacy::{LegacyRecipe, LegacyStore};
pub use migrate::{MigrationReport, VerificationReport};
pub use models::{display_line, Ingredient, Recipe, RecipeDraft, RecipeIngredient};
pub use query::{RecipePage, RecipeQuery};
pub use schema::{MIGRATIONS, SCHEMA};

use crate::config::{DatabaseConfig, SearchConfig};
use crate::error::{Error, Result};
use crate::normalize::{LeadingQuantitySplitter, Normalizer, QuantitySplitter, VocabularyNormalizer};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared flag a caller raises to abandon in-flight operations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation applied to every operation on a handle.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelFlag>,
}

/// Remaining allowance of one running operation.
pub(crate) struct Budget {
    deadline: Option<Instant>,
    cancel: Option<CancelFlag>,
}

impl Budget {
    /// Fails with `Cancelled` once the deadline has passed or the flag is up.
    pub(crate) fn check(&self, operation: &str) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(Error::Cancelled(format!("{} was cancelled", operation)));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Cancelled(format!("{} exceeded its deadline", operation)));
        }
        Ok(())
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Page size bounds applied by the query builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 100,
        }
    }
}

impl From<&SearchConfig> for PageLimits {
    fn from(config: &SearchConfig) -> Self {
        Self {
            default_page_size: config.default_page_size.max(1),
            max_page_size: config.max_page_size.max(1),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
    options: CallOptions,
    limits: PageLimits,
    normalizer: Arc<dyn Normalizer>,
    splitter: Arc<dyn QuantitySplitter>,
}

impl Database {
    /// Opens (creating if needed) the store file and checks it is reachable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StoreUnavailable(format!("cannot create {:?}: {}", parent, e))
            })?;
        }

        let db = Self {
            path,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            options: CallOptions::default(),
            limits: PageLimits::default(),
            normalizer: Arc::new(VocabularyNormalizer),
            splitter: Arc::new(LeadingQuantitySplitter),
        };
        db.connect(&db.budget())?;
        Ok(db)
    }

    pub fn from_config(database: &DatabaseConfig, search: &SearchConfig) -> Result<Self> {
        let mut db = Self::open(&database.path)?
            .with_busy_timeout(Duration::from_millis(database.busy_timeout_ms))
            .with_page_limits(search.into());
        if let Some(ms) = database.transaction_timeout_ms {
            db = db.with_timeout(Duration::from_millis(ms));
        }
        Ok(db)
    }

    /// Creates tables, indexes and triggers, then applies pending migrations.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.connect(&self.budget())?;
        conn.execute_batch(SCHEMA)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, path = ?self.path, "Store schema ready");
        self.run_migrations(&conn);
        Ok(())
    }

    fn run_migrations(&self, conn: &Connection) {
        for migration in MIGRATIONS {
            let _ = conn.execute(migration, []);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn normalizer(&self) -> &dyn Normalizer {
        self.normalizer.as_ref()
    }

    pub fn splitter(&self) -> &dyn QuantitySplitter {
        self.splitter.as_ref()
    }

    pub fn page_limits(&self) -> PageLimits {
        self.limits
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn QuantitySplitter>) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_page_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Bounds each operation started through the returned handle.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.options.cancel = Some(flag);
        self
    }

    pub fn with_call_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn budget(&self) -> Budget {
        Budget {
            deadline: self.options.timeout.map(|t| Instant::now() + t),
            cancel: self.options.cancel.clone(),
        }
    }

    pub(crate) fn connect(&self, budget: &Budget) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        let wait = budget
            .remaining()
            .map_or(self.busy_timeout, |left| left.min(self.busy_timeout));
        conn.busy_timeout(wait)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Write transactions take the write lock up front so two writers never
    /// deadlock upgrading from a shared lock.
    pub(crate) fn begin_write<'c>(&self, conn: &'c mut Connection) -> Result<Transaction<'c>> {
        Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    pub(crate) fn begin_read<'c>(&self, conn: &'c mut Connection) -> Result<Transaction<'c>> {
        Ok(conn.transaction_with_behavior(TransactionBehavior::Deferred)?)
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Current time at the precision the store keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn truncate(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(6)
}

/// Fixed-width text so lexical order matches time order.
pub(crate) fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    pub fn temp_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("recipes.db")).unwrap();
        db.initialize().unwrap();
        (dir, db)
    }

    pub fn draft(name: &str, lines: &[&str]) -> RecipeDraft {
        RecipeDraft::new(name, format!("Make the {}.", name.to_lowercase()))
            .with_ingredients(lines.iter().copied())
    }

    pub fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    pub fn count(db: &Database, table: &str) -> i64 {
        let conn = Connection::open(db.path()).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let (_dir, db) = temp_db();
        db.initialize().unwrap();
        db.initialize().unwrap();
        assert_eq!(count(&db, "recipes"), 0);
    }

    #[test]
    fn test_open_unreachable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let result = Database::open(blocker.join("recipes.db"));
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[test]
    fn test_timestamp_is_fixed_width() {
        let early = timestamp(&at("2024-01-01T09:00:00Z"));
        let later = timestamp(&at("2024-01-01T09:00:00.5Z"));
        assert_eq!(early, "2024-01-01T09:00:00.000000Z");
        assert_eq!(early.len(), later.len());
        assert!(early < later);
        assert_eq!(parse_timestamp(0, &later).unwrap(), at("2024-01-01T09:00:00.5Z"));
    }

    #[test]
    fn test_budget_checks() {
        let (_dir, db) = temp_db();
        assert!(db.budget().check("noop").is_ok());

        let flag = CancelFlag::new();
        let cancelled = db.clone().with_cancel_flag(flag.clone());
        assert!(cancelled.budget().check("noop").is_ok());
        flag.cancel();
        assert!(matches!(
            cancelled.budget().check("noop"),
            Err(Error::Cancelled(_))
        ));

        let expired = db.with_timeout(Duration::ZERO);
        assert!(matches!(expired.budget().check("noop"), Err(Error::Cancelled(_))));
    }
}
