//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Writers And Readers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      One Store, Many Registers                          │
//! │                                                                         │
//! │  EngineConfig::from_env() ──► DbConfig ──► Database::new(config)       │
//! │                                                │ pool + migrations      │
//! │                                                ▼                        │
//! │   register 1 ── sales().commit ──┐                                     │
//! │   register 2 ── returns().create ┼──► SQLite write lock (one writer)   │
//! │   back office ─ counts().apply ──┘        waits up to busy_timeout,    │
//! │                                           then Conflict                │
//! │                                                                         │
//! │   reports ───── low_stock_report, history ──► WAL snapshot reads       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled so that reports and
//! catalog reads never block a checkout in progress.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use mercado_core::FREQUENT_PRODUCTS_LIMIT;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::audit::AuditRepository;
use crate::repository::count::CountRepository;
use crate::repository::loss::LossRepository;
use crate::repository::product::ProductRepository;
use crate::repository::promotion::PromotionRepository;
use crate::repository::returns::ReturnRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::shift::ShiftRepository;
use crate::repository::suspended::SuspendedSaleRepository;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/mercado/mercado.db")
///     .max_connections(5)
///     .busy_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Pool ceiling. Default: 5
    pub max_connections: u32,

    /// Connections kept open. Default: 1
    pub min_connections: u32,

    /// How long to wait for a free connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// How long a writer waits for the SQLite lock before reporting a conflict.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Apply pending migrations in `Database::new`. Default: true
    pub run_migrations: bool,

    /// How many best sellers are tagged as frequent after each sale.
    /// Default: 3
    pub frequent_limit: u32,
}

impl DbConfig {
    /// File-backed store at `path`, created on first connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            frequent_limit: FREQUENT_PRODUCTS_LIMIT,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// How long `acquire` waits for a free connection.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Sets how many products are tagged as frequent.
    pub fn frequent_limit(mut self, limit: u32) -> Self {
        self.frequent_limit = limit;
        self
    }

    /// A private in-memory store, used by the test suites.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// // Each call gets its own isolated, empty database
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            // every pooled connection would open its own empty database
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(3600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            frequent_limit: FREQUENT_PRODUCTS_LIMIT,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }
}

// =============================================================================
// Database
// =============================================================================

/// Entry point to the store: owns the pool and hands out repositories.
///
/// Cheap to clone; every clone shares the same pool. Repositories are
/// created per call and hold a pool handle of their own.
///
/// ## Usage
/// ```rust,ignore
/// let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await?;
/// let sale = db.sales().commit(&request).await?;
/// let summary = db.shifts().close(&shift.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,

    frequent_limit: u32,
}

impl Database {
    /// Opens the store.
    ///
    /// ## What This Does
    /// 1. Opens (or creates) the file
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous
    ///    - Foreign keys enabled
    ///    - Busy timeout for competing writers
    /// 3. Builds the pool
    /// 4. Applies migrations unless disabled
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening store");

        let connect_url = if config.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.database_path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            frequent_limit: config.frequent_limit,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    ///
    /// Idempotent. Called by `new()` when `run_migrations` is set.
    pub async fn run_migrations(&self) -> DbResult<()> {
        debug!("Applying migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Raw pool, for callers that need a connection of their own.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Catalog: products, categories, low-stock report.
    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn shifts(&self) -> ShiftRepository {
        ShiftRepository::new(self.pool.clone())
    }

    /// Sale commits and sale history.
    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone(), self.frequent_limit)
    }

    pub fn suspended_sales(&self) -> SuspendedSaleRepository {
        SuspendedSaleRepository::new(self.pool.clone())
    }

    pub fn returns(&self) -> ReturnRepository {
        ReturnRepository::new(self.pool.clone())
    }

    pub fn losses(&self) -> LossRepository {
        LossRepository::new(self.pool.clone())
    }

    /// Physical count sessions.
    pub fn counts(&self) -> CountRepository {
        CountRepository::new(self.pool.clone())
    }

    pub fn promotions(&self) -> PromotionRepository {
        PromotionRepository::new(self.pool.clone())
    }

    /// Read access to the audit trail.
    pub fn audit(&self) -> AuditRepository {
        AuditRepository::new(self.pool.clone())
    }

    /// Waits for in-flight work, then closes every connection.
    pub async fn close(&self) {
        info!("Closing store");
        self.pool.close().await;
    }

    /// `SELECT 1` round trip.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_stores_are_isolated() {
        let first = Database::new(DbConfig::in_memory()).await.unwrap();
        let second = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(first.health_check().await);

        first.shifts().open_or_get_active("op-1", mercado_core::Money::zero()).await.unwrap();
        assert!(second.shifts().current("op-1").await.unwrap().is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = DbConfig::new("./register.db")
            .max_connections(8)
            .min_connections(2)
            .busy_timeout(Duration::from_millis(250))
            .frequent_limit(5);

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.frequent_limit, 5);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
