//! # mercado-db: Database Layer for Mercado POS
//!
//! SQLite store for the sales & inventory engine. Every mutating
//! operation runs in exactly one transaction owned by a repository method,
//! so a rejected or failed call leaves the store as it was.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mercado POS Data Flow                            │
//! │                                                                         │
//! │  Request handler (checkout, return, count, ...)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    mercado-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ sales, shifts │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ returns, loss │    │ 001_initial  │  │   │
//! │  │   │ WAL, busy     │    │ counts, promo │    │  _schema.sql │  │   │
//! │  │   │ timeout       │    │ catalog,audit │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ pure rules                     │   │
//! │  │                                ▼                                │   │
//! │  │                          mercado-core                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (MERCADO_DB_PATH)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`config`] - Environment-driven engine configuration
//! - [`telemetry`] - Tracing subscriber setup for host processes
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mercado_db::{CommitSale, Database, EngineConfig};
//!
//! let db = Database::new(EngineConfig::from_env()?.db_config()).await?;
//!
//! let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await?;
//! let record = db.sales().commit(&CommitSale::new("op-1", cart, PaymentMethod::Cash)).await?;
//! let summary = db.shifts().close(&shift.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::audit::AuditRepository;
pub use repository::count::{AdjustmentOutcome, AdjustmentSelection, CountRepository, SessionReport, SessionSummary};
pub use repository::loss::{LossFilter, LossListing, LossRepository};
pub use repository::product::{LowStockItem, LowStockReport, NewProduct, ProductRepository, ProductUpdate, Removal};
pub use repository::promotion::{NewPromotion, PromotionRepository, PromotionUpdate};
pub use repository::returns::ReturnRepository;
pub use repository::sale::{AppliedPromotion, CommitSale, SaleRepository};
pub use repository::shift::ShiftRepository;
pub use repository::suspended::SuspendedSaleRepository;
