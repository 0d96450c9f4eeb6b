//! # Database Error Types
//!
//! Error types for store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Where Store Errors Come From                          │
//! │                                                                         │
//! │  CoreError (mercado-core)        SQLite Error (sqlx::Error)             │
//! │  validation, stock, locks             │                                 │
//! │       │                               ▼                                 │
//! │       │                     constraint / busy / pool classification     │
//! │       │                               │                                 │
//! │       └──────────────┬────────────────┘                                 │
//! │                      ▼                                                  │
//! │            DbError (this module)                                        │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │            DbError::kind() → Validation | StateConflict                 │
//! │                              | Consistency | NotFound                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed operation never leaves partial state: the transaction handle is
//! dropped on the `?` path and SQLite rolls it back.

use mercado_core::{CoreError, ErrorKind, ValidationError};
use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A business rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// No row with the requested id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write.
    ///
    /// ## When This Occurs
    /// - Duplicate barcode or category name
    /// - A second active shift for the same operator
    /// - Ticket collision
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// The row references a parent that does not exist.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (e.g. `current_stock >= 0`).
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// Another writer holds the database lock.
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    /// The store could not be opened or the pool is closed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Timed out waiting for a pooled connection.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A stored JSON payload could not be read or written.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// `NotFound` for `entity` with `id`.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Maps the error onto the engine's error taxonomy.
    ///
    /// ```text
    /// Domain(e)                          → e.kind()
    /// NotFound                           → NotFound
    /// UniqueViolation, Conflict,
    /// PoolExhausted                      → StateConflict
    /// Check / ForeignKey violation,
    /// Serialization, everything else     → Consistency
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Domain(err) => err.kind(),
            DbError::NotFound { .. } => ErrorKind::NotFound,
            DbError::UniqueViolation { .. } | DbError::Conflict(_) | DbError::PoolExhausted => {
                ErrorKind::StateConflict
            }
            _ => ErrorKind::Consistency,
        }
    }

    /// Returns the wrapped domain error, if any.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// Classifies driver errors.
///
/// ```text
/// RowNotFound                 → NotFound
/// Database                    → constraint or lock, by message and code
/// PoolTimedOut                → PoolExhausted
/// anything else               → Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite messages:
                // "UNIQUE constraint failed: <table>.<column>"
                // "FOREIGN KEY constraint failed"
                // "CHECK constraint failed: <expr>"
                // "database is locked" / "database table is locked"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("is locked") || is_busy_code(db_err.code().as_deref()) {
                    DbError::Conflict(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .is_some_and(|c| matches!(c & 0xff, 5 | 6))
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let stock = DbError::from(CoreError::InsufficientStock {
            product_id: "A".into(),
            available: 1.0,
            requested: 2.0,
        });
        assert_eq!(stock.kind(), ErrorKind::StateConflict);
        assert_eq!(DbError::not_found("Sale", "x").kind(), ErrorKind::NotFound);
        assert_eq!(DbError::Conflict("locked".into()).kind(), ErrorKind::StateConflict);
        assert_eq!(
            DbError::CheckViolation { message: "stock".into() }.kind(),
            ErrorKind::Consistency
        );
    }

    #[test]
    fn test_validation_converts_to_domain() {
        let err = DbError::from(ValidationError::Required { field: "reason".into() });
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(err.as_domain(), Some(CoreError::Validation(_))));
    }

    #[test]
    fn test_busy_codes() {
        assert!(is_busy_code(Some("5")));
        assert!(is_busy_code(Some("517")));
        assert!(is_busy_code(Some("262")));
        assert!(!is_busy_code(Some("19")));
        assert!(!is_busy_code(None));
    }
}
