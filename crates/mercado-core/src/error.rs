//! # Error Types
//!
//! Domain-specific error types for mercado-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Engine Error Families                               │
//! │                                                                         │
//! │  mercado-core errors (this file)                                       │
//! │  ├── CoreError        - Domain outcomes (stock, shifts, counts)        │
//! │  └── ValidationError  - Malformed or missing input                     │
//! │                                                                         │
//! │  mercado-db errors (separate crate)                                    │
//! │  └── DbError          - Store failures, wraps CoreError                │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → request handler         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Taxonomy
//! Every error maps onto one [`ErrorKind`]:
//!
//! | Kind          | Caller action            | Examples                            |
//! |---------------|--------------------------|-------------------------------------|
//! | Validation    | fix the input            | missing title, percentage > 100     |
//! | StateConflict | retry later or re-read   | insufficient stock, locked entry    |
//! | Consistency   | none, logged as a bug    | closed shift mutated, negative stock|
//! | NotFound      | re-read the catalog      | unknown product, promotion, session |

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of every error the engine can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    StateConflict,
    Consistency,
    NotFound,
}

// =============================================================================
// Core Error
// =============================================================================

/// A business rule refused the operation.
///
/// None of these leave partial state behind: they are raised before a
/// mutation or abort the transaction that was performing it.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but has been deactivated.
    #[error("Product {0} is inactive")]
    ProductInactive(String),

    /// Insufficient stock to complete the operation.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart line (qty: 5)
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Register shows: "Only 3 units in stock"
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: f64,
        requested: f64,
    },

    /// The operator has no open shift.
    #[error("Operator {0} has no active shift")]
    NoActiveShift(String),

    /// An aggregate update targeted a shift that is already closed.
    #[error("Shift {0} is closed")]
    ShiftClosed(String),

    /// The record belongs to a shift other than the caller's open shift.
    #[error("{entity} {id} does not belong to the caller's active shift")]
    NotAuthorized { entity: String, id: String },

    /// A count entry is adjusted or closed and can no longer be counted.
    #[error("Count entry {entry_id} is {state} and cannot be modified")]
    EntryLocked { entry_id: String, state: String },

    #[error("Promotion not found: {0}")]
    PromotionNotFound(String),

    /// The promotion's daily usage cap has been reached.
    #[error("Promotion {promotion_id} reached its daily limit of {limit} uses")]
    PromotionLimitReached { promotion_id: String, limit: u32 },

    #[error("Count session not found: {0}")]
    SessionNotFound(String),

    #[error("Count entry not found: {0}")]
    EntryNotFound(String),

    #[error("Suspended sale not found: {0}")]
    SuspendedSaleNotFound(String),

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Inventory loss not found: {0}")]
    LossNotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    /// A count session was requested but the catalog has nothing to count.
    #[error("There are no active products to count")]
    NoActiveProducts,

    /// A mutation would have produced negative stock.
    #[error("Stock for {product_id} would become negative ({resulting})")]
    NegativeStock { product_id: String, resulting: f64 },

    /// Input was rejected before any state was read.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Maps the error onto the engine's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,

            CoreError::InsufficientStock { .. }
            | CoreError::ProductInactive(_)
            | CoreError::NoActiveShift(_)
            | CoreError::NotAuthorized { .. }
            | CoreError::EntryLocked { .. }
            | CoreError::PromotionLimitReached { .. }
            | CoreError::NoActiveProducts => ErrorKind::StateConflict,

            CoreError::ShiftClosed(_) | CoreError::NegativeStock { .. } => ErrorKind::Consistency,

            CoreError::ProductNotFound(_)
            | CoreError::PromotionNotFound(_)
            | CoreError::SessionNotFound(_)
            | CoreError::EntryNotFound(_)
            | CoreError::SuspendedSaleNotFound(_)
            | CoreError::SaleNotFound(_)
            | CoreError::LossNotFound(_)
            | CoreError::CategoryNotFound(_) => ErrorKind::NotFound,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any store access. `line` fields are zero-based cart
/// positions so the register can highlight the offending row.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Empty or whitespace-only text.
    #[error("{field} is required")]
    Required { field: String },

    /// A required field is missing on a specific cart line.
    #[error("cart line {line}: {field} is required")]
    LineFieldRequired { line: usize, field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or more.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// A unit-typed product was given a fractional quantity.
    #[error("cart line {line}: product {product_id} is sold by unit, quantity {quantity} is not whole")]
    FractionalQuantity {
        line: usize,
        product_id: String,
        quantity: f64,
    },

    /// A fixed discount larger than the amount it discounts.
    #[error("discount {amount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { amount: i64, subtotal: i64 },

    /// Invalid format (e.g., invalid UUID, malformed condition payload).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate category name).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "A".to_string(),
            available: 3.0,
            requested: 5.0,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for A: available 3, requested 5"
        );

        let err = ValidationError::LineFieldRequired {
            line: 2,
            field: "title".to_string(),
        };
        assert_eq!(err.to_string(), "cart line 2: title is required");
    }

    #[test]
    fn test_rejected_input_is_a_validation_kind() {
        let wrapped = CoreError::from(ValidationError::Required {
            field: "reason".to_string(),
        });
        assert!(matches!(wrapped, CoreError::Validation(_)));
        assert_eq!(wrapped.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            CoreError::NoActiveShift("op".into()).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            CoreError::EntryLocked {
                entry_id: "e".into(),
                state: "adjusted".into()
            }
            .kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(CoreError::ShiftClosed("s".into()).kind(), ErrorKind::Consistency);
        assert_eq!(
            CoreError::SessionNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
    }
}
