//! # Validation Module
//!
//! Input validation for every operation that accepts caller data.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request handler                                              │
//! │  └── Deserialization (serde): types, enum tags, percentage range       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Required fields, positive quantities                              │
//! │  └── Reported before any store access                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (current_stock >= 0)                                        │
//! │  ├── UNIQUE tickets, one active shift per operator                     │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::CartLine;
use crate::MAX_CART_ITEMS;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Trims a required text field, rejecting blank input.
pub fn require_text(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(value.to_string())
}

/// Trims optional free text; blank input becomes `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validates a product title.
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters
///
/// ```rust
/// use mercado_core::validation::validate_title;
///
/// assert!(validate_title("Pan amasado").is_ok());
/// assert!(validate_title("   ").is_err());
/// ```
pub fn validate_title(title: &str) -> ValidationResult<String> {
    let title = require_text("title", title)?;
    if title.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: 200,
        });
    }
    Ok(title)
}

/// Normalizes a category name: trimmed, first letter upper-cased.
pub fn normalize_category_name(name: &str) -> ValidationResult<String> {
    let name = require_text("category name", name)?;
    let mut chars = name.chars();
    Ok(match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => name,
    })
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity that must be strictly positive.
pub fn validate_positive_quantity(field: &str, quantity: f64) -> ValidationResult<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a stock level or counted quantity (zero allowed).
pub fn validate_stock_level(field: &str, quantity: f64) -> ValidationResult<()> {
    if !quantity.is_finite() || quantity < 0.0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a price (zero allowed for free items).
pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Cart Validators
// =============================================================================

/// Validates the shape of a cart before any lookup happens.
///
/// ## Rules
/// - At least one line, at most [`MAX_CART_ITEMS`]
/// - Every line has a product id and a title
/// - Every quantity is positive, every unit price non-negative
///
/// ## User Workflow
/// ```text
/// Cashier presses "Cobrar"
///      │
///      ▼
/// validate_cart(lines) ← THIS FUNCTION
///      │
///      ├── empty?            → Required { field: "cart_items" }
///      ├── line 2 no title?  → LineFieldRequired { line: 2, field: "title" }
///      ├── qty 0?            → MustBePositive { field: "cart line 0 quantity" }
///      │
///      └── OK → shift / product / stock checks
/// ```
pub fn validate_cart(lines: &[CartLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "cart_items".to_string(),
        });
    }

    if lines.len() > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    for (index, line) in lines.iter().enumerate() {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::LineFieldRequired {
                line: index,
                field: "product_id".to_string(),
            });
        }
        if line.title.trim().is_empty() {
            return Err(ValidationError::LineFieldRequired {
                line: index,
                field: "title".to_string(),
            });
        }
        validate_positive_quantity(&format!("cart line {index} quantity"), line.quantity)?;
        validate_price(&format!("cart line {index} unit_price"), line.unit_price)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
