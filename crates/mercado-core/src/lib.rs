//! # mercado-core: Pure Business Logic for Mercado POS
//!
//! Everything the sales & inventory engine can decide without touching the
//! store: money math, cart validation, promotion evaluation and the physical
//! count state machine.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mercado POS Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Request handlers (HTTP / desktop, out of tree)          │   │
//! │  │    checkout, suspend, return, record loss, count, close shift    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    mercado-db (Database Layer)                   │   │
//! │  │        transactions, stock updates, shift aggregates, audit      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ mercado-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ promotion │  │   count   │  │   │
//! │  │   │  Product  │  │   Money   │  │   rules   │  │  entries  │  │   │
//! │  │   │   Sale    │  │ Discount  │  │  windows  │  │   stats   │  │   │
//! │  │   │   Shift   │  │   Rate    │  │  manual   │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Shift, Sale, count entries, audit)
//! - [`money`] - Integer money and discount rates
//! - [`promotion`] - Promotion rule engine and manual discounts
//! - [`count`] - Physical count transitions and session statistics
//! - [`error`] - Domain error types and taxonomy
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use mercado_core::money::{DiscountRate, Money};
//! use mercado_core::promotion::{DiscountShape, PromotionRule};
//! use mercado_core::CartLine;
//!
//! let cart = vec![CartLine {
//!     product_id: "A".into(),
//!     title: "Café".into(),
//!     unit_price: Money::from_minor(1000),
//!     quantity: 2.0,
//! }];
//!
//! let rule = PromotionRule::GeneralDiscount { min_purchase: Some(Money::from_minor(1500)) };
//! let shape = DiscountShape::Percentage(DiscountRate::from_percentage(10.0).unwrap());
//!
//! assert!(rule.applies_to(&cart));
//! assert_eq!(shape.apply(rule.applicable_subtotal(&cart)).minor_units(), 200);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod count;
pub mod error;
pub mod money;
pub mod promotion;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::{DiscountRate, Money};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Ticket prefix for suspended sales.
pub const SUSPENDED_TICKET_PREFIX: &str = "SUSP";

/// Ticket prefix for returns.
pub const RETURN_TICKET_PREFIX: &str = "DEV";

/// Number of best-selling products tagged as frequent.
pub const FREQUENT_PRODUCTS_LIMIT: u32 = 3;
