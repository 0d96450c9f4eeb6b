//! # Domain Types
//!
//! Core domain types used throughout Mercado POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │     Shift       │   │      Sale       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  price (Money)  │   │  operator_id    │   │  ticket         │       │
//! │  │  current_stock  │   │  total_sales    │   │  total (Money)  │       │
//! │  │  unit_type      │   │  total_returns  │   │  lines[] (snap) │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ SuspendedSale   │   │ ProductReturn   │   │  InventoryLoss  │       │
//! │  │  items[] (JSON) │   │  quantity       │   │  kind           │       │
//! │  │  never touches  │   │  adds stock     │   │  removes stock  │       │
//! │  │  stock/totals   │   │  + shift totals │   │  reversible     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ PhysicalCount   │   │ ProductChange   │   │ CountAdjustment │       │
//! │  │ Entry (state)   │   │ (audit)         │   │ (audit)         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Sale lines and returns copy the product title and unit price at the time
//! of the operation, so later catalog edits never rewrite history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Catalog
// =============================================================================

/// How a product is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Sold in whole units.
    Unit,
    /// Sold by weight; quantities may be fractional.
    Weight,
}

impl Default for UnitType {
    fn default() -> Self {
        UnitType::Unit
    }
}

impl UnitType {
    /// Checks that a quantity is expressible in this unit.
    pub fn accepts(&self, quantity: f64) -> bool {
        match self {
            UnitType::Unit => quantity.fract() == 0.0,
            UnitType::Weight => true,
        }
    }
}

/// A product category.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A product available for sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to cashier and on receipts.
    pub title: String,

    /// Unit price in minor currency units.
    pub price: Money,

    /// Current stock. Fractional for weight-typed products. Never negative.
    pub current_stock: f64,

    /// Stock at or below this level is reported as low.
    pub min_stock: f64,

    pub unit_type: UnitType,

    pub category_id: Option<String>,

    pub barcode: Option<String>,

    /// Profit margin included in the price, if known.
    pub cost_margin: Option<Money>,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    /// Tagged as one of the best sellers.
    pub is_frequent: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Cost price, when a margin is recorded.
    pub fn cost_price(&self) -> Option<Money> {
        self.cost_margin.map(|margin| self.price - margin)
    }

    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.min_stock
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.current_stock <= 0.0
    }
}

// =============================================================================
// Shift
// =============================================================================

/// How a sale was paid.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
}

/// A bounded work session for one operator.
///
/// At most one shift per operator has `is_active = true`. While active the
/// totals only grow; returns accumulate in their own columns.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shift {
    pub id: String,
    pub operator_id: String,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Cash in the drawer when the shift opened.
    pub opening_float: Money,
    pub total_sales: Money,
    pub total_cash: Money,
    pub total_card: Money,
    pub sales_count: i64,
    pub total_returns: Money,
    pub returns_count: i64,
}

impl Shift {
    /// Sales minus returns.
    pub fn net_total(&self) -> Money {
        self.total_sales - self.total_returns
    }

    /// Expected cash in the drawer: float + cash sales − returns.
    pub fn expected_cash(&self) -> Money {
        self.opening_float + self.total_cash - self.total_returns
    }
}

/// Read-only snapshot of a shift's totals, returned on close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShiftSummary {
    pub shift_id: String,
    pub operator_id: String,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub total_sales: Money,
    pub total_cash: Money,
    pub total_card: Money,
    pub sales_count: i64,
    pub total_returns: Money,
    pub returns_count: i64,
    pub net_total: Money,
    pub expected_cash: Money,
}

impl From<&Shift> for ShiftSummary {
    fn from(shift: &Shift) -> Self {
        ShiftSummary {
            shift_id: shift.id.clone(),
            operator_id: shift.operator_id.clone(),
            opened_at: shift.opened_at,
            closed_at: shift.closed_at,
            total_sales: shift.total_sales,
            total_cash: shift.total_cash,
            total_card: shift.total_card,
            sales_count: shift.sales_count,
            total_returns: shift.total_returns,
            returns_count: shift.returns_count,
            net_total: shift.net_total(),
            expected_cash: shift.expected_cash(),
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// One line of a proposed cart, as submitted by the register.
///
/// Title and unit price are the values the cashier saw; they are frozen
/// into the sale line as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub title: String,
    pub unit_price: Money,
    pub quantity: f64,
}

impl CartLine {
    /// `unit_price × quantity`, rounded half-up to a whole unit.
    pub fn line_subtotal(&self) -> Money {
        self.unit_price.times_quantity(self.quantity)
    }
}

/// Σ(unit price × quantity) over every line.
pub fn cart_subtotal(lines: &[CartLine]) -> Money {
    lines.iter().map(CartLine::line_subtotal).sum()
}

/// Total quantity of one product across all lines of a cart.
pub fn cart_quantity_of(lines: &[CartLine], product_id: &str) -> f64 {
    lines
        .iter()
        .filter(|l| l.product_id == product_id)
        .map(|l| l.quantity)
        .sum()
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale. Immutable apart from `note`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Human-readable ticket, unique across all sales.
    pub ticket: String,
    pub shift_id: String,
    pub operator_id: String,
    pub payment_method: PaymentMethod,
    pub subtotal: Money,
    pub discount_total: Money,
    /// Post-discount total. Never negative.
    pub total: Money,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A line item in a sale.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLine {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// Product title at time of sale (frozen).
    pub title_snapshot: String,
    /// Unit price at time of sale (frozen).
    pub unit_price: Money,
    pub quantity: f64,
    pub line_subtotal: Money,
}

/// Where an applied discount came from.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    Manual,
    Promotion,
}

/// A discount applied to a committed sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AppliedDiscount {
    pub id: String,
    pub sale_id: String,
    pub source: DiscountSource,
    pub promotion_id: Option<String>,
    pub description: String,
    pub amount: Money,
    /// Percentage applied, for manual percentage discounts.
    pub percentage: Option<f64>,
    /// Operator who applied the discount.
    pub applied_by: String,
}

/// A sale with its lines and discounts.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRecord {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
    pub discounts: Vec<AppliedDiscount>,
}

// =============================================================================
// Suspended Sale
// =============================================================================

/// A parked cart. Has no effect on stock or shift totals.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SuspendedSale {
    pub id: String,
    pub ticket: String,
    pub shift_id: String,
    pub operator_id: String,
    pub items: Vec<CartLine>,
    pub total: Money,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Returns
// =============================================================================

/// A customer return, recorded against a product and a shift.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductReturn {
    pub id: String,
    pub ticket: String,
    pub shift_id: String,
    pub operator_id: String,
    pub product_id: String,
    pub title_snapshot: String,
    pub quantity: f64,
    pub unit_price: Money,
    pub total: Money,
    pub reason: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Inventory Loss
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    Expired,
    Damaged,
}

/// A non-sale stock decrement.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryLoss {
    pub id: String,
    pub product_id: String,
    pub quantity: f64,
    pub kind: LossKind,
    pub reason: Option<String>,
    pub operator_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Physical Count
// =============================================================================

/// State of a single count entry. See [`crate::count`] for transitions.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CountState {
    Pending,
    Counted,
    Adjusted,
    Closed,
}

impl CountState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountState::Pending => "pending",
            CountState::Counted => "counted",
            CountState::Adjusted => "adjusted",
            CountState::Closed => "closed",
        }
    }
}

/// One product's line in a count session.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PhysicalCountEntry {
    pub id: String,
    pub session_id: String,
    pub product_id: String,
    pub operator_id: String,
    /// Stock recorded in the catalog when the session started.
    pub system_quantity: f64,
    pub physical_quantity: Option<f64>,
    /// `physical_quantity − system_quantity`, once counted.
    pub difference: Option<f64>,
    pub state: CountState,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub counted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub adjusted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Audit
// =============================================================================

/// What happened to a product.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ProductAction {
    Created,
    Updated,
    Deactivated,
    Deleted,
    StockSold,
    StockReturned,
    LossRecorded,
    LossReverted,
}

/// Catalog-change audit entry. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductChange {
    pub id: String,
    pub product_id: String,
    pub operator_id: String,
    pub action: ProductAction,
    pub description: String,
    /// JSON object of the values before the change.
    pub old_values: Option<String>,
    /// JSON object of the values after the change.
    pub new_values: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Physical-count audit entry. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CountAdjustment {
    pub id: String,
    pub product_id: String,
    pub operator_id: String,
    pub session_id: String,
    pub old_stock: f64,
    pub new_stock: f64,
    pub difference: f64,
    pub observation: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
