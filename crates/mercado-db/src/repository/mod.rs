//! # Repository Module
//!
//! Store access for the sales & inventory engine.
//!
//! ## Transaction Boundaries
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Who Owns the Transaction                             │
//! │                                                                         │
//! │  Public repository method           one BEGIN .. COMMIT                │
//! │  ├── SaleRepository::commit         sale, lines, stock, shift, audit   │
//! │  ├── ReturnRepository::create       return, stock, shift, audit        │
//! │  ├── LossRepository::record/delete  ledger row, stock, audit           │
//! │  └── CountRepository::apply_..      entries, stock, count audit        │
//! │       │                                                                 │
//! │       │  &mut SqliteConnection (the open transaction)                  │
//! │       ▼                                                                 │
//! │  pub(crate) helpers                 never BEGIN or COMMIT themselves   │
//! │  ├── shift::claim_active / record_sale / record_return                 │
//! │  ├── product::fetch / decrement_stock / increment_stock / set_stock    │
//! │  ├── promotion::fetch / uses_on                                        │
//! │  ├── suspended::take                                                   │
//! │  └── audit::record_product_change / record_count_adjustment            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog, categories, low-stock report
//! - [`ShiftRepository`](shift::ShiftRepository) - Shift lifecycle and aggregates
//! - [`SaleRepository`](sale::SaleRepository) - Checkout commits and sale history
//! - [`SuspendedSaleRepository`](suspended::SuspendedSaleRepository) - Parked carts
//! - [`ReturnRepository`](returns::ReturnRepository) - Customer returns
//! - [`LossRepository`](loss::LossRepository) - Inventory-loss ledger
//! - [`CountRepository`](count::CountRepository) - Physical count sessions
//! - [`PromotionRepository`](promotion::PromotionRepository) - Promotions and daily caps
//! - [`AuditRepository`](audit::AuditRepository) - Audit trail reads

pub mod audit;
pub mod count;
pub mod loss;
pub mod product;
pub mod promotion;
pub mod returns;
pub mod sale;
pub mod shift;
pub mod suspended;
