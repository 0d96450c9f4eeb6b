//! # Sale Repository
//!
//! Checkout commits and sale history.
//!
//! ## Commit Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Sale Commit (one transaction)                        │
//! │                                                                         │
//! │  validate cart + discounts          (pure, before BEGIN)               │
//! │       │                                                                 │
//! │  BEGIN                                                                  │
//! │  ├── claim operator's active shift  → NoActiveShift                    │
//! │  ├── load every product             → ProductNotFound / Inactive       │
//! │  ├── check quantities vs stock      → FractionalQuantity / Insufficient│
//! │  ├── check promotion daily caps     → PromotionLimitReached            │
//! │  ├── INSERT sale, lines, discounts                                     │
//! │  ├── guarded stock decrement + audit, per product                      │
//! │  ├── consume resumed suspended sale → NotAuthorized if foreign         │
//! │  └── shift aggregates += total                                         │
//! │  COMMIT                                                                 │
//! │       │                                                                 │
//! │  refresh frequent-products tag      (best effort, outside the tx)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any `?` inside the transaction drops it, and SQLite rolls back every
//! earlier step.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use mercado_core::promotion::ManualDiscount;
use mercado_core::validation::{optional_text, require_text, validate_cart, validate_price};
use mercado_core::{
    cart_quantity_of, cart_subtotal, AppliedDiscount, CartLine, CoreError, DiscountSource, Money, PaymentMethod,
    Product, ProductAction, Sale, SaleLine, SaleRecord, ValidationError,
};

use crate::error::DbResult;
use crate::repository::audit::{record_product_change, ProductChangeEntry};
use crate::repository::product::{self, ProductRepository, STOCK_EPSILON};
use crate::repository::{promotion, shift, suspended};

const SALE_COLUMNS: &str =
    "id, ticket, shift_id, operator_id, payment_method, subtotal, discount_total, total, note, created_at";

/// A catalog promotion the register applied, with the amount it computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedPromotion {
    pub promotion_id: String,
    pub discount_amount: Money,
}

/// Everything the register submits at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSale {
    pub operator_id: String,
    pub items: Vec<CartLine>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub manual_discount: Option<ManualDiscount>,
    #[serde(default)]
    pub applied_promotions: Vec<AppliedPromotion>,
    #[serde(default)]
    pub note: Option<String>,
    /// Suspended sale consumed by this checkout.
    #[serde(default)]
    pub resuming_suspended_id: Option<String>,
}

impl CommitSale {
    pub fn new(operator_id: impl Into<String>, items: Vec<CartLine>, payment_method: PaymentMethod) -> Self {
        CommitSale {
            operator_id: operator_id.into(),
            items,
            payment_method,
            manual_discount: None,
            applied_promotions: Vec::new(),
            note: None,
            resuming_suspended_id: None,
        }
    }
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    frequent_limit: u32,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool, frequent_limit: u32) -> Self {
        SaleRepository { pool, frequent_limit }
    }

    /// Commits a checkout atomically.
    ///
    /// ## Errors
    /// - `Validation`: empty cart, missing line fields, bad discount,
    ///   fractional quantity for a unit product
    /// - `StateConflict`: no active shift, insufficient stock, promotion
    ///   cap reached, foreign suspended sale, lock contention
    /// - `NotFound`: product, promotion or suspended sale missing
    /// - `Consistency`: the claimed shift closed underneath the commit
    pub async fn commit(&self, request: &CommitSale) -> DbResult<SaleRecord> {
        let operator_id = require_text("operator_id", &request.operator_id)?;
        validate_cart(&request.items)?;

        let subtotal = cart_subtotal(&request.items);
        let manual = request
            .manual_discount
            .as_ref()
            .map(|discount| discount.evaluate(subtotal).map(|outcome| (discount, outcome)))
            .transpose()?;
        let mut seen_promotions = HashSet::with_capacity(request.applied_promotions.len());
        for (index, applied) in request.applied_promotions.iter().enumerate() {
            require_text(&format!("applied promotion {index} promotion_id"), &applied.promotion_id)?;
            validate_price(&format!("applied promotion {index} discount_amount"), applied.discount_amount)?;
            if !seen_promotions.insert(applied.promotion_id.trim()) {
                return Err(ValidationError::Duplicate {
                    field: "applied promotion".to_string(),
                    value: applied.promotion_id.clone(),
                }
                .into());
            }
        }

        let mut tx = self.pool.begin().await?;

        let shift = shift::claim_active(&mut tx, &operator_id).await?;

        let products = load_cart_products(&mut tx, &request.items).await?;
        check_stock(&request.items, &products)?;

        let business_date = promotion::business_date();
        let mut promotion_names = Vec::with_capacity(request.applied_promotions.len());
        for applied in &request.applied_promotions {
            let promo = promotion::fetch(&mut tx, &applied.promotion_id).await?;
            if let Some(limit) = promo.max_uses_per_day {
                let uses = promotion::uses_on(&mut tx, &promo.id, business_date).await?;
                if !promo.has_capacity(uses) {
                    return Err(CoreError::PromotionLimitReached {
                        promotion_id: promo.id,
                        limit,
                    }
                    .into());
                }
            }
            promotion_names.push(promo.name);
        }

        let promotion_total: Money = request.applied_promotions.iter().map(|p| p.discount_amount).sum();
        let manual_amount = manual.as_ref().map_or(Money::zero(), |(_, outcome)| outcome.amount);
        let discount_total = (manual_amount + promotion_total).min(subtotal);
        let total = (subtotal - discount_total).non_negative();

        let now = Utc::now();
        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            ticket: sale_ticket(&shift.id),
            shift_id: shift.id.clone(),
            operator_id: operator_id.clone(),
            payment_method: request.payment_method,
            subtotal,
            discount_total,
            total,
            note: optional_text(request.note.as_deref()),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, ticket, shift_id, operator_id, payment_method,
                subtotal, discount_total, total, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.ticket)
        .bind(&sale.shift_id)
        .bind(&sale.operator_id)
        .bind(sale.payment_method)
        .bind(sale.subtotal)
        .bind(sale.discount_total)
        .bind(sale.total)
        .bind(&sale.note)
        .bind(sale.created_at)
        .execute(&mut *tx)
        .await?;

        let mut lines = Vec::with_capacity(request.items.len());
        for (position, item) in request.items.iter().enumerate() {
            let line = SaleLine {
                id: Uuid::new_v4().to_string(),
                sale_id: sale.id.clone(),
                product_id: item.product_id.clone(),
                title_snapshot: item.title.trim().to_string(),
                unit_price: item.unit_price,
                quantity: item.quantity,
                line_subtotal: item.line_subtotal(),
            };

            sqlx::query(
                r#"
                INSERT INTO sale_lines (
                    id, sale_id, product_id, title_snapshot, unit_price, quantity, line_subtotal, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&line.id)
            .bind(&line.sale_id)
            .bind(&line.product_id)
            .bind(&line.title_snapshot)
            .bind(line.unit_price)
            .bind(line.quantity)
            .bind(line.line_subtotal)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;

            lines.push(line);
        }

        let mut discounts = Vec::new();
        if let Some((discount, outcome)) = &manual {
            discounts.push(AppliedDiscount {
                id: Uuid::new_v4().to_string(),
                sale_id: sale.id.clone(),
                source: DiscountSource::Manual,
                promotion_id: None,
                description: discount.description(),
                amount: outcome.amount,
                percentage: discount.applied_percentage(),
                applied_by: operator_id.clone(),
            });
        }
        for (applied, name) in request.applied_promotions.iter().zip(promotion_names) {
            discounts.push(AppliedDiscount {
                id: Uuid::new_v4().to_string(),
                sale_id: sale.id.clone(),
                source: DiscountSource::Promotion,
                promotion_id: Some(applied.promotion_id.clone()),
                description: name,
                amount: applied.discount_amount,
                percentage: None,
                applied_by: operator_id.clone(),
            });
        }
        for discount in &discounts {
            sqlx::query(
                r#"
                INSERT INTO sale_discounts (
                    id, sale_id, source, promotion_id, description, amount, percentage, applied_by, business_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&discount.id)
            .bind(&discount.sale_id)
            .bind(discount.source)
            .bind(&discount.promotion_id)
            .bind(&discount.description)
            .bind(discount.amount)
            .bind(discount.percentage)
            .bind(&discount.applied_by)
            .bind(business_date)
            .execute(&mut *tx)
            .await?;
        }

        for product in &products {
            let quantity = cart_quantity_of(&request.items, &product.id);
            product::decrement_stock(&mut tx, &product.id, quantity).await?;

            let remaining = (product.current_stock - quantity).max(0.0);
            record_product_change(
                &mut tx,
                ProductChangeEntry::new(
                    &product.id,
                    &operator_id,
                    ProductAction::StockSold,
                    format!("Sold {quantity} on ticket {}", sale.ticket),
                )
                .values(
                    Some(json!({ "current_stock": product.current_stock })),
                    Some(json!({ "current_stock": remaining })),
                ),
            )
            .await?;
        }

        if let Some(suspended_id) = &request.resuming_suspended_id {
            suspended::take(&mut tx, suspended_id, &shift.id).await?;
        }

        shift::record_sale(&mut tx, &shift.id, sale.total, sale.payment_method).await?;

        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            ticket = %sale.ticket,
            shift_id = %sale.shift_id,
            total = %sale.total,
            lines = lines.len(),
            "Sale committed"
        );

        if let Err(err) = ProductRepository::new(self.pool.clone())
            .refresh_frequent(self.frequent_limit)
            .await
        {
            warn!(error = %err, "Frequent products refresh failed");
        }

        Ok(SaleRecord { sale, lines, discounts })
    }

    /// Replaces the note on a sale of the operator's open shift.
    ///
    /// A blank note clears it.
    pub async fn set_note(&self, operator_id: &str, sale_id: &str, note: Option<&str>) -> DbResult<Sale> {
        let note = optional_text(note);

        let updated = sqlx::query(
            r#"
            UPDATE sales SET note = ?3
            WHERE id = ?1
              AND shift_id IN (SELECT id FROM shifts WHERE operator_id = ?2 AND is_active = 1)
            "#,
        )
        .bind(sale_id)
        .bind(operator_id)
        .bind(&note)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let sale = self.find(sale_id).await?;
            return Err(match sale {
                None => CoreError::SaleNotFound(sale_id.to_string()),
                Some(_) => CoreError::NotAuthorized {
                    entity: "Sale".to_string(),
                    id: sale_id.to_string(),
                },
            }
            .into());
        }

        debug!(sale_id = %sale_id, "Sale note updated");
        self.find(sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()).into())
    }

    /// Gets a sale with its lines (in cart order) and discounts.
    pub async fn get(&self, sale_id: &str) -> DbResult<SaleRecord> {
        let sale = self
            .find(sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

        let lines = sqlx::query_as::<_, SaleLine>(
            r#"
            SELECT id, sale_id, product_id, title_snapshot, unit_price, quantity, line_subtotal
            FROM sale_lines WHERE sale_id = ?1 ORDER BY position
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        let discounts = sqlx::query_as::<_, AppliedDiscount>(
            r#"
            SELECT id, sale_id, source, promotion_id, description, amount, percentage, applied_by
            FROM sale_discounts WHERE sale_id = ?1 ORDER BY rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SaleRecord { sale, lines, discounts })
    }

    /// Sales of one shift, newest first.
    pub async fn list_for_shift(&self, shift_id: &str, limit: u32, offset: u32) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE shift_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(shift_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    async fn find(&self, sale_id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sale)
    }
}

/// Loads each distinct cart product once, in first-appearance order, and
/// checks unit-typed lines carry whole quantities.
async fn load_cart_products(conn: &mut SqliteConnection, items: &[CartLine]) -> DbResult<Vec<Product>> {
    let mut products: Vec<Product> = Vec::new();

    for item in items {
        if products.iter().any(|p| p.id == item.product_id) {
            continue;
        }
        products.push(product::fetch_active(conn, &item.product_id).await?);
    }

    for (line, item) in items.iter().enumerate() {
        let unit_type = products
            .iter()
            .find(|p| p.id == item.product_id)
            .map(|p| p.unit_type)
            .unwrap_or_default();
        if !unit_type.accepts(item.quantity) {
            return Err(ValidationError::FractionalQuantity {
                line,
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            }
            .into());
        }
    }

    Ok(products)
}

/// Rejects the cart if any product's total requested quantity exceeds stock.
fn check_stock(items: &[CartLine], products: &[Product]) -> Result<(), CoreError> {
    for product in products {
        let requested = cart_quantity_of(items, &product.id);
        if requested > product.current_stock + STOCK_EPSILON {
            return Err(CoreError::InsufficientStock {
                product_id: product.id.clone(),
                available: product.current_stock,
                requested,
            });
        }
    }
    Ok(())
}

/// `T<shift prefix>-<12 random hex>`.
fn sale_ticket(shift_id: &str) -> String {
    let prefix: String = shift_id.chars().filter(|c| *c != '-').take(8).collect();
    // uuid v4 carries its version nibble at hex position 12, outside this slice
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(12).collect();
    format!("T{}-{}", prefix.to_uppercase(), suffix.to_uppercase())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::NewProduct;
    use crate::repository::promotion::NewPromotion;
    use crate::{Database, DbConfig};
    use mercado_core::promotion::{ActivityWindow, DiscountShape, PromotionRule};
    use mercado_core::{DiscountRate, ErrorKind, UnitType};
    use std::time::Duration;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn product(db: &Database, title: &str, price: i64, stock: f64) -> Product {
        db.products()
            .create(
                NewProduct {
                    title: title.to_string(),
                    price: Money::from_minor(price),
                    current_stock: stock,
                    ..NewProduct::default()
                },
                "admin",
            )
            .await
            .unwrap()
    }

    fn line(product: &Product, quantity: f64) -> CartLine {
        CartLine {
            product_id: product.id.clone(),
            title: product.title.clone(),
            unit_price: product.price,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_plain_sale_updates_stock_and_shift() {
        let db = db().await;
        let a = product(&db, "A", 1000, 10.0).await;
        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();

        let request = CommitSale::new("op-1", vec![line(&a, 2.0)], PaymentMethod::Cash);
        let record = db.sales().commit(&request).await.unwrap();

        assert_eq!(record.sale.total.minor_units(), 2000);
        assert_eq!(record.sale.shift_id, shift.id);
        assert!(record.sale.ticket.starts_with('T'));
        assert_eq!(record.lines.len(), 1);
        assert_eq!(db.products().get(&a.id).await.unwrap().current_stock, 8.0);

        let shift = db.shifts().get(&shift.id).await.unwrap();
        assert_eq!(shift.sales_count, 1);
        assert_eq!(shift.total_sales.minor_units(), 2000);
        assert_eq!(shift.total_cash.minor_units(), 2000);
        assert!(shift.total_card.is_zero());

        let history = db.audit().product_history(Some(&a.id), 10).await.unwrap();
        assert_eq!(history[0].action, ProductAction::StockSold);
    }

    #[tokio::test]
    async fn test_manual_percentage_discount() {
        let db = db().await;
        let a = product(&db, "A", 1000, 10.0).await;
        db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();

        let mut request = CommitSale::new("op-1", vec![line(&a, 2.0)], PaymentMethod::Card);
        request.manual_discount = Some(ManualDiscount::Percentage {
            value: DiscountRate::from_percentage(10.0).unwrap(),
            description: None,
        });
        let record = db.sales().commit(&request).await.unwrap();

        assert_eq!(record.sale.discount_total.minor_units(), 200);
        assert_eq!(record.sale.total.minor_units(), 1800);
        assert_eq!(record.discounts.len(), 1);
        assert_eq!(record.discounts[0].source, DiscountSource::Manual);
        assert_eq!(record.discounts[0].percentage, Some(10.0));

        let stored = db.sales().get(&record.sale.id).await.unwrap();
        assert_eq!(stored.discounts.len(), 1);
        assert_eq!(stored.discounts[0].amount.minor_units(), 200);
    }

    #[tokio::test]
    async fn test_rejections_leave_no_trace() {
        let db = db().await;
        let a = product(&db, "A", 1000, 1.0).await;

        // No shift yet.
        let request = CommitSale::new("op-1", vec![line(&a, 1.0)], PaymentMethod::Cash);
        let err = db.sales().commit(&request).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NoActiveShift(_))));

        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();

        let empty = CommitSale::new("op-1", vec![], PaymentMethod::Cash);
        assert_eq!(db.sales().commit(&empty).await.unwrap_err().kind(), ErrorKind::Validation);

        let too_many = CommitSale::new("op-1", vec![line(&a, 2.0)], PaymentMethod::Cash);
        let err = db.sales().commit(&too_many).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let fractional = CommitSale::new("op-1", vec![line(&a, 0.5)], PaymentMethod::Cash);
        let err = db.sales().commit(&fractional).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::Validation(ValidationError::FractionalQuantity { line: 0, .. }))
        ));

        assert_eq!(db.products().get(&a.id).await.unwrap().current_stock, 1.0);
        let shift = db.shifts().get(&shift.id).await.unwrap();
        assert_eq!(shift.sales_count, 0);
        assert!(db.sales().list_for_shift(&shift.id, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_split_lines_share_one_stock_check() {
        let db = db().await;
        let a = product(&db, "A", 100, 3.0).await;
        let b = product(&db, "B", 100, 5.0).await;
        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();

        // 2 + 2 of A exceeds its stock of 3 even though each line fits.
        let request = CommitSale::new(
            "op-1",
            vec![line(&b, 1.0), line(&a, 2.0), line(&a, 2.0)],
            PaymentMethod::Cash,
        );
        let err = db.sales().commit(&request).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock { requested, .. }) if *requested == 4.0
        ));

        assert_eq!(db.products().get(&b.id).await.unwrap().current_stock, 5.0);
        assert_eq!(db.shifts().get(&shift.id).await.unwrap().sales_count, 0);
        assert!(db.audit().product_history(Some(&b.id), 10).await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_weight_product_fractional_sale() {
        let db = db().await;
        let cheese = db
            .products()
            .create(
                NewProduct {
                    title: "Queso".to_string(),
                    price: Money::from_minor(1999),
                    current_stock: 2.0,
                    unit_type: UnitType::Weight,
                    ..NewProduct::default()
                },
                "admin",
            )
            .await
            .unwrap();
        db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();

        let request = CommitSale::new("op-1", vec![line(&cheese, 0.375)], PaymentMethod::Cash);
        let record = db.sales().commit(&request).await.unwrap();
        assert_eq!(record.sale.total.minor_units(), 750);
        let stock = db.products().get(&cheese.id).await.unwrap().current_stock;
        assert!((stock - 1.625).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_promotion_daily_cap() {
        let db = db().await;
        let a = product(&db, "A", 1000, 10.0).await;
        db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();
        let promo = db
            .promotions()
            .create(NewPromotion {
                name: "Una vez".to_string(),
                description: None,
                rule: PromotionRule::GeneralDiscount { min_purchase: None },
                discount: DiscountShape::FixedAmount(Money::from_minor(100)),
                window: ActivityWindow::default(),
                max_uses_per_day: Some(1),
                priority: 0,
            })
            .await
            .unwrap();

        let mut request = CommitSale::new("op-1", vec![line(&a, 1.0)], PaymentMethod::Cash);
        request.applied_promotions = vec![AppliedPromotion {
            promotion_id: promo.id.clone(),
            discount_amount: Money::from_minor(100),
        }];

        let first = db.sales().commit(&request).await.unwrap();
        assert_eq!(first.sale.total.minor_units(), 900);
        assert_eq!(first.discounts[0].description, "Una vez");

        let err = db.sales().commit(&request).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::PromotionLimitReached { limit: 1, .. })
        ));
        assert_eq!(db.products().get(&a.id).await.unwrap().current_stock, 9.0);
    }

    #[tokio::test]
    async fn test_same_promotion_cannot_be_applied_twice_in_one_sale() {
        let db = db().await;
        let a = product(&db, "A", 1000, 10.0).await;
        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();
        let promo = db
            .promotions()
            .create(NewPromotion {
                name: "Una vez".to_string(),
                description: None,
                rule: PromotionRule::GeneralDiscount { min_purchase: None },
                discount: DiscountShape::FixedAmount(Money::from_minor(100)),
                window: ActivityWindow::default(),
                max_uses_per_day: Some(1),
                priority: 0,
            })
            .await
            .unwrap();

        let applied = AppliedPromotion {
            promotion_id: promo.id.clone(),
            discount_amount: Money::from_minor(100),
        };
        let mut request = CommitSale::new("op-1", vec![line(&a, 1.0)], PaymentMethod::Cash);
        request.applied_promotions = vec![applied.clone(), applied];

        let err = db.sales().commit(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(db.products().get(&a.id).await.unwrap().current_stock, 10.0);
        assert!(db.shifts().get(&shift.id).await.unwrap().total_sales.is_zero());

        // A single application still fits under the cap.
        request.applied_promotions.truncate(1);
        let record = db.sales().commit(&request).await.unwrap();
        assert_eq!(record.sale.total.minor_units(), 900);
    }

    #[tokio::test]
    async fn test_discounts_never_push_total_below_zero() {
        let db = db().await;
        let a = product(&db, "A", 500, 10.0).await;
        db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();
        let promo = db
            .promotions()
            .create(NewPromotion {
                name: "Grande".to_string(),
                description: None,
                rule: PromotionRule::GeneralDiscount { min_purchase: None },
                discount: DiscountShape::FixedAmount(Money::from_minor(400)),
                window: ActivityWindow::default(),
                max_uses_per_day: None,
                priority: 0,
            })
            .await
            .unwrap();

        let mut request = CommitSale::new("op-1", vec![line(&a, 1.0)], PaymentMethod::Cash);
        request.manual_discount = Some(ManualDiscount::FixedAmount {
            value: Money::from_minor(300),
            description: Some("Cliente frecuente".to_string()),
        });
        request.applied_promotions = vec![AppliedPromotion {
            promotion_id: promo.id,
            discount_amount: Money::from_minor(400),
        }];

        let record = db.sales().commit(&request).await.unwrap();
        assert!(record.sale.total.is_zero());
        assert_eq!(record.sale.discount_total.minor_units(), 500);
    }

    #[tokio::test]
    async fn test_resume_consumes_suspended_sale() {
        let db = db().await;
        let a = product(&db, "A", 1000, 10.0).await;
        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();

        let parked = db
            .suspended_sales()
            .suspend("op-1", &shift.id, vec![line(&a, 1.0)], None)
            .await
            .unwrap();
        let items = db.suspended_sales().resume("op-1", &parked.id).await.unwrap();

        let mut request = CommitSale::new("op-1", items, PaymentMethod::Cash);
        request.resuming_suspended_id = Some(parked.id.clone());
        db.sales().commit(&request).await.unwrap();

        assert!(db.suspended_sales().list("op-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_note_only_within_open_shift() {
        let db = db().await;
        let a = product(&db, "A", 1000, 10.0).await;
        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();
        let record = db
            .sales()
            .commit(&CommitSale::new("op-1", vec![line(&a, 1.0)], PaymentMethod::Cash))
            .await
            .unwrap();

        let sale = db.sales().set_note("op-1", &record.sale.id, Some(" sin bolsa ")).await.unwrap();
        assert_eq!(sale.note.as_deref(), Some("sin bolsa"));

        let err = db.sales().set_note("op-2", &record.sale.id, Some("x")).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NotAuthorized { .. })));

        let cleared = db.sales().set_note("op-1", &record.sale.id, Some("  ")).await.unwrap();
        assert!(cleared.note.is_none());

        db.shifts().close(&shift.id).await.unwrap();
        let err = db.sales().set_note("op-1", &record.sale.id, Some("late")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let err = db.sales().set_note("op-1", "missing", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_shift_totals_match_recorded_sales_and_returns() {
        let db = db().await;
        let a = product(&db, "A", 1000, 20.0).await;
        let b = product(&db, "B", 250, 20.0).await;
        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();

        for (item, method) in [
            (line(&a, 2.0), PaymentMethod::Cash),
            (line(&b, 3.0), PaymentMethod::Card),
            (line(&a, 1.0), PaymentMethod::Card),
        ] {
            db.sales().commit(&CommitSale::new("op-1", vec![item], method)).await.unwrap();
        }
        db.returns().create("op-1", &b.id, 1.0, "Roto").await.unwrap();

        let summary = db.shifts().close(&shift.id).await.unwrap();
        let sales = db.sales().list_for_shift(&shift.id, 100, 0).await.unwrap();
        let returns = db.returns().list_for_shift(&shift.id).await.unwrap();

        let sold: Money = sales.iter().map(|s| s.total).sum();
        let returned: Money = returns.iter().map(|r| r.total).sum();
        assert_eq!(summary.total_sales, sold);
        assert_eq!(summary.total_returns, returned);
        assert_eq!(summary.total_cash + summary.total_card, sold);
        assert_eq!(sales.len(), 3);
        assert_eq!(db.sales().list_for_shift(&shift.id, 2, 2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_frequent_products_refreshed_after_sale() {
        let db = db().await;
        let a = product(&db, "A", 100, 50.0).await;
        let b = product(&db, "B", 100, 50.0).await;
        db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();

        db.sales()
            .commit(&CommitSale::new("op-1", vec![line(&a, 5.0), line(&b, 1.0)], PaymentMethod::Cash))
            .await
            .unwrap();

        let frequent = db.products().list_frequent().await.unwrap();
        assert_eq!(frequent.len(), 2);
        assert!(frequent.iter().all(|p| p.is_frequent));
        // Category untouched.
        assert!(db.products().get(&a.id).await.unwrap().category_id.is_none());

        let top = db.products().refresh_frequent(1).await.unwrap();
        assert_eq!(top, vec![a.id.clone()]);
        assert!(!db.products().get(&b.id).await.unwrap().is_frequent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_sales_of_last_unit() {
        let path = std::env::temp_dir().join(format!("mercado-race-{}.db", Uuid::new_v4()));
        let db = Database::new(
            DbConfig::new(&path)
                .max_connections(4)
                .busy_timeout(Duration::from_secs(10)),
        )
        .await
        .unwrap();

        let a = product(&db, "Último", 1000, 1.0).await;
        db.shifts().open_or_get_active("reg-1", Money::zero()).await.unwrap();
        db.shifts().open_or_get_active("reg-2", Money::zero()).await.unwrap();

        let first = CommitSale::new("reg-1", vec![line(&a, 1.0)], PaymentMethod::Cash);
        let second = CommitSale::new("reg-2", vec![line(&a, 1.0)], PaymentMethod::Cash);
        let (sales_1, sales_2) = (db.sales(), db.sales());

        let (r1, r2) = tokio::join!(sales_1.commit(&first), sales_2.commit(&second));

        let outcomes = [r1, r2];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::StateConflict);
        assert_eq!(db.products().get(&a.id).await.unwrap().current_stock, 0.0);

        db.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_sale_ticket_format() {
        let ticket = sale_ticket("0a1b2c3d-4e5f-6789-abcd-ef0123456789");
        assert!(ticket.starts_with("T0A1B2C3D-"));
        assert_eq!(ticket.len(), "T0A1B2C3D-".len() + 12);

        let shift = "0a1b2c3d-4e5f-6789-abcd-ef0123456789";
        let tickets: HashSet<String> = (0..500).map(|_| sale_ticket(shift)).collect();
        assert_eq!(tickets.len(), 500);
    }
}
