//! # Product Repository
//!
//! Catalog store: products, categories, the low-stock report and the
//! frequent-products tag. Also hosts the stock helpers every other
//! repository calls inside its own transaction.
//!
//! ## Stock Mutations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Guarded Stock Decrement                              │
//! │                                                                         │
//! │  UPDATE products                                                       │
//! │  SET current_stock = MAX(current_stock - :qty, 0)                      │
//! │  WHERE id = :id AND current_stock + ε >= :qty                          │
//! │       │                                                                 │
//! │       ├── 1 row  → stock decremented, caller continues                 │
//! │       └── 0 rows → InsufficientStock, caller's transaction rolls back  │
//! │                                                                         │
//! │  Two registers selling the last unit: the second UPDATE runs after     │
//! │  the first commits (SQLite write lock), sees 0, and matches no row.    │
//! │  CHECK (current_stock >= 0) backs this up at the schema level.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use mercado_core::validation::{
    normalize_category_name, optional_text, validate_price, validate_stock_level, validate_title,
};
use mercado_core::{Category, CoreError, LossKind, Money, Product, ProductAction, UnitType, ValidationError};

use crate::error::{DbError, DbResult};
use crate::repository::audit::{record_product_change, ProductChangeEntry};

/// Tolerance for floating-point stock comparisons.
pub(crate) const STOCK_EPSILON: f64 = 1e-9;

pub(crate) const PRODUCT_COLUMNS: &str = "id, title, price, current_stock, min_stock, unit_type, category_id, \
     barcode, cost_margin, is_active, is_frequent, created_at, updated_at";

// =============================================================================
// Request / Report Types
// =============================================================================

/// Fields for a new catalog product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub title: String,
    pub price: Money,
    #[serde(default)]
    pub current_stock: f64,
    #[serde(default)]
    pub min_stock: f64,
    #[serde(default)]
    pub unit_type: UnitType,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub cost_margin: Option<Money>,
}

/// Partial product update. `None` leaves a field unchanged; for the
/// nullable fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub price: Option<Money>,
    pub current_stock: Option<f64>,
    pub min_stock: Option<f64>,
    pub unit_type: Option<UnitType>,
    pub category_id: Option<Option<String>>,
    pub barcode: Option<Option<String>>,
    pub cost_margin: Option<Option<Money>>,
}

/// What `remove` did to the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    /// No history referenced the product; the row is gone.
    Deleted,
    /// History references the product; it was deactivated instead.
    Deactivated,
}

/// A low-stock product with its recorded losses.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LowStockItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,
    pub expired_quantity: f64,
    pub damaged_quantity: f64,
}

/// Active products at or below their minimum stock, plus catalog totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockReport {
    pub items: Vec<LowStockItem>,
    pub active_products: i64,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub total_expired: f64,
    pub total_damaged: f64,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog database operations.
///
/// ## Usage
/// ```rust,ignore
/// let category = db.products().create_category("bebidas").await?;
/// let product = db.products().create(new_product, "op-1").await?;
/// let report = db.products().low_stock_report().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Categories
    // -------------------------------------------------------------------------

    /// Creates a category. Names are trimmed, capitalised and unique
    /// regardless of case.
    pub async fn create_category(&self, name: &str) -> DbResult<Category> {
        let name = normalize_category_name(name)?;

        let existing: Option<String> = sqlx::query_scalar("SELECT id FROM categories WHERE name = ?1 COLLATE NOCASE")
            .bind(&name)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(DbError::duplicate("category name", name));
        }

        let category = Category {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO categories (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&category.id)
            .bind(&category.name)
            .bind(category.created_at)
            .execute(&self.pool)
            .await?;

        debug!(category_id = %category.id, name = %category.name, "Category created");
        Ok(category)
    }

    pub async fn list_categories(&self) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>("SELECT id, name, created_at FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Creates a product and records a `created` audit entry.
    pub async fn create(&self, new: NewProduct, operator_id: &str) -> DbResult<Product> {
        let title = validate_title(&new.title)?;
        validate_price("price", new.price)?;
        validate_stock_level("current_stock", new.current_stock)?;
        validate_stock_level("min_stock", new.min_stock)?;
        check_unit_quantity(new.unit_type, "current_stock", new.current_stock)?;
        if let Some(margin) = new.cost_margin {
            validate_price("cost_margin", margin)?;
        }

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            title,
            price: new.price,
            current_stock: new.current_stock,
            min_stock: new.min_stock,
            unit_type: new.unit_type,
            category_id: optional_text(new.category_id.as_deref()),
            barcode: optional_text(new.barcode.as_deref()),
            cost_margin: new.cost_margin,
            is_active: true,
            is_frequent: false,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;

        if let Some(category_id) = &product.category_id {
            ensure_category(&mut tx, category_id).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO products (
                id, title, price, current_stock, min_stock, unit_type, category_id,
                barcode, cost_margin, is_active, is_frequent, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, 0, ?10, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.title)
        .bind(product.price)
        .bind(product.current_stock)
        .bind(product.min_stock)
        .bind(product.unit_type)
        .bind(&product.category_id)
        .bind(&product.barcode)
        .bind(product.cost_margin)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        record_product_change(
            &mut tx,
            ProductChangeEntry::new(
                &product.id,
                operator_id,
                ProductAction::Created,
                format!("Product created: {}", product.title),
            )
            .values(None, Some(snapshot(&product))),
        )
        .await?;

        tx.commit().await?;

        info!(product_id = %product.id, title = %product.title, "Product created");
        Ok(product)
    }

    /// Applies a partial update and records what changed.
    ///
    /// An update that changes nothing writes no audit entry.
    pub async fn update(&self, product_id: &str, update: ProductUpdate, operator_id: &str) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;

        let before = fetch(&mut tx, product_id).await?;
        let mut after = before.clone();

        if let Some(title) = &update.title {
            after.title = validate_title(title)?;
        }
        if let Some(price) = update.price {
            validate_price("price", price)?;
            after.price = price;
        }
        if let Some(stock) = update.current_stock {
            validate_stock_level("current_stock", stock)?;
            after.current_stock = stock;
        }
        if let Some(min_stock) = update.min_stock {
            validate_stock_level("min_stock", min_stock)?;
            after.min_stock = min_stock;
        }
        if let Some(unit_type) = update.unit_type {
            after.unit_type = unit_type;
        }
        check_unit_quantity(after.unit_type, "current_stock", after.current_stock)?;
        if let Some(category_id) = &update.category_id {
            after.category_id = optional_text(category_id.as_deref());
            if let Some(id) = &after.category_id {
                ensure_category(&mut tx, id).await?;
            }
        }
        if let Some(barcode) = &update.barcode {
            after.barcode = optional_text(barcode.as_deref());
        }
        if let Some(margin) = update.cost_margin {
            if let Some(m) = margin {
                validate_price("cost_margin", m)?;
            }
            after.cost_margin = margin;
        }

        let Some(diff) = ProductDiff::between(&before, &after) else {
            debug!(product_id = %product_id, "Product update changed nothing");
            return Ok(before);
        };

        after.updated_at = Utc::now();
        sqlx::query(
            r#"
            UPDATE products SET
                title = ?2, price = ?3, current_stock = ?4, min_stock = ?5, unit_type = ?6,
                category_id = ?7, barcode = ?8, cost_margin = ?9, updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(&after.id)
        .bind(&after.title)
        .bind(after.price)
        .bind(after.current_stock)
        .bind(after.min_stock)
        .bind(after.unit_type)
        .bind(&after.category_id)
        .bind(&after.barcode)
        .bind(after.cost_margin)
        .bind(after.updated_at)
        .execute(&mut *tx)
        .await?;

        record_product_change(
            &mut tx,
            ProductChangeEntry::new(&after.id, operator_id, ProductAction::Updated, diff.description)
                .values(Some(Value::Object(diff.old)), Some(Value::Object(diff.new))),
        )
        .await?;

        tx.commit().await?;

        info!(product_id = %after.id, "Product updated");
        Ok(after)
    }

    /// Gets a product by ID, active or not.
    pub async fn get(&self, product_id: &str) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, product_id).await
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE barcode = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(barcode.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Active products ordered by title, optionally in one category.
    pub async fn list_active(&self, category_id: Option<&str>) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND (?1 IS NULL OR category_id = ?1) \
             ORDER BY title COLLATE NOCASE, id"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Deletes a product that nothing references; deactivates it otherwise.
    pub async fn remove(&self, product_id: &str, operator_id: &str) -> DbResult<Removal> {
        let mut tx = self.pool.begin().await?;
        let product = fetch(&mut tx, product_id).await?;

        let references: i64 = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM sale_lines WHERE product_id = ?1)
                 + (SELECT COUNT(*) FROM returns WHERE product_id = ?1)
                 + (SELECT COUNT(*) FROM inventory_losses WHERE product_id = ?1)
                 + (SELECT COUNT(*) FROM physical_count_entries WHERE product_id = ?1)
            "#,
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;

        let removal = if references == 0 {
            sqlx::query("DELETE FROM products WHERE id = ?1")
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
            Removal::Deleted
        } else {
            sqlx::query("UPDATE products SET is_active = 0, is_frequent = 0, updated_at = ?2 WHERE id = ?1")
                .bind(product_id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            Removal::Deactivated
        };

        let (action, description) = match removal {
            Removal::Deleted => (ProductAction::Deleted, format!("Product deleted: {}", product.title)),
            Removal::Deactivated => (
                ProductAction::Deactivated,
                format!("Product deactivated: {} ({references} historical records)", product.title),
            ),
        };
        record_product_change(
            &mut tx,
            ProductChangeEntry::new(product_id, operator_id, action, description)
                .values(Some(snapshot(&product)), None),
        )
        .await?;

        tx.commit().await?;

        info!(product_id = %product_id, removal = ?removal, "Product removed");
        Ok(removal)
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Reports
    // -------------------------------------------------------------------------

    pub async fn low_stock_report(&self) -> DbResult<LowStockReport> {
        let sql = format!(
            r#"
            SELECT {columns},
                   COALESCE(SUM(CASE WHEN l.kind = 'expired' THEN l.quantity END), 0.0) AS expired_quantity,
                   COALESCE(SUM(CASE WHEN l.kind = 'damaged' THEN l.quantity END), 0.0) AS damaged_quantity
            FROM products p
            LEFT JOIN inventory_losses l ON l.product_id = p.id
            WHERE p.is_active = 1 AND p.current_stock <= p.min_stock
            GROUP BY p.id
            ORDER BY p.current_stock ASC, p.title COLLATE NOCASE
            "#,
            columns = prefixed_columns("p")
        );
        let items = sqlx::query_as::<_, LowStockItem>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let (active_products, low_stock_count, out_of_stock_count): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN current_stock <= min_stock THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN current_stock <= 0 THEN 1 ELSE 0 END), 0)
            FROM products
            WHERE is_active = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let totals: Vec<(LossKind, f64)> =
            sqlx::query_as("SELECT kind, COALESCE(SUM(quantity), 0.0) FROM inventory_losses GROUP BY kind")
                .fetch_all(&self.pool)
                .await?;
        let total_of = |kind: LossKind| -> f64 { totals.iter().filter(|(k, _)| *k == kind).map(|(_, q)| q).sum() };

        Ok(LowStockReport {
            items,
            active_products,
            low_stock_count,
            out_of_stock_count,
            total_expired: total_of(LossKind::Expired),
            total_damaged: total_of(LossKind::Damaged),
        })
    }

    // -------------------------------------------------------------------------
    // Frequent products
    // -------------------------------------------------------------------------

    /// Re-tags the `limit` best sellers (by total quantity sold) as frequent.
    ///
    /// Returns the tagged product ids, best seller first.
    pub async fn refresh_frequent(&self, limit: u32) -> DbResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE products SET is_frequent = 0 WHERE is_frequent = 1")
            .execute(&mut *tx)
            .await?;

        let top: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT sl.product_id
            FROM sale_lines sl
            INNER JOIN products p ON p.id = sl.product_id
            WHERE p.is_active = 1
            GROUP BY sl.product_id
            ORDER BY SUM(sl.quantity) DESC, sl.product_id
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        for product_id in &top {
            sqlx::query("UPDATE products SET is_frequent = 1 WHERE id = ?1")
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(count = top.len(), "Frequent products refreshed");
        Ok(top)
    }

    pub async fn list_frequent(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_frequent = 1 AND is_active = 1 \
             ORDER BY title COLLATE NOCASE"
        );
        let products = sqlx::query_as::<_, Product>(&sql).fetch_all(&self.pool).await?;
        Ok(products)
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

/// Loads a product on the caller's connection.
pub(crate) async fn fetch(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Product> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    sqlx::query_as::<_, Product>(&sql)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
}

/// Loads a product that must be active.
pub(crate) async fn fetch_active(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Product> {
    let product = fetch(conn, product_id).await?;
    if !product.is_active {
        return Err(CoreError::ProductInactive(product_id.to_string()).into());
    }
    Ok(product)
}

/// Decrements stock if at least `quantity` is available.
///
/// Returns `InsufficientStock` (with the stock seen at rejection) when the
/// guard matches no row.
pub(crate) async fn decrement_stock(conn: &mut SqliteConnection, product_id: &str, quantity: f64) -> DbResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE products
        SET current_stock = MAX(current_stock - ?2, 0), updated_at = ?4
        WHERE id = ?1 AND current_stock + ?3 >= ?2
        "#,
    )
    .bind(product_id)
    .bind(quantity)
    .bind(STOCK_EPSILON)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        let available: Option<f64> = sqlx::query_scalar("SELECT current_stock FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(available) = available else {
            return Err(CoreError::ProductNotFound(product_id.to_string()).into());
        };
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            available,
            requested: quantity,
        }
        .into());
    }

    Ok(())
}

pub(crate) async fn increment_stock(conn: &mut SqliteConnection, product_id: &str, quantity: f64) -> DbResult<()> {
    let updated = sqlx::query("UPDATE products SET current_stock = current_stock + ?2, updated_at = ?3 WHERE id = ?1")
        .bind(product_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(CoreError::ProductNotFound(product_id.to_string()).into());
    }
    Ok(())
}

/// Sets stock to an absolute value (count adjustments).
pub(crate) async fn set_stock(conn: &mut SqliteConnection, product_id: &str, stock: f64) -> DbResult<()> {
    if stock < 0.0 {
        tracing::error!(product_id = %product_id, stock, "Refusing to store negative stock");
        return Err(CoreError::NegativeStock {
            product_id: product_id.to_string(),
            resulting: stock,
        }
        .into());
    }

    let updated = sqlx::query("UPDATE products SET current_stock = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(product_id)
        .bind(stock)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(CoreError::ProductNotFound(product_id.to_string()).into());
    }
    Ok(())
}

/// Audit snapshot of the editable product fields.
pub(crate) fn snapshot(product: &Product) -> Value {
    json!({
        "title": product.title,
        "price": product.price,
        "current_stock": product.current_stock,
        "min_stock": product.min_stock,
        "unit_type": product.unit_type,
        "category_id": product.category_id,
        "barcode": product.barcode,
        "cost_margin": product.cost_margin,
        "is_active": product.is_active,
    })
}

async fn ensure_category(conn: &mut SqliteConnection, category_id: &str) -> DbResult<()> {
    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ?1")
        .bind(category_id)
        .fetch_optional(&mut *conn)
        .await?;
    if exists.is_none() {
        return Err(CoreError::CategoryNotFound(category_id.to_string()).into());
    }
    Ok(())
}

fn check_unit_quantity(unit_type: UnitType, field: &str, quantity: f64) -> Result<(), ValidationError> {
    if !unit_type.accepts(quantity) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a whole number for unit products".to_string(),
        });
    }
    Ok(())
}

fn prefixed_columns(alias: &str) -> String {
    PRODUCT_COLUMNS
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Field-by-field difference between two versions of a product.
struct ProductDiff {
    description: String,
    old: Map<String, Value>,
    new: Map<String, Value>,
}

impl ProductDiff {
    fn between(before: &Product, after: &Product) -> Option<ProductDiff> {
        let old_snapshot = snapshot(before);
        let new_snapshot = snapshot(after);
        let (Value::Object(old_fields), Value::Object(new_fields)) = (old_snapshot, new_snapshot) else {
            return None;
        };

        let mut diff = ProductDiff {
            description: String::new(),
            old: Map::new(),
            new: Map::new(),
        };
        let mut parts = Vec::new();

        for (field, new_value) in new_fields {
            let old_value = old_fields.get(&field).cloned().unwrap_or(Value::Null);
            if old_value == new_value {
                continue;
            }
            parts.push(format!("{field}: {old_value} -> {new_value}"));
            diff.old.insert(field.clone(), old_value);
            diff.new.insert(field, new_value);
        }

        if parts.is_empty() {
            return None;
        }
        diff.description = format!("Product updated: {}", parts.join("; "));
        Some(diff)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use mercado_core::ErrorKind;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn new_product(title: &str, price: i64, stock: f64) -> NewProduct {
        NewProduct {
            title: title.to_string(),
            price: Money::from_minor(price),
            current_stock: stock,
            min_stock: 2.0,
            ..NewProduct::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = db().await;
        let created = db.products().create(new_product("  Leche  ", 1200, 10.0), "op").await.unwrap();
        assert_eq!(created.title, "Leche");

        let fetched = db.products().get(&created.id).await.unwrap();
        assert_eq!(fetched.price.minor_units(), 1200);
        assert_eq!(fetched.current_stock, 10.0);
        assert!(fetched.is_active);

        let history = db.audit().product_history(Some(&created.id), 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, ProductAction::Created);
    }

    #[tokio::test]
    async fn test_fractional_stock_rejected_for_unit_products() {
        let db = db().await;
        let err = db.products().create(new_product("Pan", 100, 2.5), "op").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut weighed = new_product("Queso", 100, 2.5);
        weighed.unit_type = UnitType::Weight;
        assert!(db.products().create(weighed, "op").await.is_ok());
    }

    #[tokio::test]
    async fn test_update_records_diff_and_skips_noop() {
        let db = db().await;
        let product = db.products().create(new_product("Pan", 100, 5.0), "op").await.unwrap();

        let noop = ProductUpdate {
            title: Some("Pan".to_string()),
            ..ProductUpdate::default()
        };
        db.products().update(&product.id, noop, "op").await.unwrap();
        assert_eq!(db.audit().product_history(Some(&product.id), 10).await.unwrap().len(), 1);

        let change = ProductUpdate {
            price: Some(Money::from_minor(150)),
            ..ProductUpdate::default()
        };
        let updated = db.products().update(&product.id, change, "op").await.unwrap();
        assert_eq!(updated.price.minor_units(), 150);

        let history = db.audit().product_history(Some(&product.id), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, ProductAction::Updated);
        assert!(history[0].description.contains("price"));
        let old: Value = serde_json::from_str(history[0].old_values.as_deref().unwrap()).unwrap();
        assert_eq!(old["price"], json!(100));
    }

    #[tokio::test]
    async fn test_remove_deletes_unreferenced() {
        let db = db().await;
        let product = db.products().create(new_product("Pan", 100, 5.0), "op").await.unwrap();

        assert_eq!(db.products().remove(&product.id, "op").await.unwrap(), Removal::Deleted);
        let err = db.products().get(&product.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Audit outlives the row.
        assert_eq!(db.audit().product_history(Some(&product.id), 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_deactivates_referenced() {
        let db = db().await;
        let product = db.products().create(new_product("Pan", 100, 5.0), "op").await.unwrap();
        db.losses()
            .record(&product.id, 1.0, LossKind::Damaged, None, "op")
            .await
            .unwrap();

        assert_eq!(db.products().remove(&product.id, "op").await.unwrap(), Removal::Deactivated);
        assert!(!db.products().get(&product.id).await.unwrap().is_active);
        assert!(db.products().list_active(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_categories() {
        let db = db().await;
        let bebidas = db.products().create_category("  bebidas ").await.unwrap();
        assert_eq!(bebidas.name, "Bebidas");

        let dup = db.products().create_category("BEBIDAS").await.unwrap_err();
        assert!(matches!(dup, DbError::UniqueViolation { .. }));

        let mut coke = new_product("Cola", 900, 5.0);
        coke.category_id = Some(bebidas.id.clone());
        db.products().create(coke, "op").await.unwrap();
        db.products().create(new_product("Pan", 100, 5.0), "op").await.unwrap();

        assert_eq!(db.products().list_active(Some(&bebidas.id)).await.unwrap().len(), 1);
        assert_eq!(db.products().list_active(None).await.unwrap().len(), 2);

        let mut orphan = new_product("X", 1, 0.0);
        orphan.category_id = Some("missing".to_string());
        let err = db.products().create(orphan, "op").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_low_stock_report() {
        let db = db().await;
        let low = db.products().create(new_product("Low", 100, 5.0), "op").await.unwrap();
        db.products().create(new_product("Out", 100, 0.0), "op").await.unwrap();
        db.products().create(new_product("Fine", 100, 50.0), "op").await.unwrap();

        db.losses().record(&low.id, 2.0, LossKind::Expired, None, "op").await.unwrap();
        db.losses().record(&low.id, 1.0, LossKind::Damaged, None, "op").await.unwrap();

        let report = db.products().low_stock_report().await.unwrap();
        assert_eq!(report.active_products, 3);
        assert_eq!(report.low_stock_count, 2);
        assert_eq!(report.out_of_stock_count, 1);
        assert_eq!(report.total_expired, 2.0);
        assert_eq!(report.total_damaged, 1.0);

        let item = report.items.iter().find(|i| i.product.id == low.id).unwrap();
        assert_eq!(item.product.current_stock, 2.0);
        assert_eq!(item.expired_quantity, 2.0);
        assert_eq!(item.damaged_quantity, 1.0);
    }

    #[tokio::test]
    async fn test_guarded_decrement() {
        let db = db().await;
        let product = db.products().create(new_product("Pan", 100, 1.0), "op").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        decrement_stock(&mut conn, &product.id, 1.0).await.unwrap();
        let err = decrement_stock(&mut conn, &product.id, 1.0).await.unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock { available, .. }) if *available == 0.0
        ));
        drop(conn);

        assert_eq!(db.products().get(&product.id).await.unwrap().current_stock, 0.0);
    }

    #[test]
    fn test_cost_price() {
        let now = Utc::now();
        let product = Product {
            id: "p".into(),
            title: "Pan".into(),
            price: Money::from_minor(1000),
            current_stock: 1.0,
            min_stock: 0.0,
            unit_type: UnitType::Unit,
            category_id: None,
            barcode: None,
            cost_margin: Some(Money::from_minor(300)),
            is_active: true,
            is_frequent: false,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(product.cost_price(), Some(Money::from_minor(700)));
    }
}
