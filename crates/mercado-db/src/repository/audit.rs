//! # Audit Repository
//!
//! Append-only audit trail. Writers run on the caller's connection so the
//! entry commits or rolls back together with the change it describes.
//!
//! ```text
//! product_changes      created / updated / deactivated / deleted,
//!                      stock_sold / stock_returned, loss_recorded / reverted
//! count_adjustments    one row per stock change made by a count session
//! ```
//!
//! Neither table references `products`, so history outlives a hard delete.

use chrono::Utc;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use mercado_core::{CountAdjustment, ProductAction, ProductChange};

use crate::error::DbResult;

/// A product change about to be recorded.
#[derive(Debug, Clone)]
pub(crate) struct ProductChangeEntry<'a> {
    pub product_id: &'a str,
    pub operator_id: &'a str,
    pub action: ProductAction,
    pub description: String,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
}

impl<'a> ProductChangeEntry<'a> {
    pub fn new(
        product_id: &'a str,
        operator_id: &'a str,
        action: ProductAction,
        description: impl Into<String>,
    ) -> Self {
        ProductChangeEntry {
            product_id,
            operator_id,
            action,
            description: description.into(),
            old_values: None,
            new_values: None,
        }
    }

    pub fn values(mut self, old: Option<Value>, new: Option<Value>) -> Self {
        self.old_values = old;
        self.new_values = new;
        self
    }
}

pub(crate) async fn record_product_change(
    conn: &mut SqliteConnection,
    entry: ProductChangeEntry<'_>,
) -> DbResult<()> {
    debug!(product_id = %entry.product_id, action = ?entry.action, "Recording product change");

    let old_values = entry.old_values.as_ref().map(Value::to_string);
    let new_values = entry.new_values.as_ref().map(Value::to_string);

    sqlx::query(
        r#"
        INSERT INTO product_changes (
            id, product_id, operator_id, action, description,
            old_values, new_values, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(entry.product_id)
    .bind(entry.operator_id)
    .bind(entry.action)
    .bind(&entry.description)
    .bind(old_values)
    .bind(new_values)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// A count-session stock change about to be recorded.
#[derive(Debug, Clone)]
pub(crate) struct CountAdjustmentEntry<'a> {
    pub product_id: &'a str,
    pub operator_id: &'a str,
    pub session_id: &'a str,
    pub old_stock: f64,
    pub new_stock: f64,
    pub observation: String,
}

pub(crate) async fn record_count_adjustment(
    conn: &mut SqliteConnection,
    entry: CountAdjustmentEntry<'_>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO count_adjustments (
            id, product_id, operator_id, session_id,
            old_stock, new_stock, difference, observation, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(entry.product_id)
    .bind(entry.operator_id)
    .bind(entry.session_id)
    .bind(entry.old_stock)
    .bind(entry.new_stock)
    .bind(entry.new_stock - entry.old_stock)
    .bind(&entry.observation)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Read access to the audit trail.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Product changes, newest first, optionally for one product.
    pub async fn product_history(&self, product_id: Option<&str>, limit: u32) -> DbResult<Vec<ProductChange>> {
        let changes = sqlx::query_as::<_, ProductChange>(
            r#"
            SELECT id, product_id, operator_id, action, description,
                   old_values, new_values, created_at
            FROM product_changes
            WHERE (?1 IS NULL OR product_id = ?1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(changes)
    }

    /// Count adjustments, newest first, optionally for one product.
    pub async fn count_history(&self, product_id: Option<&str>, limit: u32) -> DbResult<Vec<CountAdjustment>> {
        let adjustments = sqlx::query_as::<_, CountAdjustment>(
            r#"
            SELECT id, product_id, operator_id, session_id,
                   old_stock, new_stock, difference, observation, created_at
            FROM count_adjustments
            WHERE (?1 IS NULL OR product_id = ?1)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(adjustments)
    }
}
