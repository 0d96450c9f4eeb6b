//! # Return Repository
//!
//! Customer returns. A return puts stock back and adds to the shift's
//! return totals; it is not tied to the sale the goods came from.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use mercado_core::validation::{require_text, validate_positive_quantity};
use mercado_core::{ProductAction, ProductReturn, ValidationError, RETURN_TICKET_PREFIX};

use crate::error::DbResult;
use crate::repository::audit::{record_product_change, ProductChangeEntry};
use crate::repository::{product, shift};

const RETURN_COLUMNS: &str = "id, ticket, shift_id, operator_id, product_id, title_snapshot, quantity, \
     unit_price, total, reason, created_at";

#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

impl ReturnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    /// Records a return on the operator's open shift.
    ///
    /// The refund is the product's current price times the quantity.
    pub async fn create(
        &self,
        operator_id: &str,
        product_id: &str,
        quantity: f64,
        reason: &str,
    ) -> DbResult<ProductReturn> {
        validate_positive_quantity("quantity", quantity)?;
        let reason = require_text("reason", reason)?;

        let mut tx = self.pool.begin().await?;

        let shift = shift::claim_active(&mut tx, operator_id).await?;
        let product = product::fetch(&mut tx, product_id).await?;
        if !product.unit_type.accepts(quantity) {
            return Err(ValidationError::InvalidFormat {
                field: "quantity".to_string(),
                reason: "must be a whole number for unit products".to_string(),
            }
            .into());
        }

        let record = ProductReturn {
            id: Uuid::new_v4().to_string(),
            ticket: return_ticket(),
            shift_id: shift.id.clone(),
            operator_id: operator_id.to_string(),
            product_id: product.id.clone(),
            title_snapshot: product.title.clone(),
            quantity,
            unit_price: product.price,
            total: product.price.times_quantity(quantity),
            reason,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO returns (
                id, ticket, shift_id, operator_id, product_id, title_snapshot,
                quantity, unit_price, total, reason, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&record.id)
        .bind(&record.ticket)
        .bind(&record.shift_id)
        .bind(&record.operator_id)
        .bind(&record.product_id)
        .bind(&record.title_snapshot)
        .bind(record.quantity)
        .bind(record.unit_price)
        .bind(record.total)
        .bind(&record.reason)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        product::increment_stock(&mut tx, &product.id, quantity).await?;
        record_product_change(
            &mut tx,
            ProductChangeEntry::new(
                &product.id,
                operator_id,
                ProductAction::StockReturned,
                format!("Returned {quantity} on ticket {}: {}", record.ticket, record.reason),
            )
            .values(
                Some(json!({ "current_stock": product.current_stock })),
                Some(json!({ "current_stock": product.current_stock + quantity })),
            ),
        )
        .await?;

        shift::record_return(&mut tx, &shift.id, record.total).await?;

        tx.commit().await?;

        info!(
            return_id = %record.id,
            ticket = %record.ticket,
            product_id = %record.product_id,
            total = %record.total,
            "Return recorded"
        );
        Ok(record)
    }

    /// Returns recorded on a shift, newest first.
    pub async fn list_for_shift(&self, shift_id: &str) -> DbResult<Vec<ProductReturn>> {
        let sql = format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE shift_id = ?1 ORDER BY created_at DESC, rowid DESC"
        );
        let returns = sqlx::query_as::<_, ProductReturn>(&sql)
            .bind(shift_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(returns)
    }
}

fn return_ticket() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{RETURN_TICKET_PREFIX}-{}", suffix.to_uppercase())
}
