//! # Loss Repository
//!
//! Inventory-loss ledger: expired or damaged goods taken out of stock.
//!
//! Rows are immutable. Deleting one is the sanctioned correction path: it
//! puts the quantity back and is audited as `loss_reverted`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use mercado_core::validation::{optional_text, validate_positive_quantity};
use mercado_core::{CoreError, InventoryLoss, LossKind, ProductAction, ValidationError};

use crate::error::DbResult;
use crate::repository::audit::{record_product_change, ProductChangeEntry};
use crate::repository::product;

const LOSS_COLUMNS: &str = "id, product_id, quantity, kind, reason, operator_id, created_at";

/// Filter for [`LossRepository::list`]. Empty matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LossFilter {
    pub product_id: Option<String>,
    pub kind: Option<LossKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Matching losses with quantity totals by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossListing {
    pub losses: Vec<InventoryLoss>,
    pub total_expired: f64,
    pub total_damaged: f64,
}

#[derive(Debug, Clone)]
pub struct LossRepository {
    pool: SqlitePool,
}

impl LossRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LossRepository { pool }
    }

    /// Takes `quantity` out of stock as a loss.
    ///
    /// ## Errors
    /// - `Validation` when quantity is not positive
    /// - `InsufficientStock` when quantity exceeds current stock
    pub async fn record(
        &self,
        product_id: &str,
        quantity: f64,
        kind: LossKind,
        reason: Option<&str>,
        operator_id: &str,
    ) -> DbResult<InventoryLoss> {
        validate_positive_quantity("quantity", quantity)?;

        let mut tx = self.pool.begin().await?;
        let product = product::fetch(&mut tx, product_id).await?;
        if !product.unit_type.accepts(quantity) {
            return Err(ValidationError::InvalidFormat {
                field: "quantity".to_string(),
                reason: "must be a whole number for unit products".to_string(),
            }
            .into());
        }
        product::decrement_stock(&mut tx, product_id, quantity).await?;

        let loss = InventoryLoss {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.to_string(),
            quantity,
            kind,
            reason: optional_text(reason),
            operator_id: operator_id.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO inventory_losses (id, product_id, quantity, kind, reason, operator_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&loss.id)
        .bind(&loss.product_id)
        .bind(loss.quantity)
        .bind(loss.kind)
        .bind(&loss.reason)
        .bind(&loss.operator_id)
        .bind(loss.created_at)
        .execute(&mut *tx)
        .await?;

        record_product_change(
            &mut tx,
            ProductChangeEntry::new(
                product_id,
                operator_id,
                ProductAction::LossRecorded,
                format!("Loss recorded: {quantity} {kind:?}"),
            )
            .values(
                Some(json!({ "current_stock": product.current_stock })),
                Some(json!({ "current_stock": (product.current_stock - quantity).max(0.0) })),
            ),
        )
        .await?;

        tx.commit().await?;

        info!(loss_id = %loss.id, product_id = %product_id, quantity, kind = ?kind, "Loss recorded");
        Ok(loss)
    }

    /// Reverts a loss, returning its quantity to stock.
    pub async fn delete(&self, loss_id: &str, operator_id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {LOSS_COLUMNS} FROM inventory_losses WHERE id = ?1");
        let loss = sqlx::query_as::<_, InventoryLoss>(&sql)
            .bind(loss_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::LossNotFound(loss_id.to_string()))?;

        sqlx::query("DELETE FROM inventory_losses WHERE id = ?1")
            .bind(loss_id)
            .execute(&mut *tx)
            .await?;

        let product = product::fetch(&mut tx, &loss.product_id).await?;
        product::increment_stock(&mut tx, &loss.product_id, loss.quantity).await?;

        record_product_change(
            &mut tx,
            ProductChangeEntry::new(
                &loss.product_id,
                operator_id,
                ProductAction::LossReverted,
                format!("Loss reverted: {} {:?}", loss.quantity, loss.kind),
            )
            .values(
                Some(json!({ "current_stock": product.current_stock })),
                Some(json!({ "current_stock": product.current_stock + loss.quantity })),
            ),
        )
        .await?;

        tx.commit().await?;

        info!(loss_id = %loss_id, product_id = %loss.product_id, quantity = loss.quantity, "Loss reverted");
        Ok(())
    }

    /// Losses matching `filter`, newest first.
    pub async fn list(&self, filter: &LossFilter) -> DbResult<LossListing> {
        let sql = format!(
            r#"
            SELECT {LOSS_COLUMNS} FROM inventory_losses
            WHERE (?1 IS NULL OR product_id = ?1)
              AND (?2 IS NULL OR kind = ?2)
              AND (?3 IS NULL OR created_at >= ?3)
              AND (?4 IS NULL OR created_at <= ?4)
            ORDER BY created_at DESC, rowid DESC
            "#
        );
        let losses = sqlx::query_as::<_, InventoryLoss>(&sql)
            .bind(&filter.product_id)
            .bind(filter.kind)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_all(&self.pool)
            .await?;

        let total_of = |kind: LossKind| -> f64 { losses.iter().filter(|l| l.kind == kind).map(|l| l.quantity).sum() };
        let total_expired = total_of(LossKind::Expired);
        let total_damaged = total_of(LossKind::Damaged);

        Ok(LossListing {
            losses,
            total_expired,
            total_damaged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::NewProduct;
    use crate::{Database, DbConfig};
    use mercado_core::{ErrorKind, Money};

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(
                NewProduct {
                    title: "Yogur".to_string(),
                    price: Money::from_minor(300),
                    current_stock: 10.0,
                    ..NewProduct::default()
                },
                "admin",
            )
            .await
            .unwrap();
        (db, product.id)
    }

    #[tokio::test]
    async fn test_record_and_revert_loss() {
        let (db, product_id) = setup().await;

        let loss = db
            .losses()
            .record(&product_id, 3.0, LossKind::Expired, Some("fecha"), "op-1")
            .await
            .unwrap();
        assert_eq!(db.products().get(&product_id).await.unwrap().current_stock, 7.0);

        db.losses().delete(&loss.id, "op-1").await.unwrap();
        assert_eq!(db.products().get(&product_id).await.unwrap().current_stock, 10.0);

        let actions: Vec<ProductAction> = db
            .audit()
            .product_history(Some(&product_id), 10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.action)
            .collect();
        assert_eq!(
            actions,
            vec![ProductAction::LossReverted, ProductAction::LossRecorded, ProductAction::Created]
        );

        let err = db.losses().delete(&loss.id, "op-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_loss_cannot_exceed_stock() {
        let (db, product_id) = setup().await;

        let err = db
            .losses()
            .record(&product_id, 11.0, LossKind::Damaged, None, "op-1")
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::InsufficientStock { .. })));

        let err = db
            .losses()
            .record(&product_id, -1.0, LossKind::Damaged, None, "op-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(db.products().get(&product_id).await.unwrap().current_stock, 10.0);
        assert!(db.losses().list(&LossFilter::default()).await.unwrap().losses.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_totals() {
        let (db, product_id) = setup().await;
        db.losses().record(&product_id, 1.0, LossKind::Expired, None, "op").await.unwrap();
        db.losses().record(&product_id, 2.0, LossKind::Damaged, None, "op").await.unwrap();
        db.losses().record(&product_id, 3.0, LossKind::Expired, None, "op").await.unwrap();

        let all = db.losses().list(&LossFilter::default()).await.unwrap();
        assert_eq!(all.losses.len(), 3);
        assert_eq!(all.total_expired, 4.0);
        assert_eq!(all.total_damaged, 2.0);

        let damaged = db
            .losses()
            .list(&LossFilter {
                kind: Some(LossKind::Damaged),
                ..LossFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(damaged.losses.len(), 1);
        assert_eq!(damaged.total_expired, 0.0);

        let future = db
            .losses()
            .list(&LossFilter {
                from: Some(Utc::now() + chrono::Duration::hours(1)),
                ..LossFilter::default()
            })
            .await
            .unwrap();
        assert!(future.losses.is_empty());
    }
}
