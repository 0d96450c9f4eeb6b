//! # Suspended Sale Repository
//!
//! Parked carts. Suspending stores the cart and its total and touches
//! nothing else: no stock, no shift aggregates. A parked cart is consumed
//! by a later `SaleRepository::commit` that names it in
//! `resuming_suspended_id`.
//!
//! Every operation checks the suspended sale belongs to the caller's open
//! shift; anything else is `NotAuthorized`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use mercado_core::validation::{optional_text, validate_cart};
use mercado_core::{cart_subtotal, CartLine, CoreError, Money, SuspendedSale, SUSPENDED_TICKET_PREFIX};

use crate::error::{DbError, DbResult};

const SUSPENDED_COLUMNS: &str = "id, ticket, shift_id, operator_id, items, total, note, created_at";

#[derive(Debug, sqlx::FromRow)]
struct SuspendedRow {
    id: String,
    ticket: String,
    shift_id: String,
    operator_id: String,
    items: String,
    total: Money,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SuspendedRow> for SuspendedSale {
    type Error = DbError;

    fn try_from(row: SuspendedRow) -> Result<Self, Self::Error> {
        Ok(SuspendedSale {
            items: serde_json::from_str(&row.items)?,
            id: row.id,
            ticket: row.ticket,
            shift_id: row.shift_id,
            operator_id: row.operator_id,
            total: row.total,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

/// Repository for suspended sales.
#[derive(Debug, Clone)]
pub struct SuspendedSaleRepository {
    pool: SqlitePool,
}

impl SuspendedSaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SuspendedSaleRepository { pool }
    }

    /// Parks a cart on the operator's open shift.
    ///
    /// `shift_id` must be that open shift.
    pub async fn suspend(
        &self,
        operator_id: &str,
        shift_id: &str,
        items: Vec<CartLine>,
        note: Option<&str>,
    ) -> DbResult<SuspendedSale> {
        validate_cart(&items)?;

        let mut conn = self.pool.acquire().await?;
        let open_shift = active_shift_id(&mut conn, operator_id).await?;
        if open_shift != shift_id {
            return Err(not_authorized("Shift", shift_id));
        }

        let suspended = SuspendedSale {
            id: Uuid::new_v4().to_string(),
            ticket: suspended_ticket(),
            shift_id: open_shift,
            operator_id: operator_id.to_string(),
            total: cart_subtotal(&items),
            items,
            note: optional_text(note),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO suspended_sales (id, ticket, shift_id, operator_id, items, total, note, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&suspended.id)
        .bind(&suspended.ticket)
        .bind(&suspended.shift_id)
        .bind(&suspended.operator_id)
        .bind(serde_json::to_string(&suspended.items)?)
        .bind(suspended.total)
        .bind(&suspended.note)
        .bind(suspended.created_at)
        .execute(&mut *conn)
        .await?;

        info!(
            suspended_id = %suspended.id,
            ticket = %suspended.ticket,
            total = %suspended.total,
            "Sale suspended"
        );
        Ok(suspended)
    }

    /// Returns the parked cart. Read-only; the record stays until a commit
    /// consumes it or it is deleted.
    pub async fn resume(&self, operator_id: &str, suspended_id: &str) -> DbResult<Vec<CartLine>> {
        let mut conn = self.pool.acquire().await?;
        let suspended = owned(&mut conn, operator_id, suspended_id).await?;
        debug!(suspended_id = %suspended_id, lines = suspended.items.len(), "Suspended sale resumed");
        Ok(suspended.items)
    }

    /// Discards a parked cart.
    pub async fn delete(&self, operator_id: &str, suspended_id: &str) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        let suspended = owned(&mut conn, operator_id, suspended_id).await?;

        sqlx::query("DELETE FROM suspended_sales WHERE id = ?1")
            .bind(&suspended.id)
            .execute(&mut *conn)
            .await?;

        info!(suspended_id = %suspended_id, "Suspended sale deleted");
        Ok(())
    }

    /// Parked carts of the operator's open shift, newest first.
    pub async fn list(&self, operator_id: &str) -> DbResult<Vec<SuspendedSale>> {
        let mut conn = self.pool.acquire().await?;
        let shift_id = active_shift_id(&mut conn, operator_id).await?;

        let sql = format!(
            "SELECT {SUSPENDED_COLUMNS} FROM suspended_sales WHERE shift_id = ?1 \
             ORDER BY created_at DESC, rowid DESC"
        );
        let rows = sqlx::query_as::<_, SuspendedRow>(&sql)
            .bind(&shift_id)
            .fetch_all(&mut *conn)
            .await?;

        rows.into_iter().map(SuspendedSale::try_from).collect()
    }
}

/// Deletes a suspended sale being consumed by a checkout on `shift_id`.
pub(crate) async fn take(conn: &mut SqliteConnection, suspended_id: &str, shift_id: &str) -> DbResult<()> {
    let suspended = fetch(conn, suspended_id).await?;
    if suspended.shift_id != shift_id {
        return Err(not_authorized("SuspendedSale", suspended_id));
    }

    sqlx::query("DELETE FROM suspended_sales WHERE id = ?1")
        .bind(suspended_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn fetch(conn: &mut SqliteConnection, suspended_id: &str) -> DbResult<SuspendedSale> {
    let sql = format!("SELECT {SUSPENDED_COLUMNS} FROM suspended_sales WHERE id = ?1");
    let row = sqlx::query_as::<_, SuspendedRow>(&sql)
        .bind(suspended_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::SuspendedSaleNotFound(suspended_id.to_string()))?;
    SuspendedSale::try_from(row)
}

async fn owned(conn: &mut SqliteConnection, operator_id: &str, suspended_id: &str) -> DbResult<SuspendedSale> {
    let suspended = fetch(conn, suspended_id).await?;
    let shift_id = active_shift_id(conn, operator_id).await?;
    if suspended.shift_id != shift_id {
        return Err(not_authorized("SuspendedSale", suspended_id));
    }
    Ok(suspended)
}

async fn active_shift_id(conn: &mut SqliteConnection, operator_id: &str) -> DbResult<String> {
    sqlx::query_scalar::<_, String>("SELECT id FROM shifts WHERE operator_id = ?1 AND is_active = 1")
        .bind(operator_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::NoActiveShift(operator_id.to_string()).into())
}

fn not_authorized(entity: &str, id: &str) -> DbError {
    CoreError::NotAuthorized {
        entity: entity.to_string(),
        id: id.to_string(),
    }
    .into()
}

fn suspended_ticket() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{SUSPENDED_TICKET_PREFIX}-{}", suffix.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use mercado_core::ErrorKind;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn cart() -> Vec<CartLine> {
        vec![
            CartLine {
                product_id: "A".to_string(),
                title: "Arroz".to_string(),
                unit_price: Money::from_minor(800),
                quantity: 2.0,
            },
            CartLine {
                product_id: "B".to_string(),
                title: "Azúcar".to_string(),
                unit_price: Money::from_minor(500),
                quantity: 1.0,
            },
        ]
    }

    #[tokio::test]
    async fn test_suspend_and_resume() {
        let db = db().await;
        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();

        let parked = db
            .suspended_sales()
            .suspend("op-1", &shift.id, cart(), Some("vuelve luego"))
            .await
            .unwrap();
        assert!(parked.ticket.starts_with("SUSP-"));
        assert_eq!(parked.ticket.len(), "SUSP-".len() + 8);
        assert_eq!(parked.total.minor_units(), 2100);

        let items = db.suspended_sales().resume("op-1", &parked.id).await.unwrap();
        assert_eq!(items, cart());

        // Resume is read-only.
        let listed = db.suspended_sales().list("op-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].note.as_deref(), Some("vuelve luego"));

        db.suspended_sales().delete("op-1", &parked.id).await.unwrap();
        let err = db.suspended_sales().resume("op-1", &parked.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_cross_shift_access_rejected() {
        let db = db().await;
        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();
        db.shifts().open_or_get_active("op-2", Money::zero()).await.unwrap();

        let err = db
            .suspended_sales()
            .suspend("op-2", &shift.id, cart(), None)
            .await
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NotAuthorized { .. })));

        let parked = db.suspended_sales().suspend("op-1", &shift.id, cart(), None).await.unwrap();
        let err = db.suspended_sales().resume("op-2", &parked.id).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NotAuthorized { .. })));
        let err = db.suspended_sales().delete("op-2", &parked.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert!(db.suspended_sales().list("op-2").await.unwrap().is_empty());

        // A new shift for the same operator no longer owns it.
        db.shifts().close(&shift.id).await.unwrap();
        db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();
        let err = db.suspended_sales().resume("op-1", &parked.id).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(CoreError::NotAuthorized { .. })));
    }

    #[tokio::test]
    async fn test_suspend_requires_valid_cart() {
        let db = db().await;
        let shift = db.shifts().open_or_get_active("op-1", Money::zero()).await.unwrap();
        let err = db.suspended_sales().suspend("op-1", &shift.id, vec![], None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
