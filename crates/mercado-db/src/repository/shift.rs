//! # Shift Repository
//!
//! Shift lifecycle and the aggregate counters every sale and return feeds.
//!
//! ## Shift Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Shift Lifecycle                                   │
//! │                                                                         │
//! │  open_or_get_active(op)                                                │
//! │     └── INSERT .. ON CONFLICT DO NOTHING  (unique active per operator) │
//! │     └── SELECT the active row             (new or pre-existing)        │
//! │                                                                         │
//! │  while active                                                          │
//! │     └── record_sale(total, method)    total_sales, bucket, count += .. │
//! │     └── record_return(amount)         total_returns, count += ..       │
//! │         both guarded by `is_active = 1`; 0 rows → ShiftClosed          │
//! │                                                                         │
//! │  close(shift_id)                                                       │
//! │     └── is_active = 0, closed_at = now → ShiftSummary (frozen)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info};
use uuid::Uuid;

use mercado_core::validation::{require_text, validate_price};
use mercado_core::{CoreError, Money, PaymentMethod, Shift, ShiftSummary};

use crate::error::{DbError, DbResult};

const SHIFT_COLUMNS: &str = "id, operator_id, opened_at, closed_at, is_active, opening_float, \
     total_sales, total_cash, total_card, sales_count, total_returns, returns_count";

/// Repository for shift database operations.
#[derive(Debug, Clone)]
pub struct ShiftRepository {
    pool: SqlitePool,
}

impl ShiftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShiftRepository { pool }
    }

    /// Returns the operator's active shift, opening one if there is none.
    ///
    /// Two concurrent calls for the same operator both return the same
    /// shift: the partial unique index turns the losing insert into a no-op.
    /// `opening_float` is only used when a new shift is created.
    pub async fn open_or_get_active(&self, operator_id: &str, opening_float: Money) -> DbResult<Shift> {
        let operator_id = require_text("operator_id", operator_id)?;
        validate_price("opening_float", opening_float)?;

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let inserted = sqlx::query(
            r#"
            INSERT INTO shifts (id, operator_id, opened_at, is_active, opening_float, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&operator_id)
        .bind(now)
        .bind(opening_float)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let shift = self
            .current(&operator_id)
            .await?
            .ok_or_else(|| DbError::Internal(format!("active shift for {operator_id} vanished after open")))?;

        if inserted > 0 {
            info!(shift_id = %shift.id, operator_id = %operator_id, "Shift opened");
        } else {
            debug!(shift_id = %shift.id, operator_id = %operator_id, "Reusing active shift");
        }

        Ok(shift)
    }

    /// The operator's active shift, if any.
    pub async fn current(&self, operator_id: &str) -> DbResult<Option<Shift>> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE operator_id = ?1 AND is_active = 1");
        let shift = sqlx::query_as::<_, Shift>(&sql)
            .bind(operator_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(shift)
    }

    pub async fn get(&self, shift_id: &str) -> DbResult<Shift> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE id = ?1");
        sqlx::query_as::<_, Shift>(&sql)
            .bind(shift_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Shift", shift_id))
    }

    /// Closes a shift and returns its final totals.
    ///
    /// ## Errors
    /// - `NotFound` when the shift doesn't exist
    /// - `NoActiveShift` when it is already closed
    pub async fn close(&self, shift_id: &str) -> DbResult<ShiftSummary> {
        let now = Utc::now();

        let closed = sqlx::query(
            r#"
            UPDATE shifts
            SET is_active = 0, closed_at = ?2, updated_at = ?2
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(shift_id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let shift = self.get(shift_id).await?;
        if closed == 0 {
            return Err(CoreError::NoActiveShift(shift.operator_id).into());
        }

        let summary = ShiftSummary::from(&shift);
        info!(
            shift_id = %shift.id,
            operator_id = %shift.operator_id,
            total_sales = %summary.total_sales,
            total_returns = %summary.total_returns,
            sales_count = summary.sales_count,
            "Shift closed"
        );

        Ok(summary)
    }

    /// Closes whichever shift the operator has open.
    pub async fn close_for_operator(&self, operator_id: &str) -> DbResult<ShiftSummary> {
        let shift = self
            .current(operator_id)
            .await?
            .ok_or_else(|| CoreError::NoActiveShift(operator_id.to_string()))?;

        self.close(&shift.id).await
    }

    /// Closed shifts, newest first, optionally for one operator.
    pub async fn history(&self, operator_id: Option<&str>, limit: u32) -> DbResult<Vec<Shift>> {
        let sql = format!(
            "SELECT {SHIFT_COLUMNS} FROM shifts \
             WHERE is_active = 0 AND (?1 IS NULL OR operator_id = ?1) \
             ORDER BY opened_at DESC, rowid DESC LIMIT ?2"
        );
        let shifts = sqlx::query_as::<_, Shift>(&sql)
            .bind(operator_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(shifts)
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

/// Locks and returns the operator's active shift.
///
/// Issued as a write so the enclosing transaction takes the SQLite write
/// lock up front, before any read that a competing writer could invalidate.
pub(crate) async fn claim_active(conn: &mut SqliteConnection, operator_id: &str) -> DbResult<Shift> {
    let sql = format!(
        "UPDATE shifts SET updated_at = ?2 WHERE operator_id = ?1 AND is_active = 1 RETURNING {SHIFT_COLUMNS}"
    );
    sqlx::query_as::<_, Shift>(&sql)
        .bind(operator_id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::NoActiveShift(operator_id.to_string()).into())
}

/// Adds a committed sale to the shift's totals.
pub(crate) async fn record_sale(
    conn: &mut SqliteConnection,
    shift_id: &str,
    total: Money,
    method: PaymentMethod,
) -> DbResult<()> {
    let (cash, card) = match method {
        PaymentMethod::Cash => (total, Money::zero()),
        PaymentMethod::Card => (Money::zero(), total),
    };

    let updated = sqlx::query(
        r#"
        UPDATE shifts
        SET total_sales = total_sales + ?2,
            total_cash = total_cash + ?3,
            total_card = total_card + ?4,
            sales_count = sales_count + 1,
            updated_at = ?5
        WHERE id = ?1 AND is_active = 1
        "#,
    )
    .bind(shift_id)
    .bind(total)
    .bind(cash)
    .bind(card)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        error!(shift_id = %shift_id, "Sale aggregate targeted a closed shift");
        return Err(CoreError::ShiftClosed(shift_id.to_string()).into());
    }

    Ok(())
}

/// Adds a return to the shift's return totals.
pub(crate) async fn record_return(conn: &mut SqliteConnection, shift_id: &str, amount: Money) -> DbResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE shifts
        SET total_returns = total_returns + ?2,
            returns_count = returns_count + 1,
            updated_at = ?3
        WHERE id = ?1 AND is_active = 1
        "#,
    )
    .bind(shift_id)
    .bind(amount)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        error!(shift_id = %shift_id, "Return aggregate targeted a closed shift");
        return Err(CoreError::ShiftClosed(shift_id.to_string()).into());
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
