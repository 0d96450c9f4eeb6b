//! # Promotion Repository
//!
//! Stores catalog promotions and answers "what applies to this cart right
//! now". Rule evaluation itself lives in `mercado_core::promotion`; this
//! module only loads promotions, enforces the daily usage cap and persists
//! edits.
//!
//! Rules and discount shapes are stored as JSON columns next to a `kind`
//! tag; the activity window is spread over plain columns so it stays
//! queryable.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use mercado_core::promotion::{
    active_promotions, applicable_promotions, ActivityWindow, ApplicablePromotion, DiscountShape, Promotion,
    PromotionKind, PromotionRule,
};
use mercado_core::validation::optional_text;
use mercado_core::{CartLine, CoreError};

use crate::error::{DbError, DbResult};

const PROMOTION_COLUMNS: &str = "id, name, description, kind, rule, discount, start_date, end_date, \
     weekdays, hour_start, hour_end, is_active, max_uses_per_day, priority, created_at";

/// Fields for a new promotion. New promotions start active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPromotion {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rule: PromotionRule,
    pub discount: DiscountShape,
    #[serde(default)]
    pub window: ActivityWindow,
    #[serde(default)]
    pub max_uses_per_day: Option<u32>,
    #[serde(default)]
    pub priority: i32,
}

/// Partial promotion update. For nullable fields `Some(None)` clears.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub rule: Option<PromotionRule>,
    pub discount: Option<DiscountShape>,
    pub window: Option<ActivityWindow>,
    pub is_active: Option<bool>,
    pub max_uses_per_day: Option<Option<u32>>,
    pub priority: Option<i32>,
}

#[derive(Debug, sqlx::FromRow)]
struct PromotionRow {
    id: String,
    name: String,
    description: Option<String>,
    #[allow(dead_code)]
    kind: PromotionKind,
    rule: String,
    discount: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    weekdays: String,
    hour_start: Option<NaiveTime>,
    hour_end: Option<NaiveTime>,
    is_active: bool,
    max_uses_per_day: Option<i64>,
    priority: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = DbError;

    fn try_from(row: PromotionRow) -> Result<Self, Self::Error> {
        let max_uses_per_day = row
            .max_uses_per_day
            .map(u32::try_from)
            .transpose()
            .map_err(|_| DbError::Internal(format!("promotion {} has an invalid daily cap", row.id)))?;

        Ok(Promotion {
            rule: serde_json::from_str(&row.rule)?,
            discount: serde_json::from_str(&row.discount)?,
            window: ActivityWindow {
                start_date: row.start_date,
                end_date: row.end_date,
                weekdays: serde_json::from_str(&row.weekdays)?,
                hour_start: row.hour_start,
                hour_end: row.hour_end,
            },
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            max_uses_per_day,
            priority: row.priority,
            created_at: row.created_at,
        })
    }
}

/// Repository for promotion database operations.
#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    pub async fn create(&self, new: NewPromotion) -> DbResult<Promotion> {
        let promotion = Promotion {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            description: optional_text(new.description.as_deref()),
            rule: new.rule,
            discount: new.discount,
            window: new.window,
            is_active: true,
            max_uses_per_day: new.max_uses_per_day,
            priority: new.priority,
            created_at: Utc::now(),
        };
        promotion.validate()?;

        sqlx::query(
            r#"
            INSERT INTO promotions (
                id, name, description, kind, rule, discount, start_date, end_date,
                weekdays, hour_start, hour_end, is_active, max_uses_per_day, priority,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.name)
        .bind(&promotion.description)
        .bind(promotion.kind())
        .bind(serde_json::to_string(&promotion.rule)?)
        .bind(serde_json::to_string(&promotion.discount)?)
        .bind(promotion.window.start_date)
        .bind(promotion.window.end_date)
        .bind(serde_json::to_string(&promotion.window.weekdays)?)
        .bind(promotion.window.hour_start)
        .bind(promotion.window.hour_end)
        .bind(promotion.is_active)
        .bind(promotion.max_uses_per_day.map(i64::from))
        .bind(promotion.priority)
        .bind(promotion.created_at)
        .execute(&self.pool)
        .await?;

        info!(promotion_id = %promotion.id, name = %promotion.name, kind = ?promotion.kind(), "Promotion created");
        Ok(promotion)
    }

    pub async fn update(&self, promotion_id: &str, update: PromotionUpdate) -> DbResult<Promotion> {
        let mut promotion = self.get(promotion_id).await?;

        if let Some(name) = update.name {
            promotion.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            promotion.description = optional_text(description.as_deref());
        }
        if let Some(rule) = update.rule {
            promotion.rule = rule;
        }
        if let Some(discount) = update.discount {
            promotion.discount = discount;
        }
        if let Some(window) = update.window {
            promotion.window = window;
        }
        if let Some(is_active) = update.is_active {
            promotion.is_active = is_active;
        }
        if let Some(cap) = update.max_uses_per_day {
            promotion.max_uses_per_day = cap;
        }
        if let Some(priority) = update.priority {
            promotion.priority = priority;
        }
        promotion.validate()?;

        sqlx::query(
            r#"
            UPDATE promotions SET
                name = ?2, description = ?3, kind = ?4, rule = ?5, discount = ?6,
                start_date = ?7, end_date = ?8, weekdays = ?9, hour_start = ?10, hour_end = ?11,
                is_active = ?12, max_uses_per_day = ?13, priority = ?14, updated_at = ?15
            WHERE id = ?1
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.name)
        .bind(&promotion.description)
        .bind(promotion.kind())
        .bind(serde_json::to_string(&promotion.rule)?)
        .bind(serde_json::to_string(&promotion.discount)?)
        .bind(promotion.window.start_date)
        .bind(promotion.window.end_date)
        .bind(serde_json::to_string(&promotion.window.weekdays)?)
        .bind(promotion.window.hour_start)
        .bind(promotion.window.hour_end)
        .bind(promotion.is_active)
        .bind(promotion.max_uses_per_day.map(i64::from))
        .bind(promotion.priority)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(promotion_id = %promotion.id, "Promotion updated");
        Ok(promotion)
    }

    /// Deletes a promotion. Discounts already applied keep their amount and
    /// description; their promotion reference is cleared.
    pub async fn delete(&self, promotion_id: &str) -> DbResult<()> {
        let deleted = sqlx::query("DELETE FROM promotions WHERE id = ?1")
            .bind(promotion_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(CoreError::PromotionNotFound(promotion_id.to_string()).into());
        }

        info!(promotion_id = %promotion_id, "Promotion deleted");
        Ok(())
    }

    /// Flips the active flag and returns the promotion.
    pub async fn toggle(&self, promotion_id: &str) -> DbResult<Promotion> {
        let updated = sqlx::query("UPDATE promotions SET is_active = NOT is_active, updated_at = ?2 WHERE id = ?1")
            .bind(promotion_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(CoreError::PromotionNotFound(promotion_id.to_string()).into());
        }

        let promotion = self.get(promotion_id).await?;
        debug!(promotion_id = %promotion_id, is_active = promotion.is_active, "Promotion toggled");
        Ok(promotion)
    }

    pub async fn get(&self, promotion_id: &str) -> DbResult<Promotion> {
        let mut conn = self.pool.acquire().await?;
        fetch(&mut conn, promotion_id).await
    }

    /// All promotions, highest priority first, then newest.
    pub async fn list(&self) -> DbResult<Vec<Promotion>> {
        let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions ORDER BY priority DESC, created_at DESC, id");
        let rows = sqlx::query_as::<_, PromotionRow>(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Promotion::try_from).collect()
    }

    /// Promotions whose flag and activity window admit `now` (local time),
    /// in evaluation order.
    pub async fn list_active(&self, now: NaiveDateTime) -> DbResult<Vec<Promotion>> {
        let enabled = self.enabled().await?;
        Ok(active_promotions(&enabled, now).into_iter().cloned().collect())
    }

    /// Promotions that discount something in `cart` at `now`, skipping any
    /// that already reached their daily cap.
    pub async fn applicable(&self, cart: &[CartLine], now: NaiveDateTime) -> DbResult<Vec<ApplicablePromotion>> {
        let mut candidates = Vec::new();
        for promotion in self.enabled().await? {
            if promotion.max_uses_per_day.is_some() {
                let uses = self.uses_on(&promotion.id, now.date()).await?;
                if !promotion.has_capacity(uses) {
                    debug!(promotion_id = %promotion.id, uses, "Promotion at daily cap");
                    continue;
                }
            }
            candidates.push(promotion);
        }

        Ok(applicable_promotions(&candidates, cart, now))
    }

    /// Times the promotion was applied on `date`.
    pub async fn uses_on(&self, promotion_id: &str, date: NaiveDate) -> DbResult<u32> {
        let mut conn = self.pool.acquire().await?;
        uses_on(&mut conn, promotion_id, date).await
    }

    async fn enabled(&self) -> DbResult<Vec<Promotion>> {
        let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions WHERE is_active = 1");
        let rows = sqlx::query_as::<_, PromotionRow>(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Promotion::try_from).collect()
    }
}

// =============================================================================
// In-transaction helpers
// =============================================================================

/// The date daily caps are counted against.
pub(crate) fn business_date() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) async fn fetch(conn: &mut SqliteConnection, promotion_id: &str) -> DbResult<Promotion> {
    let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions WHERE id = ?1");
    let row = sqlx::query_as::<_, PromotionRow>(&sql)
        .bind(promotion_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::PromotionNotFound(promotion_id.to_string()))?;
    Promotion::try_from(row)
}

pub(crate) async fn uses_on(conn: &mut SqliteConnection, promotion_id: &str, date: NaiveDate) -> DbResult<u32> {
    let uses: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sale_discounts WHERE promotion_id = ?1 AND business_date = ?2")
            .bind(promotion_id)
            .bind(date)
            .fetch_one(&mut *conn)
            .await?;
    Ok(u32::try_from(uses).unwrap_or(u32::MAX))
}

// =============================================================================
// Unit Tests
// =============================================================================
