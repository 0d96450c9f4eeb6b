//! # Count Repository
//!
//! Physical count sessions: snapshot, count over time, then adjust
//! selectively.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Physical Count Entry States                          │
//! │                                                                         │
//! │   start_session ──► pending ──record_count──► counted ◄──┐             │
//! │                        │                        │  └──────┘ recount    │
//! │                        │                        │                      │
//! │                        │               apply_adjustments               │
//! │                        │                        ▼                      │
//! │                        │                    adjusted   (terminal)      │
//! │                        │                                               │
//! │   next start_session by the same operator                              │
//! │                        └──────────┬─────────────┘                      │
//! │                                   ▼                                    │
//! │                                closed      (terminal)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transition rules live in `mercado_core::count`; this module applies
//! them inside transactions. Session status is derived from the entries
//! and never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use mercado_core::count::{
    adjustment_observation, plan_adjustment, record_count, AdjustmentPlan, SessionStats, SessionStatus,
};
use mercado_core::validation::{optional_text, require_text};
use mercado_core::{CoreError, PhysicalCountEntry, ValidationError};

use crate::error::DbResult;
use crate::repository::audit::{record_count_adjustment, CountAdjustmentEntry};
use crate::repository::product;

const ENTRY_COLUMNS: &str = "e.id, e.session_id, e.product_id, e.operator_id, e.system_quantity, \
     e.physical_quantity, e.difference, e.state, e.notes, e.created_at, e.counted_at, e.adjusted_at";

/// Which counted entries `apply_adjustments` should apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentSelection {
    All,
    Entries(Vec<String>),
}

/// Entry ids moved to `adjusted`, split by whether stock changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentOutcome {
    pub adjusted: Vec<String>,
    pub unchanged: Vec<String>,
}

/// A session with its entries (by product title) and progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub operator_id: String,
    pub started_at: DateTime<Utc>,
    pub entries: Vec<PhysicalCountEntry>,
    pub stats: SessionStats,
    pub status: SessionStatus,
}

/// One line of the session list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub operator_id: String,
    pub started_at: DateTime<Utc>,
    pub stats: SessionStats,
    pub status: SessionStatus,
}

#[derive(Debug, Clone)]
pub struct CountRepository {
    pool: SqlitePool,
}

impl CountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CountRepository { pool }
    }

    /// Opens a session over every active product.
    ///
    /// The operator's unfinished entries from earlier sessions are closed
    /// first.
    pub async fn start_session(&self, operator_id: &str) -> DbResult<SessionReport> {
        let operator_id = require_text("operator_id", operator_id)?;
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query(
            "UPDATE physical_count_entries SET state = 'closed' \
             WHERE operator_id = ?1 AND state IN ('pending', 'counted')",
        )
        .bind(&operator_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let products: Vec<(String, f64)> =
            sqlx::query_as("SELECT id, current_stock FROM products WHERE is_active = 1 ORDER BY title COLLATE NOCASE, id")
                .fetch_all(&mut *tx)
                .await?;
        if products.is_empty() {
            return Err(CoreError::NoActiveProducts.into());
        }

        for (product_id, stock) in &products {
            sqlx::query(
                r#"
                INSERT INTO physical_count_entries (
                    id, session_id, product_id, operator_id, system_quantity, state, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&session_id)
            .bind(product_id)
            .bind(&operator_id)
            .bind(*stock)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let report = load_report(&mut tx, &session_id).await?;
        tx.commit().await?;

        info!(
            session_id = %session_id,
            operator_id = %operator_id,
            entries = products.len(),
            closed_stale = closed,
            "Count session started"
        );
        Ok(report)
    }

    /// Records (or re-records) the physical quantity on an entry.
    pub async fn record_count(
        &self,
        entry_id: &str,
        physical_quantity: f64,
        notes: Option<&str>,
    ) -> DbResult<PhysicalCountEntry> {
        let mut tx = self.pool.begin().await?;

        let entry = fetch_entry(&mut tx, entry_id).await?;
        let recorded = record_count(&entry, physical_quantity)?;
        let product = product::fetch(&mut tx, &entry.product_id).await?;
        if !product.unit_type.accepts(recorded.physical_quantity) {
            return Err(ValidationError::InvalidFormat {
                field: "physical_quantity".to_string(),
                reason: "must be a whole number for unit products".to_string(),
            }
            .into());
        }
        let notes = optional_text(notes).or(entry.notes.clone());

        let updated = sqlx::query(
            r#"
            UPDATE physical_count_entries
            SET physical_quantity = ?2, difference = ?3, state = 'counted', notes = ?4, counted_at = ?5
            WHERE id = ?1 AND state IN ('pending', 'counted')
            "#,
        )
        .bind(entry_id)
        .bind(recorded.physical_quantity)
        .bind(recorded.difference)
        .bind(&notes)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(CoreError::EntryLocked {
                entry_id: entry_id.to_string(),
                state: entry.state.as_str().to_string(),
            }
            .into());
        }

        let entry = fetch_entry(&mut tx, entry_id).await?;
        tx.commit().await?;

        debug!(entry_id = %entry_id, difference = recorded.difference, "Count recorded");
        Ok(entry)
    }

    /// Applies counted entries of an operator's session to the catalog.
    ///
    /// Entries that are not `counted` are skipped and keep their state.
    /// The whole batch commits or none of it does.
    pub async fn apply_adjustments(
        &self,
        operator_id: &str,
        session_id: &str,
        selection: &AdjustmentSelection,
    ) -> DbResult<AdjustmentOutcome> {
        let mut tx = self.pool.begin().await?;

        let entries = session_entries(&mut tx, session_id).await?;
        if entries.is_empty() || entries.iter().any(|e| e.operator_id != operator_id) {
            return Err(CoreError::SessionNotFound(session_id.to_string()).into());
        }

        let selected: Vec<&PhysicalCountEntry> = match selection {
            AdjustmentSelection::All => entries.iter().collect(),
            AdjustmentSelection::Entries(ids) => ids
                .iter()
                .enumerate()
                .filter(|(index, id)| !ids[..*index].contains(id))
                .map(|(_, id)| {
                    entries
                        .iter()
                        .find(|e| &e.id == id)
                        .ok_or_else(|| CoreError::EntryNotFound(id.clone()))
                })
                .collect::<Result<_, _>>()?,
        };

        let now = Utc::now();
        let mut outcome = AdjustmentOutcome::default();

        for entry in selected {
            let Some(plan) = plan_adjustment(entry) else {
                continue;
            };

            match plan {
                AdjustmentPlan::SetStock { new_stock, .. } => {
                    let current = product::fetch(&mut tx, &entry.product_id).await?;
                    product::set_stock(&mut tx, &entry.product_id, new_stock).await?;
                    record_count_adjustment(
                        &mut tx,
                        CountAdjustmentEntry {
                            product_id: &entry.product_id,
                            operator_id,
                            session_id,
                            old_stock: current.current_stock,
                            new_stock,
                            observation: adjustment_observation(session_id, entry.notes.as_deref()),
                        },
                    )
                    .await?;
                    outcome.adjusted.push(entry.id.clone());
                }
                AdjustmentPlan::Unchanged => outcome.unchanged.push(entry.id.clone()),
            }

            sqlx::query(
                "UPDATE physical_count_entries SET state = 'adjusted', adjusted_at = ?2 WHERE id = ?1 AND state = 'counted'",
            )
            .bind(&entry.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            session_id = %session_id,
            adjusted = outcome.adjusted.len(),
            unchanged = outcome.unchanged.len(),
            "Count adjustments applied"
        );
        Ok(outcome)
    }

    pub async fn session(&self, session_id: &str) -> DbResult<SessionReport> {
        let mut conn = self.pool.acquire().await?;
        load_report(&mut conn, session_id).await
    }

    /// Every session, newest first, optionally for one operator.
    pub async fn sessions(&self, operator_id: Option<&str>) -> DbResult<Vec<SessionSummary>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM physical_count_entries e \
             WHERE (?1 IS NULL OR e.operator_id = ?1) \
             ORDER BY e.created_at DESC, e.session_id, e.rowid"
        );
        let entries = sqlx::query_as::<_, PhysicalCountEntry>(&sql)
            .bind(operator_id)
            .fetch_all(&self.pool)
            .await?;

        let mut grouped: Vec<Vec<PhysicalCountEntry>> = Vec::new();
        for entry in entries {
            match grouped.last_mut() {
                Some(group) if group[0].session_id == entry.session_id => group.push(entry),
                _ => grouped.push(vec![entry]),
            }
        }

        Ok(grouped
            .into_iter()
            .map(|group| {
                let stats = SessionStats::from_entries(&group);
                SessionSummary {
                    session_id: group[0].session_id.clone(),
                    operator_id: group[0].operator_id.clone(),
                    started_at: group[0].created_at,
                    status: stats.status(),
                    stats,
                }
            })
            .collect())
    }
}

async fn fetch_entry(conn: &mut SqliteConnection, entry_id: &str) -> DbResult<PhysicalCountEntry> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM physical_count_entries e WHERE e.id = ?1");
    sqlx::query_as::<_, PhysicalCountEntry>(&sql)
        .bind(entry_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::EntryNotFound(entry_id.to_string()).into())
}

/// Entries of a session ordered by product title.
async fn session_entries(conn: &mut SqliteConnection, session_id: &str) -> DbResult<Vec<PhysicalCountEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM physical_count_entries e \
         LEFT JOIN products p ON p.id = e.product_id \
         WHERE e.session_id = ?1 \
         ORDER BY p.title COLLATE NOCASE, e.product_id"
    );
    let entries = sqlx::query_as::<_, PhysicalCountEntry>(&sql)
        .bind(session_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(entries)
}

async fn load_report(conn: &mut SqliteConnection, session_id: &str) -> DbResult<SessionReport> {
    let entries = session_entries(conn, session_id).await?;
    let Some(first) = entries.first() else {
        return Err(CoreError::SessionNotFound(session_id.to_string()).into());
    };

    let operator_id = first.operator_id.clone();
    let started_at = first.created_at;

    let stats = SessionStats::from_entries(&entries);
    Ok(SessionReport {
        session_id: session_id.to_string(),
        operator_id,
        started_at,
        status: stats.status(),
        stats,
        entries,
    })
}
