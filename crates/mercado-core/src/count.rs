//! # Physical Count State Machine
//!
//! Transitions and derived statistics for physical count entries. The store
//! layer persists entries; every rule about what may happen to them lives
//! here.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   start_session                                                         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ┌─────────┐  record_count  ┌─────────┐  apply_adjustments ┌────────┐ │
//! │   │ pending │ ─────────────► │ counted │ ─────────────────► │adjusted│ │
//! │   └────┬────┘                └──┬───┬──┘                    └────────┘ │
//! │        │                        │   │ record_count (re-count)           │
//! │        │                        │   └──────────┐                        │
//! │        │                        │              ▼                        │
//! │        │  newer session by      │          counted                      │
//! │        │  the same operator     │                                       │
//! │        ▼                        ▼                                       │
//! │   ┌──────────────────────────────────┐                                 │
//! │   │              closed              │                                 │
//! │   └──────────────────────────────────┘                                 │
//! │                                                                         │
//! │   adjusted and closed are terminal: record_count → EntryLocked          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{CountState, PhysicalCountEntry};
use crate::validation::validate_stock_level;

/// Differences at or below this magnitude are treated as "no change".
pub const COUNT_TOLERANCE: f64 = 0.001;

/// Differences above this magnitude are reported as discrepancies.
pub const DIFFERENCE_REPORT_TOLERANCE: f64 = 0.01;

// =============================================================================
// Transitions
// =============================================================================

impl CountState {
    /// Whether a physical quantity may be (re)recorded.
    pub fn accepts_count(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CountState::Adjusted | CountState::Closed)
    }
}

/// Outcome of recording a physical quantity on an entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedCount {
    pub physical_quantity: f64,
    pub difference: f64,
}

/// Validates a count against an entry and computes its difference.
///
/// Legal only from `pending` or `counted`; the caller moves the entry to
/// `counted` with the returned values.
pub fn record_count(entry: &PhysicalCountEntry, physical_quantity: f64) -> CoreResult<RecordedCount> {
    if !entry.state.accepts_count() {
        return Err(CoreError::EntryLocked {
            entry_id: entry.id.clone(),
            state: entry.state.as_str().to_string(),
        });
    }
    validate_stock_level("physical_quantity", physical_quantity)?;

    Ok(RecordedCount {
        physical_quantity,
        difference: physical_quantity - entry.system_quantity,
    })
}

/// What applying an entry does to the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdjustmentPlan {
    /// Stock is set to the counted quantity.
    SetStock { new_stock: f64, difference: f64 },
    /// The difference is within tolerance; the entry is closed out as-is.
    Unchanged,
}

/// Decides how a selected entry is applied.
///
/// Returns `None` for entries that are not `counted`; those are skipped
/// by the adjustment batch and keep their state.
pub fn plan_adjustment(entry: &PhysicalCountEntry) -> Option<AdjustmentPlan> {
    if entry.state != CountState::Counted {
        return None;
    }
    let physical = entry.physical_quantity?;
    let difference = entry.difference.unwrap_or(physical - entry.system_quantity);

    if difference.abs() > COUNT_TOLERANCE {
        Some(AdjustmentPlan::SetStock {
            new_stock: physical,
            difference,
        })
    } else {
        Some(AdjustmentPlan::Unchanged)
    }
}

/// Audit observation written for every stock change made by a session.
pub fn adjustment_observation(session_id: &str, notes: Option<&str>) -> String {
    match notes.map(str::trim).filter(|n| !n.is_empty()) {
        Some(notes) => format!("Physical count adjustment - session {session_id} - {notes}"),
        None => format!("Physical count adjustment - session {session_id}"),
    }
}

// =============================================================================
// Session Statistics
// =============================================================================

/// Derived status of a count session. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Nothing counted yet.
    Started,
    /// Some entries counted, none adjusted.
    InProgress,
    /// Some, but not all, entries adjusted.
    PartiallyAdjusted,
    /// Every entry adjusted.
    Completed,
    /// Superseded by a newer session before completion.
    Closed,
}

/// Progress figures for a count session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionStats {
    pub total: usize,
    /// Entries counted or adjusted.
    pub counted: usize,
    pub adjusted: usize,
    pub pending: usize,
    pub closed: usize,
    /// Entries whose difference exceeds [`DIFFERENCE_REPORT_TOLERANCE`].
    pub with_differences: usize,
    /// `counted / total × 100`, two decimals.
    pub progress_percent: f64,
}

impl SessionStats {
    pub fn from_entries(entries: &[PhysicalCountEntry]) -> Self {
        let count = |state: CountState| entries.iter().filter(|e| e.state == state).count();

        let total = entries.len();
        let adjusted = count(CountState::Adjusted);
        let counted = count(CountState::Counted) + adjusted;
        let with_differences = entries
            .iter()
            .filter(|e| e.difference.is_some_and(|d| d.abs() > DIFFERENCE_REPORT_TOLERANCE))
            .count();

        let progress_percent = if total > 0 {
            ((counted as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };

        SessionStats {
            total,
            counted,
            adjusted,
            pending: count(CountState::Pending),
            closed: count(CountState::Closed),
            with_differences,
            progress_percent,
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.total > 0 && self.adjusted == self.total {
            SessionStatus::Completed
        } else if self.closed > 0 && self.pending == 0 && self.counted == self.adjusted {
            SessionStatus::Closed
        } else if self.adjusted > 0 {
            SessionStatus::PartiallyAdjusted
        } else if self.counted > 0 {
            SessionStatus::InProgress
        } else {
            SessionStatus::Started
        }
    }

    /// True once every entry is adjusted.
    pub fn is_complete(&self) -> bool {
        self.status() == SessionStatus::Completed
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, system: f64, state: CountState) -> PhysicalCountEntry {
        PhysicalCountEntry {
            id: id.to_string(),
            session_id: "session".to_string(),
            product_id: format!("p-{id}"),
            operator_id: "op".to_string(),
            system_quantity: system,
            physical_quantity: None,
            difference: None,
            state,
            notes: None,
            created_at: Utc::now(),
            counted_at: None,
            adjusted_at: None,
        }
    }

    fn counted(id: &str, system: f64, physical: f64) -> PhysicalCountEntry {
        let mut e = entry(id, system, CountState::Counted);
        e.physical_quantity = Some(physical);
        e.difference = Some(physical - system);
        e
    }

    #[test]
    fn test_record_count_from_pending() {
        let e = entry("1", 10.0, CountState::Pending);
        let recorded = record_count(&e, 8.0).unwrap();
        assert_eq!(recorded.difference, -2.0);
    }

    #[test]
    fn test_recount_allowed_from_counted() {
        let e = counted("1", 10.0, 8.0);
        assert_eq!(record_count(&e, 9.0).unwrap().difference, -1.0);
    }

    #[test]
    fn test_record_count_locked_after_adjust_or_close() {
        for state in [CountState::Adjusted, CountState::Closed] {
            let e = entry("1", 10.0, state);
            let err = record_count(&e, 8.0).unwrap_err();
            assert!(matches!(err, CoreError::EntryLocked { .. }));
        }
    }

    #[test]
    fn test_negative_physical_quantity_rejected() {
        let e = entry("1", 10.0, CountState::Pending);
        assert!(matches!(record_count(&e, -1.0), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_plan_adjustment() {
        assert_eq!(
            plan_adjustment(&counted("1", 10.0, 8.0)),
            Some(AdjustmentPlan::SetStock {
                new_stock: 8.0,
                difference: -2.0
            })
        );
        assert_eq!(
            plan_adjustment(&counted("1", 10.0, 10.0005)),
            Some(AdjustmentPlan::Unchanged)
        );
        assert_eq!(plan_adjustment(&entry("1", 10.0, CountState::Pending)), None);
        assert_eq!(plan_adjustment(&entry("1", 10.0, CountState::Adjusted)), None);
    }

    #[test]
    fn test_session_stats_and_status() {
        let mut entries = vec![
            entry("1", 10.0, CountState::Pending),
            entry("2", 5.0, CountState::Pending),
            entry("3", 0.0, CountState::Pending),
        ];
        assert_eq!(SessionStats::from_entries(&entries).status(), SessionStatus::Started);

        entries[0] = counted("1", 10.0, 8.0);
        let stats = SessionStats::from_entries(&entries);
        assert_eq!(stats.status(), SessionStatus::InProgress);
        assert_eq!(stats.counted, 1);
        assert_eq!(stats.with_differences, 1);
        assert_eq!(stats.progress_percent, 33.33);

        entries[0].state = CountState::Adjusted;
        assert_eq!(
            SessionStats::from_entries(&entries).status(),
            SessionStatus::PartiallyAdjusted
        );

        for e in entries.iter_mut() {
            e.state = CountState::Adjusted;
        }
        let stats = SessionStats::from_entries(&entries);
        assert!(stats.is_complete());
        assert_eq!(stats.progress_percent, 100.0);
    }

    #[test]
    fn test_superseded_session_is_closed() {
        let entries = vec![
            entry("1", 10.0, CountState::Closed),
            entry("2", 5.0, CountState::Closed),
        ];
        let status = SessionStats::from_entries(&entries).status();
        assert_eq!(status, SessionStatus::Closed);
    }

    #[test]
    fn test_adjustment_observation() {
        assert_eq!(
            adjustment_observation("abc", None),
            "Physical count adjustment - session abc"
        );
        assert_eq!(
            adjustment_observation("abc", Some("shelf B")),
            "Physical count adjustment - session abc - shelf B"
        );
    }
}
