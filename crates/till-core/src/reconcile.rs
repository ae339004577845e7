//! Resolve a daily summary row back to the ledger entries it was built from
//!
//! A row's key `(entry_date, created_by, label)` is not unique among raw entries,
//! so resolution is a tagged result instead of "first match". Edits through a
//! row fetch fresh entries first; a row whose entries have since changed resolves
//! to [`Resolution::NoMatch`], which is an expected outcome, not a bug.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::Error;
use crate::models::{Actor, DateRange, EntryPatch, EntryStatus, LedgerEntry};
use crate::store::LedgerStore;
use crate::summary::SummaryKey;

/// Outcome of matching a row key against entries
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum Resolution {
    Unique(LedgerEntry),
    /// Several approved entries share the key, ordered by creation time
    Ambiguous(Vec<LedgerEntry>),
    NoMatch,
}

impl Resolution {
    /// Every matched entry
    pub fn entries(&self) -> Vec<&LedgerEntry> {
        match self {
            Self::Unique(entry) => vec![entry],
            Self::Ambiguous(entries) => entries.iter().collect(),
            Self::NoMatch => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Unique(_) => 1,
            Self::Ambiguous(entries) => entries.len(),
            Self::NoMatch => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::NoMatch)
    }
}

/// Approved entries carrying `key`, ordered by creation time then id
pub fn members(key: &SummaryKey, entries: &[LedgerEntry]) -> Vec<LedgerEntry> {
    let mut matched: Vec<LedgerEntry> = entries
        .iter()
        .filter(|e| e.status == EntryStatus::Approved && key.matches(e))
        .cloned()
        .collect();
    matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    matched
}

/// Match a row key against a set of entries
pub fn resolve(key: &SummaryKey, entries: &[LedgerEntry]) -> Resolution {
    let mut matched = members(key, entries);
    match matched.len() {
        0 => Resolution::NoMatch,
        1 => Resolution::Unique(matched.remove(0)),
        _ => Resolution::Ambiguous(matched),
    }
}

/// How an edit picks a target when several entries share the row key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Refuse and return the candidates
    #[default]
    Reject,
    /// Edit the entry created first (lowest id on equal timestamps)
    EarliestCreated,
}

impl std::str::FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "reject" => Ok(Self::Reject),
            "earliest_created" | "earliest" => Ok(Self::EarliestCreated),
            _ => Err(format!("Unknown tie-break policy: {}", s)),
        }
    }
}

/// What bulk delete does after a member fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Stop at the first failure; later members are reported as not attempted
    #[default]
    StopOnFirstFailure,
    /// Try every member regardless of earlier failures
    ContinueOnFailure,
}

impl std::str::FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "stop" | "stop_on_first_failure" => Ok(Self::StopOnFirstFailure),
            "continue" | "continue_on_failure" => Ok(Self::ContinueOnFailure),
            _ => Err(format!("Unknown delete policy: {}", s)),
        }
    }
}

/// Errors from row-level edit and delete
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Nothing in the store matches the row anymore; refresh and retry
    #[error("No matching entries for {0}; refresh the summary")]
    NoMatchingEntries(SummaryKey),

    #[error("{} entries match this row; choose one or use a tie-break policy", .candidates.len())]
    Ambiguous {
        key: SummaryKey,
        candidates: Vec<LedgerEntry>,
    },

    #[error(transparent)]
    Store(#[from] Error),
}

/// A member that could not be deleted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDelete {
    pub id: i64,
    pub error: String,
}

/// Per-member outcome of deleting a row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkDeleteReport {
    pub key: SummaryKey,
    pub deleted: Vec<i64>,
    pub failed: Vec<FailedDelete>,
    pub not_attempted: Vec<i64>,
}

impl BulkDeleteReport {
    /// Every member was removed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.not_attempted.is_empty()
    }

    /// Some members were removed and some were not
    pub fn is_partial(&self) -> bool {
        !self.deleted.is_empty() && !self.is_complete()
    }
}

fn fetch_members<S: LedgerStore + ?Sized>(
    store: &S,
    key: &SummaryKey,
) -> Result<Vec<LedgerEntry>, ReconcileError> {
    let entries = store.list_entries(&DateRange::day(key.entry_date))?;
    Ok(members(key, &entries))
}

/// Resolve a row against the store's current entries
pub fn resolve_row<S: LedgerStore + ?Sized>(
    store: &S,
    key: &SummaryKey,
) -> Result<Resolution, ReconcileError> {
    let entries = store.list_entries(&DateRange::day(key.entry_date))?;
    Ok(resolve(key, &entries))
}

/// Edit the single entry behind a row
///
/// Fails with `NoMatchingEntries` when the row is stale and with `Ambiguous`
/// when several entries match under [`TieBreak::Reject`]. No mutation happens
/// in either case.
pub fn edit_row<S: LedgerStore + ?Sized>(
    store: &S,
    actor: &Actor,
    key: &SummaryKey,
    patch: &EntryPatch,
    tie_break: TieBreak,
) -> Result<LedgerEntry, ReconcileError> {
    let target = match resolve_row(store, key)? {
        Resolution::NoMatch => return Err(ReconcileError::NoMatchingEntries(key.clone())),
        Resolution::Unique(entry) => entry,
        Resolution::Ambiguous(candidates) => match tie_break {
            TieBreak::Reject => {
                return Err(ReconcileError::Ambiguous {
                    key: key.clone(),
                    candidates,
                })
            }
            // candidates are already in creation order
            TieBreak::EarliestCreated => candidates
                .into_iter()
                .next()
                .ok_or_else(|| ReconcileError::NoMatchingEntries(key.clone()))?,
        },
    };

    let updated = store.update_entry(actor, target.id, patch)?;
    info!(id = updated.id, date = %key.entry_date, "Edited entry through summary row");
    Ok(updated)
}

/// Delete every entry behind a row, one at a time
///
/// Deletion is not atomic across members; the report says exactly which
/// members were removed. A stale row fails with `NoMatchingEntries`.
pub fn delete_row<S: LedgerStore + ?Sized>(
    store: &S,
    actor: &Actor,
    key: &SummaryKey,
    policy: DeletePolicy,
) -> Result<BulkDeleteReport, ReconcileError> {
    let targets = fetch_members(store, key)?;
    if targets.is_empty() {
        return Err(ReconcileError::NoMatchingEntries(key.clone()));
    }

    let mut report = BulkDeleteReport {
        key: key.clone(),
        deleted: Vec::new(),
        failed: Vec::new(),
        not_attempted: Vec::new(),
    };

    let mut ids = targets.iter().map(|e| e.id);
    while let Some(id) = ids.next() {
        match store.delete_entry(actor, id) {
            Ok(()) => report.deleted.push(id),
            Err(e) => {
                warn!(id, error = %e, "Failed to delete entry behind summary row");
                report.failed.push(FailedDelete {
                    id,
                    error: e.to_string(),
                });
                if policy == DeletePolicy::StopOnFirstFailure {
                    report.not_attempted.extend(ids.by_ref());
                    break;
                }
            }
        }
    }

    info!(
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        not_attempted = report.not_attempted.len(),
        "Deleted summary row"
    );
    Ok(report)
}
