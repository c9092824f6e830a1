//! Per-date attendance state with optimistic writes and single-step undo

use async_trait::async_trait;
use chrono::{Duration as DateDelta, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attendance::stats::AttendanceStats;
use crate::attendance::store::AttendanceStore;
use crate::attendance::undo::{UndoEntry, UndoKind, UndoSlot};
use crate::attendance::AttendanceStatus;
use crate::error::{Error, Result};
use crate::models::{AttendanceRecord, Child, Identity, NewAttendanceRecord};
use crate::realtime::TypedChange;

/// Prefix of the id given to a row that is still being inserted
const PROVISIONAL_PREFIX: &str = "pending-";

/// Asks the actor to confirm the destructive `Absent -> Unmarked` step
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm_unmark(&self, child: &Child) -> bool;
}

#[async_trait]
impl<F> Confirmer for F
where
    F: Fn(&Child) -> bool + Send + Sync,
{
    async fn confirm_unmark(&self, child: &Child) -> bool {
        (self)(child)
    }
}

/// Result of one tap on a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Changed {
        from: AttendanceStatus,
        to: AttendanceStatus,
    },
    /// The actor declined the unmark prompt; nothing changed
    Declined,
}

/// Result of invoking undo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    /// No entry, or the entry's window has closed
    NothingToUndo,
    Reverted(UndoKind),
}

/// Counts from "mark all present"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkOutcome {
    pub created: usize,
    pub updated: usize,
}

/// Roster and rows read for one date
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    pub date: NaiveDate,
    pub roster: Vec<Child>,
    pub records: Vec<AttendanceRecord>,
}

/// An in-flight load, detached from the tracker so it can run while the
/// viewed date keeps changing
pub struct LoadTicket {
    store: Arc<dyn AttendanceStore>,
    generation: u64,
    date: NaiveDate,
}

impl LoadTicket {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Read the roster and the rows for the ticket's date
    pub async fn fetch(self) -> Result<Snapshot> {
        let (roster, records) = tokio::try_join!(
            self.store.list_children(),
            self.store.list_attendance(self.date)
        )?;

        Ok(Snapshot {
            generation: self.generation,
            date: self.date,
            roster,
            records,
        })
    }
}

/// Attendance for the viewed date
///
/// Every local change and date switch bumps a generation counter; a snapshot
/// is applied only if no such change happened since its ticket was issued.
/// Remote changes seen while a load is in flight are replayed on top of the
/// snapshot instead.
pub struct AttendanceTracker {
    store: Arc<dyn AttendanceStore>,
    date: NaiveDate,
    roster: Vec<Child>,
    records: HashMap<String, AttendanceRecord>,
    undo: UndoSlot,
    generation: u64,
    loading: bool,
    remote_during_load: Vec<TypedChange<AttendanceRecord>>,
}

impl AttendanceTracker {
    /// Create an empty tracker; call [`reload`](Self::reload) to populate it
    pub fn new(store: Arc<dyn AttendanceStore>, date: NaiveDate, undo_window: Duration) -> Self {
        Self {
            store,
            date,
            roster: Vec::new(),
            records: HashMap::new(),
            undo: UndoSlot::new(undo_window),
            generation: 0,
            loading: false,
            remote_during_load: Vec::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn roster(&self) -> &[Child] {
        &self.roster
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn record_for(&self, child_id: &str) -> Option<&AttendanceRecord> {
        self.records.get(child_id)
    }

    pub fn status_of(&self, child_id: &str) -> AttendanceStatus {
        AttendanceStatus::from_record(self.records.get(child_id))
    }

    /// Counts over the roster for the viewed date
    pub fn stats(&self) -> AttendanceStats {
        AttendanceStats::compute(
            self.roster.len(),
            self.roster.iter().filter_map(|c| self.records.get(&c.id)),
        )
    }

    pub fn pending_undo(&self) -> Option<&UndoEntry> {
        self.undo.peek_live()
    }

    pub fn undo_remaining(&self) -> Option<Duration> {
        self.undo.remaining()
    }

    pub fn dismiss_undo(&mut self) {
        self.undo.clear();
    }

    fn invalidate(&mut self) {
        self.generation += 1;
    }

    /// Start a load for the viewed date
    pub fn load_ticket(&mut self) -> LoadTicket {
        self.invalidate();
        self.loading = true;
        self.remote_during_load.clear();
        LoadTicket {
            store: self.store.clone(),
            generation: self.generation,
            date: self.date,
        }
    }

    /// Apply a finished load; returns false if it was superseded
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.generation != self.generation || snapshot.date != self.date {
            debug!(
                snapshot_date = %snapshot.date,
                viewed_date = %self.date,
                "discarding stale attendance snapshot"
            );
            return false;
        }

        let mut records: HashMap<String, AttendanceRecord> = HashMap::new();
        for record in snapshot.records {
            let keep_existing = records
                .get(&record.child_id)
                .map_or(false, |kept| kept.created_at <= record.created_at);
            if keep_existing {
                warn!(child_id = %record.child_id, date = %record.date, "duplicate attendance row ignored");
            } else {
                records.insert(record.child_id.clone(), record);
            }
        }

        for change in std::mem::take(&mut self.remote_during_load) {
            fold_change(&mut records, change);
        }

        self.roster = snapshot.roster;
        self.records = records;
        self.loading = false;
        true
    }

    /// Re-read roster and rows for the viewed date
    pub async fn reload(&mut self) -> Result<()> {
        let ticket = self.load_ticket();
        match ticket.fetch().await {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot);
                Ok(())
            }
            Err(e) => {
                self.loading = false;
                self.remote_during_load.clear();
                Err(e)
            }
        }
    }

    /// Switch the viewed date without waiting for the load
    ///
    /// Drops the pending undo entry and any rows of the old date.
    pub fn switch_date(&mut self, date: NaiveDate) -> LoadTicket {
        self.undo.clear();
        if date != self.date {
            info!(from = %self.date, to = %date, "switching attendance date");
            self.date = date;
            self.records.clear();
        }
        self.load_ticket()
    }

    /// Switch the viewed date and load it
    pub async fn set_date(&mut self, date: NaiveDate) -> Result<()> {
        let ticket = self.switch_date(date);
        match ticket.fetch().await {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot);
                Ok(())
            }
            Err(e) => {
                self.loading = false;
                self.remote_during_load.clear();
                Err(e)
            }
        }
    }

    /// Move the viewed date by `days`
    pub async fn step_date(&mut self, days: i64) -> Result<()> {
        let date = self
            .date
            .checked_add_signed(DateDelta::days(days))
            .ok_or_else(|| Error::validation(format!("date out of range: {} + {} days", self.date, days)))?;
        self.set_date(date).await
    }

    /// Stop tracking: drop the undo entry and any in-flight load
    pub fn close(&mut self) {
        self.undo.clear();
        self.invalidate();
        self.loading = false;
        self.remote_during_load.clear();
        debug!(date = %self.date, "attendance tracker closed");
    }

    fn child(&self, child_id: &str) -> Result<Child> {
        self.roster
            .iter()
            .find(|c| c.id == child_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("child {} is not on the roster", child_id)))
    }

    /// Advance one child through `Unmarked -> Present -> Absent -> Unmarked`
    ///
    /// The last step asks `confirmer` first. A failed write reloads the date
    /// and returns the error; no undo entry is recorded for it.
    pub async fn cycle<C>(&mut self, child_id: &str, actor: &Identity, confirmer: &C) -> Result<TransitionOutcome>
    where
        C: Confirmer + ?Sized,
    {
        require_admin(actor, "mark attendance")?;
        let child = self.child(child_id)?;
        let from = self.status_of(child_id);

        let result = match from {
            AttendanceStatus::Unmarked => self.mark_present(&child, actor).await,
            AttendanceStatus::Present => self.mark_absent(&child).await,
            AttendanceStatus::Absent => {
                if !confirmer.confirm_unmark(&child).await {
                    debug!(child_id, "unmark declined");
                    return Ok(TransitionOutcome::Declined);
                }
                self.unmark(&child).await
            }
        };

        match result {
            Ok(entry) => {
                self.undo.record(entry);
                let to = self.status_of(child_id);
                info!(child_id, date = %self.date, ?from, ?to, actor = %actor.id, "attendance changed");
                Ok(TransitionOutcome::Changed { from, to })
            }
            Err(e) => Err(self.resync_after(e).await),
        }
    }

    async fn mark_present(&mut self, child: &Child, actor: &Identity) -> Result<UndoEntry> {
        self.invalidate();
        self.records.insert(
            child.id.clone(),
            AttendanceRecord {
                id: format!("{}{}", PROVISIONAL_PREFIX, Uuid::new_v4()),
                child_id: child.id.clone(),
                date: self.date,
                present: true,
                marked_by: actor.id.clone(),
                created_at: Utc::now(),
            },
        );

        let row = NewAttendanceRecord {
            child_id: child.id.clone(),
            date: self.date,
            present: true,
            marked_by: actor.id.clone(),
        };

        match self.store.insert_attendance(vec![row]).await {
            Ok(rows) => {
                let record = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::general("insert returned no attendance row"))?;
                let entry = UndoEntry::created(&child.id, self.date, &record.id);
                self.records.insert(child.id.clone(), record);
                Ok(entry)
            }
            Err(e) if e.is_unique_violation() => {
                debug!(child_id = %child.id, "row already exists, updating it instead");
                let existing = self
                    .store
                    .find_attendance(&child.id, self.date)
                    .await?
                    .ok_or(e)?;
                let record = self.store.set_presence(&existing.id, true).await?;
                let entry = UndoEntry::updated(&child.id, self.date, &record.id, existing.present, true);
                self.records.insert(child.id.clone(), record);
                Ok(entry)
            }
            Err(e) => Err(e),
        }
    }

    async fn mark_absent(&mut self, child: &Child) -> Result<UndoEntry> {
        let id = match self.records.get_mut(&child.id) {
            Some(record) => {
                record.present = false;
                record.id.clone()
            }
            None => return Err(Error::not_found(format!("no attendance row for {}", child.id))),
        };
        self.invalidate();

        let record = self.store.set_presence(&id, false).await?;
        self.records.insert(child.id.clone(), record);
        Ok(UndoEntry::updated(&child.id, self.date, &id, true, false))
    }

    async fn unmark(&mut self, child: &Child) -> Result<UndoEntry> {
        let removed = self
            .records
            .remove(&child.id)
            .ok_or_else(|| Error::not_found(format!("no attendance row for {}", child.id)))?;
        self.invalidate();

        self.store.delete_attendance(&removed.id).await?;
        Ok(UndoEntry::deleted(&child.id, self.date, &removed.id, removed.present))
    }

    /// Revert the pending entry, if its window is still open
    ///
    /// A failed inverse puts the entry back so it can be retried.
    pub async fn undo(&mut self, actor: &Identity) -> Result<UndoOutcome> {
        require_admin(actor, "undo attendance changes")?;

        let entry = match self.undo.take_live() {
            Some(entry) if entry.date == self.date => entry,
            _ => return Ok(UndoOutcome::NothingToUndo),
        };

        match self.revert(&entry, actor).await {
            Ok(()) => {
                info!(child_id = %entry.child_id, kind = ?entry.kind, "attendance change undone");
                if let Err(e) = self.reload().await {
                    warn!(error = %e, "reload after undo failed");
                }
                Ok(UndoOutcome::Reverted(entry.kind))
            }
            Err(e) => {
                self.undo.restore(entry);
                Err(self.resync_after(e).await)
            }
        }
    }

    async fn revert(&mut self, entry: &UndoEntry, actor: &Identity) -> Result<()> {
        self.invalidate();
        let record_id = entry
            .record_id
            .as_deref()
            .ok_or_else(|| Error::general("undo entry has no record id"))?;

        match entry.kind {
            UndoKind::Created => {
                self.records.remove(&entry.child_id);
                self.store.delete_attendance(record_id).await
            }
            UndoKind::Updated => {
                let prior = entry
                    .prior
                    .ok_or_else(|| Error::general("update entry has no prior flag"))?;
                let record = self.store.set_presence(record_id, prior).await?;
                self.records.insert(entry.child_id.clone(), record);
                Ok(())
            }
            UndoKind::Deleted => {
                let prior = entry
                    .prior
                    .ok_or_else(|| Error::general("delete entry has no prior flag"))?;
                let record = self
                    .insert_or_update(&entry.child_id, prior, &actor.id)
                    .await?;
                self.records.insert(entry.child_id.clone(), record);
                Ok(())
            }
        }
    }

    /// Insert a row for the viewed date, or update the row that already exists
    async fn insert_or_update(&self, child_id: &str, present: bool, marked_by: &str) -> Result<AttendanceRecord> {
        let row = NewAttendanceRecord {
            child_id: child_id.to_string(),
            date: self.date,
            present,
            marked_by: marked_by.to_string(),
        };

        match self.store.insert_attendance(vec![row]).await {
            Ok(rows) => rows
                .into_iter()
                .next()
                .ok_or_else(|| Error::general("insert returned no attendance row")),
            Err(e) if e.is_unique_violation() => {
                let existing = self
                    .store
                    .find_attendance(child_id, self.date)
                    .await?
                    .ok_or(e)?;
                self.store.set_presence(&existing.id, present).await
            }
            Err(e) => Err(e),
        }
    }

    /// Mark every roster child present
    ///
    /// Unmarked children get a new row, absent ones are flipped. The pending
    /// undo entry is dropped and no new one is recorded.
    pub async fn mark_all_present(&mut self, actor: &Identity) -> Result<BulkOutcome> {
        require_admin(actor, "mark attendance")?;
        self.undo.clear();
        self.invalidate();

        match self.write_all_present(actor).await {
            Ok(outcome) => {
                info!(
                    date = %self.date,
                    created = outcome.created,
                    updated = outcome.updated,
                    "marked all present"
                );
                if let Err(e) = self.reload().await {
                    warn!(error = %e, "reload after bulk mark failed");
                }
                Ok(outcome)
            }
            Err(e) => Err(self.resync_after(e).await),
        }
    }

    async fn write_all_present(&mut self, actor: &Identity) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();

        let unmarked: Vec<String> = self
            .roster
            .iter()
            .filter(|c| !self.records.contains_key(&c.id))
            .map(|c| c.id.clone())
            .collect();
        let absent: Vec<String> = self
            .roster
            .iter()
            .filter_map(|c| self.records.get(&c.id))
            .filter(|r| !r.present)
            .map(|r| r.id.clone())
            .collect();

        if !unmarked.is_empty() {
            let rows = unmarked
                .iter()
                .map(|child_id| NewAttendanceRecord {
                    child_id: child_id.clone(),
                    date: self.date,
                    present: true,
                    marked_by: actor.id.clone(),
                })
                .collect();

            match self.store.insert_attendance(rows).await {
                Ok(inserted) => {
                    outcome.created += inserted.len();
                    for record in inserted {
                        self.records.insert(record.child_id.clone(), record);
                    }
                }
                Err(e) if e.is_unique_violation() => {
                    debug!("batch insert collided, falling back to one row at a time");
                    for child_id in &unmarked {
                        let record = self.insert_or_update(child_id, true, &actor.id).await?;
                        outcome.created += 1;
                        self.records.insert(child_id.clone(), record);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        for record_id in absent {
            let record = self.store.set_presence(&record_id, true).await?;
            outcome.updated += 1;
            self.records.insert(record.child_id.clone(), record);
        }

        Ok(outcome)
    }

    /// Fold a row change from another actor into the view
    ///
    /// Rows for other dates are ignored. The undo entry is left alone, and a
    /// load in flight for the same date stays valid.
    pub fn apply_remote_change(&mut self, change: TypedChange<AttendanceRecord>) -> bool {
        if let TypedChange::Inserted(record) | TypedChange::Updated(record) = &change {
            if record.date != self.date {
                return false;
            }
        }
        if self.loading {
            self.remote_during_load.push(change.clone());
        }
        fold_change(&mut self.records, change)
    }

    /// Reload after a failed write and hand back the original error
    async fn resync_after(&mut self, error: Error) -> Error {
        warn!(error = %error, date = %self.date, "attendance write failed, resynchronizing");
        if let Err(e) = self.reload().await {
            warn!(error = %e, "resync failed");
        }
        error
    }
}

/// Apply one row change to the rows of the viewed date
fn fold_change(records: &mut HashMap<String, AttendanceRecord>, change: TypedChange<AttendanceRecord>) -> bool {
    match change {
        TypedChange::Inserted(record) | TypedChange::Updated(record) => {
            if records.get(&record.child_id) == Some(&record) {
                return false;
            }
            debug!(child_id = %record.child_id, present = record.present, "remote attendance change");
            records.insert(record.child_id.clone(), record);
            true
        }
        TypedChange::Deleted(old) => {
            let id = match old.get("id").and_then(|v| v.as_str()) {
                Some(id) => id,
                None => return false,
            };
            let child_id = records
                .values()
                .find(|r| r.id == id)
                .map(|r| r.child_id.clone());
            match child_id {
                Some(child_id) => {
                    debug!(%child_id, "remote attendance delete");
                    records.remove(&child_id);
                    true
                }
                None => false,
            }
        }
    }
}

fn require_admin(actor: &Identity, action: &str) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(Error::forbidden(format!("only admins may {}", action)))
    }
}
