//! Single-slot undo buffer with a display deadline

use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::Instant;

/// Which mutation an entry reverts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoKind {
    /// A row was created; undo deletes it
    Created,
    /// A row's flag changed; undo writes the prior flag back
    Updated,
    /// A row was deleted; undo re-creates it with the prior flag
    Deleted,
}

/// The most recent reversible transition
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry {
    pub kind: UndoKind,
    pub child_id: String,
    pub date: NaiveDate,
    /// Flag before the mutation; `None` when no row existed
    pub prior: Option<bool>,
    /// Flag after the mutation; `None` when the row is gone
    pub new: Option<bool>,
    pub record_id: Option<String>,
    pub created_at: Instant,
}

impl UndoEntry {
    pub fn created(child_id: &str, date: NaiveDate, record_id: &str) -> Self {
        Self {
            kind: UndoKind::Created,
            child_id: child_id.to_string(),
            date,
            prior: None,
            new: Some(true),
            record_id: Some(record_id.to_string()),
            created_at: Instant::now(),
        }
    }

    pub fn updated(child_id: &str, date: NaiveDate, record_id: &str, prior: bool, new: bool) -> Self {
        Self {
            kind: UndoKind::Updated,
            child_id: child_id.to_string(),
            date,
            prior: Some(prior),
            new: Some(new),
            record_id: Some(record_id.to_string()),
            created_at: Instant::now(),
        }
    }

    pub fn deleted(child_id: &str, date: NaiveDate, record_id: &str, prior: bool) -> Self {
        Self {
            kind: UndoKind::Deleted,
            child_id: child_id.to_string(),
            date,
            prior: Some(prior),
            new: None,
            record_id: Some(record_id.to_string()),
            created_at: Instant::now(),
        }
    }
}

/// Holds at most one [`UndoEntry`]; a new entry replaces the old one
///
/// Expiry is checked against the entry's deadline whenever the slot is read,
/// so nothing needs to run when the window closes.
#[derive(Debug)]
pub struct UndoSlot {
    window: Duration,
    entry: Option<UndoEntry>,
}

impl UndoSlot {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entry: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace whatever is pending, restarting the window
    pub fn record(&mut self, entry: UndoEntry) {
        self.entry = Some(entry);
    }

    fn is_live(&self, entry: &UndoEntry) -> bool {
        entry.created_at + self.window > Instant::now()
    }

    /// The pending entry, if its window is still open
    pub fn peek_live(&self) -> Option<&UndoEntry> {
        self.entry.as_ref().filter(|e| self.is_live(e))
    }

    /// Remove and return the pending entry; an expired entry is dropped
    pub fn take_live(&mut self) -> Option<UndoEntry> {
        let entry = self.entry.take()?;
        self.is_live(&entry).then_some(entry)
    }

    /// Put back an entry whose inverse failed, unless a newer one arrived
    pub fn restore(&mut self, entry: UndoEntry) {
        if self.entry.is_none() && self.is_live(&entry) {
            self.entry = Some(entry);
        }
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// Time left before the pending entry expires
    pub fn remaining(&self) -> Option<Duration> {
        let entry = self.peek_live()?;
        Some((entry.created_at + self.window).saturating_duration_since(Instant::now()))
    }
}
