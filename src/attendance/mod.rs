//! Attendance marking for one date at a time

mod feed;
mod stats;
mod store;
mod tracker;
mod undo;

use crate::models::AttendanceRecord;

pub use feed::AttendanceFeed;
pub use stats::AttendanceStats;
pub use store::{AttendanceStore, RemoteAttendanceStore};
pub use tracker::{
    AttendanceTracker, BulkOutcome, Confirmer, LoadTicket, Snapshot, TransitionOutcome, UndoOutcome,
};
pub use undo::{UndoEntry, UndoKind, UndoSlot};

/// A child's state on the viewed date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    /// No row exists
    Unmarked,
    Present,
    Absent,
}

impl AttendanceStatus {
    /// The state one tap leads to
    pub fn next(self) -> Self {
        match self {
            AttendanceStatus::Unmarked => AttendanceStatus::Present,
            AttendanceStatus::Present => AttendanceStatus::Absent,
            AttendanceStatus::Absent => AttendanceStatus::Unmarked,
        }
    }

    pub fn from_record(record: Option<&AttendanceRecord>) -> Self {
        match record {
            None => AttendanceStatus::Unmarked,
            Some(r) if r.present => AttendanceStatus::Present,
            Some(_) => AttendanceStatus::Absent,
        }
    }
}
