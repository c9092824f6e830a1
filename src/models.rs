//! Rows of the hosted tables

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Table names
pub mod tables {
    pub const CHILDREN: &str = "children";
    pub const ATTENDANCE: &str = "attendance";
    pub const PROFILES: &str = "profiles";
    pub const EVENTS: &str = "events";
    pub const EVENT_NOTIFICATIONS: &str = "event_notifications";
    pub const MEDIA: &str = "media";
}

/// Actor roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Parent,
}

/// The authenticated actor, read from the `profiles` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub role: Role,
    #[serde(rename = "full_name")]
    pub name: String,
    pub email: String,
}

impl Identity {
    /// Whether this actor may mark attendance, create events and manage rosters
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A guardian who receives event notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guardian {
    pub id: String,
    #[serde(rename = "full_name")]
    pub name: String,
    pub email: String,
}

/// A child on the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub name: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub assigned_staff_id: Option<String>,
    #[serde(default)]
    pub medical_notes: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub dietary_requirements: Option<String>,
}

/// One row per (child, date) at most
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub child_id: String,
    pub date: NaiveDate,
    pub present: bool,
    pub marked_by: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for an attendance row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAttendanceRecord {
    pub child_id: String,
    pub date: NaiveDate,
    pub present: bool,
    pub marked_by: String,
}

/// A calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
    pub created_by: String,
}

/// Input for creating an event
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub event_date: DateTime<Utc>,
}

/// Insert payload for an event, stamped with its creator
#[derive(Debug, Clone, Serialize)]
pub(crate) struct EventInsert<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub event_date: DateTime<Utc>,
    pub created_by: &'a str,
}

/// One notification row per guardian per event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNotification {
    pub id: String,
    pub event_id: String,
    pub parent_id: String,
    pub read: bool,
}

/// Insert payload for an event notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEventNotification {
    pub event_id: String,
    pub parent_id: String,
    pub read: bool,
}

/// An uploaded photo or video of a child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub child_id: String,
    pub url: String,
    pub storage_path: String,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a media row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMediaItem {
    pub child_id: String,
    pub url: String,
    pub storage_path: String,
    pub uploaded_by: String,
}
