#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use childcare_supabase::attendance::AttendanceStore;
use childcare_supabase::error::{Error, Result};
use childcare_supabase::events::{EventStore, Notification, NotificationScheduler, ScheduleId, Trigger};
use childcare_supabase::models::{
    AttendanceRecord, Child, Event, EventNotification, Guardian, Identity, NewAttendanceRecord, NewEvent,
    NewEventNotification, Role,
};

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

pub fn admin() -> Identity {
    Identity {
        id: "admin-1".to_string(),
        role: Role::Admin,
        name: "Dana".to_string(),
        email: "dana@example.com".to_string(),
    }
}

pub fn parent() -> Identity {
    Identity {
        id: "parent-1".to_string(),
        role: Role::Parent,
        name: "Pat".to_string(),
        email: "pat@example.com".to_string(),
    }
}

pub fn child(id: &str, name: &str) -> Child {
    Child {
        id: id.to_string(),
        name: name.to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(2020, 5, 17).unwrap(),
        parent_id: Some("parent-1".to_string()),
        assigned_staff_id: None,
        medical_notes: None,
        allergies: None,
        dietary_requirements: None,
    }
}

fn unique_violation() -> Error {
    Error::Api {
        status: 409,
        code: Some("23505".to_string()),
        message: "duplicate key value violates unique constraint \"attendance_child_id_date_key\"".to_string(),
    }
}

fn unavailable() -> Error {
    Error::Api {
        status: 503,
        code: None,
        message: "service unavailable".to_string(),
    }
}

#[derive(Default)]
struct AttendanceState {
    children: Vec<Child>,
    rows: Vec<AttendanceRecord>,
    next_id: u64,
    failing_writes: usize,
    writes: usize,
}

/// Attendance tables in memory, with the (child, date) uniqueness constraint
#[derive(Default)]
pub struct MemoryAttendanceStore {
    state: Mutex<AttendanceState>,
}

impl MemoryAttendanceStore {
    pub fn with_children(children: Vec<Child>) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().children = children;
        store
    }

    /// Rows currently stored for a date
    pub fn rows(&self, date: NaiveDate) -> Vec<AttendanceRecord> {
        let state = self.state.lock().unwrap();
        state.rows.iter().filter(|r| r.date == date).cloned().collect()
    }

    pub fn row_for(&self, child_id: &str, date: NaiveDate) -> Option<AttendanceRecord> {
        self.rows(date).into_iter().find(|r| r.child_id == child_id)
    }

    /// Write a row as another actor would, bypassing the tracker
    pub fn insert_behind_back(&self, child_id: &str, date: NaiveDate, present: bool) -> AttendanceRecord {
        let mut state = self.state.lock().unwrap();
        let record = new_row(&mut state, child_id, date, present, "admin-2");
        state.rows.push(record.clone());
        record
    }

    pub fn delete_behind_back(&self, record_id: &str) {
        self.state.lock().unwrap().rows.retain(|r| r.id != record_id);
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().unwrap().failing_writes = count;
    }

    /// Successful and failed writes seen so far
    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }
}

fn new_row(state: &mut AttendanceState, child_id: &str, date: NaiveDate, present: bool, marked_by: &str) -> AttendanceRecord {
    state.next_id += 1;
    AttendanceRecord {
        id: format!("row-{}", state.next_id),
        child_id: child_id.to_string(),
        date,
        present,
        marked_by: marked_by.to_string(),
        created_at: Utc::now(),
    }
}

fn begin_write(state: &mut AttendanceState) -> Result<()> {
    state.writes += 1;
    if state.failing_writes > 0 {
        state.failing_writes -= 1;
        return Err(unavailable());
    }
    Ok(())
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn list_children(&self) -> Result<Vec<Child>> {
        let mut children = self.state.lock().unwrap().children.clone();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn list_attendance(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        Ok(self.rows(date))
    }

    async fn find_attendance(&self, child_id: &str, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        Ok(self.row_for(child_id, date))
    }

    async fn insert_attendance(&self, rows: Vec<NewAttendanceRecord>) -> Result<Vec<AttendanceRecord>> {
        let mut state = self.state.lock().unwrap();
        begin_write(&mut state)?;

        let clash = rows.iter().any(|new| {
            state
                .rows
                .iter()
                .any(|r| r.child_id == new.child_id && r.date == new.date)
        });
        if clash {
            return Err(unique_violation());
        }

        let mut inserted = Vec::new();
        for row in rows {
            let record = new_row(&mut state, &row.child_id, row.date, row.present, &row.marked_by);
            state.rows.push(record.clone());
            inserted.push(record);
        }
        Ok(inserted)
    }

    async fn set_presence(&self, record_id: &str, present: bool) -> Result<AttendanceRecord> {
        let mut state = self.state.lock().unwrap();
        begin_write(&mut state)?;

        let row = state
            .rows
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| Error::not_found(record_id))?;
        row.present = present;
        Ok(row.clone())
    }

    async fn delete_attendance(&self, record_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        begin_write(&mut state)?;
        state.rows.retain(|r| r.id != record_id);
        Ok(())
    }
}

#[derive(Default)]
struct EventState {
    guardians: Vec<Guardian>,
    events: Vec<Event>,
    notifications: Vec<EventNotification>,
    fail_notifications: bool,
}

#[derive(Default)]
pub struct MemoryEventStore {
    state: Mutex<EventState>,
}

impl MemoryEventStore {
    pub fn with_guardians(ids: &[&str]) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().guardians = ids
            .iter()
            .map(|id| Guardian {
                id: id.to_string(),
                name: format!("Guardian {}", id),
                email: format!("{}@example.com", id),
            })
            .collect();
        store
    }

    pub fn fail_notifications(&self) {
        self.state.lock().unwrap().fail_notifications = true;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn notifications(&self) -> Vec<EventNotification> {
        self.state.lock().unwrap().notifications.clone()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_event(&self, event: &NewEvent, created_by: &str) -> Result<Event> {
        let mut state = self.state.lock().unwrap();
        let event = Event {
            id: format!("event-{}", state.events.len() + 1),
            title: event.title.clone(),
            description: event.description.clone(),
            event_date: event.event_date,
            created_by: created_by.to_string(),
        };
        state.events.push(event.clone());
        Ok(event)
    }

    async fn list_active_guardians(&self) -> Result<Vec<Guardian>> {
        Ok(self.state.lock().unwrap().guardians.clone())
    }

    async fn insert_notifications(&self, rows: Vec<NewEventNotification>) -> Result<Vec<EventNotification>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_notifications {
            return Err(unavailable());
        }
        let start = state.notifications.len();
        let inserted: Vec<EventNotification> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| EventNotification {
                id: format!("notification-{}", start + i + 1),
                event_id: row.event_id,
                parent_id: row.parent_id,
                read: row.read,
            })
            .collect();
        state.notifications.extend(inserted.iter().cloned());
        Ok(inserted)
    }
}

/// Records every schedule call; calls whose index is in `failing` fail
#[derive(Default)]
pub struct RecordingScheduler {
    calls: Mutex<Vec<(Notification, Trigger)>>,
    failing: HashSet<usize>,
}

impl RecordingScheduler {
    pub fn failing_calls(indexes: &[usize]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: indexes.iter().copied().collect(),
        }
    }

    pub fn calls(&self) -> Vec<(Notification, Trigger)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationScheduler for RecordingScheduler {
    async fn schedule(&self, notification: Notification, trigger: Trigger) -> Result<ScheduleId> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push((notification, trigger));
        if self.failing.contains(&index) {
            return Err(Error::scheduling("push service rejected the request"));
        }
        Ok(ScheduleId(format!("schedule-{}", index + 1)))
    }
}
