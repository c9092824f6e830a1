//! Persistence seam for the attendance tracker

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::auth::TokenSource;
use crate::error::{Error, Result};
use crate::models::{AttendanceRecord, Child, NewAttendanceRecord};
use crate::postgrest::PostgrestClient;

/// Row access the tracker needs
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// The full roster, ordered by name
    async fn list_children(&self) -> Result<Vec<Child>>;

    /// Rows whose date equals `date` exactly
    async fn list_attendance(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>>;

    /// The row for one (child, date) pair, if any
    async fn find_attendance(&self, child_id: &str, date: NaiveDate) -> Result<Option<AttendanceRecord>>;

    /// Insert one or more rows and return them as stored
    async fn insert_attendance(&self, rows: Vec<NewAttendanceRecord>) -> Result<Vec<AttendanceRecord>>;

    /// Set the presence flag; `NotFound` when the row is gone
    async fn set_presence(&self, record_id: &str, present: bool) -> Result<AttendanceRecord>;

    /// Delete a row; deleting a missing row is not an error
    async fn delete_attendance(&self, record_id: &str) -> Result<()>;
}

/// [`AttendanceStore`] over the `children` and `attendance` tables
pub struct RemoteAttendanceStore {
    children: PostgrestClient,
    attendance: PostgrestClient,
    tokens: Arc<dyn TokenSource>,
}

impl RemoteAttendanceStore {
    pub fn new(children: PostgrestClient, attendance: PostgrestClient, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            children,
            attendance,
            tokens,
        }
    }

    async fn authorized(&self, table: &PostgrestClient) -> Result<PostgrestClient> {
        let token = self
            .tokens
            .access_token()
            .await
            .ok_or(Error::NotAuthenticated)?;
        Ok(table.clone().with_auth(&token))
    }
}

#[async_trait]
impl AttendanceStore for RemoteAttendanceStore {
    async fn list_children(&self) -> Result<Vec<Child>> {
        self.authorized(&self.children)
            .await?
            .select("*")
            .order("name", true)
            .execute::<Child>()
            .await
    }

    async fn list_attendance(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        self.authorized(&self.attendance)
            .await?
            .select("*")
            .eq("date", date)
            .execute::<AttendanceRecord>()
            .await
    }

    async fn find_attendance(&self, child_id: &str, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        self.authorized(&self.attendance)
            .await?
            .select("*")
            .eq("child_id", child_id)
            .eq("date", date)
            .execute_one::<AttendanceRecord>()
            .await
    }

    async fn insert_attendance(&self, rows: Vec<NewAttendanceRecord>) -> Result<Vec<AttendanceRecord>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = rows.len(), "inserting attendance rows");
        self.authorized(&self.attendance)
            .await?
            .insert(rows)
            .execute::<AttendanceRecord>()
            .await
    }

    async fn set_presence(&self, record_id: &str, present: bool) -> Result<AttendanceRecord> {
        let updated = self
            .authorized(&self.attendance)
            .await?
            .update(json!({ "present": present }))
            .eq("id", record_id)
            .execute::<AttendanceRecord>()
            .await?;

        updated
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("attendance record {}", record_id)))
    }

    async fn delete_attendance(&self, record_id: &str) -> Result<()> {
        let deleted = self
            .authorized(&self.attendance)
            .await?
            .delete()
            .eq("id", record_id)
            .execute::<AttendanceRecord>()
            .await?;

        if deleted.is_empty() {
            debug!(record_id, "attendance row already gone");
        }
        Ok(())
    }
}
