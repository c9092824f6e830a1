//! Persistence seam for events and their notification rows

use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::TokenSource;
use crate::error::{Error, Result};
use crate::models::{Event, EventInsert, EventNotification, Guardian, NewEvent, NewEventNotification};
use crate::postgrest::PostgrestClient;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert an event stamped with its creator
    async fn insert_event(&self, event: &NewEvent, created_by: &str) -> Result<Event>;

    /// Every guardian who should hear about new events
    async fn list_active_guardians(&self) -> Result<Vec<Guardian>>;

    /// Insert notification rows in one batch
    async fn insert_notifications(&self, rows: Vec<NewEventNotification>) -> Result<Vec<EventNotification>>;
}

/// [`EventStore`] over the `events`, `profiles` and `event_notifications` tables
pub struct RemoteEventStore {
    events: PostgrestClient,
    profiles: PostgrestClient,
    notifications: PostgrestClient,
    tokens: Arc<dyn TokenSource>,
}

impl RemoteEventStore {
    pub fn new(
        events: PostgrestClient,
        profiles: PostgrestClient,
        notifications: PostgrestClient,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            events,
            profiles,
            notifications,
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
impl EventStore for RemoteEventStore {
    async fn insert_event(&self, event: &NewEvent, created_by: &str) -> Result<Event> {
        let row = EventInsert {
            title: &event.title,
            description: event.description.as_deref(),
            event_date: event.event_date,
            created_by,
        };

        self.authorized(&self.events)
            .await?
            .insert(row)
            .execute::<Event>()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::general("insert returned no event row"))
    }

    async fn list_active_guardians(&self) -> Result<Vec<Guardian>> {
        self.authorized(&self.profiles)
            .await?
            .select("id,full_name,email")
            .eq("role", "parent")
            .execute::<Guardian>()
            .await
    }

    async fn insert_notifications(&self, rows: Vec<NewEventNotification>) -> Result<Vec<EventNotification>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.authorized(&self.notifications)
            .await?
            .insert(rows)
            .execute::<EventNotification>()
            .await
    }
}
