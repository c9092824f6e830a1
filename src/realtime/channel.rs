use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::realtime::client::RealtimeClient;
use crate::realtime::message::{events, ChangeKind, PostgresChangesPayload, RealtimeMessage, RowChange};

/// Callback invoked for each matching row change
pub type ChangeCallback = Arc<dyn Fn(RowChange) + Send + Sync>;

/// Which row changes a binding listens to
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseChanges {
    schema: String,
    table: String,
    event: ChangeKind,
    filter: Option<String>,
}

impl DatabaseChanges {
    /// Listen to every change on `table`
    pub fn new(table: &str) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.to_string(),
            event: ChangeKind::All,
            filter: None,
        }
    }

    /// Set the schema
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    /// Restrict to one kind of change
    pub fn event(mut self, event: ChangeKind) -> Self {
        self.event = event;
        self
    }

    /// Only deliver rows where `column` equals `value`
    ///
    /// The realtime service supports a single filter per binding; a later
    /// call replaces an earlier one.
    pub fn eq<T: ToString>(mut self, column: &str, value: T) -> Self {
        self.filter = Some(format!("{}=eq.{}", column, value.to_string()));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn to_config(&self) -> serde_json::Value {
        let mut config = json!({
            "event": self.event.as_str(),
            "schema": self.schema,
            "table": self.table,
        });
        if let Some(filter) = &self.filter {
            config["filter"] = json!(filter);
        }
        config
    }

    fn matches(&self, change: &RowChange) -> bool {
        self.schema == change.schema && self.table == change.table && self.event.accepts(change.kind)
    }
}

struct Binding {
    changes: DatabaseChanges,
    callback: ChangeCallback,
}

/// A joined topic and its bindings
pub struct Channel {
    topic: String,
    bindings: Vec<Binding>,
}

impl Channel {
    pub(crate) fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn join_message(&self, join_ref: String, access_token: Option<String>) -> RealtimeMessage {
        let changes: Vec<serde_json::Value> =
            self.bindings.iter().map(|b| b.changes.to_config()).collect();

        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": changes,
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = json!(token);
        }

        RealtimeMessage {
            topic: self.topic.clone(),
            event: events::JOIN.to_string(),
            payload,
            message_ref: Some(join_ref),
        }
    }

    /// Deliver a message addressed to this topic
    pub(crate) fn handle_message(&self, message: &RealtimeMessage) {
        match message.event.as_str() {
            events::POSTGRES_CHANGES => {
                let payload: PostgresChangesPayload =
                    match serde_json::from_value(message.payload.clone()) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(topic = %self.topic, error = %e, "malformed postgres_changes payload");
                            return;
                        }
                    };

                for binding in self.bindings.iter().filter(|b| b.changes.matches(&payload.data)) {
                    (binding.callback)(payload.data.clone());
                }
            }
            events::REPLY => {
                let status = message.payload.get("status").and_then(|s| s.as_str());
                if status == Some("ok") {
                    debug!(topic = %self.topic, "channel reply ok");
                } else {
                    warn!(topic = %self.topic, payload = %message.payload, "channel reply not ok");
                }
            }
            events::ERROR => warn!(topic = %self.topic, "channel error"),
            other => trace!(topic = %self.topic, event = other, "ignoring channel event"),
        }
    }
}

/// Builder for a channel subscription
pub struct ChannelBuilder {
    client: RealtimeClient,
    topic: String,
    bindings: Vec<Binding>,
}

impl ChannelBuilder {
    pub(crate) fn new(client: RealtimeClient, name: &str) -> Self {
        Self {
            client,
            topic: format!("realtime:{}", name),
            bindings: Vec::new(),
        }
    }

    /// Register a callback for row changes
    pub fn on<F>(mut self, changes: DatabaseChanges, callback: F) -> Self
    where
        F: Fn(RowChange) + Send + Sync + 'static,
    {
        self.bindings.push(Binding {
            changes,
            callback: Arc::new(callback),
        });
        self
    }

    /// Build the channel without joining it
    pub(crate) fn build(self) -> (RealtimeClient, Channel) {
        (
            self.client,
            Channel {
                topic: self.topic,
                bindings: self.bindings,
            },
        )
    }

    /// Join the channel on the connected socket
    pub async fn subscribe(self) -> Result<Subscription> {
        if self.bindings.is_empty() {
            return Err(Error::realtime("channel has no bindings"));
        }

        let (client, channel) = self.build();
        let topic = channel.topic().to_string();
        client.join(Arc::new(channel)).await?;
        info!(topic = %topic, "subscribed");

        Ok(Subscription {
            topic,
            client: Some(client),
        })
    }
}

/// An active channel subscription; leaves the channel when dropped
pub struct Subscription {
    topic: String,
    client: Option<RealtimeClient>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Leave the channel now
    pub async fn unsubscribe(mut self) -> Result<()> {
        match self.client.take() {
            Some(client) => client.leave(&self.topic).await,
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let topic = self.topic.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = client.leave(&topic).await {
                    warn!(topic = %topic, error = %e, "failed to leave channel");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn change_message(topic: &str, kind: &str, table: &str) -> RealtimeMessage {
        RealtimeMessage {
            topic: topic.to_string(),
            event: events::POSTGRES_CHANGES.to_string(),
            payload: json!({
                "ids": [1],
                "data": {
                    "type": kind,
                    "schema": "public",
                    "table": table,
                    "commit_timestamp": "2024-03-01T08:00:00Z",
                    "record": { "id": "r1" },
                    "old_record": {}
                }
            }),
            message_ref: None,
        }
    }

    #[tokio::test]
    async fn dispatches_matching_changes_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let client = RealtimeClient::new("http://localhost:54321", "anon");
        let (_, channel) = client
            .channel("attendance")
            .on(
                DatabaseChanges::new("attendance").event(ChangeKind::Update),
                move |change| sink.lock().unwrap().push(change.kind),
            )
            .build();

        channel.handle_message(&change_message("realtime:attendance", "UPDATE", "attendance"));
        channel.handle_message(&change_message("realtime:attendance", "INSERT", "attendance"));
        channel.handle_message(&change_message("realtime:attendance", "UPDATE", "children"));

        assert_eq!(*seen.lock().unwrap(), vec![ChangeKind::Update]);
    }

    #[test]
    fn join_message_carries_filter_and_token() {
        let client = RealtimeClient::new("http://localhost:54321", "anon");
        let (_, channel) = client
            .channel("attendance-2024-03-01")
            .on(
                DatabaseChanges::new("attendance").eq("date", "2024-03-01"),
                |_| {},
            )
            .build();

        let join = channel.join_message("7".to_string(), Some("jwt".to_string()));
        assert_eq!(join.topic, "realtime:attendance-2024-03-01");
        assert_eq!(join.event, "phx_join");
        assert_eq!(join.payload["access_token"], "jwt");
        let binding = &join.payload["config"]["postgres_changes"][0];
        assert_eq!(binding["event"], "*");
        assert_eq!(binding["table"], "attendance");
        assert_eq!(binding["filter"], "date=eq.2024-03-01");
    }
}
