//! Fire-and-forget reminder scheduling

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::auth::TokenSource;
use crate::error::{Error, Result};
use crate::functions::{FunctionInvokeOptions, FunctionsClient};

/// A message for the notification service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// When a notification is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Now,
    At(DateTime<Utc>),
}

/// Opaque handle returned by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleId(pub String);

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External notification service; no delivery confirmation is offered
#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    async fn schedule(&self, notification: Notification, trigger: Trigger) -> Result<ScheduleId>;
}

#[derive(Debug, Deserialize)]
struct ScheduleReply {
    id: String,
}

/// Schedules reminders through an edge function
pub struct FunctionScheduler {
    functions: FunctionsClient,
    function_name: String,
    tokens: Arc<dyn TokenSource>,
}

impl FunctionScheduler {
    pub fn new(functions: FunctionsClient, function_name: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            functions,
            function_name: function_name.to_string(),
            tokens,
        }
    }
}

#[async_trait]
impl NotificationScheduler for FunctionScheduler {
    async fn schedule(&self, notification: Notification, trigger: Trigger) -> Result<ScheduleId> {
        let send_at = match trigger {
            Trigger::Now => None,
            Trigger::At(at) => Some(at.to_rfc3339()),
        };
        let body = json!({
            "title": notification.title,
            "body": notification.body,
            "data": notification.data,
            "send_at": send_at,
        });

        let mut options = FunctionInvokeOptions::new().with_body(body);
        if let Some(token) = self.tokens.access_token().await {
            options = options.with_authorization(&token);
        }

        debug!(function = %self.function_name, ?trigger, "scheduling notification");
        let reply: ScheduleReply = self
            .functions
            .invoke(&self.function_name, &options)
            .await
            .map_err(Error::scheduling)?;

        Ok(ScheduleId(reply.id))
    }
}
