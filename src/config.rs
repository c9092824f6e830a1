//! Configuration options for the childcare client

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default file holding the persisted session between runs
pub const DEFAULT_SESSION_FILE: &str = ".childcare-session.json";

/// Configuration options for the childcare client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whether to refresh an expired token once before giving up
    pub auto_refresh_token: bool,

    /// Whether sign-in writes tokens to the session store
    pub persist_session: bool,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// The database schema
    pub db_schema: String,

    /// How long an attendance change stays undoable
    pub undo_window: Duration,

    /// Storage bucket holding uploaded media
    pub media_bucket: String,

    /// Edge function used to schedule reminders
    pub notification_function: String,

    /// Value sent in the `X-Client-Info` header
    pub client_info: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            request_timeout: Some(Duration::from_secs(30)),
            db_schema: "public".to_string(),
            undo_window: Duration::from_secs(10),
            media_bucket: "media".to_string(),
            notification_function: "schedule-notification".to_string(),
            client_info: concat!("childcare-supabase/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientOptions {
    /// Set whether to automatically refresh the token
    pub fn with_auto_refresh_token(mut self, value: bool) -> Self {
        self.auto_refresh_token = value;
        self
    }

    /// Set whether to persist the session
    pub fn with_persist_session(mut self, value: bool) -> Self {
        self.persist_session = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the database schema
    pub fn with_db_schema(mut self, value: &str) -> Self {
        self.db_schema = value.to_string();
        self
    }

    /// Set the undo window for attendance changes
    pub fn with_undo_window(mut self, value: Duration) -> Self {
        self.undo_window = value;
        self
    }

    /// Set the media bucket
    pub fn with_media_bucket(mut self, value: &str) -> Self {
        self.media_bucket = value.to_string();
        self
    }

    /// Set the edge function used for reminders
    pub fn with_notification_function(mut self, value: &str) -> Self {
        self.notification_function = value.to_string();
        self
    }
}

/// Project coordinates read from the environment
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The base URL of the Supabase project
    pub url: String,

    /// The anonymous API key
    pub key: String,

    /// Where the durable session is written
    pub session_file: PathBuf,

    /// Client options
    pub options: ClientOptions,
}

impl ClientConfig {
    /// Read `SUPABASE_URL`, `SUPABASE_KEY` and `CHILDCARE_SESSION_FILE`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("SUPABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::config("SUPABASE_URL must be set"))?;
        let key = lookup("SUPABASE_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::config("SUPABASE_KEY must be set"))?;
        let session_file = lookup("CHILDCARE_SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            key,
            session_file,
            options: ClientOptions::default(),
        })
    }
}
