//! Childcare client library
//!
//! Attendance marking with single-step undo, session management and event
//! notification fan-out for a childcare app whose data lives in a Supabase
//! project: database, auth, storage, realtime and edge functions.

pub mod attendance;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod functions;
pub mod media;
pub mod models;
pub mod payments;
pub mod postgrest;
pub mod realtime;
pub mod storage;

use reqwest::Client;
use std::sync::Arc;

use crate::attendance::RemoteAttendanceStore;
use crate::auth::{AuthClient, ProfileTable, SessionManager, SessionStore, TokenSource};
use crate::config::{ClientConfig, ClientOptions};
use crate::error::Result;
use crate::events::{EventService, FunctionScheduler, RemoteEventStore};
use crate::functions::FunctionsClient;
use crate::media::MediaService;
use crate::models::tables;
use crate::postgrest::PostgrestClient;
use crate::realtime::RealtimeClient;
use crate::storage::StorageClient;

/// The main entry point: one project, one HTTP client
pub struct Childcare {
    /// The base URL for the Supabase project
    pub url: String,
    /// The anonymous API key for the Supabase project
    pub key: String,
    /// HTTP client used for requests
    pub http_client: Client,
    /// Client options
    pub options: ClientOptions,
}

impl Childcare {
    /// Create a client with default options
    ///
    /// # Example
    ///
    /// ```
    /// use childcare_supabase::Childcare;
    ///
    /// let childcare = Childcare::new("https://your-project-url.supabase.co", "your-anon-key");
    /// ```
    pub fn new(url: &str, key: &str) -> Self {
        Self::new_with_options(url, key, ClientOptions::default())
    }

    /// Create a client with custom options
    pub fn new_with_options(url: &str, key: &str, options: ClientOptions) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client: Client::new(),
            options,
        }
    }

    /// Create a client from [`ClientConfig`]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new_with_options(&config.url, &config.key, config.options.clone())
    }

    /// Create a client from `SUPABASE_URL` and `SUPABASE_KEY`
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(&ClientConfig::from_env()?))
    }

    /// Database operations on a table
    ///
    /// # Example
    ///
    /// ```
    /// use childcare_supabase::Childcare;
    ///
    /// let childcare = Childcare::new("https://your-project-url.supabase.co", "your-anon-key");
    /// let query = childcare.from("children").select("*").order("name", true);
    /// ```
    pub fn from(&self, table: &str) -> PostgrestClient {
        PostgrestClient::new(&self.url, &self.key, table, self.http_client.clone(), &self.options)
    }

    /// The identity provider
    pub fn auth(&self) -> AuthClient {
        AuthClient::new(&self.url, &self.key, self.http_client.clone(), &self.options)
    }

    /// File storage
    pub fn storage(&self) -> StorageClient {
        StorageClient::new(&self.url, &self.key, self.http_client.clone(), &self.options)
    }

    /// Change subscriptions
    pub fn realtime(&self) -> RealtimeClient {
        RealtimeClient::new(&self.url, &self.key)
    }

    /// Edge functions
    pub fn functions(&self) -> FunctionsClient {
        FunctionsClient::new(&self.url, &self.key, self.http_client.clone(), &self.options)
    }

    /// A session manager persisting into `store`
    pub fn session_manager(&self, store: Arc<dyn SessionStore>) -> SessionManager {
        SessionManager::new(
            Arc::new(self.auth()),
            Arc::new(ProfileTable::new(self.from(tables::PROFILES))),
            store,
            self.options.clone(),
        )
    }

    /// The attendance tables, authorized by `tokens`
    pub fn attendance_store(&self, tokens: Arc<dyn TokenSource>) -> RemoteAttendanceStore {
        RemoteAttendanceStore::new(self.from(tables::CHILDREN), self.from(tables::ATTENDANCE), tokens)
    }

    /// Event creation with reminders scheduled through the configured function
    pub fn event_service(&self, tokens: Arc<dyn TokenSource>) -> EventService {
        let store = RemoteEventStore::new(
            self.from(tables::EVENTS),
            self.from(tables::PROFILES),
            self.from(tables::EVENT_NOTIFICATIONS),
            tokens.clone(),
        );
        let scheduler = FunctionScheduler::new(self.functions(), &self.options.notification_function, tokens);
        EventService::new(Arc::new(store), Arc::new(scheduler))
    }

    /// Media uploads into the configured bucket
    pub fn media(&self, tokens: Arc<dyn TokenSource>) -> MediaService {
        MediaService::new(self.storage(), self.from(tables::MEDIA), &self.options.media_bucket, tokens)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::attendance::{AttendanceStatus, AttendanceTracker, TransitionOutcome, UndoOutcome};
    pub use crate::auth::{FileSessionStore, SessionManager, TokenSource};
    pub use crate::config::{ClientConfig, ClientOptions};
    pub use crate::error::{Error, Result};
    pub use crate::models::{Child, Identity, NewEvent, Role};
    pub use crate::Childcare;
}
