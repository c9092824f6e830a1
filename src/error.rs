//! Error handling for the childcare client

use std::fmt;
use thiserror::Error;

/// Postgres error code raised by a unique constraint
const UNIQUE_VIOLATION: &str = "23505";

/// Unified error type for the childcare client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JWT decoding errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// A hosted service answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A required field was missing before a write was attempted
    #[error("Validation error: {0}")]
    Validation(String),

    /// The identity provider rejected the credentials
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// A token was issued but no profile row matches it
    #[error("No profile found for user {0}")]
    ProfileNotFound(String),

    /// The access token is no longer accepted
    #[error("Session expired")]
    SessionExpired,

    /// No identity is signed in
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The signed-in role may not perform the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A row the operation relies on no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Realtime subscription errors
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Edge Function errors
    #[error("Function error: {0}")]
    Function(String),

    /// Notification scheduling errors
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local file errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    /// Create a new forbidden error
    pub fn forbidden<T: fmt::Display>(msg: T) -> Self {
        Error::Forbidden(msg.to_string())
    }

    /// Create a new not-found error
    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Error::NotFound(msg.to_string())
    }

    /// Create a new storage error
    pub fn storage<T: fmt::Display>(msg: T) -> Self {
        Error::Storage(msg.to_string())
    }

    /// Create a new realtime error
    pub fn realtime<T: fmt::Display>(msg: T) -> Self {
        Error::Realtime(msg.to_string())
    }

    /// Create a new function error
    pub fn function<T: fmt::Display>(msg: T) -> Self {
        Error::Function(msg.to_string())
    }

    /// Create a new scheduling error
    pub fn scheduling<T: fmt::Display>(msg: T) -> Self {
        Error::Scheduling(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// HTTP status of an API error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the error means the bearer token was rejected
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::SessionExpired) || self.status() == Some(401)
    }

    /// Whether the error is a unique constraint violation at the data layer
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Api { status, code, .. } => {
                *status == 409 || code.as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unique_violation_by_code_or_status() {
        let by_code = Error::Api {
            status: 400,
            code: Some("23505".to_string()),
            message: "duplicate key".to_string(),
        };
        let by_status = Error::Api {
            status: 409,
            code: None,
            message: "conflict".to_string(),
        };
        assert!(by_code.is_unique_violation());
        assert!(by_status.is_unique_violation());
        assert!(!Error::validation("title").is_unique_violation());
    }

    #[test]
    fn classifies_unauthorized() {
        let api = Error::Api {
            status: 401,
            code: None,
            message: "JWT expired".to_string(),
        };
        assert!(api.is_unauthorized());
        assert!(Error::SessionExpired.is_unauthorized());
        assert!(!Error::NotAuthenticated.is_unauthorized());
    }
}
