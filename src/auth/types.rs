//! Types for authentication and user management

use serde::{Deserialize, Serialize};

/// User data returned by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    pub id: String,

    /// The user's email address
    #[serde(default)]
    pub email: Option<String>,

    /// The provider-side role (usually `authenticated`)
    #[serde(default)]
    pub role: Option<String>,

    /// The app metadata
    #[serde(default)]
    pub app_metadata: serde_json::Value,

    /// The user metadata
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Token grant returned on sign-in and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token
    pub access_token: String,

    /// The refresh token
    pub refresh_token: String,

    /// The token type
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// The expiry time in seconds
    #[serde(default)]
    pub expires_in: i64,

    /// The expiry timestamp
    #[serde(default)]
    pub expires_at: Option<i64>,

    /// The signed-in user
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Tokens produced by a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    /// The new access token
    pub access_token: String,

    /// The new refresh token
    pub refresh_token: String,

    /// The user the tokens belong to, when the provider reported it
    pub user_id: Option<String>,
}

/// Claims read from an access token without verifying its signature
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AccessClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}
