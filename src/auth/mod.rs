//! Authentication and session management

mod profile;
mod session;
mod store;
mod types;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, FetchBuilder};

/// GoTrue error codes for a wrong email or password
const REJECTED_CREDENTIALS: &[&str] = &["invalid_grant", "invalid_credentials"];

pub use profile::*;
pub use session::*;
pub use store::*;
pub use types::*;

/// The identity provider the session manager exchanges credentials with
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange email and password for tokens
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<TokenResponse>;

    /// Exchange a refresh token for new tokens
    async fn refresh_session(&self, refresh_token: &str) -> Result<TokenResponse>;

    /// Validate an access token and return its user
    async fn get_user(&self, access_token: &str) -> Result<User>;

    /// Revoke the session behind an access token
    async fn sign_out(&self, access_token: &str) -> Result<()>;
}

/// Anything that can hand out the current bearer token
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Option<String>;
}

/// A fixed token, for service scripts and tests
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Client for Supabase Auth (GoTrue)
#[derive(Clone)]
pub struct AuthClient {
    /// The base URL for the Supabase project
    url: String,

    /// The anonymous API key for the Supabase project
    key: String,

    /// HTTP client used for requests
    client: Client,

    client_info: String,
    timeout: Option<Duration>,
}

impl AuthClient {
    /// Create a new Auth client
    pub(crate) fn new(url: &str, key: &str, client: Client, options: &ClientOptions) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            client,
            client_info: options.client_info.clone(),
            timeout: options.request_timeout,
        }
    }

    fn get_auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    fn prepare<'a>(&self, fetch: FetchBuilder<'a>) -> FetchBuilder<'a> {
        fetch
            .header("apikey", &self.key)
            .header("X-Client-Info", &self.client_info)
            .timeout(self.timeout)
    }
}

#[async_trait]
impl IdentityProvider for AuthClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<TokenResponse> {
        let url = self.get_auth_url("/token");
        let body = json!({ "email": email, "password": password });

        let result = self
            .prepare(Fetch::post(&self.client, &url))
            .query([("grant_type", "password")])
            .json(&body)?
            .execute::<TokenResponse>()
            .await;

        result.map_err(|e| match e {
            Error::Api {
                code: Some(code),
                message,
                ..
            } if REJECTED_CREDENTIALS.contains(&code.as_str()) => Error::InvalidCredentials(message),
            other => other,
        })
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<TokenResponse> {
        let url = self.get_auth_url("/token");
        let body = json!({ "refresh_token": refresh_token });

        let result = self
            .prepare(Fetch::post(&self.client, &url))
            .query([("grant_type", "refresh_token")])
            .json(&body)?
            .execute::<TokenResponse>()
            .await;

        result.map_err(|e| match e {
            Error::Api {
                status: 400 | 401, ..
            } => Error::SessionExpired,
            other => other,
        })
    }

    async fn get_user(&self, access_token: &str) -> Result<User> {
        let url = self.get_auth_url("/user");

        let result = self
            .prepare(Fetch::get(&self.client, &url))
            .bearer_auth(access_token)
            .execute::<User>()
            .await;

        result.map_err(|e| match e {
            Error::Api {
                status: 401 | 403, ..
            } => Error::SessionExpired,
            other => other,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = self.get_auth_url("/logout");

        self.prepare(Fetch::post(&self.client, &url))
            .bearer_auth(access_token)
            .execute_raw()
            .await?;

        Ok(())
    }
}
