//! Session lifecycle: sign-in, stored-token verification, refresh and sign-out

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::auth::store::{SessionStore, AUTH_TOKEN_KEY, CURRENT_USER_KEY, REFRESH_TOKEN_KEY};
use crate::auth::types::{AccessClaims, RefreshedTokens, TokenResponse};
use crate::auth::{IdentityProvider, ProfileDirectory, TokenSource};
use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::models::Identity;

#[derive(Debug, Clone)]
struct ActiveSession {
    access_token: String,
    refresh_token: Option<String>,
    identity: Identity,
}

/// Single owner of the signed-in identity and its tokens
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileDirectory>,
    store: Arc<dyn SessionStore>,
    options: ClientOptions,
    state: RwLock<Option<ActiveSession>>,
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileDirectory>,
        store: Arc<dyn SessionStore>,
        options: ClientOptions,
    ) -> Self {
        Self {
            provider,
            profiles,
            store,
            options,
            state: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The signed-in identity, if any
    pub async fn current_identity(&self) -> Option<Identity> {
        self.state.read().await.as_ref().map(|s| s.identity.clone())
    }

    /// The signed-in identity, or `NotAuthenticated`
    pub async fn require_identity(&self) -> Result<Identity> {
        self.current_identity().await.ok_or(Error::NotAuthenticated)
    }

    /// Exchange credentials for a session and load the matching profile
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        if email.trim().is_empty() {
            return Err(Error::validation("email is required"));
        }
        if password.is_empty() {
            return Err(Error::validation("password is required"));
        }

        let tokens = self.provider.sign_in_with_password(email.trim(), password).await?;
        self.persist_tokens(&tokens.access_token, &tokens.refresh_token)
            .await?;

        let identity = self
            .establish(
                &tokens.access_token,
                Some(tokens.refresh_token.as_str()),
                &tokens.user.id,
                None,
            )
            .await?;
        info!(user_id = %identity.id, role = ?identity.role, "signed in");
        Ok(identity)
    }

    /// Restore the session persisted by an earlier run
    ///
    /// Returns `Ok(None)` when nothing is stored or the stored session could
    /// not be revived; in the latter case all stored state is cleared. The
    /// cached profile stands in when the profile lookup itself fails.
    pub async fn verify_stored_token(&self) -> Result<Option<Identity>> {
        let token = match self.store.get(AUTH_TOKEN_KEY).await? {
            Some(token) => token,
            None => {
                debug!("no stored session");
                return Ok(None);
            }
        };
        let cached = self.cached_identity().await;

        let verified = if is_locally_expired(&token) {
            debug!("stored access token is past its expiry");
            Err(Error::SessionExpired)
        } else {
            self.provider.get_user(&token).await
        };

        let (access_token, refresh_token, user_id) = match verified {
            Ok(user) => (token, self.store.get(REFRESH_TOKEN_KEY).await?, user.id),
            Err(e) if e.is_unauthorized() && self.options.auto_refresh_token => {
                match self.refresh().await {
                    Ok(refreshed) => {
                        let user_id = match refreshed.user_id.clone() {
                            Some(id) => id,
                            None => match claims(&refreshed.access_token).ok().and_then(|c| c.sub) {
                                Some(id) => id,
                                None => {
                                    self.discard("refreshed token names no user").await?;
                                    return Ok(None);
                                }
                            },
                        };
                        (refreshed.access_token, Some(refreshed.refresh_token), user_id)
                    }
                    Err(e) => {
                        self.discard(&format!("refresh failed: {}", e)).await?;
                        return Ok(None);
                    }
                }
            }
            Err(e) => {
                self.discard(&format!("stored token rejected: {}", e)).await?;
                return Ok(None);
            }
        };

        match self
            .establish(&access_token, refresh_token.as_deref(), &user_id, cached)
            .await
        {
            Ok(identity) => {
                info!(user_id = %identity.id, "restored session");
                Ok(Some(identity))
            }
            Err(e @ Error::ProfileNotFound(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "profile load failed, session dropped");
                Ok(None)
            }
        }
    }

    /// Refresh the tokens, with at most one refresh in flight
    ///
    /// A caller that waited on another refresh and finds the stored refresh
    /// token already rotated reuses that result instead of refreshing again.
    pub async fn refresh(&self) -> Result<RefreshedTokens> {
        let seen = self.current_refresh_token().await?;
        let _guard = self.refresh_lock.lock().await;

        let current = match self.current_refresh_token().await? {
            Some(token) => token,
            None => return Err(Error::SessionExpired),
        };

        if seen.as_deref() != Some(current.as_str()) {
            if let Some(access_token) = self.current_access_token().await? {
                debug!("refresh already completed by another caller");
                let user_id = claims(&access_token).ok().and_then(|c| c.sub);
                return Ok(RefreshedTokens {
                    access_token,
                    refresh_token: current,
                    user_id,
                });
            }
        }

        let tokens: TokenResponse = self.provider.refresh_session(&current).await?;
        self.persist_tokens(&tokens.access_token, &tokens.refresh_token)
            .await?;

        if let Some(active) = self.state.write().await.as_mut() {
            active.access_token = tokens.access_token.clone();
            active.refresh_token = Some(tokens.refresh_token.clone());
        }

        info!(user_id = %tokens.user.id, "session refreshed");
        Ok(RefreshedTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user_id: Some(tokens.user.id),
        })
    }

    /// Sign out remotely (best effort) and clear every piece of local state
    pub async fn sign_out(&self) -> Result<()> {
        let token = match self.state.read().await.as_ref() {
            Some(active) => Some(active.access_token.clone()),
            None => self.store.get(AUTH_TOKEN_KEY).await?,
        };

        if let Some(token) = token {
            if let Err(e) = self.provider.sign_out(&token).await {
                warn!(error = %e, "remote sign-out failed, clearing local session anyway");
            }
        }

        self.clear().await?;
        info!("signed out");
        Ok(())
    }

    /// Load the profile for a verified token and make it the active session
    ///
    /// A missing profile clears the session: an authenticated but profileless
    /// state is never kept. `cached` is used only when the lookup fails and it
    /// belongs to the same user.
    async fn establish(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user_id: &str,
        cached: Option<Identity>,
    ) -> Result<Identity> {
        let profile = match self.profiles.fetch_profile(access_token, user_id).await {
            Ok(profile) => profile,
            Err(e) if !e.is_unauthorized() => match cached.filter(|c| c.id == user_id) {
                Some(identity) => {
                    warn!(user_id, error = %e, "profile lookup failed, using the cached profile");
                    Some(identity)
                }
                None => {
                    self.clear().await?;
                    return Err(e);
                }
            },
            Err(e) => {
                self.clear().await?;
                return Err(e);
            }
        };

        let identity = match profile {
            Some(identity) => identity,
            None => {
                warn!(user_id, "no profile row for user, forcing sign-out");
                self.clear().await?;
                return Err(Error::ProfileNotFound(user_id.to_string()));
            }
        };

        if self.options.persist_session {
            self.store
                .set(CURRENT_USER_KEY, &serde_json::to_string(&identity)?)
                .await?;
        }

        *self.state.write().await = Some(ActiveSession {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            identity: identity.clone(),
        });

        Ok(identity)
    }

    /// The profile saved by the last run, if it still parses
    async fn cached_identity(&self) -> Option<Identity> {
        let json = match self.store.get(CURRENT_USER_KEY).await {
            Ok(json) => json?,
            Err(e) => {
                debug!(error = %e, "cached profile unreadable");
                return None;
            }
        };
        serde_json::from_str(&json).ok()
    }

    /// Stored refresh token, or the in-memory one when nothing is persisted
    async fn current_refresh_token(&self) -> Result<Option<String>> {
        if let Some(token) = self.store.get(REFRESH_TOKEN_KEY).await? {
            return Ok(Some(token));
        }
        Ok(self
            .state
            .read()
            .await
            .as_ref()
            .and_then(|s| s.refresh_token.clone()))
    }

    async fn current_access_token(&self) -> Result<Option<String>> {
        if let Some(token) = self.store.get(AUTH_TOKEN_KEY).await? {
            return Ok(Some(token));
        }
        Ok(self.access_token().await)
    }

    async fn persist_tokens(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        if !self.options.persist_session {
            return Ok(());
        }
        self.store.set(AUTH_TOKEN_KEY, access_token).await?;
        self.store.set(REFRESH_TOKEN_KEY, refresh_token).await
    }

    async fn discard(&self, reason: &str) -> Result<()> {
        warn!(reason, "discarding stored session");
        self.clear().await
    }

    async fn clear(&self) -> Result<()> {
        *self.state.write().await = None;
        self.store.remove(AUTH_TOKEN_KEY).await?;
        self.store.remove(REFRESH_TOKEN_KEY).await?;
        self.store.remove(CURRENT_USER_KEY).await
    }
}

#[async_trait]
impl TokenSource for SessionManager {
    async fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }
}

/// Read claims from an access token without checking its signature
pub(crate) fn claims(token: &str) -> Result<AccessClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// Whether the token's `exp` claim is already past; opaque tokens are left to the server
fn is_locally_expired(token: &str) -> bool {
    match claims(token) {
        Ok(AccessClaims { exp: Some(exp), .. }) => exp <= Utc::now().timestamp(),
        _ => false,
    }
}
