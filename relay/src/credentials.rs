//! The upload account's OAuth credential, cached on disk between runs.

use crate::oauth::OAuthManager;
use eyre::Context;
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct TimeBoundAccessToken {
    token: BasicTokenResponse,
    /// When the current access token expires (with safety buffer)
    expires_at: SystemTime,
}

impl TimeBoundAccessToken {
    /// Wraps a token that is treated as already expired, forcing a refresh before first use.
    ///
    /// Tokens loaded from disk carry no issue time, so we cannot tell how much of their lifetime
    /// is left.
    pub fn expired(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: SystemTime::UNIX_EPOCH,
            token,
        }
    }

    /// Wraps a freshly issued token, computing its expiry from `expires_in`.
    pub fn new(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: Self::calculate_token_expiry(&token),
            token,
        }
    }

    pub fn raw_token(&self) -> &BasicTokenResponse {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// Refreshes this token, preserving the refresh token if Google doesn't send a new one.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Token was successfully refreshed
    /// * `Ok(false)` - Refresh failed (invalid grant, no refresh token, etc.)
    /// * `Err(_)` - Network or other error occurred
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        match oauth_manager
            .refresh_token(&self.token)
            .await
            .context("refresh OAuth token")?
        {
            Some(new_token) => {
                let old_token = std::mem::replace(&mut self.token, new_token);

                if self.token.refresh_token().is_none() {
                    tracing::trace!("new token lacks refresh token, preserving original");
                    self.token
                        .set_refresh_token(old_token.refresh_token().cloned());
                }

                self.expires_at = Self::calculate_token_expiry(&self.token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Uses now + `expires_in` - 5 minutes, or 55 minutes if the token doesn't say.
    fn calculate_token_expiry(token: &BasicTokenResponse) -> SystemTime {
        let now = SystemTime::now();
        match token.expires_in() {
            Some(expires_in) => now + expires_in.saturating_sub(Duration::from_secs(300)),
            None => now + Duration::from_secs(3300),
        }
    }
}

/// File-backed credential provider for the upload account.
///
/// Every change to the token (initial authorization, refresh) is written back to the cache file
/// so that a restart can pick up where this process left off.
#[derive(Debug)]
pub struct TokenCache {
    path: PathBuf,
    oauth: OAuthManager,
    token: Mutex<Option<TimeBoundAccessToken>>,
}

impl TokenCache {
    /// Opens the cache at `path`. A missing file just means nobody has authorized yet.
    pub fn open(path: impl Into<PathBuf>, oauth: OAuthManager) -> eyre::Result<Self> {
        let path = path.into();
        let token = match std::fs::read_to_string(&path) {
            Ok(json) => {
                let token: BasicTokenResponse = serde_json::from_str(&json)
                    .with_context(|| format!("parse cached token in {}", path.display()))?;
                Some(TimeBoundAccessToken::expired(token))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e).with_context(|| format!("read token cache {}", path.display()));
            }
        };
        Ok(Self::with_token(path, oauth, token))
    }

    pub(crate) fn with_token(
        path: PathBuf,
        oauth: OAuthManager,
        token: Option<TimeBoundAccessToken>,
    ) -> Self {
        Self {
            path,
            oauth,
            token: Mutex::new(token),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Makes sure a usable token is available before the poll loop starts.
    ///
    /// Cached tokens are always refreshed so the first upload doesn't discover a revoked grant
    /// hours later. If there is no cached token, or refreshing it is rejected, this falls back to
    /// the interactive flow.
    pub async fn prepare(&self) -> eyre::Result<()> {
        if self.refresh().await.context("refresh cached token")? {
            tracing::info!(path = %self.path.display(), "refreshed cached upload credential");
            return Ok(());
        }
        tracing::info!("no usable cached credential, starting interactive authorization");
        self.authenticate().await
    }

    /// Runs the interactive authorization flow and caches the result.
    pub async fn authenticate(&self) -> eyre::Result<()> {
        let mut slot = self.token.lock().await;
        self.authenticate_locked(&mut slot).await
    }

    /// Refreshes the cached token.
    ///
    /// Returns `Ok(false)` if there is no token or the refresh was rejected; the cache is left
    /// untouched in that case.
    pub async fn refresh(&self) -> eyre::Result<bool> {
        let mut slot = self.token.lock().await;
        self.refresh_locked(&mut slot).await
    }

    /// Returns an access token that is valid for at least the next few minutes.
    ///
    /// An expiring token is refreshed first; if that is rejected, the user is asked to authorize
    /// again, which blocks until they do.
    pub async fn access_token(&self) -> eyre::Result<String> {
        let mut slot = self.token.lock().await;
        let usable = slot.as_ref().is_some_and(|t| !t.is_expired());
        if !usable {
            tracing::debug!("access token missing or expired");
            if !self.refresh_locked(&mut slot).await? {
                tracing::warn!("access token could not be refreshed, re-authorizing");
                self.authenticate_locked(&mut slot).await?;
            }
        }

        let token = slot
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no access token after authorization"))?;
        Ok(token.raw_token().access_token().secret().to_string())
    }

    async fn refresh_locked(&self, slot: &mut Option<TimeBoundAccessToken>) -> eyre::Result<bool> {
        let Some(token) = slot.as_mut() else {
            return Ok(false);
        };
        if !token.refresh(&self.oauth).await? {
            return Ok(false);
        }
        self.persist(token.raw_token())?;
        Ok(true)
    }

    async fn authenticate_locked(
        &self,
        slot: &mut Option<TimeBoundAccessToken>,
    ) -> eyre::Result<()> {
        let raw = self
            .oauth
            .authenticate()
            .await
            .context("authorize upload account")?;
        self.persist(&raw)?;
        *slot = Some(TimeBoundAccessToken::new(raw));
        Ok(())
    }

    fn persist(&self, token: &BasicTokenResponse) -> eyre::Result<()> {
        let json = serde_json::to_vec_pretty(token).context("serialize OAuth token")?;
        crate::cursor::replace_file(&self.path, &json)
            .with_context(|| format!("write token cache {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "updated token cache");
        Ok(())
    }
}
