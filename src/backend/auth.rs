//! Supabase auth (GoTrue) client.
//!
//! Sessions are persisted through [`SessionStore`] and every change is
//! published to [`SessionListener`]s: sign-in, sign-out and token refresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::{MarksError, Result};
use crate::backend::http::{auth_headers, build_client, ensure_success};
use crate::backend::oauth::{authorize_url, Pkce, RedirectListener};
use crate::backend::session_store::SessionStore;
use crate::backend::{AuthProvider, SessionBroadcast, SessionListener};
use crate::config::BackendConfig;
use crate::domain::{Identity, Session};

const DEFAULT_LIFETIME_SECS: i64 = 3600;
const REFRESH_RETRY: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Identity,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| {
                now + chrono::Duration::seconds(self.expires_in.unwrap_or(DEFAULT_LIFETIME_SECS))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

pub struct SupabaseAuth {
    config: BackendConfig,
    client: Client,
    store: SessionStore,
    sessions: SessionBroadcast,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl SupabaseAuth {
    pub fn new(config: BackendConfig, store: SessionStore) -> Result<Self> {
        let client = build_client(&config)?;
        let stored = store.load()?;
        Ok(Self {
            config,
            client,
            store,
            sessions: SessionBroadcast::new(stored),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Identity> {
        let url = self.config.auth_url("user")?;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .headers(auth_headers(&self.config.anon_key, Some(access_token))?)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Session> {
        let mut url = self.config.auth_url("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .headers(auth_headers(&self.config.anon_key, None)?)
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = ensure_success(response).await?.json().await?;
        Ok(token.into_session(Utc::now()))
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Session> {
        self.token_grant(
            "pkce",
            json!({ "auth_code": code, "code_verifier": verifier }),
        )
        .await
    }

    /// Refresh the current session, unless another caller already did.
    pub async fn refresh_current(&self) -> Result<Option<Session>> {
        let _guard = self.refresh_lock.lock().await;
        let Some(current) = self.sessions.current() else {
            return Ok(None);
        };
        if !current.is_expired() {
            return Ok(Some(current));
        }

        match self
            .token_grant("refresh_token", json!({ "refresh_token": current.refresh_token }))
            .await
        {
            Ok(session) => {
                info!("Refreshed session for {}", session.user.display_name());
                self.establish(session.clone())?;
                Ok(Some(session))
            }
            Err(e)
                if e.is_unauthorized() || matches!(e, MarksError::Backend { status: 400, .. }) =>
            {
                warn!("Refresh token rejected, signing out: {}", e);
                self.forget()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn revoke(&self, access_token: &str) -> Result<()> {
        let url = self.config.auth_url("logout")?;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .headers(auth_headers(&self.config.anon_key, Some(access_token))?)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    fn establish(&self, session: Session) -> Result<()> {
        self.store.save(&session)?;
        debug!("Session stored at {}", self.store.path().display());
        self.sessions.publish(Some(session));
        Ok(())
    }

    fn forget(&self) -> Result<()> {
        self.store.clear()?;
        self.sessions.publish(None);
        Ok(())
    }

    /// Keep the session fresh in the background until the handle is dropped.
    pub fn spawn_refresh_task(self: &Arc<Self>) -> RefreshTask {
        let auth = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut listener = auth.sessions.listen();
            loop {
                let Some(current) = auth.sessions.current() else {
                    if listener.changed().await.is_none() {
                        break;
                    }
                    continue;
                };

                tokio::select! {
                    _ = tokio::time::sleep(current.refresh_in(Utc::now())) => {
                        if let Err(e) = auth.refresh_current().await {
                            warn!("Session refresh failed, retrying: {}", e);
                            tokio::time::sleep(REFRESH_RETRY).await;
                        }
                    }
                    changed = listener.changed() => {
                        if changed.is_none() {
                            break;
                        }
                    }
                }
            }
        });
        RefreshTask { handle }
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn current_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.refresh_current().await? else {
            return Ok(None);
        };

        match self.fetch_user(&session.access_token).await {
            Ok(user) if user == session.user => Ok(Some(session)),
            Ok(user) => {
                let session = Session { user, ..session };
                self.establish(session.clone())?;
                Ok(Some(session))
            }
            Err(e) if e.is_unauthorized() => {
                warn!("Stored session was rejected: {}", e);
                self.forget()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn on_session_change(&self) -> SessionListener {
        self.sessions.listen()
    }

    async fn start_oauth(&self, provider: &str) -> Result<()> {
        let pkce = Pkce::generate();
        let listener = RedirectListener::bind(self.config.redirect_port).await?;
        let url = authorize_url(&self.config, provider, &pkce)?;

        info!("Opening browser for {} sign-in", provider);
        if let Err(e) = open::that(url.as_str()) {
            warn!("Could not open a browser ({}); visit {}", e, url);
        }

        let code = listener.wait_for_code().await?;
        let session = self.exchange_code(&code, &pkce.verifier).await?;
        info!("Signed in as {}", session.user.display_name());
        self.establish(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.sessions.current() {
            // The local session goes away even if the server call fails.
            if let Err(e) = self.revoke(&session.access_token).await {
                warn!("Server-side sign-out failed: {}", e);
            }
        }
        self.forget()
    }
}

/// Background token refresh; aborted on drop.
pub struct RefreshTask {
    handle: JoinHandle<()>,
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_prefers_expires_at() {
        let body = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1900000000,
            "refresh_token": "r1",
            "user": {"id": "u1", "email": "a@example.com", "role": "authenticated"}
        }"#;
        let token: TokenResponse = serde_json::from_str(body).unwrap();
        let session = token.into_session(Utc::now());
        assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(session.user, Identity::new("u1", "a@example.com"));
    }

    #[test]
    fn test_token_response_falls_back_to_expires_in() {
        let body = r#"{
            "access_token": "jwt",
            "expires_in": 120,
            "refresh_token": "r1",
            "user": {"id": "u1", "email": "a@example.com"}
        }"#;
        let now = Utc::now();
        let token: TokenResponse = serde_json::from_str(body).unwrap();
        let session = token.into_session(now);
        assert_eq!((session.expires_at - now).num_seconds(), 120);
    }

    fn auth_with_session(dir: &tempfile::TempDir, session: Option<Session>) -> SupabaseAuth {
        let store = SessionStore::new(dir.path().join("session.json"));
        if let Some(session) = &session {
            store.save(session).unwrap();
        }
        let config = BackendConfig {
            url: "http://127.0.0.1:9".into(),
            anon_key: "anon".into(),
            ..BackendConfig::default()
        };
        SupabaseAuth::new(config, store).unwrap()
    }

    #[tokio::test]
    async fn test_new_restores_stored_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session {
            access_token: "jwt".into(),
            refresh_token: "r1".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user: Identity::new("u1", "a@example.com"),
        };
        let auth = auth_with_session(&dir, Some(session.clone()));
        // Still fresh, so no network round trip is needed.
        assert_eq!(auth.refresh_current().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_sign_out_clears_local_session_when_offline() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session {
            access_token: "jwt".into(),
            refresh_token: "r1".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user: Identity::new("u1", "a@example.com"),
        };
        let auth = auth_with_session(&dir, Some(session));
        let mut listener = auth.on_session_change();

        auth.sign_out().await.unwrap();

        assert_eq!(listener.changed().await, Some(None));
        assert!(!dir.path().join("session.json").exists());
    }

    #[tokio::test]
    async fn test_no_session_means_no_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let auth = auth_with_session(&dir, None);
        assert!(auth.refresh_current().await.unwrap().is_none());
    }
}
