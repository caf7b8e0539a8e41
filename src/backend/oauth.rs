//! PKCE helpers and the loopback listener that receives the OAuth redirect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;
use url::Url;

use crate::app::{MarksError, Result};
use crate::config::BackendConfig;

const VERIFIER_LEN: usize = 64;
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(VERIFIER_LEN)
            .map(char::from)
            .collect();
        Self::from_verifier(verifier)
    }

    /// S256 challenge: base64url(sha256(verifier)) without padding.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }
}

pub fn authorize_url(config: &BackendConfig, provider: &str, pkce: &Pkce) -> Result<Url> {
    let mut url = config.auth_url("authorize")?;
    url.query_pairs_mut()
        .append_pair("provider", provider)
        .append_pair("redirect_to", &config.redirect_uri())
        .append_pair("code_challenge", &pkce.challenge)
        .append_pair("code_challenge_method", "s256");
    Ok(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    Denied(String),
}

/// Read the outcome from the query parameters of the `/callback` redirect.
pub fn callback_outcome(params: &HashMap<String, String>) -> CallbackOutcome {
    let error = params
        .get("error_description")
        .or_else(|| params.get("error"));
    match (params.get("code"), error) {
        (_, Some(reason)) => CallbackOutcome::Denied(reason.clone()),
        (Some(code), None) => CallbackOutcome::Code(code.clone()),
        (None, None) => CallbackOutcome::Denied("redirect carried no code".into()),
    }
}

type OutcomeSlot = Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>;

async fn callback(
    State(slot): State<OutcomeSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    let outcome = callback_outcome(&params);
    let response = match &outcome {
        CallbackOutcome::Code(_) => (
            StatusCode::OK,
            "Signed in to smartmarks. You can close this window.",
        ),
        CallbackOutcome::Denied(_) => (
            StatusCode::BAD_REQUEST,
            "Sign-in failed. Return to the terminal.",
        ),
    };
    // Only the first redirect counts.
    if let Some(tx) = slot.lock().await.take() {
        let _ = tx.send(outcome);
    }
    response
}

pub struct RedirectListener {
    listener: TcpListener,
}

impl RedirectListener {
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        Ok(Self { listener })
    }

    pub fn port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Serve `/callback` until the provider redirects back with a code.
    pub async fn wait_for_code(self) -> Result<String> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let slot: OutcomeSlot = Arc::new(Mutex::new(Some(outcome_tx)));
        let app = Router::new()
            .route("/callback", get(callback))
            .with_state(slot);

        let mut server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = tokio::time::timeout(CALLBACK_TIMEOUT, outcome_rx).await;

        // Let the browser's response flush, but don't wait on idle connections.
        let _ = shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
            debug!("OAuth listener still had open connections; aborting");
            server.abort();
        }

        match outcome {
            Ok(Ok(CallbackOutcome::Code(code))) => Ok(code),
            Ok(Ok(CallbackOutcome::Denied(reason))) => Err(MarksError::Auth(reason)),
            Ok(Err(_)) => Err(MarksError::Auth("Redirect listener stopped".into())),
            Err(_) => Err(MarksError::Auth("Timed out waiting for the sign-in redirect".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn test_challenge_matches_rfc7636_vector() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_generated_verifier_shape() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), VERIFIER_LEN);
        assert!(pkce.verifier.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(pkce.verifier, Pkce::generate().verifier);
    }

    #[test]
    fn test_authorize_url() {
        let config = BackendConfig {
            url: "https://abcd.supabase.co".into(),
            anon_key: "anon".into(),
            ..BackendConfig::default()
        };
        let pkce = Pkce::from_verifier("verifier");
        let url = authorize_url(&config, "google", &pkce).unwrap();
        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".into(), "google".into())));
        assert!(pairs.contains(&(
            "redirect_to".into(),
            "http://localhost:54321/callback".into()
        )));
        assert!(pairs.contains(&("code_challenge".into(), pkce.challenge.clone())));
        assert!(pairs.contains(&("code_challenge_method".into(), "s256".into())));
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_callback_outcome() {
        assert_eq!(
            callback_outcome(&params(&[("code", "abc123")])),
            CallbackOutcome::Code("abc123".into())
        );
        assert_eq!(
            callback_outcome(&params(&[
                ("error", "access_denied"),
                ("error_description", "User denied")
            ])),
            CallbackOutcome::Denied("User denied".into())
        );
        assert!(matches!(
            callback_outcome(&params(&[])),
            CallbackOutcome::Denied(_)
        ));
    }

    async fn send(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            target
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_listener_skips_unrelated_requests() {
        let listener = RedirectListener::bind(0).await.unwrap();
        let port = listener.port().unwrap();

        let client = tokio::spawn(async move {
            let favicon = send(port, "/favicon.ico").await;
            let callback = send(port, "/callback?code=xyz").await;
            (favicon, callback)
        });

        let code = listener.wait_for_code().await.unwrap();
        let (favicon, callback) = client.await.unwrap();
        assert_eq!(code, "xyz");
        assert!(favicon.starts_with("HTTP/1.1 404"));
        assert!(callback.starts_with("HTTP/1.1 200"));
        assert!(callback.contains("You can close this window"));
    }

    #[tokio::test]
    async fn test_listener_not_blocked_by_idle_connection() {
        let listener = RedirectListener::bind(0).await.unwrap();
        let port = listener.port().unwrap();

        // A browser preconnect that never sends a request.
        let idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let client = tokio::spawn(async move { send(port, "/callback?code=xyz").await });

        let code = tokio::time::timeout(Duration::from_secs(10), listener.wait_for_code())
            .await
            .expect("redirect should not wait behind the idle connection")
            .unwrap();
        assert_eq!(code, "xyz");
        assert!(client.await.unwrap().starts_with("HTTP/1.1 200"));
        drop(idle);
    }

    #[tokio::test]
    async fn test_listener_reports_denied_sign_in() {
        let listener = RedirectListener::bind(0).await.unwrap();
        let port = listener.port().unwrap();
        let client = tokio::spawn(async move { send(port, "/callback?error=access_denied").await });

        let err = listener.wait_for_code().await.unwrap_err();
        assert!(matches!(err, MarksError::Auth(reason) if reason == "access_denied"));
        assert!(client.await.unwrap().starts_with("HTTP/1.1 400"));
    }
}
