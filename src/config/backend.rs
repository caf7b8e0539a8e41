//! Connection settings for the hosted backend.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::app::{MarksError, Result};

pub const URL_ENV: &str = "SUPABASE_URL";
pub const ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`.
    pub url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,
    pub schema: String,
    pub table: String,
    /// Realtime channel name.
    pub channel: String,
    /// OAuth provider used by sign-in.
    pub provider: String,
    /// Loopback port receiving the OAuth redirect.
    pub redirect_port: u16,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            schema: "public".to_string(),
            table: "bookmarks".to_string(),
            channel: "bookmarks-realtime".to_string(),
            provider: "google".to_string(),
            redirect_port: 54321,
            request_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    /// Apply `SUPABASE_URL` / `SUPABASE_ANON_KEY` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(std::env::var(URL_ENV).ok(), std::env::var(ANON_KEY_ENV).ok());
    }

    pub fn apply_overrides(&mut self, url: Option<String>, anon_key: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.url = url.trim().to_string();
        }
        if let Some(key) = anon_key.filter(|k| !k.trim().is_empty()) {
            self.anon_key = key.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(MarksError::Config(format!(
                "backend.url is not set (config file or {})",
                URL_ENV
            )));
        }
        if self.anon_key.trim().is_empty() {
            return Err(MarksError::Config(format!(
                "backend.anon_key is not set (config file or {})",
                ANON_KEY_ENV
            )));
        }
        let base = self.base_url()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(MarksError::Config(format!(
                "backend.url must be http or https: {}",
                self.url
            )));
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Ok(Url::parse(&raw)?)
    }

    /// `{url}/rest/v1/{table}`
    pub fn rest_url(&self) -> Result<Url> {
        Ok(self.base_url()?.join(&format!("rest/v1/{}", self.table))?)
    }

    /// `{url}/auth/v1/{path}`
    pub fn auth_url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url()?.join(&format!("auth/v1/{}", path))?)
    }

    /// `ws(s)://{host}/realtime/v1/websocket?apikey=..&vsn=1.0.0`
    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = self.base_url()?.join("realtime/v1/websocket")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| {
            MarksError::Config(format!("Cannot derive websocket URL from {}", self.url))
        })?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.redirect_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
