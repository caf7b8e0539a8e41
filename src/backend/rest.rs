//! PostgREST client for the bookmark table.

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::app::{MarksError, Result};
use crate::backend::http::{auth_headers, build_client, ensure_success};
use crate::backend::BookmarkTable;
use crate::config::BackendConfig;
use crate::domain::{Bookmark, NewBookmark};

pub struct RestTable {
    config: BackendConfig,
    client: Client,
}

impl RestTable {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    /// `?select=*&order=created_at.desc`
    pub fn select_url(&self) -> Result<Url> {
        let mut url = self.config.rest_url()?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", "created_at.desc");
        Ok(url)
    }

    /// `?id=eq.{id}`
    pub fn delete_url(&self, id: &str) -> Result<Url> {
        let mut url = self.config.rest_url()?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));
        Ok(url)
    }

    fn profile(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&self.config.schema)
            .map_err(|_| MarksError::Config(format!("Invalid schema name: {}", self.config.schema)))
    }
}

#[async_trait]
impl BookmarkTable for RestTable {
    async fn select_all(&self, access_token: Option<&str>) -> Result<Vec<Bookmark>> {
        let url = self.select_url()?;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .headers(auth_headers(&self.config.anon_key, access_token)?)
            .header("Accept-Profile", self.profile()?)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn insert(&self, access_token: Option<&str>, bookmark: &NewBookmark) -> Result<()> {
        let url = self.config.rest_url()?;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .headers(auth_headers(&self.config.anon_key, access_token)?)
            .header("Content-Profile", self.profile()?)
            .header("Prefer", "return=minimal")
            .json(&[bookmark])
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete(&self, access_token: Option<&str>, id: &str) -> Result<()> {
        let url = self.delete_url(id)?;
        debug!("DELETE {}", url);
        let response = self
            .client
            .delete(url)
            .headers(auth_headers(&self.config.anon_key, access_token)?)
            .header("Content-Profile", self.profile()?)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
