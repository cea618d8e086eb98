//! HTTP client for a Swift-style object-storage API
//!
//! Uses v1.0 token auth (`X-Auth-User` / `X-Auth-Key` in, `X-Auth-Token`
//! out) and JSON listings under `<storage_url>/v1/<account>`.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use tracing::{debug, info};

use super::client::{ContainerListing, ListingEntry, StorageClient};
use super::errors::StorageError;
use crate::config::StorageConfig;
use crate::document::{EntityPath, Headers};

const AUTH_TOKEN_HEADER: &str = "x-auth-token";

pub struct SwiftClient {
    http: Client,
    config: StorageConfig,
    token: RwLock<Option<String>>,
}

impl SwiftClient {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    /// Percent-encode each `/`-separated segment, keeping the separators
    fn encode_path(raw: &str) -> String {
        raw.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn account_url(&self, account: &str) -> String {
        format!(
            "{}/v1/{}",
            self.config.storage_url.trim_end_matches('/'),
            urlencoding::encode(account)
        )
    }

    fn entity_url(&self, path: &EntityPath) -> String {
        let mut url = self.account_url(path.account_name());
        if let Some(container) = path.container_name() {
            url.push('/');
            url.push_str(&urlencoding::encode(container));
        }
        if let Some(object) = path.object_name() {
            url.push('/');
            url.push_str(&Self::encode_path(object));
        }
        url
    }

    async fn token(&self) -> Result<String, StorageError> {
        let cached = self.token.read().clone();
        if let Some(token) = cached {
            return Ok(token);
        }
        self.refresh_auth().await?;
        let refreshed = self.token.read().clone();
        refreshed.ok_or_else(|| StorageError::Auth("no token after refresh".into()))
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Response, StorageError> {
        let token = self.token().await?;
        let response = self
            .http
            .request(method, url)
            .header("X-Auth-Token", token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(StorageError::from_status(status, url))
        }
    }

    async fn listing(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<(Headers, Vec<ListingEntry>), StorageError> {
        let response = self.send(Method::GET, url, query).await?;
        let headers = headers_to_map(response.headers());
        // 204 carries an empty body
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok((headers, Vec::new()));
        }
        let entries = serde_json::from_slice(&body).map_err(|source| StorageError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok((headers, entries))
    }
}

/// Lower-cased header names; values that are not valid text are skipped
fn headers_to_map(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl StorageClient for SwiftClient {
    async fn list_containers(&self, account: &str) -> Result<Vec<ListingEntry>, StorageError> {
        let url = self.account_url(account);
        let mut containers = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut query = vec![("format", "json".to_string())];
            if let Some(m) = &marker {
                query.push(("marker", m.clone()));
            }
            let (_, page) = self.listing(&url, &query).await?;
            let Some(last) = page.last() else {
                break;
            };
            marker = Some(last.name.clone());
            containers.extend(page);
        }

        debug!(account, count = containers.len(), "listed containers");
        Ok(containers)
    }

    async fn list_objects(
        &self,
        account: &str,
        container: &str,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<ContainerListing, StorageError> {
        let url = self.entity_url(&EntityPath::container(account, container));
        let mut query = vec![
            ("format", "json".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(m) = marker {
            query.push(("marker", m.to_string()));
        }

        let (headers, objects) = self.listing(&url, &query).await?;
        debug!(account, container, marker, count = objects.len(), "listed objects");
        Ok(ContainerListing { headers, objects })
    }

    async fn head(&self, path: &EntityPath) -> Result<Headers, StorageError> {
        let url = self.entity_url(path);
        let response = self.send(Method::HEAD, &url, &[]).await?;
        Ok(headers_to_map(response.headers()))
    }

    async fn refresh_auth(&self) -> Result<(), StorageError> {
        let response = self
            .http
            .get(&self.config.auth_url)
            .header("X-Auth-User", &self.config.auth_user)
            .header("X-Auth-Key", &self.config.auth_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Auth(format!(
                "{} returned {}",
                self.config.auth_url, status
            )));
        }

        let token = response
            .headers()
            .get(AUTH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StorageError::Auth("response carried no X-Auth-Token".into()))?;

        *self.token.write() = Some(token);
        info!(user = %self.config.auth_user, "obtained storage auth token");
        Ok(())
    }
}
