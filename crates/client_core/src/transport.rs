//! Backend collaborator: the four zone endpoints over HTTP/JSON.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::ZoneId,
    error::ApiError,
    protocol::{TimerQuery, UpdateZoneRequest, ZoneRecord},
};
use url::Url;

use crate::error::TransportError;

type TransportResult<T> = std::result::Result<T, TransportError>;

#[async_trait]
pub trait ZoneBackend: Send + Sync {
    async fn fetch_zones(&self) -> TransportResult<Vec<ZoneRecord>>;
    async fn toggle(&self, zone_id: ZoneId) -> TransportResult<ZoneRecord>;
    async fn set_timer(&self, zone_id: ZoneId, seconds: u32) -> TransportResult<ZoneRecord>;
    async fn rename(&self, zone_id: ZoneId, name: &str) -> TransportResult<ZoneRecord>;
}

/// `ZoneBackend` over reqwest. Requests are sent once; retry policy belongs
/// to the caller.
pub struct HttpZoneBackend {
    http: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpZoneBackend {
    pub fn new(base_url: &str) -> TransportResult<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> TransportResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| TransportError::Network {
                endpoint: base_url.to_string(),
                source,
            })?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> TransportResult<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed =
            Url::parse(trimmed).map_err(|_| TransportError::InvalidBaseUrl(base_url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base_url: trimmed.to_string(),
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|token| !token.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: String,
        request: RequestBuilder,
    ) -> TransportResult<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|source| TransportError::Network {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                endpoint,
                status: status.as_u16(),
                error: ApiError::from_response(status.as_u16(), &body),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| TransportError::Network {
                endpoint: endpoint.clone(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|err| TransportError::Decode {
            endpoint,
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl ZoneBackend for HttpZoneBackend {
    async fn fetch_zones(&self) -> TransportResult<Vec<ZoneRecord>> {
        let endpoint = self.endpoint("/zones");
        let request = self.http.get(&endpoint);
        self.send(endpoint, request).await
    }

    async fn toggle(&self, zone_id: ZoneId) -> TransportResult<ZoneRecord> {
        let endpoint = self.endpoint(&format!("/zones/{}/toggle", zone_id.0));
        let request = self.http.post(&endpoint);
        self.send(endpoint, request).await
    }

    async fn set_timer(&self, zone_id: ZoneId, seconds: u32) -> TransportResult<ZoneRecord> {
        let endpoint = self.endpoint(&format!("/zones/{}/timer", zone_id.0));
        let request = self.http.post(&endpoint).query(&TimerQuery { seconds });
        self.send(endpoint, request).await
    }

    async fn rename(&self, zone_id: ZoneId, name: &str) -> TransportResult<ZoneRecord> {
        let endpoint = self.endpoint(&format!("/zones/{}", zone_id.0));
        let request = self.http.put(&endpoint).json(&UpdateZoneRequest {
            name: Some(name.to_string()),
        });
        self.send(endpoint, request).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
