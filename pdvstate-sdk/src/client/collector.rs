//! Collector API client (terminal agent → collector).

use reqwest::{Client, StatusCode};
use url::Url;

use super::ClientError;
use crate::objects::{PdvEventPayload, RulesDocument};

/// Typed HTTP client for the collector endpoints.
#[derive(Debug, Clone)]
pub struct CollectorClient {
    http: Client,
    base_url: Url,
}

impl CollectorClient {
    /// Create a new `CollectorClient`.
    ///
    /// * `base_url` – root URL of the collector (e.g. `https://10.0.0.5`).
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Create a `CollectorClient` on top of an existing `reqwest::Client`
    /// (e.g. one configured with timeouts or certificate handling).
    ///
    /// The client is shared, not rebuilt.
    pub fn with_http_client(client: Client, base_url: Url) -> Self {
        Self {
            http: client,
            base_url,
        }
    }

    /// `GET /config/version` – the version string of the published rule set.
    ///
    /// Surrounding whitespace is trimmed.
    pub async fn rules_version(&self) -> Result<String, ClientError> {
        let url = self.base_url.join("/config/version")?;
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        let body = resp.text().await?;
        Ok(body.trim().to_string())
    }

    /// `GET /config/rules` – the full, uncompiled rule document.
    pub async fn rules(&self) -> Result<RulesDocument, ClientError> {
        let url = self.base_url.join("/config/rules")?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `POST /pdv/event` – submit one terminal event.
    ///
    /// Returns the response status on success; the body is ignored.
    pub async fn post_event(&self, payload: &PdvEventPayload) -> Result<StatusCode, ClientError> {
        let url = self.base_url.join("/pdv/event")?;
        let body = serde_json::to_vec(payload)?;

        let resp = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(status)
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
