//! HTTP transport layer for pushing log streams to Loki

use crate::config::{BasicAuth, Config};
use crate::errors::{Result, ShipperError};
use crate::stream::PushRequest;
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Destination for flushed push requests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PushRequest) -> Result<()>;
}

/// HTTP transport posting JSON push requests
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(
        endpoint: String,
        http_timeout: Duration,
        basic_auth: Option<&BasicAuth>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(auth) = basic_auth {
            let mut value = HeaderValue::from_str(&basic_auth_header(auth)).map_err(|_| {
                ShipperError::Config("basic auth credentials are not valid header text".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(http_timeout)
            .default_headers(headers)
            .user_agent(format!("loki_shipper/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ShipperError::Http)?;

        Ok(Self {
            client,
            endpoint,
            timeout: http_timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            config.http_timeout,
            config.basic_auth.as_ref(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Turn the push response into a result; any status of 400 or above fails
    async fn handle_response(&self, response: Response) -> Result<()> {
        let status = response.status();

        if status.as_u16() < 400 {
            debug!("Push accepted by {} with status {}", self.endpoint, status);
            return Ok(());
        }

        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let error_message = match status.as_u16() {
            400 => format!("Bad request: {}", error_body),
            401 => format!("Unauthorized: {}", error_body),
            403 => format!("Forbidden: {}", error_body),
            404 => format!("Push endpoint not found: {}", error_body),
            413 => format!("Push payload too large: {}", error_body),
            429 => format!("Rate limited: {}", error_body),
            500..=599 => format!("Server error {}: {}", status, error_body),
            _ => format!("Unexpected response {}: {}", status, error_body),
        };

        Err(ShipperError::Transport(error_message))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: PushRequest) -> Result<()> {
        let body = serde_json::to_vec(&request)?;

        let response = timeout(
            self.timeout,
            self.client.post(&self.endpoint).body(body).send(),
        )
        .await
        .map_err(|_| ShipperError::Transport("Request timeout".to_string()))?
        .map_err(ShipperError::Http)?;

        self.handle_response(response).await
    }
}

/// `Basic base64(user:pass)`
pub fn basic_auth_header(auth: &BasicAuth) -> String {
    let credentials = format!("{}:{}", auth.username, auth.password);
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    )
}
