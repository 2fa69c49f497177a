//! Terminal backend client.
//!
//! Session creation is a plain HTTP call; the socket URL is derived from
//! the same base URL. The [`TerminalBackend`] trait is the seam the
//! [`Driver`](super::driver::Driver) talks to, so tests can swap in a
//! scripted backend.

use async_trait::async_trait;
use reqwest::Client;

use super::protocol::SessionCreated;
use super::ConnectError;
use crate::{constants, ws};

/// Path of the session endpoint, for both `POST` and the socket.
pub const SESSION_PATH: &str = "/api/terminal/session";

/// Creates terminal sessions and names their sockets.
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Ask the backend for a new shell session.
    async fn create_session(&self) -> Result<String, ConnectError>;

    /// WebSocket URL for `session_id`.
    fn socket_url(&self, session_id: &str) -> Result<String, ConnectError>;
}

/// [`TerminalBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTerminalBackend {
    client: Client,
    base_url: String,
}

impl HttpTerminalBackend {
    /// Backend at `base_url` (e.g. `http://localhost:3001`).
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Backend with a pre-configured HTTP client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Base URL, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TerminalBackend for HttpTerminalBackend {
    async fn create_session(&self) -> Result<String, ConnectError> {
        let url = format!("{}{SESSION_PATH}", self.base_url);
        log::debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ConnectError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("Session request rejected: {status}");
            return Err(ConnectError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let created: SessionCreated = response
            .json()
            .await
            .map_err(|e| ConnectError::InvalidResponse(e.to_string()))?;
        match created.session_id {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(ConnectError::InvalidResponse(
                created
                    .error
                    .or(created.message)
                    .unwrap_or_else(|| "missing sessionId".to_string()),
            )),
        }
    }

    fn socket_url(&self, session_id: &str) -> Result<String, ConnectError> {
        let base = ws::http_to_ws_scheme(&self.base_url);
        let mut url = reqwest::Url::parse(&format!("{base}{SESSION_PATH}"))
            .map_err(|e| ConnectError::SocketOpen(format!("invalid socket URL: {e}")))?;
        url.query_pairs_mut().append_pair("sessionId", session_id);
        Ok(url.to_string())
    }
}
