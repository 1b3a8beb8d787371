//! HTTP transport backed by reqwest

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use super::wire::{decode_messages, encode_send_body, error_reason};
use super::{Transport, TransportResult};
use crate::credentials::Credential;
use crate::error::TransportError;
use crate::models::Message;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT: u64 = 10;

const USER_AGENT: &str = concat!("chatsync/", env!("CARGO_PKG_VERSION"));

/// Transport for the chat REST endpoints
///
/// - `GET /api/chat/messages`
/// - `POST /api/chat/send`
/// - `DELETE /api/chat/messages/{id}`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    /// Create a transport with the default timeout
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT))
    }

    /// Create a transport with a per-request timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Server base URL, without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch(&self, credential: Option<&Credential>) -> TransportResult<Vec<Message>> {
        let request = self.client.get(self.url("/api/chat/messages"));
        let response = execute(request, credential).await?;
        let body = response.text().await.map_err(network_error)?;
        decode_messages(&body)
    }

    async fn send(&self, credential: Option<&Credential>, text: &str) -> TransportResult<()> {
        let request = self
            .client
            .post(self.url("/api/chat/send"))
            .json(&encode_send_body(text));
        execute(request, credential).await?;
        Ok(())
    }

    async fn delete(&self, credential: Option<&Credential>, id: &str) -> TransportResult<()> {
        let request = self
            .client
            .delete(self.url(&format!("/api/chat/messages/{}", encode_segment(id))));
        execute(request, credential).await?;
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn fetch_messages<'a>(
        &'a self,
        credential: Option<&'a Credential>,
    ) -> BoxFuture<'a, TransportResult<Vec<Message>>> {
        self.fetch(credential).boxed()
    }

    fn send_message<'a>(
        &'a self,
        credential: Option<&'a Credential>,
        text: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>> {
        self.send(credential, text).boxed()
    }

    fn delete_message<'a>(
        &'a self,
        credential: Option<&'a Credential>,
        id: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>> {
        self.delete(credential, id).boxed()
    }
}

/// Send a request, attaching the bearer token when present, and turn
/// non-success statuses into classified errors
async fn execute(
    request: RequestBuilder,
    credential: Option<&Credential>,
) -> TransportResult<Response> {
    let request = match credential {
        Some(credential) => request.bearer_auth(credential.token()),
        None => request,
    };

    let response = request.send().await.map_err(network_error)?;
    let status = response.status();
    debug!("{} {}", status.as_u16(), response.url().path());

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> TransportError {
    let reason = error_reason(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Unknown status")
            .to_string()
    });
    TransportError::from_status(status.as_u16(), reason)
}

fn network_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::network(format!("Request timed out: {}", error))
    } else {
        TransportError::network(error.to_string())
    }
}

/// Percent-encode an id for use as a single path segment
fn encode_segment(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
