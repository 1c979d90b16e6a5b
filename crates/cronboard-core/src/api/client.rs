use std::fmt;

use anyhow::{bail, Context};
use reqwest::header::{HeaderMap, ETAG};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::types::{Envelope, LoginRequest};
use crate::config::ConsoleConfig;
use crate::constants::api::USER_AGENT;
use crate::error::{ConsoleError, Endpoint, Result};

/// Bearer token handed to a single call by value
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A successful backend reply
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: StatusCode,
    pub envelope: Envelope,
    pub etag: Option<String>,
}

impl ApiReply {
    /// Decode the `data` payload
    pub fn data<T: DeserializeOwned>(self) -> Result<T> {
        let data = self.envelope.data.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(data)
            .map_err(|e| ConsoleError::Server(format!("unexpected payload: {}", e)))
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(config: &ConsoleConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.api_url)
            .with_context(|| format!("invalid api_url '{}'", config.api_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!("api_url must be http or https, got '{}'", base_url.scheme());
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the URL for a path given as raw segments; each segment is percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Request builder carrying the bearer credential
    pub fn authed(&self, method: Method, segments: &[&str], credential: &Credential) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(segments))
            .bearer_auth(credential.expose())
    }

    /// Exchange username/password for a token
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let request = self
            .http
            .post(self.endpoint(&["api", "login"]))
            .json(&LoginRequest { username, password });
        let reply = self.send(request, Endpoint::General).await?;
        reply
            .envelope
            .login_token()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConsoleError::Server("login reply carried no token".to_string()))
    }

    /// Best-effort server-side session teardown
    pub async fn logout(&self, credential: &Credential) -> Result<()> {
        let request = self.authed(Method::POST, &["api", "logout"], credential);
        self.send(request, Endpoint::General).await.map(|_| ())
    }

    pub async fn get(&self, segments: &[&str], credential: &Credential) -> Result<ApiReply> {
        self.send(self.authed(Method::GET, segments, credential), Endpoint::General)
            .await
    }

    pub async fn get_data<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        credential: &Credential,
    ) -> Result<T> {
        self.get(segments, credential).await?.data()
    }

    /// Send a request and map the reply onto the error taxonomy
    pub async fn send(&self, request: RequestBuilder, endpoint: Endpoint) -> Result<ApiReply> {
        let request = request.build().map_err(ConsoleError::from)?;
        debug!("{} {}", request.method(), request.url().path());

        let response = self.http.execute(request).await?;
        let status = response.status();
        let etag = etag_of(response.headers());
        let body = response.bytes().await?;

        match serde_json::from_slice::<Envelope>(&body) {
            Ok(envelope) if status.is_success() && envelope.success => Ok(ApiReply {
                status,
                envelope,
                etag,
            }),
            Ok(envelope) => {
                let message = envelope.failure_message(status_reason(status));
                Err(ConsoleError::from_status(status, message, endpoint))
            }
            Err(_) if status.is_success() => Err(ConsoleError::Server(format!(
                "unexpected response body ({})",
                status
            ))),
            Err(_) => {
                let text = String::from_utf8_lossy(&body).trim().to_string();
                let message = if text.is_empty() {
                    status_reason(status).to_string()
                } else {
                    text
                };
                Err(ConsoleError::from_status(status, message, endpoint))
            }
        }
    }
}

fn etag_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn status_reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("request failed")
}
