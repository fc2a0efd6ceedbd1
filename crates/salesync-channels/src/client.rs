//! Shared HTTP client for marketplace APIs
//!
//! Every adapter sends its requests through a [`ChannelClient`]. The client
//! owns the authentication header, the timeouts and the per-channel rate
//! limit, and it maps HTTP outcomes onto the [`ChannelError`] taxonomy:
//!
//! | Outcome                                   | Error             |
//! |-------------------------------------------|-------------------|
//! | connect failure, timeout, 408, 5xx        | `RemoteTransient` |
//! | no rate-limit token within the wait bound | `RemoteTransient` |
//! | 429 (with its `Retry-After`)              | `Throttled`       |
//! | any other 4xx                             | `RemoteRejected`  |
//!
//! Retrying is left to the reconciliation engine, which applies the
//! configured backoff policy to transient errors.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::{header::RETRY_AFTER, Client, Method, RequestBuilder, StatusCode};
use salesync_core::config::HttpConfig;
use salesync_core::domain::{ChannelError, ChannelId};
use salesync_core::ports::{HttpMethod, Payload, RemoteResponse};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::rate_limit::{parse_retry_after, AdaptiveRateLimiter};

/// Retry-After assumed when a 429 response carries none
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Longest response excerpt kept in error details
const MAX_DETAIL_LEN: usize = 500;

// ============================================================================
// Authentication
// ============================================================================

/// How a channel authenticates its requests
#[derive(Clone, Default)]
pub enum ChannelAuth {
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// A vendor-specific header such as `X-Shopify-Access-Token`
    Header { name: String, value: String },
    /// HTTP basic authentication (WooCommerce consumer key / secret)
    Basic { username: String, password: String },
}

impl ChannelAuth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            ChannelAuth::None => request,
            ChannelAuth::Bearer(token) => request.bearer_auth(token),
            ChannelAuth::Header { name, value } => request.header(name.as_str(), value.as_str()),
            ChannelAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }
}

impl fmt::Debug for ChannelAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelAuth::None => f.write_str("None"),
            ChannelAuth::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            ChannelAuth::Header { name, .. } => write!(f, "Header({name}: <redacted>)"),
            ChannelAuth::Basic { username, .. } => write!(f, "Basic({username}:<redacted>)"),
        }
    }
}

// ============================================================================
// ChannelClient
// ============================================================================

/// HTTP client bound to one configured channel
#[derive(Debug, Clone)]
pub struct ChannelClient {
    client: Client,
    channel_id: ChannelId,
    base_url: String,
    auth: ChannelAuth,
    rate_limiter: Option<Arc<AdaptiveRateLimiter>>,
    rate_limit_wait: Duration,
}

impl ChannelClient {
    /// Creates a client with timeouts and user agent from `http`
    pub fn new(
        channel_id: ChannelId,
        base_url: impl Into<String>,
        http: &HttpConfig,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(http.timeout())
            .connect_timeout(http.connect_timeout())
            .user_agent(http.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            channel_id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: ChannelAuth::None,
            rate_limiter: None,
            rate_limit_wait: http.rate_limit_wait(),
        })
    }

    /// Sets the authentication scheme
    pub fn with_auth(mut self, auth: ChannelAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Attaches the shared rate limiter
    pub fn with_rate_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Bounds the wait for a rate-limit token
    pub fn with_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a built payload; the payload's remote key is echoed into the response
    pub async fn send(&self, payload: &Payload) -> Result<RemoteResponse, ChannelError> {
        let response = self
            .execute(
                payload.method,
                &payload.path,
                &payload.query,
                payload.body.as_ref(),
            )
            .await?;
        Ok(response.with_remote_key(payload.remote_key.clone()))
    }

    /// Performs one call and classifies the outcome
    pub async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<RemoteResponse, ChannelError> {
        let (status, text) = self.perform(method, path, query, body).await?;
        if status.is_success() {
            return Ok(RemoteResponse::new(status.as_u16(), parse_body(&text)));
        }
        Err(classify_status(status, &text))
    }

    /// Like [`execute`](Self::execute), but 404 and 410 count as success
    ///
    /// Used for removals and lookups where a missing resource is not an error.
    pub async fn execute_allow_missing(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<RemoteResponse, ChannelError> {
        let (status, text) = self.perform(method, path, query, body).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(RemoteResponse::new(status.as_u16(), parse_body(&text)));
        }
        Err(classify_status(status, &text))
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url, ChannelError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path)).map_err(|e| {
            ChannelError::LocalData(format!("invalid channel URL {}{path}: {e}", self.base_url))
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn perform(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), ChannelError> {
        let url = self.url(path, query)?;

        if let Some(ref limiter) = self.rate_limiter {
            if !limiter
                .acquire_within(self.channel_id, self.rate_limit_wait)
                .await
            {
                debug!(
                    channel_id = %self.channel_id,
                    wait_secs = self.rate_limit_wait.as_secs(),
                    "No rate limit token in time"
                );
                return Err(ChannelError::RemoteTransient(format!(
                    "local rate limit: no request slot within {}s",
                    self.rate_limit_wait.as_secs()
                )));
            }
        }

        let mut request = self.auth.apply(self.client.request(to_method(method), url));
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.map_err(transport_error)?;

        debug!(
            channel_id = %self.channel_id,
            method = %method,
            path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Channel call"
        );

        if let Some(ref limiter) = self.rate_limiter {
            if status == StatusCode::TOO_MANY_REQUESTS {
                limiter.on_throttle(self.channel_id);
            } else if status.is_success() {
                limiter.on_success(self.channel_id);
            }
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = parse_retry_after(retry_after.as_deref(), DEFAULT_RETRY_AFTER);
            warn!(
                channel_id = %self.channel_id,
                retry_after_secs = wait.as_secs(),
                "Channel rate limit hit (429)"
            );
            return Err(ChannelError::Throttled {
                detail: format!("HTTP 429 rate limited, retry after {}s", wait.as_secs()),
                retry_after: wait,
            });
        }

        Ok((status, text))
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn transport_error(e: reqwest::Error) -> ChannelError {
    if e.is_builder() {
        return ChannelError::LocalData(format!("could not build request: {e}"));
    }
    if e.is_timeout() {
        return ChannelError::RemoteTransient(format!("request timed out: {e}"));
    }
    if e.is_connect() {
        return ChannelError::RemoteTransient(format!("connection failed: {e}"));
    }
    ChannelError::RemoteTransient(format!("transport error: {e}"))
}

/// Parses a response body; empty bodies become `Null`, non-JSON bodies a string
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Maps a non-2xx status onto the error taxonomy
pub fn classify_status(status: StatusCode, text: &str) -> ChannelError {
    let detail = format!("HTTP {}: {}", status.as_u16(), error_detail(text));
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ChannelError::RemoteTransient(detail)
    } else {
        ChannelError::RemoteRejected(detail)
    }
}

/// Best-effort human readable message from a marketplace error body
pub fn error_detail(text: &str) -> String {
    let body = parse_body(text);
    let candidates = [
        "/message",
        "/errors/0/message",
        "/errors/0/longMessage",
        "/error/message",
        "/error_description",
        "/Fault/Error/0/Detail",
        "/Fault/Error/0/Message",
        "/msg",
    ];
    let found = candidates
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str));

    let detail = match found {
        Some(message) => message.to_string(),
        None if text.trim().is_empty() => "empty response body".to_string(),
        None => text.trim().to_string(),
    };
    truncate(detail)
}

fn truncate(mut detail: String) -> String {
    if detail.len() > MAX_DETAIL_LEN {
        let mut cut = MAX_DETAIL_LEN;
        while !detail.is_char_boundary(cut) {
            cut -= 1;
        }
        detail.truncate(cut);
        detail.push_str("...");
    }
    detail
}
