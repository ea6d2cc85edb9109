use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
    state::NotKeyed,
};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::config::EdinetConfig;
use super::documents::ContentType;
use super::error::{EdinetError, Result};

const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// What a request is expected to return, used to tell payloads from error envelopes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Expect {
    Json,
    Document(ContentType),
}

#[derive(Debug, Clone)]
pub struct Edinet {
    /// HTTP client for making requests
    pub(crate) client: reqwest::Client,

    /// Token bucket rate limiter shared by all clones of the client
    pub(crate) rate_limiter: Arc<Governor>,

    /// Subscription key appended to every request
    pub(crate) api_key: String,

    /// Base URL of the EDINET API
    pub(crate) base_url: String,

    /// Retry budget for transient failures
    pub(crate) max_retries: u32,
}

/// HTTP client for the EDINET disclosure API with built-in rate limiting and retry logic.
///
/// `Edinet` is the transport underneath the catalog and document operations. Every request
/// waits on a token bucket first (EDINET asks automated clients to keep a low request rate),
/// then runs through a retry loop: network failures, HTTP 429, HTTP 5xx and the HTML
/// maintenance page are retried with exponential backoff and jitter, while other 4xx
/// answers are returned immediately.
///
/// EDINET reports some failures as HTTP 200 with a JSON `metadata` envelope instead of a
/// status code. Those envelopes are unwrapped here so callers only ever see
/// [`EdinetError::NotFound`], [`EdinetError::ApiError`] or the payload itself.
///
/// # Examples
///
/// ```rust
/// # use edinetkit::Edinet;
/// let edinet = Edinet::new("your-subscription-key")?;
/// # Ok::<(), edinetkit::EdinetError>(())
/// ```
impl Edinet {
    /// Creates a new client with default settings (1 request per second, 30 s timeout).
    pub fn new(api_key: &str) -> Result<Self> {
        let config = EdinetConfig {
            api_key: api_key.to_string(),
            ..Default::default()
        };
        Self::with_config(config)
    }

    /// Creates a client with custom configuration settings.
    ///
    /// # Errors
    ///
    /// Returns `EdinetError::ConfigError` if the key is empty, the rate limit is zero, or the
    /// HTTP client cannot be built.
    pub fn with_config(config: EdinetConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(EdinetError::ConfigError(
                "API key must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("edinetkit/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| EdinetError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(config.rate_limit).ok_or_else(|| {
                EdinetError::ConfigError("Rate limit must be greater than zero".to_string())
            })?,
        )));

        Ok(Edinet {
            client,
            rate_limiter,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// Exponential backoff with ±20% jitter: 1s, 2s, 4s, 8s, 16s...
    fn calculate_backoff(retry: u32) -> Duration {
        let backoff_ms = INITIAL_BACKOFF_MS * (2_u64.pow(retry));
        let jitter = (backoff_ms as f64 * 0.2 * (fastrand::f64() - 0.5)) as i64;
        Duration::from_millis((backoff_ms as i64 + jitter) as u64)
    }

    /// Builds `{base}/{path}?{params}&Subscription-Key={key}`.
    pub(crate) fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<String> {
        let mut query: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        query.push(("Subscription-Key", self.api_key.as_str()));
        let query_string = serde_urlencoded::to_string(&query)
            .map_err(|e| EdinetError::InvalidResponse(e.to_string()))?;
        Ok(format!("{}/{}?{}", self.base_url, path, query_string))
    }

    /// Fetches a URL and returns the body once it is known to be the expected payload.
    ///
    /// # Retry Behavior
    ///
    /// - **Network errors, HTTP 5xx, maintenance pages**: retried up to `max_retries` times
    /// - **Rate limits (429)**: retried, honouring `Retry-After` when present
    /// - **HTTP 404 or an envelope reporting 404**: `EdinetError::NotFound`, no retry
    /// - **Other 4xx**: returned immediately
    pub(crate) async fn fetch(&self, url: &str, expect: Expect) -> Result<Vec<u8>> {
        let mut retries = 0;

        loop {
            self.rate_limiter.until_ready().await;
            tracing::debug!("GET {}", redact(url));

            let outcome = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if retries >= self.max_retries {
                            return Err(EdinetError::RateLimitExceeded);
                        }
                        let wait = retry_after(&headers)
                            .unwrap_or_else(|| Self::calculate_backoff(retries));
                        tracing::warn!(
                            "Rate limit hit (429) for {}. Attempt {}/{}. Waiting for {:?} before retry.",
                            redact(url),
                            retries + 1,
                            self.max_retries + 1,
                            wait
                        );
                        sleep(wait).await;
                        retries += 1;
                        continue;
                    }
                    match response.bytes().await {
                        Ok(body) => Self::classify(
                            url,
                            status,
                            &content_type(&headers),
                            body.to_vec(),
                            expect,
                        ),
                        Err(e) => Err(EdinetError::RequestError(e.without_url())),
                    }
                }
                Err(e) => Err(EdinetError::RequestError(e.without_url())),
            };

            match outcome {
                Err(e) if e.is_transient() && retries < self.max_retries => {
                    let backoff = Self::calculate_backoff(retries);
                    tracing::warn!(
                        "Request failed for {}: {}. Attempt {}/{}. Retrying in {:?}.",
                        redact(url),
                        e,
                        retries + 1,
                        self.max_retries + 1,
                        backoff
                    );
                    sleep(backoff).await;
                    retries += 1;
                }
                other => return other,
            }
        }
    }

    /// Turns one HTTP answer into a payload or a typed error.
    fn classify(
        url: &str,
        status: StatusCode,
        content_type: &str,
        body: Vec<u8>,
        expect: Expect,
    ) -> Result<Vec<u8>> {
        if status == StatusCode::NOT_FOUND {
            return Err(EdinetError::NotFound);
        }
        if !status.is_success() {
            if let Some((code, message)) = envelope_status(&body) {
                return Err(EdinetError::ApiError {
                    status: code,
                    message,
                });
            }
            return Err(EdinetError::HttpStatus {
                status: status.as_u16(),
                url: redact(url),
            });
        }

        // Sorry page served while EDINET is under maintenance or overloaded.
        if content_type.starts_with("text/html") {
            return Err(EdinetError::ApiError {
                status: 503,
                message: "service unavailable (text/html page)".to_string(),
            });
        }

        let is_json = content_type.starts_with("application/json");
        match expect {
            Expect::Json => {
                if !is_json {
                    return Err(EdinetError::InvalidResponse(format!(
                        "expected JSON, got Content-Type: {}",
                        content_type
                    )));
                }
                match envelope_status(&body) {
                    Some((200, _)) | None => Ok(body),
                    Some((404, _)) => Err(EdinetError::NotFound),
                    Some((code, message)) => Err(EdinetError::ApiError {
                        status: code,
                        message,
                    }),
                }
            }
            Expect::Document(kind) => {
                if is_json {
                    return match envelope_status(&body) {
                        Some((404, _)) => Err(EdinetError::NotFound),
                        Some((code, message)) => Err(EdinetError::ApiError {
                            status: code,
                            message,
                        }),
                        None => Err(EdinetError::InvalidResponse(
                            "JSON body where a document was expected".to_string(),
                        )),
                    };
                }
                if !kind.accepts_mime(content_type) {
                    return Err(EdinetError::InvalidResponse(format!(
                        "unexpected Content-Type {} for content type {}",
                        content_type,
                        kind.as_u8()
                    )));
                }
                if body.is_empty() {
                    return Err(EdinetError::EmptyBody);
                }
                Ok(body)
            }
        }
    }

    /// Returns the base URL of the API.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.replace(' ', "").to_lowercase())
        .unwrap_or_default()
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Reads the status carried by an EDINET JSON envelope.
///
/// Catalog answers use `{"metadata": {"status": "200", "message": "OK"}}`; gateway errors use
/// `{"statusCode": 401, "message": "..."}`.
fn envelope_status(body: &[u8]) -> Option<(u16, String)> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let (status, message) = match value.get("metadata") {
        Some(meta) => (meta.get("status")?, meta.get("message")),
        None => (
            value.get("statusCode").or_else(|| value.get("StatusCode"))?,
            value.get("message"),
        ),
    };
    let code = match status {
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        serde_json::Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
        _ => return None,
    };
    let message = message
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();
    Some((code, message))
}

/// Strips the subscription key from URLs before they reach logs or errors.
fn redact(url: &str) -> String {
    match url.find("Subscription-Key=") {
        Some(pos) => {
            let rest = &url[pos..];
            let end = rest.find('&').map(|i| pos + i).unwrap_or(url.len());
            format!("{}Subscription-Key=***{}", &url[..pos], &url[end..])
        }
        None => url.to_string(),
    }
}
