//! Resilient HTTP retrieval.
//!
//! Wraps reqwest with the behaviors hostile sites demand: a consolidated
//! retry/backoff policy, identity header rotation on blocking responses,
//! per-host request pacing, transparent redirect following with the final
//! URL reported back, binary/text disambiguation, and normalization of
//! every text response to UTF-8.

use crate::error::FetchError;
use encoding_rs::Encoding;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

/// Browser User-Agent strings rotated across retries.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
];

/// Referer values presented on first contact.
pub const REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://duckduckgo.com/",
    "https://www.facebook.com/",
    "https://www.linkedin.com/",
];

/// Process-wide immutable rotation pools, injected into the client.
#[derive(Debug, Clone)]
pub struct RotationPools {
    pub user_agents: &'static [&'static str],
    pub referers: &'static [&'static str],
}

impl Default for RotationPools {
    fn default() -> Self {
        Self {
            user_agents: USER_AGENTS,
            referers: REFERERS,
        }
    }
}

impl RotationPools {
    fn pick_user_agent(&self) -> &'static str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("Mozilla/5.0")
    }

    fn pick_referer(&self) -> &'static str {
        self.referers
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("https://www.google.com/")
    }
}

/// One backoff policy for every retry path.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry; doubles on each subsequent one.
    pub base: Duration,
    /// Upper bound on any single delay, including Retry-After hints.
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0-based). A server-provided
    /// Retry-After hint overrides the exponential schedule, capped.
    pub fn delay(&self, retry: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(secs) = retry_after_secs {
            return Duration::from_secs(secs).min(self.cap);
        }
        let factor = 2u32.saturating_pow(retry);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub request_timeout: Duration,
    /// Minimum interval between requests to the same host.
    pub pacing_delay: Duration,
    /// Total attempts per URL (first try plus retries).
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub max_redirects: usize,
    /// Concurrent in-flight transfers in `get_many`.
    pub concurrency: usize,
    /// Accept invalid or self-signed TLS certificates.
    ///
    /// Enabled by default: the archiver's job is to retrieve pages even
    /// from misconfigured hosts, and the fetched content is never trusted
    /// or executed here. This is a deliberate trust trade-off; pass
    /// `--verify-tls` (or set this to false) to restore verification.
    pub accept_invalid_certs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            pacing_delay: Duration::from_millis(100),
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            max_redirects: 10,
            concurrency: 8,
            accept_invalid_certs: true,
        }
    }
}

/// Body of a completed fetch, normalized for downstream processing.
#[derive(Debug, Clone)]
pub enum FetchedBody {
    Binary(Vec<u8>),
    /// Decoded and re-encoded to UTF-8.
    Text(String),
}

impl FetchedBody {
    pub fn len(&self) -> usize {
        match self {
            FetchedBody::Binary(b) => b.len(),
            FetchedBody::Text(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FetchedBody::Binary(b) => b,
            FetchedBody::Text(t) => t.into_bytes(),
        }
    }
}

/// A completed retrieval.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Effective URL after redirects; path and category decisions
    /// downstream use this, not the requested URL.
    pub final_url: String,
    pub content_type: String,
    pub body: FetchedBody,
}

/// Enforces the minimum inter-request interval per host, shared across
/// all concurrent transfers.
#[derive(Debug)]
struct Pacer {
    min_interval: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl Pacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    async fn wait(&self, host: &str) {
        if self.min_interval.is_zero() {
            return;
        }
        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots
                .get(host)
                .copied()
                .map(|s| s.max(now))
                .unwrap_or(now);
            slots.insert(host.to_string(), slot + self.min_interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

/// HTTP client for page and asset retrieval.
#[derive(Clone)]
pub struct FetchClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback for sites that reject HTTP/2.
    h1_client: reqwest::Client,
    config: FetchConfig,
    pools: RotationPools,
    pacer: Arc<Pacer>,
}

impl FetchClient {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let pools = RotationPools::default();
        let build = |h1_only: bool| {
            let mut builder = reqwest::Client::builder()
                .timeout(config.request_timeout)
                .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
                .danger_accept_invalid_certs(config.accept_invalid_certs);
            if h1_only {
                builder = builder.http1_only();
            }
            builder.build().map_err(|e| FetchError::Transport {
                message: e.to_string(),
            })
        };
        let client = build(false)?;
        let h1_client = build(true)?;
        let pacer = Arc::new(Pacer::new(config.pacing_delay));
        Ok(Self {
            client,
            h1_client,
            config,
            pools,
            pacer,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Retrieve one URL.
    ///
    /// Validates the URL before any network I/O, paces against the target
    /// host, retries blocking and transient failures per the backoff
    /// policy, and reports the post-redirect URL in the result.
    pub async fn get(&self, url: &str, referer: Option<&str>) -> Result<FetchResult, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        let host = match (parsed.scheme(), parsed.host_str()) {
            ("http" | "https", Some(h)) => h.to_string(),
            _ => {
                return Err(FetchError::InvalidUrl {
                    url: url.to_string(),
                })
            }
        };

        self.pacer.wait(&host).await;

        match self.get_inner(&self.client, url, referer).await {
            Err(FetchError::Transport { ref message })
                if message.contains("http2")
                    || message.contains("protocol")
                    || message.contains("connection closed") =>
            {
                // Some CDNs reset HTTP/2 connections from non-browser
                // clients; one more pass over HTTP/1.1.
                self.get_inner(&self.h1_client, url, referer).await
            }
            other => other,
        }
    }

    async fn get_inner(
        &self,
        client: &reqwest::Client,
        url: &str,
        referer: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let mut user_agent = self.pools.pick_user_agent();
        let mut attempts: u32 = 0;

        loop {
            let request = client
                .get(url)
                .header(USER_AGENT, user_agent)
                .header("Accept", "*/*")
                .header("Accept-Language", "en-US,en;q=0.9")
                .header(REFERER, referer.unwrap_or_else(|| self.pools.pick_referer()));

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match status {
                        200..=299 => return self.decode_response(url, response).await,
                        404 => return Err(FetchError::NotFound),
                        403 | 429 | 500..=599 => {
                            let retry_after = (status == 429)
                                .then(|| {
                                    response
                                        .headers()
                                        .get("retry-after")
                                        .and_then(|v| v.to_str().ok())
                                        .and_then(|s| s.parse::<u64>().ok())
                                })
                                .flatten();
                            attempts += 1;
                            if attempts >= self.config.max_attempts {
                                return Err(match status {
                                    403 => FetchError::Forbidden { retries: attempts },
                                    429 => FetchError::RateLimited { retries: attempts },
                                    s => FetchError::ServerError {
                                        status: s,
                                        retries: attempts,
                                    },
                                });
                            }
                            tracing::debug!(
                                "retrying {url} after HTTP {status} (attempt {attempts})"
                            );
                            user_agent = self.pools.pick_user_agent();
                            tokio::time::sleep(
                                self.config.backoff.delay(attempts - 1, retry_after),
                            )
                            .await;
                        }
                        s => return Err(FetchError::HttpStatus { status: s }),
                    }
                }
                Err(e) => {
                    if e.is_redirect() {
                        return Err(FetchError::TooManyRedirects);
                    }
                    let timeout = e.is_timeout();
                    let connect = e.is_connect();
                    if !timeout && !connect {
                        return Err(FetchError::Transport {
                            message: e.to_string(),
                        });
                    }
                    attempts += 1;
                    if attempts >= self.config.max_attempts {
                        return Err(if timeout {
                            FetchError::Timeout { retries: attempts }
                        } else {
                            FetchError::ConnectionFailed { retries: attempts }
                        });
                    }
                    tracing::debug!("retrying {url} after network error (attempt {attempts})");
                    tokio::time::sleep(self.config.backoff.delay(attempts - 1, None)).await;
                }
            }
        }
    }

    async fn decode_response(
        &self,
        requested_url: &str,
        response: reqwest::Response,
    ) -> Result<FetchResult, FetchError> {
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport {
                message: e.to_string(),
            })?
            .to_vec();

        let body = if is_binary_content_type(&content_type) {
            FetchedBody::Binary(bytes)
        } else if is_text_content_type(&content_type) {
            FetchedBody::Text(decode_text(&bytes, &content_type))
        } else if url_suggests_text(requested_url) || url_suggests_text(&final_url) {
            // Content-Type is absent or unhelpful; sniff the leading bytes.
            if looks_binary(&bytes) {
                FetchedBody::Binary(bytes)
            } else {
                FetchedBody::Text(decode_text(&bytes, &content_type))
            }
        } else {
            FetchedBody::Binary(bytes)
        };

        Ok(FetchResult {
            final_url,
            content_type,
            body,
        })
    }

    /// Fetch many URLs with bounded concurrency, returning results in
    /// input order. Pacing and backoff budgets are shared with every
    /// other request through this client.
    pub async fn get_many(
        &self,
        urls: &[String],
        referer: Option<&str>,
    ) -> Vec<(String, Result<FetchResult, FetchError>)> {
        let mut results: Vec<(usize, String, Result<FetchResult, FetchError>)> =
            stream::iter(urls.iter().cloned().enumerate())
                .map(|(i, u)| async move {
                    let result = self.get(&u, referer).await;
                    (i, u, result)
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;
        results.sort_by_key(|(i, _, _)| *i);
        results.into_iter().map(|(_, u, r)| (u, r)).collect()
    }
}

// ── Content classification ──────────────────────────────────────

const BINARY_TYPE_MARKERS: &[&str] = &[
    "image/",
    "video/",
    "audio/",
    "font/",
    "application/octet-stream",
    "application/zip",
    "application/x-rar",
    "application/pdf",
    "application/vnd.",
];

const TEXT_TYPE_MARKERS: &[&str] = &[
    "text/",
    "application/json",
    "application/javascript",
    "application/xml",
    "application/xhtml",
];

/// Extensions that are usually text but sometimes served without a
/// usable Content-Type.
const TEXTUAL_EXTENSIONS: &[&str] = &[".css", ".js", ".html", ".svg", ".json", ".txt"];

fn is_binary_content_type(content_type: &str) -> bool {
    BINARY_TYPE_MARKERS.iter().any(|m| content_type.contains(m))
}

fn is_text_content_type(content_type: &str) -> bool {
    TEXT_TYPE_MARKERS.iter().any(|m| content_type.contains(m))
}

fn url_suggests_text(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or("").to_lowercase();
    TEXTUAL_EXTENSIONS.iter().any(|e| path.ends_with(e))
}

/// Inspect the first 1 KB: a null byte or a significant fraction of
/// control characters means binary.
fn looks_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(1024)];
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let suspicious = sample
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, 7 | 8 | 9 | 10 | 12 | 13 | 27)) || b == 0x7f)
        .count();
    suspicious * 10 > sample.len()
}

// ── Charset handling ────────────────────────────────────────────

/// Decode to UTF-8. Priority: Content-Type charset parameter, byte-order
/// mark, in-document declaration, UTF-8 with replacement.
fn decode_text(bytes: &[u8], content_type: &str) -> String {
    let encoding = charset_param(content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| Encoding::for_bom(bytes).map(|(enc, _)| enc))
        .or_else(|| {
            declared_charset(bytes).and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or(encoding_rs::UTF_8);
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

fn charset_param(content_type: &str) -> Option<String> {
    let rest = content_type.split("charset=").nth(1)?;
    let label = rest.split(';').next()?.trim().trim_matches('"');
    (!label.is_empty()).then(|| label.to_string())
}

/// Scan the first 1 KB for `<meta charset>`, an http-equiv declaration,
/// or a CSS `@charset` rule.
fn declared_charset(bytes: &[u8]) -> Option<String> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
    let meta = Regex::new(r#"(?i)charset\s*=\s*["']?([a-zA-Z0-9_\-]+)"#).unwrap();
    if let Some(caps) = meta.captures(&head) {
        return Some(caps[1].to_string());
    }
    let css = Regex::new(r#"(?i)@charset\s+["']([a-zA-Z0-9_\-]+)["']"#).unwrap();
    css.captures(&head).map(|caps| caps[1].to_string())
}
