//! HTTP page fetcher
//!
//! Static GET of a listing page with bounded retries, exponential backoff
//! and jitter. Successful bodies go through the configured
//! [`FragmentExtractor`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, USER_AGENT},
    Client, StatusCode,
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::extract::{FragmentExtractor, OfferFragment};
use super::PageFetcher;
use crate::config::AppConfig;

const BACKOFF_JITTER_RATIO: f64 = 0.20;
const MAX_DEBUG_NAME_LEN: usize = 80;

/// Non-success HTTP status
#[derive(Debug, Error)]
#[error("HTTP {status} for {url}")]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub url: String,
}

impl HttpStatusError {
    /// Server errors and rate limiting are worth another attempt
    pub fn is_retryable(&self) -> bool {
        self.status.is_server_error() || self.status == StatusCode::TOO_MANY_REQUESTS
    }
}

/// Bounded retry policy for page fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        backoff_with_jitter(retry, self.base_delay, self.max_delay)
    }
}

/// Exponential backoff from `base`, doubled per retry, capped at `max`,
/// plus up to 20% jitter (still capped at `max`).
pub fn backoff_with_jitter(retry: u32, base: Duration, max: Duration) -> Duration {
    let exponent = retry.saturating_sub(1).min(16);
    let max_ms = max.as_millis().min(u64::MAX as u128) as u64;
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let bounded = base_ms.saturating_mul(1u64 << exponent).min(max_ms);

    let jitter_cap = ((bounded as f64) * BACKOFF_JITTER_RATIO).round() as u64;
    let jitter = if jitter_cap > 0 {
        rand::thread_rng().gen_range(0..=jitter_cap)
    } else {
        0
    };
    Duration::from_millis(bounded.saturating_add(jitter).min(max_ms))
}

/// File name for a debug dump of `url`: last two path segments, sanitized
pub fn debug_file_name(url: &str) -> String {
    let path = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(url)
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let tail = segments[segments.len().saturating_sub(2)..].join("_");

    let mut name = String::with_capacity(tail.len());
    for c in tail.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if !(c == '_' && name.ends_with('_')) {
            name.push(c);
        }
    }
    name.truncate(MAX_DEBUG_NAME_LEN);
    if name.is_empty() {
        name.push_str("page");
    }
    name
}

/// reqwest-backed [`PageFetcher`]
pub struct HttpFetcher {
    client: Client,
    extractor: FragmentExtractor,
    retry: RetryPolicy,
    debug_dir: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(
        user_agent: &str,
        accept_language: &str,
        extractor: FragmentExtractor,
        retry: RetryPolicy,
        debug_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).context("Invalid user agent header value")?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(accept_language)
                .context("Invalid Accept-Language header value")?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            extractor,
            retry,
            debug_dir,
        })
    }

    /// Build from the `scraper`, `selectors` and `output` config sections
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.scraper.user_agent,
            &config.scraper.accept_language,
            config.selectors.compile()?,
            config.scraper.retry_policy(),
            config.output.debug_path(),
        )
    }

    async fn fetch_once(&self, url: &str, max_wait: Duration) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .timeout(max_wait)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(HttpStatusError {
                status,
                url: url.to_string(),
            }
            .into());
        }

        resp.text()
            .await
            .with_context(|| format!("Failed to read body from {}", url))
    }

    async fn fetch_with_retry(&self, url: &str, max_wait: Duration) -> Result<String> {
        let attempts = self.retry.total_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.fetch_once(url, max_wait).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    let retryable = err
                        .downcast_ref::<HttpStatusError>()
                        .map_or(true, HttpStatusError::is_retryable);
                    if !retryable || attempt >= attempts {
                        return Err(err.context(format!(
                            "Giving up on {} after {} attempt(s)",
                            url, attempt
                        )));
                    }

                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        url = %url,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Fetch failed, retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn dump_debug(&self, url: &str, body: &str) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let path = dir.join(format!("{}.html", debug_file_name(url)));
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, body).await
        }
        .await;

        match result {
            Ok(()) => tracing::info!(path = %path.display(), "Saved page dump for inspection"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to save page dump"),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, url: &str, max_wait: Duration) -> Result<Vec<OfferFragment>> {
        let body = self.fetch_with_retry(url, max_wait).await?;
        let fragments = self.extractor.extract(&body);

        tracing::debug!(
            url = %url,
            bytes = body.len(),
            fragments = fragments.len(),
            "Page fetched"
        );

        if fragments.is_empty() {
            self.dump_debug(url, &body).await;
        }
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const LISTING: &str = r#"<div class="tc-item"><div class="tc-price">12,50 ₽</div></div>"#;

    type Hits = Arc<Mutex<HashMap<String, usize>>>;

    /// Local HTTP server answering each path with a fixed sequence of
    /// `(status, body)` responses; the last one repeats.
    async fn canned_server(routes: Vec<(&str, Vec<(u16, &str)>)>) -> (String, Hits) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let routes: HashMap<String, Vec<(u16, String)>> = routes
            .into_iter()
            .map(|(path, seq)| {
                let seq = seq.into_iter().map(|(s, b)| (s, b.to_string())).collect();
                (path.to_string(), seq)
            })
            .collect();
        let hits: Hits = Arc::default();
        let server_hits = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&request);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let seen = {
                    let mut hits = server_hits.lock().unwrap();
                    let n = hits.entry(path.clone()).or_insert(0);
                    *n += 1;
                    *n
                };
                let (status, body) = routes
                    .get(&path)
                    .and_then(|seq| seq.get(seen - 1).or_else(|| seq.last()))
                    .cloned()
                    .unwrap_or((404, String::new()));

                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (base, hits)
    }

    fn hits_for(hits: &Hits, path: &str) -> usize {
        hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    fn test_fetcher(debug_dir: Option<PathBuf>) -> HttpFetcher {
        let retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let extractor = FragmentExtractor::new(Some(".tc-item"), ".tc-price", None).unwrap();
        HttpFetcher::new("ratefeed-test", "ru-RU", extractor, retry, debug_dir).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_bounded_attempts() {
        let (base, hits) = canned_server(vec![("/down", vec![(503, "")])]).await;
        let fetcher = test_fetcher(None);

        let err = fetcher
            .fetch(&format!("{}/down", base), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(hits_for(&hits, "/down"), 3);
        assert!(format!("{:#}", err).contains("after 3 attempt(s)"));
        let status = err.downcast_ref::<HttpStatusError>().unwrap().status;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_fetch_does_not_retry_not_found() {
        let (base, hits) = canned_server(vec![]).await;
        let fetcher = test_fetcher(None);

        let err = fetcher
            .fetch(&format!("{}/missing", base), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(hits_for(&hits, "/missing"), 1);
        let status = err.downcast_ref::<HttpStatusError>().unwrap().status;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fetch_retries_server_error_and_rate_limit() {
        let (base, hits) = canned_server(vec![
            ("/flaky", vec![(500, ""), (200, LISTING)]),
            ("/limited", vec![(429, ""), (429, ""), (200, LISTING)]),
        ])
        .await;
        let fetcher = test_fetcher(None);

        let frags = fetcher
            .fetch(&format!("{}/flaky", base), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(frags, vec![OfferFragment::new("12,50 ₽", None)]);
        assert_eq!(hits_for(&hits, "/flaky"), 2);

        let frags = fetcher
            .fetch(&format!("{}/limited", base), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(hits_for(&hits, "/limited"), 3);
    }

    #[tokio::test]
    async fn test_empty_page_is_dumped() {
        let empty = "<html><body><p>Предложений нет</p></body></html>";
        let (base, _hits) = canned_server(vec![
            ("/chips/7/", vec![(200, empty)]),
            ("/chips/8/", vec![(200, LISTING)]),
        ])
        .await;
        let dir = std::env::temp_dir().join(format!("ratefeed-dump-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let fetcher = test_fetcher(Some(dir.clone()));

        let frags = fetcher
            .fetch(&format!("{}/chips/7/", base), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(frags.is_empty());
        let dumped = std::fs::read_to_string(dir.join("chips_7.html")).unwrap();
        assert_eq!(dumped, empty);

        fetcher
            .fetch(&format!("{}/chips/8/", base), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!dir.join("chips_8.html").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_backoff_is_bounded() {
        let base = Duration::from_millis(800);
        let max = Duration::from_secs(10);
        let first = backoff_with_jitter(1, base, max);
        assert!(first >= base);
        assert!(first <= Duration::from_millis(960));

        let later = backoff_with_jitter(20, base, max);
        assert_eq!(later, max);
    }

    #[test]
    fn test_backoff_grows() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(60);
        assert!(backoff_with_jitter(3, base, max) >= Duration::from_millis(400));
    }

    #[test]
    fn test_retry_policy_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.total_attempts(), 3);
        let none = RetryPolicy {
            max_retries: 0,
            ..policy
        };
        assert_eq!(none.total_attempts(), 1);
    }

    #[test]
    fn test_status_retryability() {
        let err = |status| HttpStatusError {
            status,
            url: "https://x".to_string(),
        };
        assert!(err(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(err(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(!err(StatusCode::NOT_FOUND).is_retryable());
    }

    #[test]
    fn test_debug_file_name() {
        assert_eq!(debug_file_name("https://funpay.com/chips/173/"), "chips_173");
        assert_eq!(
            debug_file_name("https://funpay.com/en/chips/209/?side=sell"),
            "chips_209"
        );
        assert_eq!(debug_file_name("https://funpay.com/"), "funpay.com");
        assert_eq!(debug_file_name("weird name/x:y"), "weird_name_x_y");
    }

    #[test]
    fn test_http_fetcher_builds() {
        let extractor = FragmentExtractor::new(Some(".tc-item"), ".tc-price", None).unwrap();
        let fetcher = HttpFetcher::new(
            "ratefeed-test",
            "ru-RU",
            extractor,
            RetryPolicy::default(),
            None,
        );
        assert!(fetcher.is_ok());
        assert!(HttpFetcher::new(
            "bad\nagent",
            "ru-RU",
            FragmentExtractor::new(None, ".p", None).unwrap(),
            RetryPolicy::default(),
            None
        )
        .is_err());
    }
}
