//! Hosted URL reachability probe
//!
//! Checks a hosted URL with a lightweight request before the session hands it
//! to the surface. Servers that reject `HEAD` get a one-byte ranged `GET`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::RANGE;

use crate::config::ProbeSettings;
use crate::playback::{ProbeOutcome, ProbeResult, UrlProber};

/// Errors from constructing or using the probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },

    #[error("Invalid hosted URL: {reason}")]
    InvalidUrl { reason: String },

    #[error("Unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },
}

#[derive(Debug, Clone)]
struct CachedProbe {
    checked_at: Instant,
    result: ProbeResult,
}

/// [`UrlProber`] backed by `reqwest`, with a short-lived per-URL cache.
pub struct HttpProbe {
    client: reqwest::Client,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, CachedProbe>>,
}

impl HttpProbe {
    /// Creates a probe from settings.
    ///
    /// # Errors
    ///
    /// - `ProbeError::ClientBuild` - If the HTTP client could not be created
    pub fn new(settings: &ProbeSettings) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| ProbeError::ClientBuild {
                reason: e.to_string(),
            })?;

        Ok(Self::with_client(client, settings.cache_ttl))
    }

    /// Creates a probe around an existing client.
    pub fn with_client(client: reqwest::Client, cache_ttl: Duration) -> Self {
        Self {
            client,
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Probes `url`, reusing a cached verdict while it is fresh.
    pub async fn check(&self, url: &str) -> ProbeResult {
        if let Err(error) = validate_url(url) {
            tracing::debug!(%url, %error, "Not probing hosted URL");
            return ProbeResult::error(error.to_string());
        }

        if let Some(cached) = self.cached(url) {
            tracing::trace!(%url, outcome = ?cached.outcome, "Using cached probe result");
            return cached;
        }

        let result = match self.request(url).await {
            Ok(status) => classify_status(status),
            Err(error) => classify_transport_error(&error),
        };
        tracing::debug!(
            %url,
            outcome = ?result.outcome,
            status = ?result.status,
            error = ?result.error,
            "Probed hosted URL"
        );

        if matches!(result.outcome, ProbeOutcome::Good | ProbeOutcome::Bad) {
            self.remember(url, &result);
        }
        result
    }

    /// Drops every cached verdict.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    async fn request(&self, url: &str) -> Result<StatusCode, reqwest::Error> {
        let status = self.client.head(url).send().await?.status();
        if status != StatusCode::METHOD_NOT_ALLOWED && status != StatusCode::NOT_IMPLEMENTED {
            return Ok(status);
        }

        tracing::trace!(%url, %status, "HEAD rejected; retrying with ranged GET");
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;
        Ok(response.status())
    }

    fn cached(&self, url: &str) -> Option<ProbeResult> {
        if self.cache_ttl.is_zero() {
            return None;
        }
        let mut cache = self.cache.lock();
        match cache.get(url) {
            Some(entry) if entry.checked_at.elapsed() < self.cache_ttl => Some(entry.result.clone()),
            Some(_) => {
                cache.remove(url);
                None
            }
            None => None,
        }
    }

    /// Caches `result` and evicts every entry that has gone stale.
    fn remember(&self, url: &str, result: &ProbeResult) {
        if self.cache_ttl.is_zero() {
            return;
        }
        let mut cache = self.cache.lock();
        cache.retain(|_, entry| entry.checked_at.elapsed() < self.cache_ttl);
        cache.insert(
            url.to_string(),
            CachedProbe {
                checked_at: Instant::now(),
                result: result.clone(),
            },
        );
    }
}

#[async_trait]
impl UrlProber for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeResult {
        self.check(url).await
    }
}

fn validate_url(url: &str) -> Result<(), ProbeError> {
    let parsed = url::Url::parse(url).map_err(|e| ProbeError::InvalidUrl {
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ProbeError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

/// Successful and redirect statuses are playable; everything else is bad.
pub fn classify_status(status: StatusCode) -> ProbeResult {
    let code = status.as_u16();
    if (200..400).contains(&code) {
        ProbeResult::good(code)
    } else {
        ProbeResult::bad(code)
    }
}

fn classify_transport_error(error: &reqwest::Error) -> ProbeResult {
    if error.is_timeout() {
        ProbeResult::with_outcome(ProbeOutcome::Timeout)
    } else {
        ProbeResult::error(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    const NOT_ALLOWED: &str =
        "HTTP/1.1 405 Method Not Allowed\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const PARTIAL: &str =
        "HTTP/1.1 206 Partial Content\r\ncontent-length: 1\r\nconnection: close\r\n\r\nx";
    const NOT_FOUND: &str =
        "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

    /// Serves one canned response per connection and records request heads.
    async fn serve(responses: Vec<&'static str>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let read = socket.read(&mut buf).await.unwrap();
                    if read == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..read]);
                }
                seen.lock().push(String::from_utf8_lossy(&head).to_ascii_lowercase());
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{addr}/video.mp4"), requests)
    }

    fn probe(timeout: Duration, cache_ttl: Duration) -> HttpProbe {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .unwrap();
        HttpProbe::with_client(client, cache_ttl)
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK).outcome, ProbeOutcome::Good);
        assert_eq!(classify_status(StatusCode::FOUND).outcome, ProbeOutcome::Good);
        let forbidden = classify_status(StatusCode::FORBIDDEN);
        assert_eq!(forbidden.outcome, ProbeOutcome::Bad);
        assert_eq!(forbidden.status, Some(403));
    }

    #[tokio::test]
    async fn test_non_http_url_is_not_requested() {
        let probe = probe(Duration::from_millis(200), Duration::ZERO);

        let result = probe.check("ftp://example.com/video.mp4").await;
        assert_eq!(result.outcome, ProbeOutcome::Error);
        assert!(result.error.unwrap().contains("ftp"));

        let result = probe.check("not a url").await;
        assert_eq!(result.outcome, ProbeOutcome::Error);
    }

    #[tokio::test]
    async fn test_head_rejection_retries_with_ranged_get() {
        let (url, requests) = serve(vec![NOT_ALLOWED, PARTIAL]).await;
        let probe = probe(Duration::from_secs(2), Duration::ZERO);

        let result = probe.check(&url).await;

        assert_eq!(result, ProbeResult::good(206));
        let requests = requests.lock();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("head "));
        assert!(requests[1].starts_with("get "));
        assert!(requests[1].contains("range: bytes=0-0"));
    }

    #[tokio::test]
    async fn test_missing_resource_is_bad_and_cached() {
        let (url, requests) = serve(vec![NOT_FOUND]).await;
        let probe = probe(Duration::from_secs(2), Duration::from_secs(45));

        let first = probe.check(&url).await;
        let second = probe.check(&url).await;

        assert_eq!(first, ProbeResult::bad(404));
        assert_eq!(second, first);
        assert_eq!(requests.lock().len(), 1);
    }

    #[test]
    fn test_stale_entries_are_evicted_on_insert() {
        let probe = probe(Duration::from_secs(2), Duration::from_millis(50));

        probe.remember("https://a.example.com/1.mp4", &ProbeResult::good(200));
        probe.remember("https://a.example.com/2.mp4", &ProbeResult::bad(404));
        std::thread::sleep(Duration::from_millis(80));
        probe.remember("https://a.example.com/3.mp4", &ProbeResult::good(200));

        let cache = probe.cache.lock();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("https://a.example.com/3.mp4"));
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/video.mp4", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let probe = probe(Duration::from_millis(200), Duration::ZERO);

        let result = probe.check(&url).await;

        assert_eq!(result.outcome, ProbeOutcome::Timeout);
        assert!(result.outcome.allows_playback());
    }

    #[tokio::test]
    async fn test_refused_connection_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/video.mp4", listener.local_addr().unwrap());
        drop(listener);
        let probe = probe(Duration::from_secs(2), Duration::ZERO);

        let result = probe.check(&url).await;

        assert_eq!(result.outcome, ProbeOutcome::Error);
        assert!(result.error.is_some());
    }
}
