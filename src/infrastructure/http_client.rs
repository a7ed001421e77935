//! HTTP client for web crawling with rate limiting and error handling
//!
//! An `HttpClient` is one fetch context: a connection pool, a cookie jar and
//! a disguise shared with the rest of the run, plus its own rate gate built
//! from a `RatePolicy`. Discovery uses a single context. Every detail worker
//! gets its own context via [`HttpClient::fork`], so the detail policy paces
//! each worker and the pool size bounds how many detail requests run at once.

use crate::infrastructure::disguise::{DisguisePolicy, random_delay};
use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{Client, cookie::Jar};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Failure of a single page fetch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP request failed with status {status}: {url}")]
    Status { status: u16, url: String },

    #[error("Failed to fetch URL {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Failed to read response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    pub fn transport(url: &str, message: impl ToString) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 403 and 429 mean the site is pushing back, not that the page is broken
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status(), Some(403 | 429))
    }
}

/// Source of page bodies for the pipeline
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return its body; non-2xx answers are errors
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Hands each detail worker the fetcher it keeps for its whole life
pub trait FetcherSource: Send + Sync {
    fn for_worker(&self, id: usize) -> Result<Arc<dyn PageFetcher>>;
}

/// Every worker uses the same fetcher
pub struct SharedFetcher(pub Arc<dyn PageFetcher>);

impl FetcherSource for SharedFetcher {
    fn for_worker(&self, _id: usize) -> Result<Arc<dyn PageFetcher>> {
        Ok(Arc::clone(&self.0))
    }
}

/// Each worker gets its own fork, paced by its own copy of the policy
impl FetcherSource for HttpClient {
    fn for_worker(&self, _id: usize) -> Result<Arc<dyn PageFetcher>> {
        Ok(Arc::new(self.fork()?))
    }
}

/// Politeness settings of one fetch context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatePolicy {
    /// Requests in flight at once within one context
    pub parallelism: u32,

    /// Minimum spacing between request starts of one context; 0 disables the limiter
    pub base_delay_ms: u64,

    /// Extra random wait in `[0, jitter_ms]` before each request
    pub jitter_ms: u64,
}

impl RatePolicy {
    pub const fn new(parallelism: u32, base_delay_ms: u64, jitter_ms: u64) -> Self {
        Self {
            parallelism,
            base_delay_ms,
            jitter_ms,
        }
    }

    /// Listing pages: one at a time, 2s apart plus up to 2s jitter
    pub const fn discovery_default() -> Self {
        Self::new(1, 2_000, 2_000)
    }

    /// Detail pages: one at a time, 2s apart
    pub const fn detail_default() -> Self {
        Self::new(1, 2_000, 0)
    }

    /// No waiting at all
    pub const fn unlimited(parallelism: u32) -> Self {
        Self::new(parallelism, 0, 0)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self::detail_default()
    }
}

/// HTTP client configuration for crawling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub timeout_seconds: u64,
    pub follow_redirects: bool,

    /// Honour HTTP(S)_PROXY from the environment
    pub use_system_proxy: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: crate::infrastructure::config::defaults::REQUEST_TIMEOUT_SECONDS,
            follow_redirects: true,
            use_system_proxy: true,
        }
    }
}

/// State shared by every client of one harvesting run
#[derive(Debug, Clone, Default)]
pub struct BrowserSession {
    pub disguise: Arc<DisguisePolicy>,
    pub cookies: Arc<Jar>,
}

/// Pacing of one fetch context
struct RateGate {
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    permits: Semaphore,
    policy: RatePolicy,
}

impl RateGate {
    fn new(policy: RatePolicy) -> Result<Self> {
        let permits = usize::try_from(policy.parallelism.max(1))
            .context("Parallelism does not fit in usize")?;

        Ok(Self {
            rate_limiter: Quota::with_period(policy.base_delay()).map(RateLimiter::direct),
            permits: Semaphore::new(permits),
            policy,
        })
    }

    async fn wait_turn(&self) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
        let jitter = random_delay(Duration::ZERO, self.policy.jitter());
        if !jitter.is_zero() {
            tokio::time::sleep(jitter).await;
        }
    }
}

/// HTTP client with per-context rate limiting and browser disguise
pub struct HttpClient {
    client: Client,
    gate: RateGate,
    disguise: Arc<DisguisePolicy>,
}

impl HttpClient {
    /// Create a new HTTP client with a fresh rate gate
    pub fn new(config: &HttpClientConfig, policy: RatePolicy, session: &BrowserSession) -> Result<Self> {
        let mut builder = Client::builder();
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .timeout(Duration::from_secs(config.timeout_seconds))
            .cookie_provider(Arc::clone(&session.cookies))
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            gate: RateGate::new(policy)?,
            disguise: Arc::clone(&session.disguise),
        })
    }

    /// New context over the same connections, cookies and disguise
    ///
    /// The fork starts with its own limiter and permits, so it never waits
    /// on requests made through `self`.
    pub fn fork(&self) -> Result<Self> {
        Ok(Self {
            client: self.client.clone(),
            gate: RateGate::new(self.gate.policy)?,
            disguise: Arc::clone(&self.disguise),
        })
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.gate.policy
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let _permit = self
            .gate
            .permits
            .acquire()
            .await
            .map_err(|e| FetchError::transport(url, e))?;
        self.gate.wait_turn().await;

        debug!("Fetching URL: {}", url);
        let response = self
            .client
            .get(url)
            .headers(self.disguise.next_header_set(url))
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("❌ {} answered with status {}", url, status);
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!("Successfully fetched: {} ({} chars)", url, text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::disguise::USER_AGENTS;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&raw).to_string()
    }

    /// Serve `responses` one connection each and return the raw requests seen
    async fn serve(responses: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            requests
        });
        (format!("http://{addr}"), handle)
    }

    /// Requests in flight on a [`serve_slowly`] server, and the highest count seen
    #[derive(Default)]
    struct InFlight {
        now: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlight {
        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    /// Answer every connection with a small page after `delay`
    async fn serve_slowly(delay: Duration) -> (String, Arc<InFlight>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let in_flight = Arc::new(InFlight::default());
        let counters = Arc::clone(&in_flight);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let counters = Arc::clone(&counters);
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let now = counters.now.fetch_add(1, Ordering::SeqCst) + 1;
                    counters.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    counters.now.fetch_sub(1, Ordering::SeqCst);
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                        .await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{addr}"), in_flight)
    }

    fn client_with(policy: RatePolicy) -> HttpClient {
        let config = HttpClientConfig {
            use_system_proxy: false,
            ..HttpClientConfig::default()
        };
        HttpClient::new(&config, policy, &BrowserSession::default()).unwrap()
    }

    fn client() -> HttpClient {
        client_with(RatePolicy::unlimited(1))
    }

    /// One request per client, all started together
    async fn fetch_concurrently(clients: &[&HttpClient], base: &str) -> Vec<Result<String, FetchError>> {
        let fetches = clients.iter().enumerate().map(|(n, client)| {
            let url = format!("{base}/recipe/{n}");
            async move { client.fetch(&url).await }
        });
        futures::future::join_all(fetches).await
    }

    #[test]
    fn test_rate_limited_statuses() {
        let status = |status| FetchError::Status { status, url: "u".into() };
        assert!(status(403).is_rate_limited());
        assert!(status(429).is_rate_limited());
        assert!(!status(404).is_rate_limited());
        assert!(!status(500).is_rate_limited());
        assert!(!FetchError::transport("u", "reset").is_rate_limited());
    }

    #[test]
    fn test_stage_defaults_differ() {
        assert_eq!(RatePolicy::discovery_default(), RatePolicy::new(1, 2_000, 2_000));
        assert_eq!(RatePolicy::detail_default(), RatePolicy::new(1, 2_000, 0));
        assert_eq!(RatePolicy::unlimited(4).base_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_sending() {
        let result = client().fetch("not a url").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_sends_disguise_headers() {
        let (base, server) = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 11\r\nConnection: close\r\n\r\n<p>soup</p>",
        ])
        .await;

        let body = client().fetch(&format!("{base}/recipe/1")).await.unwrap();
        assert_eq!(body, "<p>soup</p>");

        let requests = server.await.unwrap();
        let request = requests[0].to_lowercase();
        assert!(request.contains(&format!("user-agent: {}", USER_AGENTS[0].to_lowercase())));
        assert!(request.contains("referer: https://www.google.com/"));
        assert!(request.contains("accept-language: en-us,en;q=0.9,fr;q=0.8"));
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_status_error() {
        let (base, server) = serve(vec![
            "HTTP/1.1 429 Too Many Requests\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        ])
        .await;

        let error = client().fetch(&format!("{base}/busy")).await.unwrap_err();
        assert_eq!(error.status(), Some(429));
        assert!(error.is_rate_limited());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_base_delay_spaces_request_starts() {
        let (base, _) = serve_slowly(Duration::ZERO).await;
        let client = client_with(RatePolicy::new(1, 200, 0));

        let started = Instant::now();
        for n in 0..3 {
            client.fetch(&format!("{base}/recipe/{n}")).await.unwrap();
        }

        // first request is immediate, the next two wait one period each
        assert!(started.elapsed() >= Duration::from_millis(380), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_parallelism_bounds_requests_of_one_context() {
        let (base, in_flight) = serve_slowly(Duration::from_millis(150)).await;
        let client = client_with(RatePolicy::unlimited(1));

        for result in fetch_concurrently(&[&client; 3], &base).await {
            assert_eq!(result.unwrap(), "ok");
        }
        assert_eq!(in_flight.peak(), 1);

        let (base, in_flight) = serve_slowly(Duration::from_millis(150)).await;
        let client = client_with(RatePolicy::unlimited(3));
        fetch_concurrently(&[&client; 3], &base).await;
        assert_eq!(in_flight.peak(), 3);
    }

    #[tokio::test]
    async fn test_forks_are_paced_independently() {
        let (base, in_flight) = serve_slowly(Duration::from_millis(150)).await;
        let parent = client_with(RatePolicy::detail_default());
        parent.fetch(&format!("{base}/warm")).await.unwrap();

        // the parent is now 2s away from its next turn; fresh forks are not
        let forks: Vec<HttpClient> = (0..4).map(|_| parent.fork().unwrap()).collect();
        assert!(forks.iter().all(|fork| *fork.policy() == RatePolicy::detail_default()));

        let forks: Vec<&HttpClient> = forks.iter().collect();
        let started = Instant::now();
        for result in fetch_concurrently(&forks, &base).await {
            result.unwrap();
        }

        assert!(started.elapsed() < Duration::from_millis(1_500), "{:?}", started.elapsed());
        assert_eq!(in_flight.peak(), 4);
    }

    #[tokio::test]
    async fn test_jitter_stays_within_bound() {
        let (base, _) = serve_slowly(Duration::ZERO).await;
        let client = client_with(RatePolicy::new(1, 0, 100));

        let started = Instant::now();
        for n in 0..3 {
            client.fetch(&format!("{base}/recipe/{n}")).await.unwrap();
        }

        assert!(started.elapsed() < Duration::from_millis(3 * 100 + 700), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_http_client_hands_out_forks_per_worker() {
        let (base, in_flight) = serve_slowly(Duration::from_millis(100)).await;
        let source = client_with(RatePolicy::detail_default());

        let fetchers: Vec<Arc<dyn PageFetcher>> =
            (0..2).map(|id| source.for_worker(id).unwrap()).collect();
        let started = Instant::now();
        let fetches = fetchers.iter().map(|fetcher| {
            let url = format!("{base}/recipe/x");
            async move { fetcher.fetch(&url).await }
        });
        for result in futures::future::join_all(fetches).await {
            result.unwrap();
        }

        assert!(started.elapsed() < Duration::from_millis(1_500));
        assert_eq!(in_flight.peak(), 2);
    }
}
