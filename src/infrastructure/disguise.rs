//! Browser disguise policy
//!
//! Every outgoing request carries a rotating desktop user agent, the static
//! header set a real browser sends on navigation, and a plausible Referer.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use url::Url;

/// Referer sent on the first visit to a host
pub const SEARCH_ENGINE_REFERER: &str = "https://www.google.com/";

/// Desktop browser user agents, handed out round-robin
pub const USER_AGENTS: [&str; 8] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

// Accept-Encoding is left to reqwest so responses are still decompressed.
const STATIC_HEADERS: [(&str, &str); 12] = [
    ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"),
    ("accept-language", "en-US,en;q=0.9,fr;q=0.8"),
    ("dnt", "1"),
    ("upgrade-insecure-requests", "1"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
    ("cache-control", "max-age=0"),
    ("sec-ch-ua", r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", r#""Windows""#),
];

#[derive(Debug, Default)]
struct DisguiseState {
    next_agent: usize,
    seen_hosts: HashSet<String>,
}

/// Shared header policy; one instance serves every stage
#[derive(Debug, Default)]
pub struct DisguisePolicy {
    state: Mutex<DisguiseState>,
}

impl DisguisePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers for the next request to `url`
    pub fn next_header_set(&self, url: &str) -> HeaderMap {
        let (agent, referer) = self.rotate(url);

        let mut headers = HeaderMap::with_capacity(STATIC_HEADERS.len() + 2);
        for (name, value) in STATIC_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(agent));
        if let Ok(value) = HeaderValue::from_str(&referer) {
            headers.insert(REFERER, value);
        }
        headers
    }

    /// Advance the agent index and record the host under a single lock
    fn rotate(&self, url: &str) -> (&'static str, String) {
        let origin = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(|host| (parsed.scheme().to_string(), host.to_string())));

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let agent = USER_AGENTS[state.next_agent % USER_AGENTS.len()];
        state.next_agent = (state.next_agent + 1) % USER_AGENTS.len();

        let referer = match origin {
            Some((scheme, host)) => {
                let root = format!("{scheme}://{host}/");
                if state.seen_hosts.insert(host) {
                    SEARCH_ENGINE_REFERER.to_string()
                } else {
                    root
                }
            }
            None => SEARCH_ENGINE_REFERER.to_string(),
        };

        (agent, referer)
    }
}

/// Uniformly random wait in `[min, max]` at millisecond resolution.
/// `max <= min` yields `min`.
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(fastrand::u64(min_ms..=max_ms))
}
