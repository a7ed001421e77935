//! Test utilities for the harvesting pipeline
//!
//! An in-memory site that serves canned listing and recipe pages, records
//! every request, and can answer with error statuses or slow responses.

use crate::infrastructure::http_client::{FetchError, PageFetcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum FixtureResponse {
    Body(String),
    Status(u16),
}

/// Canned responses keyed by URL; unknown URLs answer 404
#[derive(Debug, Default)]
pub struct FixtureSite {
    responses: HashMap<String, FixtureResponse>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<String>>,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.responses.insert(url.into(), FixtureResponse::Body(html.into()));
        self
    }

    pub fn status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.responses.insert(url.into(), FixtureResponse::Status(status));
        self
    }

    pub fn delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }

    /// Every requested URL, in request order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == url).count()
    }
}

#[async_trait]
impl PageFetcher for FixtureSite {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }

        match self.responses.get(url) {
            Some(FixtureResponse::Body(body)) => Ok(body.clone()),
            Some(FixtureResponse::Status(status)) => Err(FetchError::Status {
                status: *status,
                url: url.to_string(),
            }),
            None => Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

/// Listing page with `(href, title)` cards and an optional next link
pub fn listing_html(cards: &[(&str, &str)], next: Option<&str>) -> String {
    let cards: String = cards
        .iter()
        .map(|(href, title)| {
            format!(
                r#"<a class="mntl-card" href="{href}"><img data-src="{href}.jpg"><span class="card__title-text">{title}</span></a>"#
            )
        })
        .collect();
    let next = next
        .map(|href| format!(r#"<a data-testid="pagination-next" href="{href}">Next</a>"#))
        .unwrap_or_default();

    format!(
        r#"<html><body><div class="mntl-taxonomysc-article-list-group">{cards}</div>{next}</body></html>"#
    )
}

/// Recipe page with one structured ingredient and the given steps
pub fn recipe_html(steps: &[&str]) -> String {
    let steps: String = steps
        .iter()
        .map(|step| format!(r#"<li><p class="mntl-sc-block-html">{step}</p></li>"#))
        .collect();

    format!(
        r#"<html><body>
<ul class="mm-recipes-structured-ingredients__list">
<li class="mm-recipes-structured-ingredients__list-item"><p><span data-ingredient-quantity="true">1</span> <span data-ingredient-unit="true">cup</span> <span data-ingredient-name="true">water</span></p></li>
</ul>
<div class="mm-recipes-steps__content"><ol class="mntl-sc-block">{steps}</ol></div>
</body></html>"#
    )
}
