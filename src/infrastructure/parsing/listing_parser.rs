//! Listing page parser
//!
//! Extracts recipe cards and the "next page" link from a category page.

use super::{
    ContextualParser, ListingSelectors, ParseContext, ParsingResult, child_text, compile_selector,
};
use crate::domain::DiscoveredItem;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Everything the discovery stage needs from one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Cards in document order, including ones without a link or title
    pub items: Vec<DiscoveredItem>,
    pub next_page: Option<String>,
}

/// Parser for category listing pages
pub struct ListingParser {
    card: Selector,
    title: Selector,
    image: Selector,
    image_attribute: String,
    next_page: Selector,
}

impl ListingParser {
    pub fn with_config(selectors: &ListingSelectors) -> ParsingResult<Self> {
        Ok(Self {
            card: compile_selector(&selectors.card)?,
            title: compile_selector(&selectors.title)?,
            image: compile_selector(&selectors.image)?,
            image_attribute: selectors.image_attribute.clone(),
            next_page: compile_selector(&selectors.next_page)?,
        })
    }

    /// Parse raw page content
    pub fn parse(&self, content: &str, context: &ParseContext) -> ListingPage {
        let html = Html::parse_document(content);
        self.parse_with_context(&html, context)
    }

    fn extract_item(&self, card: &ElementRef<'_>, context: &ParseContext) -> DiscoveredItem {
        let source_url = card
            .value()
            .attr("href")
            .and_then(|href| context.resolve(href))
            .unwrap_or_default();
        let title = child_text(card, &self.title);
        let thumbnail_url = card
            .select(&self.image)
            .find_map(|img| img.value().attr(&self.image_attribute))
            .map(|src| src.trim().to_string())
            .unwrap_or_default();

        DiscoveredItem::new(source_url, title, thumbnail_url)
    }
}

impl ContextualParser for ListingParser {
    type Output = ListingPage;
    type Context = ParseContext;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> ListingPage {
        let items: Vec<DiscoveredItem> = html
            .select(&self.card)
            .map(|card| self.extract_item(&card, context))
            .collect();

        let next_page = html
            .select(&self.next_page)
            .find_map(|link| link.value().attr("href"))
            .and_then(|href| context.resolve(href));

        debug!(
            "Parsed listing page {} ({}): {} cards, next page: {:?}",
            context.page_number,
            context.page_url,
            items.len(),
            next_page
        );

        ListingPage { items, next_page }
    }
}
