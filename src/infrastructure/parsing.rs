//! HTML parsing infrastructure
//!
//! Trait-based extraction of listing cards and recipe details from fetched
//! pages, driven by configurable CSS selectors.

pub mod config;
pub mod context;
pub mod error;
pub mod listing_parser;
pub mod recipe_parser;

pub use config::{ListingSelectors, RecipeSelectors, SelectorConfig};
pub use context::ParseContext;
pub use error::{ParsingError, ParsingResult};
pub use listing_parser::{ListingPage, ListingParser};
pub use recipe_parser::RecipeParser;

use scraper::{ElementRef, Html, Selector};

/// Parser trait with context support
pub trait ContextualParser {
    type Output;
    type Context;

    /// Parse HTML with contextual information
    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> Self::Output;
}

/// Compile a selector, keeping the offending text in the error
pub(crate) fn compile_selector(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

/// Concatenated text of an element with runs of whitespace collapsed
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Text of every descendant matching `selector`, joined like a browser would
pub(crate) fn child_text(element: &ElementRef<'_>, selector: &Selector) -> String {
    let joined = element
        .select(selector)
        .map(|child| child.text().collect::<String>())
        .collect::<String>();
    collapse_whitespace(&joined)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
