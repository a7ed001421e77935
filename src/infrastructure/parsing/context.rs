//! Parsing context for HTML extraction

use super::{ParsingError, ParsingResult};
use url::Url;

/// Context information for parsing a single fetched page
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Address the page was fetched from, used to resolve relative links
    pub page_url: Url,

    /// 1-based page position inside its category
    pub page_number: u32,
}

impl ParseContext {
    pub fn new(page_url: &str, page_number: u32) -> ParsingResult<Self> {
        let page_url = Url::parse(page_url)
            .map_err(|e| ParsingError::url_resolution_failed(page_url, e))?;
        Ok(Self { page_url, page_number })
    }

    /// Resolve an href found on the page into an absolute URL.
    /// Empty or unresolvable links yield `None`.
    pub fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        self.page_url.join(href).ok().map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute_links() {
        let context = ParseContext::new("https://www.site.com/recipes/soup/", 1).unwrap();
        assert_eq!(
            context.resolve("/recipe/12/tomato").as_deref(),
            Some("https://www.site.com/recipe/12/tomato")
        );
        assert_eq!(
            context.resolve("https://cdn.site.com/x").as_deref(),
            Some("https://cdn.site.com/x")
        );
        assert_eq!(context.resolve("  "), None);
    }

    #[test]
    fn test_rejects_unparsable_page_url() {
        assert!(matches!(
            ParseContext::new("not a url", 1),
            Err(ParsingError::UrlResolutionFailed { .. })
        ));
    }
}
