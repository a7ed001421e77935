//! Parsing configuration for HTML extraction
//!
//! Centralized configuration for CSS selectors used on category listing
//! pages and recipe detail pages.

use serde::{Deserialize, Serialize};

/// All selectors used by the harvesting pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub listing: ListingSelectors,
    pub recipe: RecipeSelectors,
}

/// CSS selectors for category listing pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// One element per recipe card
    pub card: String,

    /// Title text, relative to the card
    pub title: String,

    /// Thumbnail element, relative to the card
    pub image: String,

    /// Attribute holding the lazily loaded thumbnail URL
    pub image_attribute: String,

    /// Link to the following listing page
    pub next_page: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            card: "div.mntl-taxonomysc-article-list-group .mntl-card".to_string(),
            title: "span.card__title-text".to_string(),
            image: "img".to_string(),
            image_attribute: "data-src".to_string(),
            next_page: "a[data-testid='pagination-next']".to_string(),
        }
    }
}

/// CSS selectors for recipe detail pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeSelectors {
    pub ingredient_list: String,
    pub ingredient_item: String,
    pub ingredient_quantity: String,
    pub ingredient_unit: String,

    pub steps_container: String,
    pub step_item: String,

    /// Paragraph inside a step; the step's own text is used when absent
    pub step_text: String,
}

impl Default for RecipeSelectors {
    fn default() -> Self {
        Self {
            ingredient_list: "ul.mm-recipes-structured-ingredients__list".to_string(),
            ingredient_item: "li.mm-recipes-structured-ingredients__list-item".to_string(),
            ingredient_quantity: "span[data-ingredient-quantity=true]".to_string(),
            ingredient_unit: "span[data-ingredient-unit=true]".to_string(),
            steps_container: "div.mm-recipes-steps__content".to_string(),
            step_item: "ol.mntl-sc-block li".to_string(),
            step_text: "p.mntl-sc-block-html".to_string(),
        }
    }
}
