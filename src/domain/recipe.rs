use serde::{Deserialize, Serialize};

/// Listing entry found on a category page, handed to exactly one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredItem {
    pub source_url: String,
    pub title: String,
    pub thumbnail_url: String,
}

impl DiscoveredItem {
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        thumbnail_url: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            thumbnail_url: thumbnail_url.into(),
        }
    }

    /// Items without a link or a title are never queued
    pub fn is_harvestable(&self) -> bool {
        !self.source_url.is_empty() && !self.title.is_empty()
    }
}

/// One ingredient line from a recipe page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub quantity: String,
    pub unit: String,
}

/// One numbered preparation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Ordinal position as text ("1", "2", ...)
    pub number: String,
    pub description: String,
}

/// Completed record emitted by a worker and serialized into the output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub page: String,
    pub image: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<Instruction>,
}

impl Recipe {
    /// Start a record from the listing data; the detail page fills the rest
    pub fn from_item(item: &DiscoveredItem) -> Self {
        Self {
            name: item.title.clone(),
            page: item.source_url.clone(),
            image: item.thumbnail_url.clone(),
            ingredients: Vec::new(),
            instructions: Vec::new(),
        }
    }
}
