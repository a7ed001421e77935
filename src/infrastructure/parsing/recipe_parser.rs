//! Recipe detail parser
//!
//! Missing structure degrades to raw text rather than failing the item:
//! an ingredient without quantity/unit markup keeps its whole text as the
//! quantity, and a step without its paragraph keeps the list item's text.

use super::{
    ContextualParser, ParsingResult, RecipeSelectors, child_text, compile_selector, element_text,
};
use crate::domain::{DiscoveredItem, Ingredient, Instruction, Recipe};
use scraper::{ElementRef, Html, Selector};

/// Parser for recipe detail pages
pub struct RecipeParser {
    ingredient_list: Selector,
    ingredient_item: Selector,
    ingredient_quantity: Selector,
    ingredient_unit: Selector,
    steps_container: Selector,
    step_item: Selector,
    step_text: Selector,
}

impl RecipeParser {
    pub fn with_config(selectors: &RecipeSelectors) -> ParsingResult<Self> {
        Ok(Self {
            ingredient_list: compile_selector(&selectors.ingredient_list)?,
            ingredient_item: compile_selector(&selectors.ingredient_item)?,
            ingredient_quantity: compile_selector(&selectors.ingredient_quantity)?,
            ingredient_unit: compile_selector(&selectors.ingredient_unit)?,
            steps_container: compile_selector(&selectors.steps_container)?,
            step_item: compile_selector(&selectors.step_item)?,
            step_text: compile_selector(&selectors.step_text)?,
        })
    }

    /// Build the completed record for `item` from its detail page content
    pub fn parse(&self, content: &str, item: &DiscoveredItem) -> Recipe {
        let html = Html::parse_document(content);
        self.parse_with_context(&html, item)
    }

    fn extract_ingredient(&self, element: &ElementRef<'_>) -> Option<Ingredient> {
        let quantity = child_text(element, &self.ingredient_quantity);
        let unit = child_text(element, &self.ingredient_unit);

        if !quantity.is_empty() || !unit.is_empty() {
            return Some(Ingredient { quantity, unit });
        }

        let raw = element_text(element);
        (!raw.is_empty()).then(|| Ingredient {
            quantity: raw,
            unit: String::new(),
        })
    }

    fn extract_ingredients(&self, html: &Html) -> Vec<Ingredient> {
        html.select(&self.ingredient_list)
            .flat_map(|list| list.select(&self.ingredient_item))
            .filter_map(|element| self.extract_ingredient(&element))
            .collect()
    }

    fn extract_instructions(&self, html: &Html) -> Vec<Instruction> {
        let mut instructions = Vec::new();

        for container in html.select(&self.steps_container) {
            for (index, step) in container.select(&self.step_item).enumerate() {
                let mut description = child_text(&step, &self.step_text);
                if description.is_empty() {
                    description = element_text(&step);
                }
                if description.is_empty() {
                    continue;
                }
                instructions.push(Instruction {
                    number: (index + 1).to_string(),
                    description,
                });
            }
        }

        instructions
    }
}

impl ContextualParser for RecipeParser {
    type Output = Recipe;
    type Context = DiscoveredItem;

    fn parse_with_context(&self, html: &Html, item: &DiscoveredItem) -> Recipe {
        let mut recipe = Recipe::from_item(item);
        recipe.ingredients = self.extract_ingredients(html);
        recipe.instructions = self.extract_instructions(html);
        recipe
    }
}
