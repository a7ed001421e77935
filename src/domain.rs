//! Domain module - Core records exchanged between pipeline stages
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod recipe;

pub use recipe::{DiscoveredItem, Ingredient, Instruction, Recipe};
