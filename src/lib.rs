//! Recipe store with ingredient normalization, relational integrity and
//! bundle export/import.
//!
//! The [`db::Database`] handle owns all persistence. Ingredient lines are
//! split into quantity and name by a [`normalize::QuantitySplitter`] and
//! deduplicated by the canonical form a [`normalize::Normalizer`] produces.
//! [`cookbook::Cookbook`] adds the optional stock-photo and recipe
//! extraction services on top.

pub mod config;
pub mod cookbook;
pub mod db;
pub mod error;
pub mod export;
pub mod external;
pub mod logging;
pub mod normalize;

pub use cookbook::Cookbook;
pub use db::{Database, Recipe, RecipeDraft, RecipeQuery};
pub use error::{Error, Result};
