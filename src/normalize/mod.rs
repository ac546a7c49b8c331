//! Ingredient normalization.
//!
//! Turns a free-text ingredient name such as `"2 cups finely chopped fresh
//! Onions"` into the canonical key `"onions"` used to deduplicate ingredients
//! and to match ingredient filters. The function is total, deterministic and
//! idempotent: normalizing a canonical name returns it unchanged.

mod quantity;
pub mod vocabulary;

use std::collections::BTreeSet;

pub use quantity::{is_quantity, LeadingQuantitySplitter, QuantitySplitter, SplitLine};
use vocabulary::{is_descriptor, is_stop_word, is_unit};

/// Result of normalizing one ingredient name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIngredient {
    /// Canonical key. Empty only for whitespace-only input.
    pub primary: String,
    /// `primary` plus its individual words longer than two characters.
    pub candidates: BTreeSet<String>,
}

impl NormalizedIngredient {
    fn from_primary(primary: String) -> Self {
        let mut candidates: BTreeSet<String> = primary
            .split_whitespace()
            .filter(|word| word.chars().count() > 2)
            .map(str::to_string)
            .collect();
        if !primary.is_empty() {
            candidates.insert(primary.clone());
        }
        Self { primary, candidates }
    }
}

pub trait Normalizer: Send + Sync {
    fn normalize(&self, text: &str) -> NormalizedIngredient;
}

/// Strips amounts, units, descriptors and stop words using the built-in
/// word lists in [`vocabulary`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VocabularyNormalizer;

impl Normalizer for VocabularyNormalizer {
    fn normalize(&self, text: &str) -> NormalizedIngredient {
        let tokens = tokenize(text);
        let unquantified: Vec<&str> = tokens
            .iter()
            .map(String::as_str)
            .filter(|token| !is_quantity(token))
            .collect();

        let kept: Vec<&str> = unquantified
            .iter()
            .copied()
            .filter(|token| !is_unit(token) && !is_descriptor(token) && !is_stop_word(token))
            .collect();

        let primary = if !kept.is_empty() {
            kept.join(" ")
        } else if !unquantified.is_empty() {
            // Nothing but noise words: keep them rather than lose the line.
            unquantified.join(" ")
        } else {
            text.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        };

        NormalizedIngredient::from_primary(primary)
    }
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '\'' | '.' | '/')
}

/// Lowercase, turn separators into spaces, split, and trim joining
/// punctuation from each token's edges.
fn tokenize(text: &str) -> Vec<String> {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if is_token_char(c) { c } else { ' ' })
        .collect();

    spaced
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| matches!(c, '-' | '\'' | '.' | '/')))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
