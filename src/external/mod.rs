//! Outside services the store can use but never depends on.
//!
//! Both are optional. A failing stock-photo lookup degrades to a placeholder
//! image and a failing extraction is reported to the caller; neither ever
//! blocks a save.

pub mod extraction;
pub mod photos;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{ExtractionConfig, PhotoConfig, PhotoProviderType};

/// Finds a stock photo for a recipe title.
pub trait PhotoLookup: Send + Sync {
    /// Returns a reference (URL) to an image matching `query`.
    fn find_photo(&self, query: &str) -> Result<String>;

    fn provider_name(&self) -> &'static str;
}

/// Recipe fields recovered from a photographed recipe card or page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecipe {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub method: String,
}

/// Turns an image of a recipe into structured fields.
pub trait RecipeExtractor: Send + Sync {
    fn extract(&self, image: &[u8], mime_type: &str) -> Result<ExtractedRecipe>;

    fn provider_name(&self) -> &'static str;
}

/// Builds the configured photo lookup, if any.
pub fn create_photo_lookup(config: &PhotoConfig) -> Option<Box<dyn PhotoLookup>> {
    match config.provider {
        PhotoProviderType::None => None,
        PhotoProviderType::Pexels => match config.api_key.as_deref() {
            Some(key) if !key.is_empty() => Some(Box::new(
                photos::PexelsClient::new(&config.endpoint, key).with_timeout(config.timeout_secs),
            )),
            _ => {
                tracing::warn!("Pexels photo lookup configured without an api_key; disabled");
                None
            }
        },
    }
}

pub fn create_recipe_extractor(config: &ExtractionConfig) -> Option<Box<dyn RecipeExtractor>> {
    if !config.enabled {
        return None;
    }
    Some(Box::new(
        extraction::VisionExtractor::new(&config.endpoint, &config.model, config.api_key.as_deref())
            .with_max_tokens(config.max_tokens),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_follow_config() {
        assert!(create_photo_lookup(&PhotoConfig::default()).is_none());

        let keyless = PhotoConfig {
            provider: PhotoProviderType::Pexels,
            ..Default::default()
        };
        assert!(create_photo_lookup(&keyless).is_none());

        let keyed = PhotoConfig {
            provider: PhotoProviderType::Pexels,
            api_key: Some("secret".into()),
            ..Default::default()
        };
        assert_eq!(create_photo_lookup(&keyed).unwrap().provider_name(), "Pexels");

        assert!(create_recipe_extractor(&ExtractionConfig::default()).is_none());
        let enabled = ExtractionConfig {
            enabled: true,
            ..Default::default()
        };
        assert_eq!(
            create_recipe_extractor(&enabled).unwrap().provider_name(),
            "OpenAI-compatible"
        );
    }
}
