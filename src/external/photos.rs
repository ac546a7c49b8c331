use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;

use super::PhotoLookup;

/// Pexels search API client.
pub struct PexelsClient {
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    src: PhotoSources,
}

#[derive(Debug, Deserialize)]
struct PhotoSources {
    #[serde(default)]
    large: Option<String>,
    #[serde(default)]
    original: Option<String>,
}

impl PexelsClient {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

/// First usable image URL in a search response.
fn first_image(response: SearchResponse) -> Option<String> {
    response
        .photos
        .into_iter()
        .find_map(|p| p.src.large.or(p.src.original))
}

impl PhotoLookup for PexelsClient {
    fn find_photo(&self, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(anyhow!("Empty photo query"));
        }

        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let response = agent
            .get(&format!("{}/search", self.endpoint))
            .set("Authorization", &self.api_key)
            .query("query", query)
            .query("per_page", "1")
            .query("orientation", "landscape")
            .call()
            .map_err(|e| anyhow!("Photo search failed: {}", e))?;

        let search: SearchResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse photo search response: {}", e))?;

        first_image(search).ok_or_else(|| anyhow!("No photo found for {:?}", query))
    }

    fn provider_name(&self) -> &'static str {
        "Pexels"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_image_prefers_large() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"photos": [
                {"src": {"original": "https://img/1-orig.jpg", "large": "https://img/1-large.jpg"}},
                {"src": {"large": "https://img/2-large.jpg"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(first_image(response).as_deref(), Some("https://img/1-large.jpg"));
    }

    #[test]
    fn test_first_image_empty() {
        let response: SearchResponse = serde_json::from_str(r#"{"total_results": 0}"#).unwrap();
        assert_eq!(first_image(response), None);
    }

    #[test]
    fn test_blank_query_rejected_without_network() {
        let client = PexelsClient::new("http://127.0.0.1:9/", "key");
        assert!(client.find_photo("   ").is_err());
        assert_eq!(client.endpoint, "http://127.0.0.1:9");
    }
}
