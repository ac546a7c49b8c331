use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ExtractedRecipe, RecipeExtractor};

const EXTRACTION_PROMPT: &str = "Read the recipe in this image. Reply with only a JSON object \
    with the keys \"name\" (string), \"ingredients\" (array of strings, one ingredient line \
    each, quantities included) and \"method\" (string, steps separated by newlines). \
    Use empty values for anything you cannot read.";

/// Vision chat client for any OpenAI-compatible endpoint.
pub struct VisionExtractor {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl VisionExtractor {
    pub fn new(endpoint: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
            max_tokens: 1500,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request(&self, image: &[u8], mime_type: &str) -> ChatRequest {
        let data_url = format!("data:{};base64,{}", mime_type, BASE64.encode(image));
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: 0.2,
        }
    }
}

/// Strip a markdown code fence if the model wrapped its JSON in one.
fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();

    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let after_first_line = &trimmed[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim();
            }
        }
    }

    trimmed
}

fn parse_extraction(content: &str) -> Result<ExtractedRecipe> {
    let mut recipe: ExtractedRecipe = serde_json::from_str(extract_json(content))
        .context("Extraction reply is not the expected JSON")?;

    recipe.name = recipe.name.trim().to_string();
    recipe.method = recipe.method.trim().to_string();
    recipe.ingredients = recipe
        .ingredients
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    Ok(recipe)
}

impl RecipeExtractor for VisionExtractor {
    fn extract(&self, image: &[u8], mime_type: &str) -> Result<ExtractedRecipe> {
        if image.is_empty() {
            return Err(anyhow!("Empty image"));
        }
        let request = self.build_request(image, mime_type);
        let url = format!("{}/chat/completions", self.endpoint);

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(120))
            .build();

        let mut req = agent.post(&url).set("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", api_key));
        }

        let response = req
            .send_json(&request)
            .map_err(|e| anyhow!("Extraction request failed: {}", e))?;

        let chat_response: ChatResponse = response
            .into_json()
            .map_err(|e| anyhow!("Failed to parse extraction response: {}", e))?;

        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("No response from extraction model"))?;

        parse_extraction(content)
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_strips_fences() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_extraction_cleans_lines() {
        let recipe = parse_extraction(
            "```json\n{\"name\": \" Pancakes \", \"ingredients\": [\"200g flour\", \" \", \"2 eggs\"], \"method\": \"Whisk.\\nFry.\"}\n```",
        )
        .unwrap();
        assert_eq!(recipe.name, "Pancakes");
        assert_eq!(recipe.ingredients, vec!["200g flour", "2 eggs"]);
        assert_eq!(recipe.method, "Whisk.\nFry.");
    }

    #[test]
    fn test_parse_extraction_rejects_prose() {
        assert!(parse_extraction("I could not read this image.").is_err());
    }

    #[test]
    fn test_request_carries_data_url() {
        let extractor = VisionExtractor::new("http://localhost:1234/v1/", "vision", Some(""));
        assert!(extractor.api_key.is_none());
        let request = extractor.build_request(b"abc", "image/png");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,YWJj"
        );
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
    }
}
