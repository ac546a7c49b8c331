use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A stored recipe with its ingredient list reconstructed in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub method: String,
    #[serde(default)]
    pub photo_reference: Option<String>,
    /// Display lines, `quantity + " " + ingredient name`.
    #[serde(default)]
    pub ingredients: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller input for create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeDraft {
    /// Used by create when present; ignored by update.
    pub id: Option<String>,
    pub name: String,
    pub method: String,
    /// On update, `None` keeps the stored photo.
    pub photo_reference: Option<String>,
    pub ingredients: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecipeDraft {
    pub fn new(name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_ingredients<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ingredients = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_photo(mut self, reference: impl Into<String>) -> Self {
        self.photo_reference = Some(reference.into());
        self
    }

    /// Trims every field and rejects blank names, methods and lines.
    pub(crate) fn validated(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("recipe name is required".into()));
        }

        let method = self.method.trim().to_string();
        if method.is_empty() {
            return Err(Error::Validation("recipe method is required".into()));
        }

        let mut ingredients = Vec::with_capacity(self.ingredients.len());
        for (index, line) in self.ingredients.iter().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                return Err(Error::Validation(format!(
                    "ingredient line {} is blank",
                    index + 1
                )));
            }
            ingredients.push(line.to_string());
        }

        let photo_reference = self
            .photo_reference
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(Self {
            name,
            method,
            ingredients,
            photo_reference,
            ..self
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: String,
    /// Display name, unique across the store.
    pub name: String,
    /// Recomputed on import, so bundles may omit it.
    #[serde(default, alias = "normalized_name")]
    pub canonical_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub id: String,
    pub recipe_id: String,
    pub ingredient_id: String,
    #[serde(default)]
    pub quantity_text: Option<String>,
    pub sort_order: i64,
}

/// Rebuilds the line a user sees from its stored parts.
pub fn display_line(quantity: Option<&str>, name: &str) -> String {
    match quantity {
        Some(q) if !q.is_empty() => format!("{} {}", q, name),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_trims_fields() {
        let draft = RecipeDraft::new("  Soup ", " Simmer. ")
            .with_ingredients(["  1 onion ", "salt"])
            .with_photo("   ")
            .validated()
            .unwrap();
        assert_eq!(draft.name, "Soup");
        assert_eq!(draft.method, "Simmer.");
        assert_eq!(draft.ingredients, vec!["1 onion", "salt"]);
        assert_eq!(draft.photo_reference, None);
    }

    #[test]
    fn test_validated_rejects_blank_fields() {
        assert!(matches!(
            RecipeDraft::new(" ", "Stir").validated(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            RecipeDraft::new("Soup", "").validated(),
            Err(Error::Validation(_))
        ));
        let err = RecipeDraft::new("Soup", "Stir")
            .with_ingredients(["1 onion", "  "])
            .validated()
            .unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_display_line() {
        assert_eq!(display_line(Some("2 cups"), "stock"), "2 cups stock");
        assert_eq!(display_line(Some(""), "salt"), "salt");
        assert_eq!(display_line(None, "salt"), "salt");
    }

    #[test]
    fn test_ingredient_accepts_legacy_field_name() {
        let json = r#"{"id":"i1","name":"Flour","normalized_name":"flour",
            "created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z"}"#;
        let ingredient: Ingredient = serde_json::from_str(json).unwrap();
        assert_eq!(ingredient.canonical_name, "flour");
    }
}
