//! Reader for the legacy embedded key/value store.
//!
//! Layout: `recipe:<id>` holds a JSON recipe document and
//! `ingredient:<lowercase line>` marks a line once seen. The key/value pairs
//! live in a single `kv` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::warn;

use super::bundle::Bundle;
use super::models::{Ingredient, Recipe, RecipeIngredient};
use crate::error::{Error, Result};
use crate::normalize::{Normalizer, QuantitySplitter};

pub const RECIPE_KEY_PREFIX: &str = "recipe:";
pub const INGREDIENT_KEY_PREFIX: &str = "ingredient:";

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
);
"#;

/// A recipe document as the legacy store kept it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRecipe {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filterable_ingredient_names: Vec<String>,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub photo_filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct LegacyStore {
    conn: Connection,
}

impl LegacyStore {
    /// Opens an existing legacy file read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::StoreUnavailable(format!(
                "legacy store {:?} does not exist",
                path
            )));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Creates (or opens for writing) a legacy file.
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(KV_SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn put_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Writes a recipe document and its vocabulary markers.
    pub fn put_recipe(&self, recipe: &LegacyRecipe) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![
                format!("{}{}", RECIPE_KEY_PREFIX, recipe.id),
                serde_json::to_vec(recipe)?
            ],
        )?;
        for line in &recipe.ingredients {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![
                    format!("{}{}", INGREDIENT_KEY_PREFIX, line.trim().to_lowercase()),
                    b"1".as_slice()
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Key/value pairs under a prefix, in key order.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![prefix, prefix.len() as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every recipe document. A malformed document fails the whole read.
    pub fn recipes(&self) -> Result<Vec<LegacyRecipe>> {
        self.scan(RECIPE_KEY_PREFIX)?
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_slice(&value).map_err(|e| {
                    Error::Integrity(format!("legacy record {} is malformed: {}", key, e))
                })
            })
            .collect()
    }

    /// Lines recorded in the ingredient vocabulary.
    pub fn vocabulary(&self) -> Result<Vec<String>> {
        Ok(self
            .scan(INGREDIENT_KEY_PREFIX)?
            .into_iter()
            .map(|(key, _)| key[INGREDIENT_KEY_PREFIX.len()..].to_string())
            .collect())
    }

    /// Builds an importable bundle. Lines are split and normalized the way
    /// the writer does it; ingredients are shared by canonical name.
    /// Vocabulary entries no recipe line covers become unlinked ingredients.
    pub fn to_bundle(
        &self,
        normalizer: &dyn Normalizer,
        splitter: &dyn QuantitySplitter,
    ) -> Result<Bundle> {
        let mut bundle = Bundle::default();
        let mut by_canonical: HashMap<String, String> = HashMap::new();

        for legacy in self.recipes()? {
            let mut linked: HashSet<String> = HashSet::new();

            for (index, line) in legacy.ingredients.iter().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let parts = splitter.split(line);
                let canonical = normalizer.normalize(&parts.name).primary;

                let ingredient_id = match by_canonical.get(&canonical) {
                    Some(id) => id.clone(),
                    None => {
                        let id = format!("legacy-ingredient-{}", by_canonical.len() + 1);
                        bundle.ingredients.push(Ingredient {
                            id: id.clone(),
                            name: parts.name.clone(),
                            canonical_name: canonical.clone(),
                            created_at: legacy.created_at,
                            updated_at: legacy.created_at,
                        });
                        by_canonical.insert(canonical.clone(), id.clone());
                        id
                    }
                };

                if !linked.insert(ingredient_id.clone()) {
                    warn!(
                        recipe = %legacy.name,
                        line = %line,
                        "Dropping legacy line that repeats an ingredient"
                    );
                    continue;
                }

                bundle.recipe_ingredients.push(RecipeIngredient {
                    id: format!("{}-{}", legacy.id, index),
                    recipe_id: legacy.id.clone(),
                    ingredient_id,
                    quantity_text: parts.quantity,
                    sort_order: (linked.len() - 1) as i64,
                });
            }

            bundle.recipes.push(Recipe {
                id: legacy.id,
                name: legacy.name,
                method: legacy.method,
                photo_reference: Some(legacy.photo_filename).filter(|p| !p.is_empty()),
                ingredients: legacy.ingredients,
                created_at: legacy.created_at,
                updated_at: legacy.updated_at,
            });
        }

        // Vocabulary lines outlive the recipes that recorded them and still
        // feed autocomplete.
        let seen_at = bundle
            .recipes
            .iter()
            .map(|r| r.created_at)
            .min()
            .unwrap_or_else(super::now);
        for line in self.vocabulary()? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parts = splitter.split(line);
            let canonical = normalizer.normalize(&parts.name).primary;
            if canonical.is_empty() || by_canonical.contains_key(&canonical) {
                continue;
            }
            let id = format!("legacy-ingredient-{}", by_canonical.len() + 1);
            bundle.ingredients.push(Ingredient {
                id: id.clone(),
                name: parts.name,
                canonical_name: canonical.clone(),
                created_at: seen_at,
                updated_at: seen_at,
            });
            by_canonical.insert(canonical, id);
        }

        Ok(bundle)
    }
}
