//! Whole-store export and merge-import.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{display_line, Ingredient, Recipe, RecipeIngredient};
use super::writer::{recipe_from_row, resolve_ingredient, row_exists, IngredientSeed, RECIPE_COLUMNS};
use super::{parse_timestamp, timestamp, truncate, Database};
use crate::error::{Error, Result};

/// Portable snapshot of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub recipes: Vec<Recipe>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub recipe_ingredients: Vec<RecipeIngredient>,
}

/// Counts from one import. Recipe and ingredient counts are entries
/// processed, whether matched or created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported_recipes: usize,
    pub imported_ingredients: usize,
    /// Links inserted.
    pub imported_links: usize,
    /// Links that already existed.
    pub skipped_links: usize,
    pub created_recipes: usize,
    pub created_ingredients: usize,
}

impl Bundle {
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty() && self.ingredients.is_empty() && self.recipe_ingredients.is_empty()
    }

    /// Rejects bundles that could never import cleanly, before any write.
    fn check(&self) -> Result<()> {
        check_unique_ids("recipe", self.recipes.iter().map(|r| r.id.as_str()))?;
        check_unique_ids("ingredient", self.ingredients.iter().map(|i| i.id.as_str()))?;
        check_unique_ids("link", self.recipe_ingredients.iter().map(|l| l.id.as_str()))?;

        for recipe in &self.recipes {
            if recipe.name.trim().is_empty() || recipe.method.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "bundle recipe {} needs a name and a method",
                    recipe.id
                )));
            }
        }
        for ingredient in &self.ingredients {
            if ingredient.name.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "bundle ingredient {} has no name",
                    ingredient.id
                )));
            }
        }
        Ok(())
    }
}

fn check_unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(Error::Integrity(format!("duplicate {} id {:?} in bundle", kind, id)));
        }
    }
    Ok(())
}

impl Database {
    /// Reads the whole store in one transaction.
    pub fn export_bundle(&self) -> Result<Bundle> {
        let budget = self.budget();
        budget.check("export")?;
        let mut conn = self.connect(&budget)?;
        let tx = self.begin_read(&mut conn)?;

        let mut recipes = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM recipes r ORDER BY r.created_at ASC, r.id ASC",
                RECIPE_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], recipe_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        budget.check("export")?;

        let ingredients = {
            let mut stmt = tx.prepare(
                r#"
                SELECT id, name, canonical_name, created_at, updated_at
                FROM ingredients
                ORDER BY name ASC
                "#,
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let created_at: String = row.get(3)?;
                    let updated_at: String = row.get(4)?;
                    Ok(Ingredient {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        canonical_name: row.get(2)?,
                        created_at: parse_timestamp(3, &created_at)?,
                        updated_at: parse_timestamp(4, &updated_at)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        budget.check("export")?;

        let recipe_ingredients = {
            let mut stmt = tx.prepare(
                r#"
                SELECT id, recipe_id, ingredient_id, quantity_text, sort_order
                FROM recipe_ingredients
                ORDER BY recipe_id ASC, sort_order ASC
                "#,
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RecipeIngredient {
                        id: row.get(0)?,
                        recipe_id: row.get(1)?,
                        ingredient_id: row.get(2)?,
                        quantity_text: row.get(3)?,
                        sort_order: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        // Display lists come from the rows already read.
        let names: HashMap<&str, &str> = ingredients
            .iter()
            .map(|i| (i.id.as_str(), i.name.as_str()))
            .collect();
        let positions: HashMap<String, usize> = recipes
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id.clone(), pos))
            .collect();
        for link in &recipe_ingredients {
            if let (Some(&pos), Some(name)) = (
                positions.get(&link.recipe_id),
                names.get(link.ingredient_id.as_str()),
            ) {
                recipes[pos]
                    .ingredients
                    .push(display_line(link.quantity_text.as_deref(), name));
            }
        }

        info!(
            recipes = recipes.len(),
            ingredients = ingredients.len(),
            links = recipe_ingredients.len(),
            "Store exported"
        );

        Ok(Bundle {
            recipes,
            ingredients,
            recipe_ingredients,
        })
    }

    /// Merges a bundle into the store in one transaction.
    ///
    /// Ingredients are matched by recomputed canonical name and recipes by
    /// name; everything else is created. Links are remapped through those
    /// matches and exact duplicates are skipped. Any unresolved reference
    /// aborts the whole import.
    pub fn import_bundle(&self, bundle: &Bundle) -> Result<ImportSummary> {
        bundle.check()?;
        let budget = self.budget();
        budget.check("import")?;

        let mut conn = self.connect(&budget)?;
        let tx = self.begin_write(&mut conn)?;
        let mut summary = ImportSummary::default();

        let mut ingredient_ids: HashMap<&str, String> = HashMap::new();
        for ingredient in &bundle.ingredients {
            budget.check("import ingredients")?;
            let display = ingredient.name.trim();
            let canonical = self.normalizer.normalize(display).primary;
            let resolved = resolve_ingredient(
                &tx,
                &IngredientSeed {
                    display,
                    canonical: &canonical,
                    preferred_id: Some(&ingredient.id),
                    created_at: truncate(ingredient.created_at),
                    updated_at: truncate(ingredient.updated_at),
                },
            )?;
            if resolved.created {
                summary.created_ingredients += 1;
            }
            summary.imported_ingredients += 1;
            ingredient_ids.insert(ingredient.id.as_str(), resolved.id);
        }

        // Target id and the sort_order the bundle's links start from.
        let mut recipe_ids: HashMap<&str, (String, i64)> = HashMap::new();
        for recipe in &bundle.recipes {
            budget.check("import recipes")?;
            let name = recipe.name.trim();
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM recipes WHERE name = ?1 ORDER BY created_at, id LIMIT 1",
                    [name],
                    |row| row.get(0),
                )
                .optional()?;

            let (id, first_order) = match existing {
                Some(id) => {
                    debug!(recipe = %name, id = %id, "Matched existing recipe");
                    // merged lines go after the ones already there
                    let next: i64 = tx.query_row(
                        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM recipe_ingredients WHERE recipe_id = ?1",
                        [&id],
                        |row| row.get(0),
                    )?;
                    (id, next)
                }
                None => {
                    let id = if !recipe.id.is_empty() && !row_exists(&tx, "recipes", &recipe.id)? {
                        recipe.id.clone()
                    } else {
                        Uuid::new_v4().to_string()
                    };
                    tx.execute(
                        r#"
                        INSERT INTO recipes (id, name, method, photo_reference, created_at, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                        "#,
                        params![
                            id,
                            name,
                            recipe.method.trim(),
                            recipe.photo_reference,
                            timestamp(&truncate(recipe.created_at)),
                            timestamp(&truncate(recipe.updated_at))
                        ],
                    )?;
                    summary.created_recipes += 1;
                    (id, 0)
                }
            };
            summary.imported_recipes += 1;
            recipe_ids.insert(recipe.id.as_str(), (id, first_order));
        }

        for link in &bundle.recipe_ingredients {
            budget.check("import links")?;
            let (recipe_id, first_order) = recipe_ids.get(link.recipe_id.as_str()).ok_or_else(|| {
                Error::Integrity(format!(
                    "link {} references recipe {} which is not in the bundle",
                    link.id, link.recipe_id
                ))
            })?;
            let ingredient_id = ingredient_ids.get(link.ingredient_id.as_str()).ok_or_else(|| {
                Error::Integrity(format!(
                    "link {} references ingredient {} which is not in the bundle",
                    link.id, link.ingredient_id
                ))
            })?;

            let inserted = tx.execute(
                r#"
                INSERT INTO recipe_ingredients (id, recipe_id, ingredient_id, quantity_text, sort_order)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT (recipe_id, ingredient_id) DO NOTHING
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    recipe_id,
                    ingredient_id,
                    link.quantity_text.as_deref().filter(|q| !q.is_empty()),
                    first_order + link.sort_order
                ],
            )?;
            if inserted == 0 {
                summary.skipped_links += 1;
            } else {
                summary.imported_links += 1;
            }
        }

        budget.check("import")?;
        tx.commit()?;
        info!(
            recipes = summary.imported_recipes,
            new_recipes = summary.created_recipes,
            ingredients = summary.imported_ingredients,
            new_ingredients = summary.created_ingredients,
            links = summary.imported_links,
            skipped = summary.skipped_links,
            "Bundle imported"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::db::RecipeQuery;

    fn seeded() -> (tempfile::TempDir, Database) {
        let (dir, db) = temp_db();
        let mut soup = draft("Soup", &["2 cups stock", "1 onion, diced", "3 carrots"]);
        soup.created_at = Some(at("2024-01-01T12:00:00Z"));
        db.create_recipe(soup).unwrap();
        let mut tart = draft("Tart", &["pastry", "2 onions"]);
        tart.created_at = Some(at("2024-01-02T12:00:00Z"));
        db.create_recipe(tart).unwrap();
        (dir, db)
    }

    #[test]
    fn test_export_orders_and_display_lists() {
        let (_dir, db) = seeded();
        let bundle = db.export_bundle().unwrap();

        let names: Vec<_> = bundle.recipes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Soup", "Tart"]);
        assert_eq!(
            bundle.recipes[0].ingredients,
            vec!["2 cups stock", "1 onion, diced", "3 carrots"]
        );

        let ingredient_names: Vec<_> = bundle.ingredients.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(ingredient_names, vec!["carrots", "onion, diced", "onions", "pastry", "stock"]);
        assert_eq!(bundle.recipe_ingredients.len(), 5);
    }

    #[test]
    fn test_import_into_empty_store_round_trips() {
        let (_dir, source) = seeded();
        let bundle = source.export_bundle().unwrap();

        let (_dir2, target) = temp_db();
        let summary = target.import_bundle(&bundle).unwrap();
        assert_eq!(summary.created_recipes, 2);
        assert_eq!(summary.imported_links, 5);
        assert_eq!(summary.skipped_links, 0);

        // ids are free in the new store, so they carry over
        let copy = target.export_bundle().unwrap();
        let strip = |b: &Bundle| {
            let mut links: Vec<_> = b
                .recipe_ingredients
                .iter()
                .map(|l| (l.recipe_id.clone(), l.ingredient_id.clone(), l.quantity_text.clone(), l.sort_order))
                .collect();
            links.sort();
            (b.recipes.clone(), b.ingredients.clone(), links)
        };
        assert_eq!(strip(&copy), strip(&bundle));
    }

    #[test]
    fn test_import_is_idempotent() {
        let (_dir, db) = seeded();
        let bundle = db.export_bundle().unwrap();

        let summary = db.import_bundle(&bundle).unwrap();
        assert_eq!(summary.imported_recipes, 2);
        assert_eq!(summary.created_recipes, 0);
        assert_eq!(summary.created_ingredients, 0);
        assert_eq!(summary.imported_links, 0);
        assert_eq!(summary.skipped_links, 5);

        assert_eq!(count(&db, "recipes"), 2);
        assert_eq!(count(&db, "ingredients"), 5);
        assert_eq!(count(&db, "recipe_ingredients"), 5);
    }

    #[test]
    fn test_import_merges_by_name_and_canonical() {
        let (_dir, db) = seeded();
        let (_dir2, other) = temp_db();
        other
            .create_recipe(draft("Soup", &["1 onion", "2 leeks"]))
            .unwrap();
        other
            .create_recipe(draft("Salad", &["lettuce", "1 large onion"]))
            .unwrap();

        let summary = db.import_bundle(&other.export_bundle().unwrap()).unwrap();
        assert_eq!(summary.created_recipes, 1);
        // onion matches "onion, diced"; leeks and lettuce are new
        assert_eq!(summary.created_ingredients, 2);

        let soup = db
            .search_recipes(&RecipeQuery::new().text("soup"))
            .unwrap()
            .recipes
            .remove(0);
        // merged lines follow the existing ones
        assert_eq!(
            soup.ingredients,
            vec!["2 cups stock", "1 onion, diced", "3 carrots", "2 leeks"]
        );
        let orders: Vec<i64> = {
            let conn = rusqlite::Connection::open(db.path()).unwrap();
            let mut stmt = conn
                .prepare("SELECT sort_order FROM recipe_ingredients WHERE recipe_id = ?1 ORDER BY sort_order")
                .unwrap();
            let rows = stmt
                .query_map([&soup.id], |row| row.get(0))
                .unwrap()
                .collect::<rusqlite::Result<Vec<_>>>()
                .unwrap();
            rows
        };
        assert_eq!(orders, vec![0, 1, 2, 4]);
        assert_eq!(count(&db, "recipes"), 3);
    }

    #[test]
    fn test_dangling_link_imports_nothing() {
        let (_dir, source) = seeded();
        let mut bundle = source.export_bundle().unwrap();
        bundle.recipe_ingredients[3].ingredient_id = "missing".into();

        let (_dir2, target) = temp_db();
        let err = target.import_bundle(&bundle).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)), "{err:?}");
        assert!(err.to_string().contains("missing"));

        assert_eq!(count(&target, "recipes"), 0);
        assert_eq!(count(&target, "ingredients"), 0);
        assert_eq!(count(&target, "recipe_ingredients"), 0);
    }

    #[test]
    fn test_duplicate_bundle_ids_rejected() {
        let (_dir, source) = seeded();
        let mut bundle = source.export_bundle().unwrap();
        let copy = bundle.ingredients[0].clone();
        bundle.ingredients.push(copy);

        let (_dir2, target) = temp_db();
        assert!(matches!(target.import_bundle(&bundle), Err(Error::Integrity(_))));
        assert_eq!(count(&target, "ingredients"), 0);
    }

    #[test]
    fn test_bundle_canonical_names_are_recomputed() {
        let json = r#"{
            "recipes": [{"id": "r1", "name": "Toast", "method": "Toast it.",
                "created_at": "2024-05-01T08:00:00Z", "updated_at": "2024-05-01T08:00:00Z"}],
            "ingredients": [{"id": "i1", "name": "2 slices sourdough bread", "canonical_name": "nonsense",
                "created_at": "2024-05-01T08:00:00Z", "updated_at": "2024-05-01T08:00:00Z"}],
            "recipe_ingredients": [{"id": "l1", "recipe_id": "r1", "ingredient_id": "i1", "sort_order": 0}]
        }"#;
        let bundle: Bundle = serde_json::from_str(json).unwrap();

        let (_dir, db) = temp_db();
        db.import_bundle(&bundle).unwrap();
        let exported = db.export_bundle().unwrap();
        assert_eq!(exported.ingredients[0].canonical_name, "sourdough bread");
        assert_eq!(exported.ingredients[0].id, "i1");
        assert_eq!(exported.recipes[0].ingredients, vec!["2 slices sourdough bread"]);
    }

    #[test]
    fn test_import_taken_id_gets_fresh_one() {
        let (_dir, db) = temp_db();
        let mut existing = draft("Porridge", &["oats"]);
        existing.id = Some("r1".into());
        db.create_recipe(existing).unwrap();

        let bundle = Bundle {
            recipes: vec![Recipe {
                id: "r1".into(),
                name: "Granola".into(),
                method: "Bake it.".into(),
                photo_reference: None,
                ingredients: Vec::new(),
                created_at: at("2024-01-01T00:00:00Z"),
                updated_at: at("2024-01-01T00:00:00Z"),
            }],
            ..Default::default()
        };
        let summary = db.import_bundle(&bundle).unwrap();
        assert_eq!(summary.created_recipes, 1);
        assert_eq!(count(&db, "recipes"), 2);
        assert_eq!(db.get_recipe("r1").unwrap().unwrap().name, "Porridge");
    }
}
