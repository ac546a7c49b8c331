use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{display_line, Recipe, RecipeDraft};
use super::{now, parse_timestamp, timestamp, truncate, Budget, Database};
use crate::error::{Error, Result};

pub(crate) const RECIPE_COLUMNS: &str =
    "r.id, r.name, r.method, r.photo_reference, r.created_at, r.updated_at";

/// Maps a row selected with [`RECIPE_COLUMNS`]. The ingredient list is left empty.
pub(crate) fn recipe_from_row(row: &Row<'_>) -> rusqlite::Result<Recipe> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Recipe {
        id: row.get(0)?,
        name: row.get(1)?,
        method: row.get(2)?,
        photo_reference: row.get(3)?,
        ingredients: Vec::new(),
        created_at: parse_timestamp(4, &created_at)?,
        updated_at: parse_timestamp(5, &updated_at)?,
    })
}

pub(crate) fn fetch_recipe(conn: &Connection, id: &str) -> Result<Option<Recipe>> {
    let recipe = conn
        .query_row(
            &format!("SELECT {} FROM recipes r WHERE r.id = ?1", RECIPE_COLUMNS),
            [id],
            recipe_from_row,
        )
        .optional()?;
    Ok(recipe)
}

/// Display lines of one recipe in `sort_order`.
pub(crate) fn load_ingredient_lines(conn: &Connection, recipe_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT ri.quantity_text, i.name
        FROM recipe_ingredients ri
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ?1
        ORDER BY ri.sort_order
        "#,
    )?;

    let lines = stmt
        .query_map([recipe_id], |row| {
            let quantity: Option<String> = row.get(0)?;
            let name: String = row.get(1)?;
            Ok(display_line(quantity.as_deref(), &name))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(lines)
}

pub(crate) fn row_exists(conn: &Connection, table: &str, id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", table),
            [id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

// ============================================================================
// Ingredient resolution
// ============================================================================

/// What to insert if no existing ingredient matches.
pub(crate) struct IngredientSeed<'a> {
    pub display: &'a str,
    pub canonical: &'a str,
    /// Reused as the row id when it is not taken.
    pub preferred_id: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedIngredient {
    pub id: String,
    pub name: String,
    pub created: bool,
}

fn find_by_canonical(conn: &Connection, canonical: &str) -> Result<Option<ResolvedIngredient>> {
    let found = conn
        .query_row(
            r#"
            SELECT id, name FROM ingredients
            WHERE canonical_name = ?1
            ORDER BY created_at, id
            LIMIT 1
            "#,
            [canonical],
            |row| {
                Ok(ResolvedIngredient {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created: false,
                })
            },
        )
        .optional()?;
    Ok(found)
}

fn find_by_name(conn: &Connection, name: &str) -> Result<Option<(ResolvedIngredient, String)>> {
    let found = conn
        .query_row(
            "SELECT id, name, canonical_name FROM ingredients WHERE name = ?1",
            [name],
            |row| {
                let ingredient = ResolvedIngredient {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created: false,
                };
                Ok((ingredient, row.get::<_, String>(2)?))
            },
        )
        .optional()?;
    Ok(found)
}

/// Get-or-create an ingredient by canonical name.
///
/// The stored display name is the first spelling seen for that canonical
/// name. Later lines that normalize the same way link to it and read back
/// with that spelling: `2 onion, finely chopped` after `1 onion, diced`
/// displays as `2 onion, diced`. Only the quantity text is kept per line.
///
/// Falls back to the display name, whose stored canonical name is refreshed
/// if the normalizer has changed since it was written. A unique violation on
/// insert means another writer created the row first, so it is re-read.
pub(crate) fn resolve_ingredient(
    conn: &Connection,
    seed: &IngredientSeed<'_>,
) -> Result<ResolvedIngredient> {
    if let Some(found) = find_by_canonical(conn, seed.canonical)? {
        return Ok(found);
    }

    if let Some((found, stored_canonical)) = find_by_name(conn, seed.display)? {
        if stored_canonical != seed.canonical {
            conn.execute(
                "UPDATE ingredients SET canonical_name = ?1, updated_at = ?2 WHERE id = ?3",
                params![seed.canonical, timestamp(&now()), found.id],
            )?;
            debug!(
                ingredient = %found.name,
                from = %stored_canonical,
                to = %seed.canonical,
                "Refreshed stale canonical name"
            );
        }
        return Ok(found);
    }

    let id = match seed.preferred_id {
        Some(id) if !id.is_empty() && !row_exists(conn, "ingredients", id)? => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    };

    let inserted = conn.execute(
        r#"
        INSERT INTO ingredients (id, name, canonical_name, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            id,
            seed.display,
            seed.canonical,
            timestamp(&seed.created_at),
            timestamp(&seed.updated_at)
        ],
    );

    match inserted {
        Ok(_) => {
            debug!(ingredient = %seed.display, canonical = %seed.canonical, "Created ingredient");
            Ok(ResolvedIngredient {
                id,
                name: seed.display.to_string(),
                created: true,
            })
        }
        Err(err) => {
            let err = Error::from(err);
            if !err.is_conflict() {
                return Err(err);
            }
            if let Some(found) = find_by_canonical(conn, seed.canonical)? {
                return Ok(found);
            }
            match find_by_name(conn, seed.display)? {
                Some((found, _)) => Ok(found),
                None => Err(err),
            }
        }
    }
}

fn insert_link(
    conn: &Connection,
    recipe_id: &str,
    ingredient_id: &str,
    quantity: Option<&str>,
    sort_order: i64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO recipe_ingredients (id, recipe_id, ingredient_id, quantity_text, sort_order)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            Uuid::new_v4().to_string(),
            recipe_id,
            ingredient_id,
            quantity,
            sort_order
        ],
    )?;
    Ok(())
}

// ============================================================================
// Recipe writes
// ============================================================================

impl Database {
    /// Splits, normalizes and links each line in order. Returns the display
    /// lines as they will read back.
    fn link_lines(
        &self,
        conn: &Connection,
        budget: &Budget,
        recipe_id: &str,
        lines: &[String],
    ) -> Result<Vec<String>> {
        let stamp = now();
        let mut display = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            budget.check("linking ingredients")?;

            let parts = self.splitter.split(line);
            let canonical = self.normalizer.normalize(&parts.name).primary;
            let ingredient = resolve_ingredient(
                conn,
                &IngredientSeed {
                    display: &parts.name,
                    canonical: &canonical,
                    preferred_id: None,
                    created_at: stamp,
                    updated_at: stamp,
                },
            )?;

            insert_link(
                conn,
                recipe_id,
                &ingredient.id,
                parts.quantity.as_deref(),
                index as i64,
            )
            .map_err(|err| match err {
                Error::Conflict(_) => Error::Conflict(format!(
                    "ingredient line {} ({:?}) repeats ingredient {:?}",
                    index + 1,
                    line,
                    ingredient.name
                )),
                other => other,
            })?;

            display.push(display_line(parts.quantity.as_deref(), &ingredient.name));
        }

        Ok(display)
    }

    /// Stores a new recipe with its ordered ingredient links. Nothing is
    /// written unless every line links.
    pub fn create_recipe(&self, draft: RecipeDraft) -> Result<Recipe> {
        let draft = draft.validated()?;
        let budget = self.budget();
        budget.check("create recipe")?;

        let mut conn = self.connect(&budget)?;
        let tx = self.begin_write(&mut conn)?;

        let created_at = draft.created_at.map(truncate).unwrap_or_else(now);
        let updated_at = draft.updated_at.map(truncate).unwrap_or(created_at);
        let id = draft
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        tx.execute(
            r#"
            INSERT INTO recipes (id, name, method, photo_reference, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                id,
                draft.name,
                draft.method,
                draft.photo_reference,
                timestamp(&created_at),
                timestamp(&updated_at)
            ],
        )?;

        let ingredients = self.link_lines(&tx, &budget, &id, &draft.ingredients)?;

        budget.check("create recipe")?;
        tx.commit()?;
        info!(recipe_id = %id, name = %draft.name, lines = ingredients.len(), "Recipe created");

        Ok(Recipe {
            id,
            name: draft.name,
            method: draft.method,
            photo_reference: draft.photo_reference,
            ingredients,
            created_at,
            updated_at,
        })
    }

    /// Replaces a recipe's scalar fields and its whole ingredient list.
    pub fn update_recipe(&self, id: &str, draft: RecipeDraft) -> Result<Recipe> {
        let draft = draft.validated()?;
        let budget = self.budget();
        budget.check("update recipe")?;

        let mut conn = self.connect(&budget)?;
        let tx = self.begin_write(&mut conn)?;

        let existing = fetch_recipe(&tx, id)?.ok_or_else(|| Error::not_found("recipe", id))?;
        let updated_at = now();
        let photo_reference = draft.photo_reference.or(existing.photo_reference);

        tx.execute(
            r#"
            UPDATE recipes
            SET name = ?1, method = ?2, photo_reference = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                draft.name,
                draft.method,
                photo_reference,
                timestamp(&updated_at),
                id
            ],
        )?;
        let dropped = tx.execute("DELETE FROM recipe_ingredients WHERE recipe_id = ?1", [id])?;

        let ingredients = self.link_lines(&tx, &budget, id, &draft.ingredients)?;

        budget.check("update recipe")?;
        tx.commit()?;
        info!(
            recipe_id = %id,
            replaced = dropped,
            lines = ingredients.len(),
            "Recipe updated"
        );

        Ok(Recipe {
            id: existing.id,
            name: draft.name,
            method: draft.method,
            photo_reference,
            ingredients,
            created_at: existing.created_at,
            updated_at,
        })
    }

    /// Removes a recipe and its links. Ingredients stay. Returns whether a
    /// recipe was removed; a missing id is not an error.
    pub fn delete_recipe(&self, id: &str) -> Result<bool> {
        let budget = self.budget();
        budget.check("delete recipe")?;

        let mut conn = self.connect(&budget)?;
        let tx = self.begin_write(&mut conn)?;

        let links = tx.execute("DELETE FROM recipe_ingredients WHERE recipe_id = ?1", [id])?;
        let removed = tx.execute("DELETE FROM recipes WHERE id = ?1", [id])?;

        budget.check("delete recipe")?;
        tx.commit()?;

        if removed == 0 {
            debug!(recipe_id = %id, "Delete skipped, recipe does not exist");
        } else {
            info!(recipe_id = %id, links, "Recipe deleted");
        }
        Ok(removed > 0)
    }

    pub fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        let budget = self.budget();
        budget.check("get recipe")?;

        let mut conn = self.connect(&budget)?;
        let tx = self.begin_read(&mut conn)?;

        let Some(mut recipe) = fetch_recipe(&tx, id)? else {
            return Ok(None);
        };
        recipe.ingredients = load_ingredient_lines(&tx, id)?;
        Ok(Some(recipe))
    }

    /// Recomputes every ingredient's canonical name with the current
    /// normalizer. Returns how many changed.
    pub fn refresh_canonical_names(&self) -> Result<usize> {
        let budget = self.budget();
        budget.check("refresh canonical names")?;

        let mut conn = self.connect(&budget)?;
        let tx = self.begin_write(&mut conn)?;

        let rows: Vec<(String, String, String)> = {
            let mut stmt = tx.prepare("SELECT id, name, canonical_name FROM ingredients")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let stamp = timestamp(&now());
        let mut changed = 0;
        for (id, name, stored) in rows {
            budget.check("refresh canonical names")?;
            let fresh = self.normalizer.normalize(&name).primary;
            if fresh != stored {
                tx.execute(
                    "UPDATE ingredients SET canonical_name = ?1, updated_at = ?2 WHERE id = ?3",
                    params![fresh, stamp, id],
                )?;
                changed += 1;
            }
        }

        tx.commit()?;
        info!(changed, "Canonical names refreshed");
        Ok(changed)
    }
}
