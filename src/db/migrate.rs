//! Legacy-store migration and store verification.
//!
//! The legacy key/value store is serialized into a bundle, merged through
//! the ordinary import path in one transaction, and then checked by an
//! independent pass over the relational tables.

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use super::bundle::ImportSummary;
use super::legacy::LegacyStore;
use super::Database;
use crate::error::Result;

/// Row counts and dangling links found by [`Database::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub recipes: u64,
    pub ingredients: u64,
    pub links: u64,
    /// Ids of links whose recipe or ingredient row is missing.
    pub orphaned_links: Vec<String>,
}

impl VerificationReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_links.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub legacy_recipes: usize,
    pub summary: ImportSummary,
    pub verification: VerificationReport,
}

impl MigrationReport {
    /// Every legacy recipe landed and no link dangles.
    pub fn is_complete(&self) -> bool {
        self.summary.imported_recipes == self.legacy_recipes && self.verification.is_consistent()
    }
}

impl Database {
    /// Recounts the store and scans for links without both endpoints.
    pub fn verify(&self) -> Result<VerificationReport> {
        let budget = self.budget();
        budget.check("verify")?;
        let mut conn = self.connect(&budget)?;
        let tx = self.begin_read(&mut conn)?;

        let count = |table: &str| -> Result<u64> {
            let n: i64 =
                tx.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        };
        let recipes = count("recipes")?;
        let ingredients = count("ingredients")?;
        let links = count("recipe_ingredients")?;

        let orphaned_links = {
            let mut stmt = tx.prepare(
                r#"
                SELECT ri.id
                FROM recipe_ingredients ri
                LEFT JOIN recipes r ON r.id = ri.recipe_id
                LEFT JOIN ingredients i ON i.id = ri.ingredient_id
                WHERE r.id IS NULL OR i.id IS NULL
                ORDER BY ri.id
                "#,
            )?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            rows
        };

        let report = VerificationReport {
            recipes,
            ingredients,
            links,
            orphaned_links,
        };
        if !report.is_consistent() {
            warn!(orphans = report.orphaned_links.len(), "Store has orphaned links");
        }
        Ok(report)
    }

    /// Copies a legacy store into this one. Either every legacy recipe is
    /// imported or nothing is.
    pub fn migrate_legacy(&self, legacy_path: &Path) -> Result<MigrationReport> {
        info!("Migrating legacy store {:?}", legacy_path);
        let legacy = LegacyStore::open(legacy_path)?;
        let bundle = legacy.to_bundle(self.normalizer(), self.splitter())?;
        let legacy_recipes = bundle.recipes.len();
        info!(
            recipes = legacy_recipes,
            ingredients = bundle.ingredients.len(),
            links = bundle.recipe_ingredients.len(),
            "Legacy store serialized"
        );

        let summary = self.import_bundle(&bundle)?;
        let verification = self.verify()?;

        let report = MigrationReport {
            legacy_recipes,
            summary,
            verification,
        };
        if report.is_complete() {
            info!(
                recipes = report.verification.recipes,
                links = report.verification.links,
                "Legacy migration complete"
            );
        } else {
            warn!(?report, "Legacy migration finished with discrepancies");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::legacy::tests::legacy_recipe;
    use crate::db::testing::*;
    use crate::db::RecipeQuery;
    use crate::error::Error;
    use rusqlite::Connection;

    fn legacy_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("legacy.db");
        let store = LegacyStore::create(&path).unwrap();
        store
            .put_recipe(&legacy_recipe("a", "Soup", &["2 cups stock", "1 onion, diced", "3 carrots"]))
            .unwrap();
        store
            .put_recipe(&legacy_recipe("b", "Stew", &["500g beef", "1 onion", "2 cups stock"]))
            .unwrap();
        path
    }

    #[test]
    fn test_migrate_legacy_store() {
        let (dir, db) = temp_db();
        let report = db.migrate_legacy(&legacy_file(&dir)).unwrap();

        assert!(report.is_complete(), "{report:?}");
        assert_eq!(report.legacy_recipes, 2);
        assert_eq!(report.verification.recipes, 2);
        assert_eq!(report.verification.ingredients, 4);
        assert_eq!(report.verification.links, 6);

        let soup = db.get_recipe("a").unwrap().unwrap();
        assert_eq!(soup.ingredients, vec!["2 cups stock", "1 onion, diced", "3 carrots"]);
        assert_eq!(soup.created_at, at("2023-06-01T10:00:00Z"));

        let onion = db.search_recipes(&RecipeQuery::new().ingredient("onion")).unwrap();
        assert_eq!(onion.total, 2);
    }

    #[test]
    fn test_migrated_vocabulary_feeds_autocomplete() {
        let (dir, db) = temp_db();
        let path = dir.path().join("legacy.db");
        let store = LegacyStore::create(&path).unwrap();
        store
            .put_recipe(&legacy_recipe("a", "Soup", &["1 onion"]))
            .unwrap();
        store.put_raw("ingredient:saffron", b"1").unwrap();
        drop(store);

        let report = db.migrate_legacy(&path).unwrap();
        assert!(report.is_complete(), "{report:?}");
        assert_eq!(report.verification.ingredients, 2);
        assert_eq!(report.verification.links, 1);
        assert_eq!(db.autocomplete_ingredients("saf", 10).unwrap(), vec!["saffron"]);

        let again = db.migrate_legacy(&path).unwrap();
        assert_eq!(again.summary.created_ingredients, 0);
        assert_eq!(again.verification.ingredients, 2);
    }

    #[test]
    fn test_migration_twice_adds_nothing() {
        let (dir, db) = temp_db();
        let path = legacy_file(&dir);
        db.migrate_legacy(&path).unwrap();
        let again = db.migrate_legacy(&path).unwrap();

        assert!(again.is_complete());
        assert_eq!(again.summary.created_recipes, 0);
        assert_eq!(again.summary.imported_links, 0);
        assert_eq!(again.verification.links, 6);
    }

    #[test]
    fn test_malformed_legacy_store_migrates_nothing() {
        let (dir, db) = temp_db();
        let path = legacy_file(&dir);
        LegacyStore::create(&path)
            .unwrap()
            .put_raw("recipe:zz", b"[1, 2")
            .unwrap();

        assert!(matches!(db.migrate_legacy(&path), Err(Error::Integrity(_))));
        assert_eq!(count(&db, "recipes"), 0);
    }

    #[test]
    fn test_verify_reports_orphans() {
        let (_dir, db) = temp_db();
        db.create_recipe(draft("Soup", &["salt"])).unwrap();

        let conn = Connection::open(db.path()).unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = OFF;
             INSERT INTO recipe_ingredients (id, recipe_id, ingredient_id, quantity_text, sort_order)
             VALUES ('dangling', 'gone', 'also-gone', NULL, 0);",
        )
        .unwrap();

        let report = db.verify().unwrap();
        assert_eq!(report.orphaned_links, vec!["dangling"]);
        assert_eq!(report.links, 2);
        assert!(!report.is_consistent());
    }
}
