//! Service facade: the store plus its optional outside collaborators.

use anyhow::{anyhow, Result as AnyResult};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::db::{
    Bundle, Database, ImportSummary, MigrationReport, Recipe, RecipeDraft, RecipePage,
    RecipeQuery, VerificationReport,
};
use crate::error::Result;
use crate::external::{self, PhotoLookup, RecipeExtractor};

pub struct Cookbook {
    db: Database,
    photos: Option<Arc<dyn PhotoLookup>>,
    extractor: Option<Arc<dyn RecipeExtractor>>,
    placeholder: String,
    autocomplete_limit: usize,
}

impl Cookbook {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            photos: None,
            extractor: None,
            placeholder: "placeholder.jpg".to_string(),
            autocomplete_limit: 10,
        }
    }

    /// Opens and initializes the configured store and wires the configured
    /// collaborators.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = Database::from_config(&config.database, &config.search)?;
        db.initialize()?;

        let mut cookbook = Self::new(db);
        cookbook.placeholder = config.photos.placeholder.clone();
        cookbook.autocomplete_limit = config.search.autocomplete_limit;
        cookbook.photos = external::create_photo_lookup(&config.photos).map(Arc::from);
        cookbook.extractor = external::create_recipe_extractor(&config.extraction).map(Arc::from);
        Ok(cookbook)
    }

    pub fn with_photo_lookup(mut self, lookup: Arc<dyn PhotoLookup>) -> Self {
        self.photos = Some(lookup);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn RecipeExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Stock photo for a recipe name, or the placeholder if the lookup fails.
    fn resolve_photo(&self, name: &str) -> Option<String> {
        let lookup = self.photos.as_ref()?;
        match lookup.find_photo(name) {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!(
                    provider = lookup.provider_name(),
                    recipe = %name,
                    "Photo lookup failed, using placeholder: {}",
                    e
                );
                Some(self.placeholder.clone())
            }
        }
    }

    /// Creates a recipe, filling a missing photo from the stock-photo lookup.
    pub fn create(&self, mut draft: RecipeDraft) -> Result<Recipe> {
        let has_photo = draft
            .photo_reference
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        if !has_photo && !draft.name.trim().is_empty() {
            draft.photo_reference = self.resolve_photo(draft.name.trim());
        }
        self.db.create_recipe(draft)
    }

    pub fn update(&self, id: &str, draft: RecipeDraft) -> Result<Recipe> {
        self.db.update_recipe(id, draft)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.db.delete_recipe(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<Recipe>> {
        self.db.get_recipe(id)
    }

    pub fn search(&self, query: &RecipeQuery) -> Result<RecipePage> {
        self.db.search_recipes(query)
    }

    pub fn autocomplete(&self, prefix: &str) -> Result<Vec<String>> {
        self.db.autocomplete_ingredients(prefix, self.autocomplete_limit)
    }

    pub fn export(&self) -> Result<Bundle> {
        self.db.export_bundle()
    }

    pub fn import(&self, bundle: &Bundle) -> Result<ImportSummary> {
        self.db.import_bundle(bundle)
    }

    pub fn migrate_legacy(&self, path: &Path) -> Result<MigrationReport> {
        self.db.migrate_legacy(path)
    }

    pub fn verify(&self) -> Result<VerificationReport> {
        self.db.verify()
    }

    pub fn refresh_canonical_names(&self) -> Result<usize> {
        self.db.refresh_canonical_names()
    }

    /// Drafts a recipe from a photo of one. Nothing is stored.
    pub fn draft_from_photo(&self, image: &[u8], mime_type: &str) -> AnyResult<RecipeDraft> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| anyhow!("Recipe extraction is not configured"))?;
        let extracted = extractor.extract(image, mime_type)?;
        if extracted.name.is_empty() && extracted.ingredients.is_empty() {
            return Err(anyhow!("No recipe found in image"));
        }
        Ok(RecipeDraft::new(extracted.name, extracted.method).with_ingredients(extracted.ingredients))
    }
}
