use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Serialize;

use super::models::Recipe;
use super::writer::{load_ingredient_lines, recipe_from_row, RECIPE_COLUMNS};
use super::Database;
use crate::error::Result;

/// Filters and paging for [`Database::search_recipes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeQuery {
    /// Free text matched against recipe names and methods.
    pub text: Option<String>,
    /// Every term must match one of the recipe's ingredients.
    pub ingredients: Vec<String>,
    /// 1-based; 0 is treated as 1.
    pub page: u32,
    /// 0 means the configured default.
    pub page_size: u32,
}

impl RecipeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn ingredient(mut self, term: impl Into<String>) -> Self {
        self.ingredients.push(term.into());
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipePage {
    pub recipes: Vec<Recipe>,
    /// Matches across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

/// WHERE clauses with their numbered bind values.
#[derive(Debug, Default)]
struct RecipeFilter {
    clauses: Vec<String>,
    args: Vec<Value>,
}

impl RecipeFilter {
    /// Binds a value and returns its `?N` index.
    fn bind(&mut self, value: Value) -> usize {
        self.args.push(value);
        self.args.len()
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Quotes each word so user text never reaches the FTS5 query syntax.
/// Quoted words are implicitly ANDed.
fn match_expression(text: &str) -> Option<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w.to_lowercase()))
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// One quoted FTS5 phrase, so a multi-word term matches those words in order.
fn phrase_expression(text: &str) -> Option<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(format!("\"{}\"", words.join(" ")))
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl Database {
    /// Canonical forms of the filter terms, blanks and repeats removed.
    fn filter_terms(&self, terms: &[String]) -> Vec<String> {
        let mut canonical: Vec<String> = Vec::new();
        for term in terms {
            if term.trim().is_empty() {
                continue;
            }
            let primary = self.normalizer.normalize(term).primary;
            if !primary.is_empty() && !canonical.contains(&primary) {
                canonical.push(primary);
            }
        }
        canonical
    }

    fn build_filter(&self, query: &RecipeQuery) -> RecipeFilter {
        let mut filter = RecipeFilter::default();

        if let Some(expr) = query.text.as_deref().and_then(match_expression) {
            let n = filter.bind(Value::Text(expr));
            filter.clauses.push(format!(
                "r.id IN (SELECT recipe_id FROM recipe_search WHERE recipe_search MATCH ?{})",
                n
            ));
        }

        // One correlated lookup per term, so all terms must match. The index is
        // porter-stemmed: "eggs" finds "egg" and "onion" finds "onions".
        for (i, term) in self.filter_terms(&query.ingredients).into_iter().enumerate() {
            let Some(phrase) = phrase_expression(&term) else {
                // nothing searchable left, so nothing can match
                filter.clauses.push("0".to_string());
                continue;
            };
            let n = filter.bind(Value::Text(phrase));
            filter.clauses.push(format!(
                r#"EXISTS (
                    SELECT 1 FROM recipe_ingredients ri{i}
                    WHERE ri{i}.recipe_id = r.id
                      AND ri{i}.ingredient_id IN (
                          SELECT ingredient_id FROM ingredient_search
                          WHERE ingredient_search MATCH ?{n}
                      )
                )"#,
                i = i,
                n = n
            ));
        }

        filter
    }

    /// Filtered, paginated recipes, newest update first. The total and the
    /// page come from the same read transaction.
    pub fn search_recipes(&self, query: &RecipeQuery) -> Result<RecipePage> {
        let page = query.page.max(1);
        let page_size = match query.page_size {
            0 => self.limits.default_page_size,
            n => n.min(self.limits.max_page_size),
        };
        let filter = self.build_filter(query);
        let where_clause = filter.where_clause();

        let budget = self.budget();
        budget.check("search recipes")?;
        let mut conn = self.connect(&budget)?;
        let tx = self.begin_read(&mut conn)?;

        let total: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM recipes r{}", where_clause),
            params_from_iter(filter.args.iter()),
            |row| row.get(0),
        )?;
        budget.check("search recipes")?;

        let mut args = filter.args.clone();
        let limit = args.len() + 1;
        args.push(Value::Integer(i64::from(page_size)));
        args.push(Value::Integer((i64::from(page) - 1) * i64::from(page_size)));

        let sql = format!(
            "SELECT {} FROM recipes r{} ORDER BY r.updated_at DESC, r.id ASC LIMIT ?{} OFFSET ?{}",
            RECIPE_COLUMNS,
            where_clause,
            limit,
            limit + 1
        );
        let mut recipes = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), recipe_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        for recipe in &mut recipes {
            budget.check("search recipes")?;
            recipe.ingredients = load_ingredient_lines(&tx, &recipe.id)?;
        }

        let total = total.max(0) as u64;
        let total_pages = total.div_ceil(u64::from(page_size)) as u32;
        tracing::debug!(total, page, page_size, "Recipe search");

        Ok(RecipePage {
            recipes,
            total,
            page,
            page_size,
            total_pages,
        })
    }

    /// Ingredient display names starting with `prefix`, alphabetical.
    pub fn autocomplete_ingredients(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let pattern = format!("{}%", escape_like(&prefix));

        let budget = self.budget();
        budget.check("autocomplete ingredients")?;
        let mut conn = self.connect(&budget)?;
        let tx = self.begin_read(&mut conn)?;

        let mut stmt = tx.prepare(
            r#"
            SELECT DISTINCT name FROM ingredients
            WHERE lower(name) LIKE ?1 ESCAPE '\' OR canonical_name LIKE ?1 ESCAPE '\'
            ORDER BY name
            LIMIT ?2
            "#,
        )?;
        let names = stmt
            .query_map(rusqlite::params![pattern, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::db::RecipeDraft;
    use crate::normalize::{NormalizedIngredient, Normalizer};
    use std::sync::Arc;

    fn names(page: &RecipePage) -> Vec<&str> {
        page.recipes.iter().map(|r| r.name.as_str()).collect()
    }

    fn dated(name: &str, lines: &[&str], when: &str) -> RecipeDraft {
        let mut d = draft(name, lines);
        d.created_at = Some(at(when));
        d
    }

    #[test]
    fn test_match_expression_quotes_words() {
        assert_eq!(match_expression("Tomato soup!"), Some("\"tomato\" \"soup\"".into()));
        assert_eq!(match_expression("  \"*\" "), None);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[test]
    fn test_ingredient_filters_are_anded() {
        let (_dir, db) = temp_db();
        db.create_recipe(dated("Pancakes", &["flour", "egg"], "2024-01-01T00:00:00Z"))
            .unwrap();
        db.create_recipe(dated("Custard", &["egg", "milk"], "2024-01-02T00:00:00Z"))
            .unwrap();

        let both = db
            .search_recipes(&RecipeQuery::new().ingredient("egg"))
            .unwrap();
        assert_eq!(names(&both), vec!["Custard", "Pancakes"]);
        assert_eq!(both.total, 2);

        let flour_egg = db
            .search_recipes(&RecipeQuery::new().ingredient("flour").ingredient("egg"))
            .unwrap();
        assert_eq!(names(&flour_egg), vec!["Pancakes"]);

        let flour_milk = db
            .search_recipes(&RecipeQuery::new().ingredient("flour").ingredient("milk"))
            .unwrap();
        assert!(flour_milk.recipes.is_empty());
        assert_eq!(flour_milk.total, 0);
    }

    #[test]
    fn test_terms_are_normalized_and_match_words_of_canonical_names() {
        let (_dir, db) = temp_db();
        db.create_recipe(draft("Risotto", &["1 litre chicken stock", "300g arborio rice"]))
            .unwrap();

        for term in ["stock", "Chicken Stock", "2 cups fresh stock"] {
            let page = db.search_recipes(&RecipeQuery::new().ingredient(term)).unwrap();
            assert_eq!(page.total, 1, "{term}");
        }
        let partial = db.search_recipes(&RecipeQuery::new().ingredient("stoc")).unwrap();
        assert_eq!(partial.total, 0);
    }

    #[test]
    fn test_terms_match_singular_and_plural_forms() {
        let (_dir, db) = temp_db();
        db.create_recipe(draft("Omelette", &["3 eggs", "1 onion"])).unwrap();
        db.create_recipe(draft("Salad", &["2 tomatoes", "lettuce"])).unwrap();

        for term in ["egg", "eggs", "onion", "onions", "Onions", "2 large eggs", "tomato"] {
            let page = db.search_recipes(&RecipeQuery::new().ingredient(term)).unwrap();
            assert_eq!(page.total, 1, "{term}");
        }

        let both = db
            .search_recipes(&RecipeQuery::new().ingredient("egg").ingredient("onions"))
            .unwrap();
        assert_eq!(names(&both), vec!["Omelette"]);

        let mixed = db
            .search_recipes(&RecipeQuery::new().ingredient("eggs").ingredient("tomato"))
            .unwrap();
        assert_eq!(mixed.total, 0);
    }

    struct FixedNormalizer(&'static str);

    impl Normalizer for FixedNormalizer {
        fn normalize(&self, _text: &str) -> NormalizedIngredient {
            NormalizedIngredient {
                primary: self.0.to_string(),
                candidates: [self.0.to_string()].into_iter().collect(),
            }
        }
    }

    #[test]
    fn test_ingredient_index_follows_canonical_refresh() {
        let (_dir, db) = temp_db();
        db.clone()
            .with_normalizer(Arc::new(FixedNormalizer("mystery")))
            .create_recipe(draft("Omelette", &["3 eggs"]))
            .unwrap();

        let stale = db.search_recipes(&RecipeQuery::new().ingredient("egg")).unwrap();
        assert_eq!(stale.total, 0);

        assert_eq!(db.refresh_canonical_names().unwrap(), 1);
        let page = db.search_recipes(&RecipeQuery::new().ingredient("egg")).unwrap();
        assert_eq!(page.total, 1);
        let gone = db.search_recipes(&RecipeQuery::new().ingredient("mystery")).unwrap();
        assert_eq!(gone.total, 0);

        let symbols = db.search_recipes(&RecipeQuery::new().ingredient("%%")).unwrap();
        assert_eq!(symbols.total, 0);
    }

    #[test]
    fn test_phrase_expression() {
        assert_eq!(phrase_expression("chicken stock"), Some("\"chicken stock\"".into()));
        assert_eq!(phrase_expression("extra-virgin"), Some("\"extra virgin\"".into()));
        assert_eq!(phrase_expression("\"*\""), None);
    }

    #[test]
    fn test_text_and_ingredients_compose() {
        let (_dir, db) = temp_db();
        db.create_recipe(draft("Tomato Soup", &["4 tomatoes", "1 onion"])).unwrap();
        db.create_recipe(draft("Onion Tart", &["3 onion", "pastry"])).unwrap();

        let text = db.search_recipes(&RecipeQuery::new().text("soup")).unwrap();
        assert_eq!(names(&text), vec!["Tomato Soup"]);

        let method = db.search_recipes(&RecipeQuery::new().text("make the")).unwrap();
        assert_eq!(method.total, 2);

        let both = db
            .search_recipes(&RecipeQuery::new().text("tart").ingredient("onion"))
            .unwrap();
        assert_eq!(names(&both), vec!["Onion Tart"]);

        let blank = db.search_recipes(&RecipeQuery::new().text("  ")).unwrap();
        assert_eq!(blank.total, 2);
    }

    #[test]
    fn test_pagination_and_total() {
        let (_dir, db) = temp_db();
        for day in 1..=5 {
            db.create_recipe(dated(
                &format!("Recipe {}", day),
                &["salt"],
                &format!("2024-01-0{}T00:00:00Z", day),
            ))
            .unwrap();
        }

        let first = db.search_recipes(&RecipeQuery::new().page(1, 2)).unwrap();
        assert_eq!(names(&first), vec!["Recipe 5", "Recipe 4"]);
        assert_eq!((first.total, first.total_pages), (5, 3));

        let last = db.search_recipes(&RecipeQuery::new().page(3, 2)).unwrap();
        assert_eq!(names(&last), vec!["Recipe 1"]);

        let beyond = db.search_recipes(&RecipeQuery::new().page(9, 2)).unwrap();
        assert!(beyond.recipes.is_empty());
        assert_eq!(beyond.total, 5);

        let clamped = db.search_recipes(&RecipeQuery::new().page(0, 0)).unwrap();
        assert_eq!((clamped.page, clamped.page_size), (1, 25));
        assert_eq!(clamped.recipes.len(), 5);
    }

    #[test]
    fn test_updated_recipe_moves_to_front() {
        let (_dir, db) = temp_db();
        let old = db
            .create_recipe(dated("Old", &["salt"], "2024-01-01T00:00:00Z"))
            .unwrap();
        db.create_recipe(dated("New", &["salt"], "2024-02-01T00:00:00Z"))
            .unwrap();

        db.update_recipe(&old.id, draft("Old", &["pepper"])).unwrap();
        let page = db.search_recipes(&RecipeQuery::new()).unwrap();
        assert_eq!(names(&page), vec!["Old", "New"]);
        assert_eq!(page.recipes[0].ingredients, vec!["pepper"]);
    }

    #[test]
    fn test_deleted_recipes_leave_search_index() {
        let (_dir, db) = temp_db();
        let soup = db.create_recipe(draft("Soup", &["salt"])).unwrap();
        db.delete_recipe(&soup.id).unwrap();
        let page = db.search_recipes(&RecipeQuery::new().text("soup")).unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_autocomplete() {
        let (_dir, db) = temp_db();
        db.create_recipe(draft(
            "Bake",
            &["200g plain flour", "1 tsp baking powder", "butter", "sugar"],
        ))
        .unwrap();

        assert_eq!(
            db.autocomplete_ingredients("b", 10).unwrap(),
            vec!["baking powder", "butter"]
        );
        // canonical names match too
        assert_eq!(db.autocomplete_ingredients("FLO", 10).unwrap(), vec!["plain flour"]);
        assert_eq!(db.autocomplete_ingredients("b", 1).unwrap(), vec!["baking powder"]);
        assert!(db.autocomplete_ingredients("", 10).unwrap().is_empty());
        assert!(db.autocomplete_ingredients("%", 10).unwrap().is_empty());
    }
}
