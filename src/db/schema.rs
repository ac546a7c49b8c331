pub const SCHEMA: &str = r#"
-- Recipes: scalar fields only, the ingredient list lives in recipe_ingredients
CREATE TABLE IF NOT EXISTS recipes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    method TEXT NOT NULL,
    photo_reference TEXT,
    created_at TEXT NOT NULL,   -- RFC 3339, UTC, microseconds
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recipes_updated_at ON recipes(updated_at);
CREATE INDEX IF NOT EXISTS idx_recipes_created_at ON recipes(created_at);
CREATE INDEX IF NOT EXISTS idx_recipes_name ON recipes(name);

-- Ingredients: display name is the natural key, canonical name drives dedup and filters
CREATE TABLE IF NOT EXISTS ingredients (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    canonical_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ingredients_canonical ON ingredients(canonical_name);

-- Ordered recipe -> ingredient links
CREATE TABLE IF NOT EXISTS recipe_ingredients (
    id TEXT PRIMARY KEY,
    recipe_id TEXT NOT NULL REFERENCES recipes(id),
    ingredient_id TEXT NOT NULL REFERENCES ingredients(id),
    quantity_text TEXT,
    sort_order INTEGER NOT NULL,
    UNIQUE (recipe_id, ingredient_id)
);

CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_ingredient ON recipe_ingredients(ingredient_id);
CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_order ON recipe_ingredients(recipe_id, sort_order);

-- Full-text index over recipe name and method
CREATE VIRTUAL TABLE IF NOT EXISTS recipe_search USING fts5(
    recipe_id UNINDEXED,
    name,
    method,
    tokenize = 'porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS recipes_search_insert AFTER INSERT ON recipes BEGIN
    INSERT INTO recipe_search (recipe_id, name, method) VALUES (new.id, new.name, new.method);
END;

CREATE TRIGGER IF NOT EXISTS recipes_search_delete AFTER DELETE ON recipes BEGIN
    DELETE FROM recipe_search WHERE recipe_id = old.id;
END;

CREATE TRIGGER IF NOT EXISTS recipes_search_update AFTER UPDATE OF id, name, method ON recipes BEGIN
    DELETE FROM recipe_search WHERE recipe_id = old.id;
    INSERT INTO recipe_search (recipe_id, name, method) VALUES (new.id, new.name, new.method);
END;

-- Stemmed index over canonical names for ingredient filters ("eggs" finds "egg")
CREATE VIRTUAL TABLE IF NOT EXISTS ingredient_search USING fts5(
    ingredient_id UNINDEXED,
    canonical_name,
    tokenize = 'porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS ingredients_search_insert AFTER INSERT ON ingredients BEGIN
    INSERT INTO ingredient_search (ingredient_id, canonical_name) VALUES (new.id, new.canonical_name);
END;

CREATE TRIGGER IF NOT EXISTS ingredients_search_delete AFTER DELETE ON ingredients BEGIN
    DELETE FROM ingredient_search WHERE ingredient_id = old.id;
END;

CREATE TRIGGER IF NOT EXISTS ingredients_search_update AFTER UPDATE OF id, canonical_name ON ingredients BEGIN
    DELETE FROM ingredient_search WHERE ingredient_id = old.id;
    INSERT INTO ingredient_search (ingredient_id, canonical_name) VALUES (new.id, new.canonical_name);
END;
"#;

/// Additive changes for stores created by earlier versions. Each statement is
/// attempted once per `initialize()`; failures mean it is already applied.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE recipes ADD COLUMN photo_reference TEXT",
    // Index rows written before the search tables existed
    r#"
    INSERT INTO recipe_search (recipe_id, name, method)
    SELECT id, name, method FROM recipes
    WHERE id NOT IN (SELECT recipe_id FROM recipe_search)
    "#,
    r#"
    INSERT INTO ingredient_search (ingredient_id, canonical_name)
    SELECT id, canonical_name FROM ingredients
    WHERE id NOT IN (SELECT ingredient_id FROM ingredient_search)
    "#,
];
