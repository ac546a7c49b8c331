use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use recipebox::config::Config;
use recipebox::export::{self, ExportFormat};
use recipebox::logging;
use recipebox::{Cookbook, Recipe, RecipeDraft, RecipeQuery};

/// Fields shared by `add` and `update`
#[derive(Debug, Default)]
struct RecipeArgs {
    name: Option<String>,
    method: Option<String>,
    ingredients: Vec<String>,
    photo: Option<String>,
}

impl RecipeArgs {
    fn into_draft(self) -> RecipeDraft {
        let mut draft = RecipeDraft::new(
            self.name.unwrap_or_default(),
            self.method.unwrap_or_default(),
        )
        .with_ingredients(self.ingredients);
        draft.photo_reference = self.photo;
        draft
    }
}

#[derive(Debug)]
enum Command {
    Add(RecipeArgs),
    Update { id: String, recipe: RecipeArgs },
    Show { id: String },
    Delete { id: String },
    List(RecipeQuery),
    Ingredients { prefix: String },
    Export { path: PathBuf, format: Option<ExportFormat> },
    Import { path: PathBuf },
    MigrateLegacy { path: PathBuf },
    Verify,
    RefreshCanonical,
    Extract { image: PathBuf, save: bool },
}

#[derive(Debug)]
struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

fn take_value(args: &[String], i: &mut usize) -> Result<String> {
    let flag = &args[*i];
    *i += 1;
    match args.get(*i) {
        Some(value) => Ok(value.clone()),
        None => bail!("{} requires a value", flag),
    }
}

fn take_positional(args: &[String], i: &mut usize, what: &str) -> Result<String> {
    match args.get(*i) {
        Some(value) if !value.starts_with("--") => {
            *i += 1;
            Ok(value.clone())
        }
        _ => bail!("missing {}", what),
    }
}

fn parse_recipe_args(args: &[String], i: &mut usize) -> Result<RecipeArgs> {
    let mut recipe = RecipeArgs::default();
    while *i < args.len() {
        match args[*i].as_str() {
            "--name" | "-n" => recipe.name = Some(take_value(args, i)?),
            "--method" | "-m" => recipe.method = Some(take_value(args, i)?),
            "--ingredient" | "-i" => recipe.ingredients.push(take_value(args, i)?),
            "--photo" | "-p" => recipe.photo = Some(take_value(args, i)?),
            other => bail!("Unknown argument: {}", other),
        }
        *i += 1;
    }
    Ok(recipe)
}

fn parse_query_args(args: &[String], i: &mut usize) -> Result<RecipeQuery> {
    let mut query = RecipeQuery::new();
    while *i < args.len() {
        match args[*i].as_str() {
            "--query" | "-q" => query.text = Some(take_value(args, i)?),
            "--ingredient" | "-i" => query.ingredients.push(take_value(args, i)?),
            "--page" => {
                query.page = take_value(args, i)?.parse().context("--page expects a number")?
            }
            "--page-size" => {
                query.page_size = take_value(args, i)?
                    .parse()
                    .context("--page-size expects a number")?
            }
            other => bail!("Unknown argument: {}", other),
        }
        *i += 1;
    }
    Ok(query)
}

fn parse_args() -> Result<Cli> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() && args[i].starts_with('-') {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("recipebox {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => config_path = Some(PathBuf::from(take_value(&args, &mut i)?)),
            other => bail!("Unknown argument: {}", other),
        }
        i += 1;
    }

    let Some(name) = args.get(i).cloned() else {
        print_help();
        std::process::exit(1);
    };
    i += 1;

    let command = match name.as_str() {
        "add" => Command::Add(parse_recipe_args(&args, &mut i)?),
        "update" => {
            let id = take_positional(&args, &mut i, "recipe id")?;
            Command::Update {
                id,
                recipe: parse_recipe_args(&args, &mut i)?,
            }
        }
        "show" => Command::Show {
            id: take_positional(&args, &mut i, "recipe id")?,
        },
        "delete" => Command::Delete {
            id: take_positional(&args, &mut i, "recipe id")?,
        },
        "list" => Command::List(parse_query_args(&args, &mut i)?),
        "ingredients" => Command::Ingredients {
            prefix: take_positional(&args, &mut i, "prefix")?,
        },
        "export" => {
            let path = PathBuf::from(take_positional(&args, &mut i, "output path")?);
            let mut format = None;
            while i < args.len() {
                match args[i].as_str() {
                    "--format" | "-f" => {
                        format = Some(ExportFormat::parse(&take_value(&args, &mut i)?)?)
                    }
                    other => bail!("Unknown argument: {}", other),
                }
                i += 1;
            }
            Command::Export { path, format }
        }
        "import" => Command::Import {
            path: PathBuf::from(take_positional(&args, &mut i, "bundle path")?),
        },
        "migrate-legacy" => Command::MigrateLegacy {
            path: PathBuf::from(take_positional(&args, &mut i, "legacy store path")?),
        },
        "verify" => Command::Verify,
        "refresh-canonical" => Command::RefreshCanonical,
        "extract" => {
            let image = PathBuf::from(take_positional(&args, &mut i, "image path")?);
            let save = args.get(i).map(String::as_str) == Some("--save");
            if save {
                i += 1;
            }
            Command::Extract { image, save }
        }
        other => bail!("Unknown command: {}", other),
    };

    if let Some(extra) = args.get(i) {
        bail!("Unexpected argument: {}", extra);
    }

    Ok(Cli {
        config_path,
        command,
    })
}

fn print_help() {
    println!(
        r#"recipebox - recipe store with ingredient normalization

USAGE:
    recipebox [OPTIONS] <COMMAND>

COMMANDS:
    add --name N --method M [--ingredient LINE]... [--photo REF]
    update ID [--name N] [--method M] [--ingredient LINE]... [--photo REF]
    show ID
    delete ID
    list [--query TEXT] [--ingredient TERM]... [--page N] [--page-size N]
    ingredients PREFIX            Autocomplete ingredient names
    export PATH [--format json|csv]
    import PATH                   Merge a JSON bundle into the store
    migrate-legacy PATH           Copy a legacy key/value store into the store
    verify                        Recount rows and look for orphaned links
    refresh-canonical             Recompute canonical ingredient names
    extract IMAGE [--save]        Read a recipe from a photo

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    RECIPEBOX_CONFIG    Path to config file (overrides default location)
    RECIPEBOX_LOG       Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/recipebox/config.toml"#
    );
}

fn print_recipe(recipe: &Recipe) {
    println!("{}  ({})", recipe.name, recipe.id);
    if let Some(photo) = &recipe.photo_reference {
        println!("photo: {}", photo);
    }
    println!(
        "created {}  updated {}",
        recipe.created_at.to_rfc3339(),
        recipe.updated_at.to_rfc3339()
    );
    println!();
    for line in &recipe.ingredients {
        println!("  - {}", line);
    }
    println!();
    println!("{}", recipe.method);
}

fn image_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

fn run(cookbook: &Cookbook, command: Command) -> Result<()> {
    match command {
        Command::Add(recipe) => {
            let saved = cookbook.create(recipe.into_draft())?;
            println!("Created {}", saved.id);
        }
        Command::Update { id, recipe } => {
            let existing = cookbook
                .get(&id)?
                .with_context(|| format!("No recipe with id {}", id))?;
            let draft = RecipeDraft {
                name: recipe.name.unwrap_or(existing.name),
                method: recipe.method.unwrap_or(existing.method),
                ingredients: if recipe.ingredients.is_empty() {
                    existing.ingredients
                } else {
                    recipe.ingredients
                },
                photo_reference: recipe.photo,
                ..Default::default()
            };
            let saved = cookbook.update(&id, draft)?;
            println!("Updated {}", saved.id);
        }
        Command::Show { id } => match cookbook.get(&id)? {
            Some(recipe) => print_recipe(&recipe),
            None => bail!("No recipe with id {}", id),
        },
        Command::Delete { id } => {
            if cookbook.delete(&id)? {
                println!("Deleted {}", id);
            } else {
                println!("Nothing to delete for {}", id);
            }
        }
        Command::List(query) => {
            let page = cookbook.search(&query)?;
            for recipe in &page.recipes {
                println!("{}  {}", recipe.id, recipe.name);
            }
            println!(
                "page {}/{} ({} recipes)",
                page.page,
                page.total_pages.max(1),
                page.total
            );
        }
        Command::Ingredients { prefix } => {
            for name in cookbook.autocomplete(&prefix)? {
                println!("{}", name);
            }
        }
        Command::Export { path, format } => {
            let format = format.unwrap_or_else(|| ExportFormat::from_path(&path));
            let count = export::export_recipes(cookbook.database(), &path, format)?;
            println!("Exported {} recipes to {:?} as {}", count, path, format.name());
        }
        Command::Import { path } => {
            let bundle = export::read_bundle(&path)?;
            let summary = cookbook.import(&bundle)?;
            println!(
                "Imported {} recipes ({} new), {} ingredients ({} new), {} links ({} already present)",
                summary.imported_recipes,
                summary.created_recipes,
                summary.imported_ingredients,
                summary.created_ingredients,
                summary.imported_links,
                summary.skipped_links
            );
        }
        Command::MigrateLegacy { path } => {
            let report = cookbook.migrate_legacy(&path)?;
            println!(
                "Migrated {} legacy recipes: store now has {} recipes, {} ingredients, {} links",
                report.legacy_recipes,
                report.verification.recipes,
                report.verification.ingredients,
                report.verification.links
            );
            if !report.is_complete() {
                bail!(
                    "Verification failed: {} orphaned links",
                    report.verification.orphaned_links.len()
                );
            }
        }
        Command::Verify => {
            let report = cookbook.verify()?;
            println!(
                "{} recipes, {} ingredients, {} links",
                report.recipes, report.ingredients, report.links
            );
            if !report.is_consistent() {
                for id in &report.orphaned_links {
                    println!("orphaned link {}", id);
                }
                bail!("{} orphaned links", report.orphaned_links.len());
            }
        }
        Command::RefreshCanonical => {
            let changed = cookbook.refresh_canonical_names()?;
            println!("Updated {} canonical names", changed);
        }
        Command::Extract { image, save } => {
            let bytes =
                std::fs::read(&image).with_context(|| format!("Failed to read {:?}", image))?;
            let draft = cookbook.draft_from_photo(&bytes, image_mime_type(&image))?;
            println!("{}", draft.name);
            for line in &draft.ingredients {
                println!("  - {}", line);
            }
            println!("{}", draft.method);
            if save {
                let saved = cookbook.create(draft)?;
                println!("Created {}", saved.id);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run `recipebox --help` for usage.");
            std::process::exit(1);
        }
    };

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match cli.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let cookbook = Cookbook::from_config(&config)
        .with_context(|| format!("Failed to open store at {:?}", config.db_path()))?;

    run(&cookbook, cli.command)
}
