use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::db::{Bundle, Database, Recipe};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full bundle, importable.
    Json,
    /// One row per recipe, for spreadsheets.
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("Unknown export format: {}", other),
        }
    }

    /// Guesses from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

/// Flat recipe row for CSV export
#[derive(Debug, Serialize)]
struct CsvRecipe<'a> {
    id: &'a str,
    name: &'a str,
    method: &'a str,
    photo_reference: &'a str,
    ingredients: String,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a Recipe> for CsvRecipe<'a> {
    fn from(recipe: &'a Recipe) -> Self {
        Self {
            id: &recipe.id,
            name: &recipe.name,
            method: &recipe.method,
            photo_reference: recipe.photo_reference.as_deref().unwrap_or(""),
            ingredients: recipe.ingredients.join("; "),
            created_at: recipe.created_at.to_rfc3339(),
            updated_at: recipe.updated_at.to_rfc3339(),
        }
    }
}

/// Export the whole store to a file. Returns the number of recipes written.
pub fn export_recipes(db: &Database, output_path: &Path, format: ExportFormat) -> Result<usize> {
    let bundle = db.export_bundle().context("Failed to read store for export")?;
    let count = bundle.recipes.len();

    match format {
        ExportFormat::Json => export_json(&bundle, output_path)?,
        ExportFormat::Csv => export_csv(&bundle.recipes, output_path)?,
    }

    tracing::info!(
        recipes = count,
        format = format.name(),
        path = ?output_path,
        "Export written"
    );
    Ok(count)
}

fn export_json(bundle: &Bundle, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {:?}", output_path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, bundle)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn export_csv(recipes: &[Recipe], output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {:?}", output_path))?;
    for recipe in recipes {
        writer.serialize(CsvRecipe::from(recipe))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a JSON bundle written by [`export_recipes`].
pub fn read_bundle(path: &Path) -> Result<Bundle> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let bundle = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{:?} is not a recipe bundle", path))?;
    Ok(bundle)
}
