use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Snippet;
use crate::models::storage::migrate_value;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Yaml,
}

impl ExportFormat {
    /// Picks the format from a file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ExportFormat::Yaml,
            _ => ExportFormat::Json,
        }
    }
}

/// Export file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub snippets: Vec<Snippet>,
}

impl ExportData {
    pub fn from_snippets(snippets: &[Snippet]) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            snippets: snippets.to_vec(),
        }
    }
}

/// Export snippets to a file
pub fn export_snippets(snippets: &[Snippet], path: &Path, format: ExportFormat) -> Result<()> {
    let export_data = ExportData::from_snippets(snippets);

    let content = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&export_data)
            .context("Failed to serialize snippets to JSON")?,
        ExportFormat::Yaml => {
            serde_yaml::to_string(&export_data).context("Failed to serialize snippets to YAML")?
        }
    };

    fs::write(path, content).context("Failed to write export file")?;
    Ok(())
}

/// Import snippets from an export file. Records go through the same tags
/// repair as the data file, so exports from older versions still load.
pub fn import_snippets(path: &Path) -> Result<Vec<Snippet>> {
    let contents = fs::read_to_string(path).context("Failed to read import file")?;

    let document: serde_json::Value = match ExportFormat::from_path(path) {
        ExportFormat::Yaml => {
            serde_yaml::from_str(&contents).context("Failed to parse YAML import file")?
        }
        ExportFormat::Json => match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(_) => serde_yaml::from_str(&contents)
                .context("Failed to parse import file as JSON or YAML")?,
        },
    };

    // A bare data file is accepted as well as a full export document.
    let records = match document {
        serde_json::Value::Object(mut fields) => fields
            .remove("snippets")
            .context("Import file has no snippets")?,
        other => other,
    };

    let migrated = migrate_value(records).map_err(|e| anyhow::anyhow!(e))?;
    Ok(migrated.snippets)
}
