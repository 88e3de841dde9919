use crate::error::StoreError;
use crate::models::Snippet;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_FILE_NAME: &str = "devmind_data.json";

/// Snippets read back from disk after the schema repair pass
#[derive(Debug, Clone, PartialEq)]
pub struct MigratedSnippets {
    pub snippets: Vec<Snippet>,
    /// Number of records whose `tags` had to be repaired.
    pub migrated: usize,
}

/// Storage Manager for the single JSON data file
#[derive(Debug, Clone)]
pub struct StorageManager {
    database_file: PathBuf,
}

impl StorageManager {
    pub fn new(database_file: impl Into<PathBuf>) -> Self {
        Self {
            database_file: database_file.into(),
        }
    }

    /// Default location: `devmind_data.json` in the user's Documents folder,
    /// or in the platform data directory when there is none.
    pub fn default_database_file() -> Result<PathBuf> {
        if let Some(documents) = dirs::document_dir() {
            return Ok(documents.join(DATA_FILE_NAME));
        }

        let data_dir = dirs::data_dir()
            .context("Failed to get data directory")?
            .join("devmind");
        Ok(data_dir.join(DATA_FILE_NAME))
    }

    pub fn database_file(&self) -> &Path {
        &self.database_file
    }

    /// Reads and migrates the data file. `Ok(None)` means there is no file yet.
    pub fn load_snippets(&self) -> Result<Option<MigratedSnippets>, StoreError> {
        if !self.database_file.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.database_file).map_err(|e| {
            StoreError::Load(format!(
                "failed to read {}: {}",
                self.database_file.display(),
                e
            ))
        })?;

        let value: Value = serde_json::from_str(&content)
            .map_err(|e| StoreError::Load(format!("failed to parse data file: {}", e)))?;

        migrate_value(value).map(Some).map_err(StoreError::Load)
    }

    /// Serializes the whole sequence. The file is written next to the target
    /// and renamed over it so a failed write never leaves a truncated file.
    pub fn save_snippets(&self, snippets: &[Snippet]) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(snippets)
            .map_err(|e| StoreError::Save(format!("failed to serialize snippets: {}", e)))?;

        if let Some(parent) = self.database_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Save(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let tmp_file = self.database_file.with_extension("json.tmp");
        fs::write(&tmp_file, content).map_err(|e| {
            StoreError::Save(format!("failed to write {}: {}", tmp_file.display(), e))
        })?;

        if let Err(e) = fs::rename(&tmp_file, &self.database_file) {
            let _ = fs::remove_file(&tmp_file);
            return Err(StoreError::Save(format!(
                "failed to replace {}: {}",
                self.database_file.display(),
                e
            )));
        }

        Ok(())
    }

    /// Backup the data file to a timestamped copy in a `backups` folder beside it
    pub fn backup_database(&self) -> Result<PathBuf> {
        if !self.database_file.exists() {
            return Err(anyhow::anyhow!(
                "Nothing to back up: {} does not exist",
                self.database_file.display()
            ));
        }

        let backup_dir = self
            .database_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("backups");
        fs::create_dir_all(&backup_dir).context("Failed to create backup directory")?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let backup_file = backup_dir.join(format!("backup_{}.json", timestamp));

        fs::copy(&self.database_file, &backup_file).context("Failed to copy data file")?;

        Ok(backup_file)
    }
}

/// Turns a parsed JSON document into snippets, repairing records written
/// before tags existed. Fails if the document is not an array of snippet-shaped objects.
pub fn migrate_value(value: Value) -> std::result::Result<MigratedSnippets, String> {
    let Value::Array(records) = value else {
        return Err("expected a JSON array of snippets".to_string());
    };

    let mut migrated = 0;
    let mut seen_ids = HashSet::new();
    let mut snippets = Vec::with_capacity(records.len());

    for (index, mut record) in records.into_iter().enumerate() {
        if repair_tags(&mut record) {
            migrated += 1;
        }

        let snippet: Snippet = serde_json::from_value(record)
            .map_err(|e| format!("record {} is not a valid snippet: {}", index, e))?;

        if !seen_ids.insert(snippet.id) {
            tracing::warn!(id = snippet.id, "dropping snippet with duplicate id");
            continue;
        }

        snippets.push(snippet);
    }

    Ok(MigratedSnippets { snippets, migrated })
}

/// Backfills `tags` on a single record. Returns true when the record changed.
fn repair_tags(record: &mut Value) -> bool {
    let Some(fields) = record.as_object_mut() else {
        return false;
    };

    let replacement = match fields.get("tags") {
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => {
            let cleaned: Vec<Value> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(|tag| Value::String(tag.to_string()))
                .collect();

            if &cleaned == items {
                return false;
            }
            cleaned
        }
        _ => Vec::new(),
    };

    fields.insert("tags".to_string(), Value::Array(replacement));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn storage_in(dir: &TempDir) -> StorageManager {
        StorageManager::new(dir.path().join(DATA_FILE_NAME))
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(storage_in(&dir).load_snippets().unwrap(), None);
    }

    #[test]
    fn test_records_without_tags_get_empty_tags() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        fs::write(
            storage.database_file(),
            r#"[{"id":2,"title":"Old","code":"select 1","language":"sql"},
               {"id":1,"title":"Tagged","code":"x","language":"js","tags":["a","b"]}]"#,
        )
        .unwrap();

        let loaded = storage.load_snippets().unwrap().unwrap();
        assert_eq!(loaded.migrated, 1);
        assert!(loaded.snippets[0].tags.is_empty());
        assert_eq!(loaded.snippets[1].tags, vec!["a", "b"]);
    }

    #[test]
    fn test_improper_tags_are_replaced() {
        let migrated = migrate_value(json!([
            {"id": 3, "title": "a", "code": "", "language": "js", "tags": "x,y"},
            {"id": 2, "title": "b", "code": "", "language": "js", "tags": null},
            {"id": 1, "title": "c", "code": "", "language": "js", "tags": [1, "x"]},
        ]))
        .unwrap();

        assert_eq!(migrated.migrated, 3);
        assert!(migrated.snippets.iter().all(|s| s.tags.is_empty()));
    }

    #[test]
    fn test_blank_tags_are_scrubbed() {
        let migrated = migrate_value(json!([
            {"id": 1, "title": "a", "code": "", "language": "js", "tags": [" x ", "  ", "y"]},
        ]))
        .unwrap();
        assert_eq!(migrated.snippets[0].tags, vec!["x", "y"]);
        assert_eq!(migrated.migrated, 1);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let migrated = migrate_value(json!([
            {"id": 1, "title": "first", "code": "", "language": "js", "tags": []},
            {"id": 1, "title": "second", "code": "", "language": "js", "tags": []},
        ]))
        .unwrap();
        assert_eq!(migrated.snippets.len(), 1);
        assert_eq!(migrated.snippets[0].title, "first");
    }

    #[test]
    fn test_unknown_keys_are_tolerated() {
        let migrated = migrate_value(json!([
            {"id": 1, "title": "a", "code": "", "language": "js", "favorite": true},
        ]))
        .unwrap();
        assert_eq!(migrated.snippets[0].title, "a");
    }

    #[test]
    fn test_corrupt_file_is_load_error() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        fs::write(storage.database_file(), "{not json").unwrap();
        assert!(matches!(storage.load_snippets(), Err(StoreError::Load(_))));

        fs::write(storage.database_file(), r#"{"id": 1}"#).unwrap();
        assert!(matches!(storage.load_snippets(), Err(StoreError::Load(_))));

        fs::write(storage.database_file(), r#"[{"id": 1, "title": "no code"}]"#).unwrap();
        assert!(matches!(storage.load_snippets(), Err(StoreError::Load(_))));
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::new(dir.path().join("nested").join(DATA_FILE_NAME));
        let snippets = vec![
            Snippet::new(2, "B", "print(1)", "python", "y, z"),
            Snippet::new(1, "A", "", "javascript", "x"),
        ];

        storage.save_snippets(&snippets).unwrap();
        let loaded = storage.load_snippets().unwrap().unwrap();

        assert_eq!(loaded.snippets, snippets);
        assert_eq!(loaded.migrated, 0);
        assert!(!storage.database_file().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_into_directory_fails() {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::new(dir.path());
        let result = storage.save_snippets(&[]);
        assert!(matches!(result, Err(StoreError::Save(_))));
    }

    #[test]
    fn test_backup_copies_data_file() {
        let dir = TempDir::new().unwrap();
        let storage = storage_in(&dir);
        assert!(storage.backup_database().is_err());

        storage
            .save_snippets(&[Snippet::new(1, "A", "a", "js", "")])
            .unwrap();
        let backup = storage.backup_database().unwrap();

        assert!(backup.starts_with(dir.path().join("backups")));
        assert_eq!(
            fs::read_to_string(backup).unwrap(),
            fs::read_to_string(storage.database_file()).unwrap()
        );
    }
}
