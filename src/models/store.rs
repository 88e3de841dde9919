use crate::error::StoreError;
use crate::models::tags::{TagCount, collect_tags, parse_tags};
use crate::models::{Snippet, StorageManager};
use chrono::Utc;

/// Which fields must be non-blank for a snippet to be saved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub require_non_empty_code: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            require_non_empty_code: true,
        }
    }
}

impl ValidationPolicy {
    pub fn check(&self, title: &str, code: &str) -> Result<(), StoreError> {
        if title.trim().is_empty() {
            return Err(StoreError::validation("Title cannot be empty"));
        }
        if self.require_non_empty_code && code.trim().is_empty() {
            return Err(StoreError::validation("Code cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadReport {
    /// No data file yet.
    Fresh,
    Loaded { count: usize, migrated: usize },
}

/// Result of a mutation that was applied in memory. `persisted` carries the
/// outcome of writing the new sequence to disk; memory is never rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Change {
    pub id: i64,
    pub persisted: Result<(), StoreError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct ImportSummary {
    pub added: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub persisted: Result<(), StoreError>,
}

/// Owns the snippet sequence, newest first, and keeps the data file in step with it.
#[derive(Debug)]
pub struct SnippetStore {
    snippets: Vec<Snippet>,
    storage: StorageManager,
    policy: ValidationPolicy,
}

impl SnippetStore {
    pub fn new(storage: StorageManager, policy: ValidationPolicy) -> Self {
        Self {
            snippets: Vec::new(),
            storage,
            policy,
        }
    }

    /// Loads the data file. On failure the store is left empty.
    pub fn load(&mut self) -> Result<LoadReport, StoreError> {
        match self.storage.load_snippets() {
            Ok(None) => {
                self.snippets = Vec::new();
                tracing::info!(file = %self.storage.database_file().display(), "no data file yet");
                Ok(LoadReport::Fresh)
            }
            Ok(Some(loaded)) => {
                let count = loaded.snippets.len();
                self.snippets = loaded.snippets;
                tracing::info!(count, migrated = loaded.migrated, "snippets loaded");
                Ok(LoadReport::Loaded {
                    count,
                    migrated: loaded.migrated,
                })
            }
            Err(e) => {
                self.snippets = Vec::new();
                tracing::error!(error = %e, "failed to load snippets");
                Err(e)
            }
        }
    }

    pub fn snippets(&self) -> &[Snippet] {
        &self.snippets
    }

    pub fn get(&self, id: i64) -> Option<&Snippet> {
        self.snippets.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Distinct tags with usage counts, in order of first appearance.
    pub fn tags(&self) -> Vec<TagCount> {
        collect_tags(&self.snippets)
    }

    pub fn create(
        &mut self,
        title: &str,
        code: &str,
        language: &str,
        tags_input: &str,
    ) -> Result<Change, StoreError> {
        self.policy.check(title, code)?;

        let id = self.next_id();
        let snippet = Snippet::new(id, title.trim(), code, language, tags_input);
        self.snippets.insert(0, snippet);
        tracing::debug!(id, "snippet created");

        Ok(Change {
            id,
            persisted: self.persist(),
        })
    }

    /// Replaces the snippet in place. Returns `Ok(None)` if no snippet has this id.
    pub fn update(
        &mut self,
        id: i64,
        title: &str,
        code: &str,
        language: &str,
        tags_input: &str,
    ) -> Result<Option<Change>, StoreError> {
        self.policy.check(title, code)?;

        let Some(snippet) = self.snippets.iter_mut().find(|s| s.id == id) else {
            tracing::debug!(id, "update ignored, snippet not found");
            return Ok(None);
        };

        snippet.title = title.trim().to_string();
        snippet.code = code.to_string();
        snippet.language = language.to_string();
        snippet.tags = parse_tags(tags_input);
        tracing::debug!(id, "snippet updated");

        Ok(Some(Change {
            id,
            persisted: self.persist(),
        }))
    }

    /// Removes the snippet. Returns `None` if no snippet has this id.
    pub fn delete(&mut self, id: i64) -> Option<Change> {
        let index = self.snippets.iter().position(|s| s.id == id)?;
        self.snippets.remove(index);
        tracing::debug!(id, "snippet deleted");

        Some(Change {
            id,
            persisted: self.persist(),
        })
    }

    /// Writes the full sequence to disk.
    pub fn persist(&self) -> Result<(), StoreError> {
        let result = self.storage.save_snippets(&self.snippets);
        match &result {
            Ok(()) => tracing::debug!(count = self.snippets.len(), "snippets saved"),
            Err(e) => tracing::error!(error = %e, "failed to save snippets"),
        }
        result
    }

    /// Merges snippets from an export. New ids are slotted in by id so the
    /// newest-first order holds without moving existing records.
    pub fn merge_import(&mut self, incoming: Vec<Snippet>, overwrite: bool) -> ImportSummary {
        let mut added = 0;
        let mut replaced = 0;
        let mut skipped = 0;

        for snippet in incoming {
            if self.policy.check(&snippet.title, &snippet.code).is_err() {
                skipped += 1;
                continue;
            }

            match self.snippets.iter_mut().find(|s| s.id == snippet.id) {
                Some(existing) if overwrite => {
                    *existing = snippet;
                    replaced += 1;
                }
                Some(_) => skipped += 1,
                None => {
                    let position = self
                        .snippets
                        .iter()
                        .position(|s| s.id < snippet.id)
                        .unwrap_or(self.snippets.len());
                    self.snippets.insert(position, snippet);
                    added += 1;
                }
            }
        }

        let persisted = if added + replaced > 0 {
            self.persist()
        } else {
            Ok(())
        };

        ImportSummary {
            added,
            replaced,
            skipped,
            persisted,
        }
    }

    /// Creation time in millis, bumped past the newest id when two creates
    /// land in the same millisecond. When the newest id is `i64::MAX` the
    /// first free id at or below the current time is used instead.
    fn next_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let Some(max) = self.snippets.iter().map(|s| s.id).max() else {
            return now;
        };
        if max < now {
            return now;
        }

        max.checked_add(1).unwrap_or_else(|| {
            (i64::MIN..=now)
                .rev()
                .find(|id| self.get(*id).is_none())
                .unwrap_or(i64::MIN)
        })
    }
}
