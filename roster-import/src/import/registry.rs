//! Group registry: display name -> remote id, persisted across runs
//!
//! Seeded from the append-only CSV map written by earlier runs, updated as
//! groups are created. The row-index map lets a resumed run skip rows whose
//! group already exists. Name collisions get a deterministic suffix, one
//! level deep.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::Mutex;

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, String>,
    by_row: HashMap<usize, String>,
}

/// Group name chosen after collision disambiguation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupName {
    pub title: String,
    /// Parent group implied by the rename (numbered teams nest under the
    /// matching club when one is registered)
    pub implied_parent: Option<String>,
}

impl GroupName {
    fn plain(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            implied_parent: None,
        }
    }
}

/// Shared map of imported groups, backed by an optional CSV file
pub struct GroupRegistry {
    inner: Mutex<RegistryInner>,
    path: Option<PathBuf>,
}

impl GroupRegistry {
    /// Registry with no persistence (tests, dry runs)
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            path: None,
        }
    }

    /// Load the registry from `path`, tolerating a missing file
    ///
    /// Each record is `row_index,group_name,uuid`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut inner = RegistryInner::default();

        if path.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&path)
                .with_context(|| format!("failed to open group map: {}", path.display()))?;
            for record in reader.records() {
                let record = record.context("malformed group map record")?;
                let (Some(row), Some(name), Some(uuid)) =
                    (record.get(0), record.get(1), record.get(2))
                else {
                    continue;
                };
                if let Ok(row) = row.trim().parse::<usize>() {
                    inner.by_row.insert(row, uuid.to_string());
                }
                inner.by_name.insert(name.to_string(), uuid.to_string());
            }
        }

        Ok(Self {
            inner: Mutex::new(inner),
            path: Some(path),
        })
    }

    pub async fn id_for_name(&self, name: &str) -> Option<String> {
        self.inner.lock().await.by_name.get(name).cloned()
    }

    pub async fn id_for_row(&self, row_index: usize) -> Option<String> {
        self.inner.lock().await.by_row.get(&row_index).cloned()
    }

    pub async fn contains_name(&self, name: &str) -> bool {
        self.inner.lock().await.by_name.contains_key(name)
    }

    /// Register a created group and append it to the persisted map
    pub async fn record(&self, row_index: usize, name: &str, uuid: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.by_name.insert(name.to_string(), uuid.to_string());
        inner.by_row.insert(row_index, uuid.to_string());

        // Appended under the registry lock so concurrent workers never
        // interleave records.
        if let Some(path) = &self.path {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to append group map: {}", path.display()))?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer.write_record([row_index.to_string().as_str(), name, uuid])?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Pick a collision-free name for an incoming group
    ///
    /// Applied only to the incoming row's own name (one level deep; a
    /// sub-group is never renamed because of its children):
    /// - no collision: unchanged
    /// - "Club": first free of "X Club", "X Club 1", "X Club 2", ...
    /// - "Team": "X Team" if free, otherwise the first free numeric suffix
    ///   "X 1", "X 2", ..., nested under the renamed club when one exists
    /// - any other type: first free numeric suffix
    pub async fn disambiguate(&self, name: &str, group_type: Option<&str>) -> GroupName {
        let inner = self.inner.lock().await;
        if !inner.by_name.contains_key(name) {
            return GroupName::plain(name);
        }

        match group_type {
            Some("Club") => {
                let suffixed = format!("{} Club", name);
                if !inner.by_name.contains_key(&suffixed) {
                    return GroupName::plain(suffixed);
                }
                GroupName::plain(first_free(&inner.by_name, &suffixed))
            }
            Some("Team") => {
                let suffixed = format!("{} Team", name);
                if !inner.by_name.contains_key(&suffixed) {
                    return GroupName::plain(suffixed);
                }
                let title = first_free(&inner.by_name, name);
                // Numbered teams nest under the club that prompted the
                // rename, when that club is registered.
                let implied_parent = [format!("{} Club 1", name), format!("{} Club", name)]
                    .into_iter()
                    .find(|club| inner.by_name.contains_key(club));
                GroupName {
                    title,
                    implied_parent,
                }
            }
            _ => GroupName::plain(first_free(&inner.by_name, name)),
        }
    }
}

/// First "base N" name not yet registered, N counting up from 1
fn first_free(by_name: &HashMap<String, String>, base: &str) -> String {
    let mut n = 1;
    loop {
        let candidate = format!("{} {}", base, n);
        if !by_name.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
