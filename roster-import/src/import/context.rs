//! Per-job import context: shared state and knobs for one import run
//!
//! Explicit context object instead of process-wide globals; every test and
//! every job gets a fresh identity cache, registry, and stats.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::api::DirectoryApi;
use crate::validate::EmailDomainCheck;

use super::identity::IdentityCache;
use super::registry::GroupRegistry;
use super::stats::ImportStats;

/// Knobs for an import run
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Worker pool size override; per-sheet defaults apply when unset
    pub worker_count: Option<usize>,
    /// Only process rows whose `run_character` column matches
    pub run_character: Option<String>,
    /// Data rows to fast-forward past at the start of each sheet
    pub skip_rows: usize,
    /// Below this age a person must have a resolvable parent
    pub minor_age_threshold: i32,
    /// Persisted group map; `None` keeps the registry in memory only
    pub group_map_path: Option<PathBuf>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            worker_count: None,
            run_character: None,
            skip_rows: 0,
            minor_age_threshold: 14,
            group_map_path: Some(PathBuf::from("imported_groups.csv")),
        }
    }
}

/// Shared state for one import job, passed by reference to the scheduler
/// and pipelines
pub struct ImportContext {
    pub api: Arc<dyn DirectoryApi>,
    pub domains: Arc<dyn EmailDomainCheck>,
    pub identities: IdentityCache,
    pub groups: GroupRegistry,
    pub stats: ImportStats,
    pub options: ImportOptions,
}

impl ImportContext {
    pub fn new(
        api: Arc<dyn DirectoryApi>,
        domains: Arc<dyn EmailDomainCheck>,
        options: ImportOptions,
    ) -> Result<Self> {
        let groups = match &options.group_map_path {
            Some(path) => GroupRegistry::load(path)?,
            None => GroupRegistry::in_memory(),
        };
        Ok(Self {
            api,
            domains,
            identities: IdentityCache::new(),
            groups,
            stats: ImportStats::new(),
            options,
        })
    }

    /// Fresh context over a scripted directory, everything in memory
    #[cfg(test)]
    pub fn for_test(api: Arc<crate::api::testing::MockDirectory>) -> Arc<Self> {
        let options = ImportOptions {
            group_map_path: None,
            ..ImportOptions::default()
        };
        Arc::new(
            Self::new(api, Arc::new(crate::validate::AcceptAllDomains), options)
                .expect("in-memory context"),
        )
    }
}
