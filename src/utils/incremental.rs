// Incremental bundling support
// Content fingerprints, the module dependency graph and the on-disk module cache

use crate::core::models::CompiledModule;
use crate::utils::{KilnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const CACHE_FILE_NAME: &str = "bundle-cache.bin";
const CACHE_VERSION: u32 = 2;

/// BLAKE3 digest of a file's bytes, hex encoded
pub fn fingerprint(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Dependency graph for tracking module relationships
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Map from file path to its dependencies
    dependencies: HashMap<PathBuf, HashSet<PathBuf>>,
    /// Reverse map: dependents of each file
    dependents: HashMap<PathBuf, HashSet<PathBuf>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// `from` depends on `to`
    pub fn add_dependency(&mut self, from: PathBuf, to: PathBuf) {
        self.dependencies
            .entry(from.clone())
            .or_default()
            .insert(to.clone());

        self.dependents.entry(to).or_default().insert(from);
    }

    pub fn get_dependencies(&self, path: &Path) -> Option<&HashSet<PathBuf>> {
        self.dependencies.get(path)
    }

    pub fn get_dependents(&self, path: &Path) -> Option<&HashSet<PathBuf>> {
        self.dependents.get(path)
    }

    /// The changed file plus everything that transitively depends on it
    pub fn get_affected_files(&self, changed_file: &Path) -> HashSet<PathBuf> {
        let mut affected = HashSet::new();
        let mut to_process = vec![changed_file.to_path_buf()];

        while let Some(file) = to_process.pop() {
            if !affected.insert(file.clone()) {
                continue;
            }

            if let Some(dependents) = self.get_dependents(&file) {
                to_process.extend(
                    dependents
                        .iter()
                        .filter(|d| !affected.contains(*d))
                        .cloned(),
                );
            }
        }

        affected
    }

    /// Union of affected sets, sorted for stable reporting
    pub fn affected_by(&self, changed: &[PathBuf]) -> Vec<PathBuf> {
        let mut affected: Vec<PathBuf> = changed
            .iter()
            .flat_map(|file| self.get_affected_files(file))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        affected.sort();
        affected
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedModule {
    pub fingerprint: String,
    pub module: CompiledModule,
}

/// Everything remembered about one entry point
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryCache {
    /// Keyed by module id
    pub modules: HashMap<String, CachedModule>,
    pub last_bundle: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    /// Digest of the settings the modules were compiled with
    settings: String,
    entries: HashMap<String, EntryCache>,
}

/// Compiled modules keyed by entry point and module id, persisted with bincode.
/// A cache is only valid for the compile settings it was built with.
#[derive(Debug)]
pub struct IncrementalCache {
    path: PathBuf,
    settings: String,
    entries: HashMap<String, EntryCache>,
}

impl IncrementalCache {
    pub fn empty(path: PathBuf, settings: String) -> Self {
        Self {
            path,
            settings,
            entries: HashMap::new(),
        }
    }

    /// Load the cache at `path`. Anything unusable, or written under other
    /// compile settings, counts as an empty cache.
    pub async fn load(path: PathBuf, settings: String) -> Self {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("No bundle cache at {}: {}", path.display(), e);
                return Self::empty(path, settings);
            }
        };

        match bincode::deserialize::<CacheFile>(&bytes) {
            Ok(file) if file.version != CACHE_VERSION => {
                tracing::debug!(
                    "Discarding bundle cache version {} (expected {})",
                    file.version,
                    CACHE_VERSION
                );
                Self::empty(path, settings)
            }
            Ok(file) if file.settings != settings => {
                tracing::debug!("Discarding bundle cache built with other compile settings");
                Self::empty(path, settings)
            }
            Ok(file) => Self {
                path,
                settings,
                entries: file.entries,
            },
            Err(e) => {
                tracing::debug!("Discarding unreadable bundle cache {}: {}", path.display(), e);
                Self::empty(path, settings)
            }
        }
    }

    /// The cached compile of `module_id`, if its fingerprint still matches
    pub fn lookup(&self, entry_id: &str, module_id: &str, fingerprint: &str) -> Option<&CompiledModule> {
        self.entries
            .get(entry_id)?
            .modules
            .get(module_id)
            .filter(|cached| cached.fingerprint == fingerprint)
            .map(|cached| &cached.module)
    }

    pub fn store(&mut self, entry_id: &str, module_id: &str, fingerprint: String, module: CompiledModule) {
        self.entries
            .entry(entry_id.to_string())
            .or_default()
            .modules
            .insert(module_id.to_string(), CachedModule { fingerprint, module });
    }

    /// Drop modules that are no longer part of the entry's graph
    pub fn retain_modules(&mut self, entry_id: &str, live: &HashSet<String>) -> usize {
        match self.entries.get_mut(entry_id) {
            Some(entry) => {
                let before = entry.modules.len();
                entry.modules.retain(|id, _| live.contains(id));
                before - entry.modules.len()
            }
            None => 0,
        }
    }

    pub fn set_last_bundle(&mut self, entry_id: &str, bundle: String) {
        self.entries
            .entry(entry_id.to_string())
            .or_default()
            .last_bundle = Some(bundle);
    }

    /// Persist through a temp file and rename
    pub async fn save(&self) -> Result<()> {
        let file = CacheFile {
            version: CACHE_VERSION,
            settings: self.settings.clone(),
            entries: self.entries.clone(),
        };
        let bytes = bincode::serialize(&file)
            .map_err(|e| KilnError::Cache(format!("cannot encode bundle cache: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.path.with_extension("bin.tmp");
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}
