use crate::core::models::*;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    /// Every file below `path`, recursively, dotfiles included, sorted. An
    /// unreadable directory is recorded and the walk goes on; a missing
    /// `path` scans as empty.
    async fn scan_directory(&self, path: &Path) -> DirectoryScan;
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;
    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;
    /// Write through a sibling temp file and rename, so readers never observe
    /// a partially written file
    async fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()>;
    async fn create_directory(&self, path: &Path) -> Result<()>;
    /// Remove a file; a missing file is not an error
    async fn remove_file(&self, path: &Path) -> Result<()>;
    /// Force-delete everything below `path` and return how many top-level
    /// entries were removed. A missing directory counts as clean.
    async fn clear_directory(&self, path: &Path) -> Result<usize>;
    fn file_exists(&self, path: &Path) -> bool;
}

/// One stage of the transform chain (transpile, strip comments, minify)
pub trait Transform: Send + Sync {
    fn stage(&self) -> StageKind;

    fn applies_to(&self, path: &Path) -> bool;

    /// Where the output of this stage should be written
    fn output_path(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }

    fn apply(&self, source: &str, path: &Path) -> Result<String>;
}

/// Something the watch loop can re-run on every detected change
#[async_trait]
pub trait BuildService: Send + Sync {
    async fn rebuild(&self) -> Result<BuildOutcome>;
}
