//! Project root resolution.
//!
//! All paths are normalised to forward slashes and lexically cleaned of `.`
//! and `..` components before they are compared, so `src/../bin` and `bin`
//! are the same directory.

use crate::core::models::BuildConfig;
use crate::utils::{KilnError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

static REPEATED_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
    source_root: PathBuf,
    output_root: PathBuf,
}

impl ProjectPaths {
    /// Resolve paths against an explicit project root. Relative roots are
    /// taken relative to the working directory.
    pub fn resolve(root: &Path, config: &BuildConfig) -> Result<Self> {
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            working_dir()?.join(root)
        };

        let root = normalize(&root);
        let source_root = normalize(&root.join(&config.source_dir));
        let output_root = normalize(&root.join(&config.output_dir));

        let paths = Self {
            root,
            source_root,
            output_root,
        };
        paths.validate()?;
        Ok(paths)
    }

    fn validate(&self) -> Result<()> {
        for (label, dir) in [("source", &self.source_root), ("output", &self.output_root)] {
            if dir == &self.root || !dir.starts_with(&self.root) {
                return Err(KilnError::InvalidPath(format!(
                    "{} directory {} must be a subdirectory of the project root {}",
                    label,
                    dir.display(),
                    self.root.display()
                )));
            }
        }

        // Cleaning the output root must never reach the sources
        if self.source_root.starts_with(&self.output_root) {
            return Err(KilnError::InvalidPath(format!(
                "output directory {} contains the source directory {}",
                self.output_root.display(),
                self.source_root.display()
            )));
        }
        if self.output_root.starts_with(&self.source_root) {
            return Err(KilnError::InvalidPath(format!(
                "output directory {} is inside the source directory {}",
                self.output_root.display(),
                self.source_root.display()
            )));
        }

        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Map a file under the source root to the same relative path under the
    /// output root
    pub fn output_path_for(&self, source_file: &Path) -> Option<PathBuf> {
        source_file
            .strip_prefix(&self.source_root)
            .ok()
            .map(|relative| self.output_root.join(relative))
    }

    /// Forward-slash path relative to the source root, used as module id.
    /// Files elsewhere in the project (installed packages, sibling folders)
    /// climb out with `../`, so no two files share an id.
    pub fn module_id(&self, source_file: &Path) -> String {
        let source_file = normalize(source_file);
        if let Ok(relative) = source_file.strip_prefix(&self.source_root) {
            return to_slash(relative);
        }

        if !source_file.starts_with(&self.root) {
            return to_slash(&source_file);
        }

        let shared = self
            .source_root
            .components()
            .zip(source_file.components())
            .take_while(|(a, b)| a == b)
            .count();
        let climb = self.source_root.components().count() - shared;
        let rest: PathBuf = source_file.components().skip(shared).collect();
        format!("{}{}", "../".repeat(climb), to_slash(&rest))
    }

    /// Short display form relative to the project root
    pub fn display(&self, path: &Path) -> String {
        to_slash(path.strip_prefix(&self.root).unwrap_or(path))
    }
}

/// The process working directory; failing to read it is a setup error
pub fn working_dir() -> Result<PathBuf> {
    std::env::current_dir()
        .map_err(|e| KilnError::InvalidPath(format!("cannot determine working directory: {}", e)))
}

/// Render a path with forward slashes only
pub fn to_slash(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    REPEATED_SLASHES.replace_all(&raw, "/").into_owned()
}

/// Canonical separators plus lexical `.`/`..` folding; never touches the disk
pub fn normalize(path: &Path) -> PathBuf {
    let slashed = PathBuf::from(to_slash(path));
    let mut out = PathBuf::new();

    for component in slashed.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }

    out
}
