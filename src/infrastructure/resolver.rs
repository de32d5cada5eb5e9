use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::paths::normalize;

/// The parts of a package.json the resolver reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub main: Option<String>,
}

/// Node.js-style module resolution for the bundle variant
pub struct ModuleResolver {
    project_root: PathBuf,
    source_root: PathBuf,
    extensions: Vec<String>,
    package_cache: HashMap<PathBuf, Option<PackageJson>>,
}

impl ModuleResolver {
    pub fn new(project_root: &Path, source_root: &Path, extensions: &[String]) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            source_root: source_root.to_path_buf(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect(),
            package_cache: HashMap::new(),
        }
    }

    /// Forget cached package.json files, e.g. between watch rebuilds
    pub fn clear_cache(&mut self) {
        self.package_cache.clear();
    }

    /// Resolve `specifier` as requested from the module at `from_file`
    pub async fn resolve(&mut self, specifier: &str, from_file: &Path) -> Option<PathBuf> {
        if specifier.is_empty() {
            return None;
        }

        // Handle relative imports
        if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".." {
            let base = from_file.parent()?;
            return self.resolve_file_or_directory(&normalize(&base.join(specifier))).await;
        }

        // Root-absolute imports are anchored at the source root
        if let Some(rest) = specifier.strip_prefix('/') {
            return self.resolve_file_or_directory(&normalize(&self.source_root.join(rest))).await;
        }

        self.resolve_node_module(specifier, from_file).await
    }

    /// Walk up from the requesting file to the project root looking for
    /// `node_modules/<package>`
    async fn resolve_node_module(&mut self, specifier: &str, from_file: &Path) -> Option<PathBuf> {
        let (package_name, subpath) = parse_package_specifier(specifier);
        let mut current_dir = from_file.parent()?;

        loop {
            let package_dir = current_dir.join("node_modules").join(&package_name);
            if is_dir(&package_dir).await {
                if let Some(entry) = self.resolve_package_entry(&package_dir, subpath.as_deref()).await {
                    return Some(entry);
                }
            }

            if current_dir == self.project_root {
                break;
            }
            match current_dir.parent() {
                Some(parent) if parent.starts_with(&self.project_root) => current_dir = parent,
                _ => break,
            }
        }

        None
    }

    async fn resolve_package_entry(&mut self, package_dir: &Path, subpath: Option<&str>) -> Option<PathBuf> {
        if let Some(subpath) = subpath {
            return self.resolve_file_or_directory(&normalize(&package_dir.join(subpath))).await;
        }
        self.resolve_directory(package_dir).await
    }

    /// Try as a file, then as a directory
    async fn resolve_file_or_directory(&mut self, path: &Path) -> Option<PathBuf> {
        if let Some(file) = self.resolve_as_file(path).await {
            return Some(file);
        }
        if !is_dir(path).await {
            return None;
        }
        self.resolve_directory(path).await
    }

    /// A directory resolves through its package.json `main`, then `index`
    async fn resolve_directory(&mut self, dir: &Path) -> Option<PathBuf> {
        let manifest = dir.join("package.json");
        if let Some(main) = self.read_package_json(&manifest).await.and_then(|p| p.main) {
            let entry = normalize(&dir.join(main));
            if let Some(resolved) = self.resolve_as_file(&entry).await {
                return Some(resolved);
            }
            if let Some(resolved) = self.resolve_as_file(&entry.join("index")).await {
                return Some(resolved);
            }
        }

        self.resolve_as_file(&dir.join("index")).await
    }

    /// Check the path as-is, then with each configured extension appended
    async fn resolve_as_file(&self, path: &Path) -> Option<PathBuf> {
        if is_file(path).await {
            return Some(path.to_path_buf());
        }

        let file_name = path.file_name()?.to_string_lossy().to_string();
        for ext in &self.extensions {
            let candidate = path.with_file_name(format!("{}.{}", file_name, ext));
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }

        None
    }

    async fn read_package_json(&mut self, path: &Path) -> Option<PackageJson> {
        if let Some(cached) = self.package_cache.get(path) {
            return cached.clone();
        }

        let package = match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str::<PackageJson>(&content) {
                Ok(package) => Some(package),
                Err(e) => {
                    tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
                    None
                }
            },
            Err(_) => None,
        };

        self.package_cache.insert(path.to_path_buf(), package.clone());
        package
    }
}

/// `@scope/pkg/sub/path` -> (`@scope/pkg`, `sub/path`)
fn parse_package_specifier(specifier: &str) -> (String, Option<String>) {
    let segments_in_name = if specifier.starts_with('@') { 2 } else { 1 };
    let mut parts = specifier.splitn(segments_in_name + 1, '/');

    let name = (0..segments_in_name)
        .filter_map(|_| parts.next())
        .collect::<Vec<_>>()
        .join("/");
    let subpath = parts.next().filter(|s| !s.is_empty()).map(str::to_string);

    (name, subpath)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
