use crate::core::models::{BuildConfig, Variant};
use crate::utils::{KilnError, Logger, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "kiln.config.json";

/// Configuration file format (kiln.config.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KilnConfig {
    /// Source directory, relative to the project root (default: "src")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,

    /// Output directory, relative to the project root (default: "bin")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    /// "per-file" or "bundle" (default: "per-file")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,

    /// Target ECMAScript version (default: "es2015")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub strip_comments: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,

    /// Bundle entry, relative to the source directory (default: "index.js")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub undefined_globals: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

/// Values given on the command line; they win over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub variant: Option<Variant>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `kiln.config.json` from the project root, if present
    pub fn load_from_file(root: &Path) -> Result<Option<KilnConfig>> {
        Self::load_from_path(&root.join(CONFIG_FILE_NAME), false)
    }

    /// Load an explicitly named config file; a missing file is an error
    pub fn load_explicit(path: &Path) -> Result<KilnConfig> {
        Self::load_from_path(path, true)?.ok_or_else(|| {
            KilnError::config(format!("Config file {} not found", path.display()))
        })
    }

    fn load_from_path(config_path: &Path, required: bool) -> Result<Option<KilnConfig>> {
        if !config_path.exists() {
            if !required {
                Logger::debug(&format!("No {} found, using defaults", CONFIG_FILE_NAME));
            }
            return Ok(None);
        }

        Logger::debug(&format!("Loading config from {}", config_path.display()));

        let content = std::fs::read_to_string(config_path)?;

        let config: KilnConfig = serde_json::from_str(&content).map_err(|e| {
            KilnError::config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;

        Ok(Some(config))
    }

    /// Merge file config with CLI arguments (CLI > config file > default)
    pub fn merge_with_cli(file_config: Option<KilnConfig>, cli: &CliOverrides) -> BuildConfig {
        let file = file_config.unwrap_or_default();
        let defaults = BuildConfig::default();

        let mut extensions = file.extensions.unwrap_or(defaults.extensions);
        for ext in extensions.iter_mut() {
            *ext = ext.trim_start_matches('.').to_string();
        }

        BuildConfig {
            source_dir: file.source_dir.unwrap_or(defaults.source_dir),
            output_dir: file.output_dir.unwrap_or(defaults.output_dir),
            variant: cli.variant.or(file.variant).unwrap_or(defaults.variant),
            target: file.target.unwrap_or(defaults.target),
            strip_comments: file.strip_comments.unwrap_or(defaults.strip_comments),
            minify: file.minify.unwrap_or(defaults.minify),
            entry: file.entry.unwrap_or(defaults.entry),
            bundle_file: file.bundle_file.unwrap_or(defaults.bundle_file),
            extensions,
            undefined_globals: file.undefined_globals.unwrap_or(defaults.undefined_globals),
            cache_dir: file.cache_dir.unwrap_or(defaults.cache_dir),
            debounce_ms: file.debounce_ms.unwrap_or(defaults.debounce_ms),
        }
    }

    /// Resolve the full configuration for a project root
    pub fn resolve(root: &Path, explicit: Option<&PathBuf>, cli: &CliOverrides) -> Result<BuildConfig> {
        let file_config = match explicit {
            Some(path) => Some(Self::load_explicit(path)?),
            None => Self::load_from_file(root)?,
        };
        Ok(Self::merge_with_cli(file_config, cli))
    }
}
