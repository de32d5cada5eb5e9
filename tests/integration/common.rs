use kiln::core::models::{BuildConfig, Variant};
use kiln::core::{BuildPipeline, ProjectPaths};
use kiln::infrastructure::TokioFileSystemService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A throwaway project directory
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) -> &Self {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        self
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn paths(&self, config: &BuildConfig) -> ProjectPaths {
        ProjectPaths::resolve(self.root(), config).unwrap()
    }

    pub async fn pipeline(&self, config: BuildConfig) -> Arc<BuildPipeline> {
        let paths = self.paths(&config);
        Arc::new(
            BuildPipeline::new(paths, config, Arc::new(TokioFileSystemService))
                .await
                .unwrap(),
        )
    }
}

/// No comment stripping or minification, so outputs stay readable
pub fn readable(variant: Variant) -> BuildConfig {
    BuildConfig {
        variant,
        strip_comments: false,
        minify: false,
        ..Default::default()
    }
}
