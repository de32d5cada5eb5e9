use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which transform stage a build runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// Every file under the source root goes through the transform chain
    PerFile,
    /// One entry module and its dependency graph become a single bundle
    Bundle,
}

impl Default for Variant {
    fn default() -> Self {
        Variant::PerFile
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::PerFile => write!(f, "per-file"),
            Variant::Bundle => write!(f, "bundle"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub source_dir: String,
    pub output_dir: String,
    pub variant: Variant,
    /// ECMAScript target handed to the transpiler, e.g. `es2015`
    pub target: String,
    pub strip_comments: bool,
    pub minify: bool,
    /// Entry module, relative to the source root (bundle variant)
    pub entry: String,
    /// Bundle file name inside the output root (bundle variant)
    pub bundle_file: String,
    /// Extensions, without the dot, that the resolver probes and the watcher
    /// reacts to in the bundle variant
    pub extensions: Vec<String>,
    /// Host globals forced to `undefined` inside the bundle
    pub undefined_globals: Vec<String>,
    /// Incremental cache directory, relative to the project root
    pub cache_dir: String,
    pub debounce_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: "src".to_string(),
            output_dir: "bin".to_string(),
            variant: Variant::PerFile,
            target: "es2015".to_string(),
            strip_comments: true,
            minify: true,
            entry: "index.js".to_string(),
            bundle_file: "bundle.js".to_string(),
            extensions: default_extensions(),
            undefined_globals: default_undefined_globals(),
            cache_dir: ".kiln-cache".to_string(),
            debounce_ms: 100,
        }
    }
}

pub fn default_extensions() -> Vec<String> {
    ["ts", "js", "json"].iter().map(|s| s.to_string()).collect()
}

pub fn default_undefined_globals() -> Vec<String> {
    [
        "process",
        "global",
        "Buffer",
        "__dirname",
        "__filename",
        "setImmediate",
        "clearImmediate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// One link of the transform chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Read,
    Transpile,
    StripComments,
    Minify,
    Write,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageKind::Read => "read",
            StageKind::Transpile => "transpile",
            StageKind::StripComments => "strip-comments",
            StageKind::Minify => "minify",
            StageKind::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub size: usize,
}

impl OutputArtifact {
    pub fn new(path: PathBuf, content: Vec<u8>) -> Self {
        let size = content.len();
        Self { path, content, size }
    }
}

#[derive(Debug, Clone)]
pub struct TransformFailure {
    pub path: PathBuf,
    pub stage: StageKind,
    pub message: String,
}

impl std::fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.path.display(), self.stage, self.message)
    }
}

/// Result of pushing one source file through the chain
#[derive(Debug, Clone)]
pub enum FileOutcome {
    Emitted(OutputArtifact),
    Failed(TransformFailure),
}

/// Result of walking a source tree. Directories that could not be read are
/// recorded next to the files that were found.
#[derive(Debug, Default)]
pub struct DirectoryScan {
    pub files: Vec<PathBuf>,
    pub unreadable: Vec<TransformFailure>,
}

#[derive(Debug, Default)]
pub struct CompileReport {
    pub outcomes: Vec<FileOutcome>,
    /// Stale outputs removed because this run no longer produces them
    pub pruned: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl CompileReport {
    pub fn artifacts(&self) -> impl Iterator<Item = &OutputArtifact> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Emitted(artifact) => Some(artifact),
            FileOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransformFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            FileOutcome::Failed(failure) => Some(failure),
            FileOutcome::Emitted(_) => None,
        })
    }

    pub fn success(&self) -> bool {
        self.failures().next().is_none()
    }
}

#[derive(Debug, Default)]
pub struct BundleReport {
    pub artifact: Option<OutputArtifact>,
    pub modules: usize,
    pub recompiled: Vec<PathBuf>,
    pub reused: usize,
    /// Changed modules plus everything that transitively depends on them
    pub affected: Vec<PathBuf>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl BundleReport {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// What a single transform-stage run produced
#[derive(Debug)]
pub enum BuildOutcome {
    Compiled(CompileReport),
    Bundled(BundleReport),
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        match self {
            BuildOutcome::Compiled(report) => report.success(),
            BuildOutcome::Bundled(report) => report.success(),
        }
    }
}

/// How a module asked for another one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// `import` / `export ... from`; must resolve
    Import,
    /// `require("...")`; unresolved requests are left to fail at runtime
    Require,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleRequest {
    pub specifier: String,
    pub kind: RequestKind,
}

/// A module compiled to its registry-ready form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledModule {
    pub code: String,
    pub requests: Vec<ModuleRequest>,
}
