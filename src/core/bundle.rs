//! Bundle variant of the transform stage.
//!
//! A [`BundleSession`] owns everything that survives between rebuilds: the
//! module resolver, the dependency graph of the last run and the incremental
//! cache. One session is created per process and every rebuild goes through it.

use crate::core::interfaces::FileSystemService;
use crate::core::models::{BuildConfig, BundleReport, CompiledModule, OutputArtifact, RequestKind};
use crate::core::paths::{normalize, ProjectPaths};
use crate::infrastructure::processors::{is_identifier, js_string, ModuleRewriter, OxcTranspiler, TransformChain};
use crate::infrastructure::resolver::ModuleResolver;
use crate::utils::{fingerprint, DependencyGraph, IncrementalCache, KilnError, Logger, Result, Timer, CACHE_FILE_NAME};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const RUNTIME: &str = r#"var __kiln_cache = {};
function __kiln_load(id) {
  var cached = __kiln_cache[id];
  if (cached) return cached.exports;
  var record = __kiln_modules[id];
  var module = { exports: {} };
  __kiln_cache[id] = module;
  record[0].call(module.exports, function (specifier) {
    var target = record[1][specifier];
    if (target !== undefined) return __kiln_load(target);
    if (typeof require === "function") return require(specifier);
    throw new Error("Cannot find module '" + specifier + "'");
  }, module, module.exports);
  return module.exports;
}
function __kiln_export(target, name, getter) {
  Object.defineProperty(target, name, { enumerable: true, get: getter });
}
function __kiln_default(m) {
  return m && m.__esModule ? m["default"] : m;
}
function __kiln_star(target, source) {
  Object.keys(source).forEach(function (key) {
    if (key !== "default" && !Object.prototype.hasOwnProperty.call(target, key)) {
      __kiln_export(target, key, function () { return source[key]; });
    }
  });
}
"#;

/// Digest of every setting that changes how a module compiles
fn compile_settings(config: &BuildConfig) -> String {
    fingerprint(format!("target={}", config.target).as_bytes())
}

/// One module as placed in the bundle
struct LinkedModule {
    id: String,
    module: CompiledModule,
    /// specifier -> module id
    links: BTreeMap<String, String>,
}

pub struct BundleSession {
    paths: ProjectPaths,
    config: BuildConfig,
    fs: Arc<dyn FileSystemService>,
    rewriter: Arc<ModuleRewriter>,
    finishing: TransformChain,
    resolver: ModuleResolver,
    cache: IncrementalCache,
    graph: DependencyGraph,
}

impl BundleSession {
    /// Open a session using the cache under `<root>/<cacheDir>`
    pub async fn open(paths: ProjectPaths, config: BuildConfig, fs: Arc<dyn FileSystemService>) -> Result<Self> {
        let cache_path = paths.root().join(&config.cache_dir).join(CACHE_FILE_NAME);
        Self::open_with_cache(paths, config, fs, cache_path).await
    }

    pub async fn open_with_cache(
        paths: ProjectPaths,
        config: BuildConfig,
        fs: Arc<dyn FileSystemService>,
        cache_path: PathBuf,
    ) -> Result<Self> {
        let rewriter = Arc::new(ModuleRewriter::new(OxcTranspiler::new(&config.target)?));
        let finishing = TransformChain::finishing(&config);
        let resolver = ModuleResolver::new(paths.root(), paths.source_root(), &config.extensions);
        let cache = IncrementalCache::load(cache_path, compile_settings(&config)).await;

        Ok(Self {
            paths,
            config,
            fs,
            rewriter,
            finishing,
            resolver,
            cache,
            graph: DependencyGraph::new(),
        })
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.paths.output_root().join(&self.config.bundle_file)
    }

    pub fn entry_path(&self) -> PathBuf {
        normalize(&self.paths.source_root().join(&self.config.entry))
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Bundle the entry. Failures are reported, never raised: the previous
    /// bundle on disk is left as it was.
    pub async fn rebuild(&mut self) -> BundleReport {
        let _timer = Timer::start("bundle");
        let start = Instant::now();
        let mut report = BundleReport::default();

        if let Err(e) = self.try_rebuild(&mut report).await {
            Logger::error(&format!("Bundling {} failed: {}", self.config.entry, e.format_detailed()));
            report.artifact = None;
            report.error = Some(e.to_string());
        }

        report.elapsed = start.elapsed();
        report
    }

    async fn try_rebuild(&mut self, report: &mut BundleReport) -> Result<()> {
        let entry = self.entry_path();
        if !self.fs.file_exists(&entry) {
            return Err(KilnError::Bundle(format!(
                "entry module {} not found",
                self.paths.display(&entry)
            )));
        }

        let entry_id = self.paths.module_id(&entry);
        self.resolver.clear_cache();
        let mut graph = DependencyGraph::new();
        let modules = self.link(&entry, &entry_id, &mut graph, report).await?;

        let bundle = self.assemble(&modules, &entry_id);
        let finishing = self.finishing.clone();
        let finishing_path = self.bundle_path().with_extension("cjs");
        let bundle = tokio::task::spawn_blocking(move || finishing.run_text(&finishing_path, bundle))
            .await
            .map_err(|e| KilnError::Bundle(format!("finishing task failed: {}", e)))??;

        let bundle_path = self.bundle_path();
        self.fs.create_directory(self.paths.output_root()).await?;
        self.fs.write_file_atomic(&bundle_path, bundle.as_bytes()).await?;

        report.modules = modules.len();
        report.affected = graph.affected_by(&report.recompiled);
        report.artifact = Some(OutputArtifact::new(bundle_path, bundle.clone().into_bytes()));
        self.graph = graph;

        let live: HashSet<String> = modules.iter().map(|m| m.id.clone()).collect();
        let pruned = self.cache.retain_modules(&entry_id, &live);
        if pruned > 0 {
            Logger::debug(&format!("Pruned {} stale module(s) from the bundle cache", pruned));
        }
        self.cache.set_last_bundle(&entry_id, bundle);
        if let Err(e) = self.cache.save().await {
            Logger::warn(&format!("Could not persist bundle cache: {}", e));
        }

        Ok(())
    }

    /// Walk the module graph depth first from the entry, compiling (or
    /// reusing) every module on the way. Modules come back in pre-order.
    async fn link(
        &mut self,
        entry: &Path,
        entry_id: &str,
        graph: &mut DependencyGraph,
        report: &mut BundleReport,
    ) -> Result<Vec<LinkedModule>> {
        let mut linked = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![entry.to_path_buf()];

        while let Some(path) = stack.pop() {
            if !visited.insert(path.clone()) {
                continue;
            }

            let id = self.paths.module_id(&path);
            let module = self.load_module(&path, &id, entry_id, report).await?;

            let mut links = BTreeMap::new();
            let mut children = Vec::new();
            for request in &module.requests {
                match self.resolver.resolve(&request.specifier, &path).await {
                    Some(target) => {
                        links.insert(request.specifier.clone(), self.paths.module_id(&target));
                        graph.add_dependency(path.clone(), target.clone());
                        children.push(target);
                    }
                    None if request.kind == RequestKind::Import => {
                        return Err(KilnError::Bundle(format!(
                            "cannot resolve '{}' imported from {}",
                            request.specifier,
                            self.paths.display(&path)
                        )));
                    }
                    None => {
                        Logger::warn(&format!(
                            "Leaving require('{}') in {} to the host",
                            request.specifier,
                            self.paths.display(&path)
                        ));
                    }
                }
            }

            // reversed so the first request is visited first
            stack.extend(children.into_iter().rev());
            linked.push(LinkedModule { id, module, links });
        }

        Ok(linked)
    }

    async fn load_module(&mut self, path: &Path, id: &str, entry_id: &str, report: &mut BundleReport) -> Result<CompiledModule> {
        let bytes = self.fs.read_file(path).await?;
        let digest = fingerprint(&bytes);

        if let Some(cached) = self.cache.lookup(entry_id, id, &digest) {
            report.reused += 1;
            return Ok(cached.clone());
        }

        let source = String::from_utf8(bytes)
            .map_err(|e| KilnError::Bundle(format!("{} is not valid UTF-8: {}", self.paths.display(path), e)))?;

        Logger::processing_file(id, "bundle");
        let rewriter = Arc::clone(&self.rewriter);
        let module_path = path.to_path_buf();
        let compiled = tokio::task::spawn_blocking(move || rewriter.compile(&source, &module_path))
            .await
            .map_err(|e| KilnError::Bundle(format!("compile task failed: {}", e)))??;

        self.cache.store(entry_id, id, digest, compiled.clone());
        report.recompiled.push(path.to_path_buf());
        Ok(compiled)
    }

    fn assemble(&self, modules: &[LinkedModule], entry_id: &str) -> String {
        let globals: Vec<&str> = self
            .config
            .undefined_globals
            .iter()
            .map(String::as_str)
            .filter(|name| {
                let valid = is_identifier(name);
                if !valid {
                    Logger::warn(&format!("Ignoring invalid global name '{}'", name));
                }
                valid
            })
            .collect();

        let mut out = String::new();
        out.push_str(&format!("(function ({}) {{\n", globals.join(", ")));
        out.push_str("var __kiln_modules = {\n");

        for (index, linked) in modules.iter().enumerate() {
            let links = serde_json::to_string(&linked.links).unwrap_or_else(|_| "{}".to_string());
            out.push_str(&format!("{}: [function (require, module, exports) {{\n", js_string(&linked.id)));
            out.push_str(&linked.module.code);
            if !linked.module.code.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format!("}}, {}]", links));
            out.push_str(if index + 1 < modules.len() { ",\n" } else { "\n" });
        }

        out.push_str("};\n");
        out.push_str(RUNTIME);
        out.push_str(&format!("var __kiln_entry = __kiln_load({});\n", js_string(entry_id)));
        out.push_str("if (typeof module === \"object\" && module && module.exports) module.exports = __kiln_entry;\n");
        out.push_str("})();\n");
        out
    }
}
