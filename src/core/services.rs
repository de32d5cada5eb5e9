use crate::core::bundle::BundleSession;
use crate::core::interfaces::{BuildService, FileSystemService};
use crate::core::models::*;
use crate::core::paths::ProjectPaths;
use crate::core::tasks::{Task, TaskGraph};
use crate::infrastructure::processors::{ChainOutput, TransformChain};
use crate::utils::{KilnError, KilnUI, Logger, Result, SourceWatcher, Timer, WatchConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Empties the output root
pub struct CleanStage {
    fs: Arc<dyn FileSystemService>,
    output_root: PathBuf,
}

impl CleanStage {
    pub fn new(fs: Arc<dyn FileSystemService>, paths: &ProjectPaths) -> Self {
        Self {
            fs,
            output_root: paths.output_root().to_path_buf(),
        }
    }

    /// Remove everything below the output root. A missing directory is
    /// already clean.
    pub async fn run(&self) -> Result<usize> {
        Logger::cleaning(&self.output_root.display().to_string());
        let removed = self.fs.clear_directory(&self.output_root).await?;
        Logger::debug(&format!("Removed {} entries", removed));
        Ok(removed)
    }
}

/// Per-file variant of the transform stage
pub struct CompileStage {
    fs: Arc<dyn FileSystemService>,
    paths: ProjectPaths,
    chain: TransformChain,
    /// Outputs written by the previous run, for pruning
    previous: Mutex<HashSet<PathBuf>>,
}

impl CompileStage {
    pub fn new(fs: Arc<dyn FileSystemService>, paths: ProjectPaths, chain: TransformChain) -> Self {
        Self {
            fs,
            paths,
            chain,
            previous: Mutex::new(HashSet::new()),
        }
    }

    /// Push every file under the source root through the chain. A failing
    /// file is recorded and the run moves on to the next one.
    pub async fn run(&self) -> Result<CompileReport> {
        let _timer = Timer::start("compile");
        let start = Instant::now();

        let scan = self.fs.scan_directory(self.paths.source_root()).await;
        Logger::debug(&format!("Found {} source files", scan.files.len()));

        let mut report = CompileReport::default();
        let mut emitted = HashSet::new();
        for failure in scan.unreadable {
            self.record(FileOutcome::Failed(failure), &mut emitted, &mut report);
        }
        for file in scan.files {
            let outcome = self.process_file(file, &emitted).await;
            self.record(outcome, &mut emitted, &mut report);
        }

        report.pruned = self.prune_stale_outputs(&emitted).await;
        *self.previous.lock() = emitted;
        report.elapsed = start.elapsed();
        Ok(report)
    }

    fn record(&self, outcome: FileOutcome, emitted: &mut HashSet<PathBuf>, report: &mut CompileReport) {
        match &outcome {
            FileOutcome::Emitted(artifact) => {
                emitted.insert(artifact.path.clone());
            }
            FileOutcome::Failed(failure) => Logger::file_failed(
                &self.paths.display(&failure.path),
                &failure.stage.to_string(),
                &failure.message,
            ),
        }
        report.outcomes.push(outcome);
    }

    /// `emitted` holds the outputs already written in this run; a second
    /// source mapping onto one of them fails instead of overwriting it.
    async fn process_file(&self, file: PathBuf, emitted: &HashSet<PathBuf>) -> FileOutcome {
        let failure = |stage: StageKind, message: String, path: &PathBuf| {
            FileOutcome::Failed(TransformFailure {
                path: path.clone(),
                stage,
                message,
            })
        };

        let content = match self.fs.read_file(&file).await {
            Ok(content) => content,
            Err(e) => return failure(StageKind::Read, e.to_string(), &file),
        };

        let chain = self.chain.clone();
        let source = file.clone();
        let output: ChainOutput = match tokio::task::spawn_blocking(move || chain.run(&source, content)).await {
            Ok(Ok(output)) => output,
            Ok(Err(transform_failure)) => return FileOutcome::Failed(transform_failure),
            Err(e) => return failure(StageKind::Transpile, format!("transform task failed: {}", e), &file),
        };

        let target = match self.paths.output_path_for(&output.path) {
            Some(target) => target,
            None => {
                return failure(
                    StageKind::Write,
                    format!("{} is outside the source root", output.path.display()),
                    &file,
                )
            }
        };

        if emitted.contains(&target) {
            return failure(
                StageKind::Write,
                format!("{} was already written by another source file", self.paths.display(&target)),
                &file,
            );
        }

        if let Err(e) = self.fs.write_file(&target, &output.content).await {
            return failure(StageKind::Write, e.to_string(), &file);
        }

        FileOutcome::Emitted(OutputArtifact::new(target, output.content))
    }

    /// Delete outputs the previous run wrote that this run did not
    async fn prune_stale_outputs(&self, emitted: &HashSet<PathBuf>) -> Vec<PathBuf> {
        let stale: Vec<PathBuf> = {
            let previous = self.previous.lock();
            let mut stale: Vec<PathBuf> = previous.difference(emitted).cloned().collect();
            stale.sort();
            stale
        };

        let mut pruned = Vec::new();
        for path in stale {
            match self.fs.remove_file(&path).await {
                Ok(()) => {
                    Logger::debug(&format!("Pruned stale output {}", self.paths.display(&path)));
                    pruned.push(path);
                }
                Err(e) => Logger::warn(&format!("Could not remove stale output {}: {}", path.display(), e)),
            }
        }
        pruned
    }
}

enum TransformStage {
    PerFile(CompileStage),
    Bundle(tokio::sync::Mutex<BundleSession>),
}

/// Owns both stages and exposes them as named tasks
pub struct BuildPipeline {
    paths: ProjectPaths,
    config: BuildConfig,
    clean: CleanStage,
    transform: TransformStage,
}

impl BuildPipeline {
    pub async fn new(paths: ProjectPaths, config: BuildConfig, fs: Arc<dyn FileSystemService>) -> Result<Self> {
        let transform = match config.variant {
            Variant::PerFile => TransformStage::PerFile(CompileStage::new(
                Arc::clone(&fs),
                paths.clone(),
                TransformChain::per_file(&config)?,
            )),
            Variant::Bundle => TransformStage::Bundle(tokio::sync::Mutex::new(
                BundleSession::open(paths.clone(), config.clone(), Arc::clone(&fs)).await?,
            )),
        };

        Ok(Self {
            clean: CleanStage::new(fs, &paths),
            paths,
            config,
            transform,
        })
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn clean_task_name(&self) -> String {
        format!("clean:{}", self.config.output_dir)
    }

    pub fn transform_task_name(&self) -> &'static str {
        match self.config.variant {
            Variant::PerFile => "compile",
            Variant::Bundle => "bundle",
        }
    }

    pub async fn clean(&self) -> Result<usize> {
        self.clean.run().await
    }

    /// One run of the configured transform stage
    pub async fn transform(&self) -> Result<BuildOutcome> {
        match &self.transform {
            TransformStage::PerFile(stage) => Ok(BuildOutcome::Compiled(stage.run().await?)),
            TransformStage::Bundle(session) => Ok(BuildOutcome::Bundled(session.lock().await.rebuild().await)),
        }
    }

    /// The watcher for this pipeline: every file in the per-file variant,
    /// configured extensions in the bundle variant
    pub fn watcher(&self) -> SourceWatcher {
        let config = WatchConfig::new(self.paths.source_root().to_path_buf()).with_debounce(self.config.debounce_ms);
        let config = match self.config.variant {
            Variant::PerFile => config,
            Variant::Bundle => config.with_extensions(&self.config.extensions),
        };
        SourceWatcher::new(config)
    }

    /// `clean:<outputDir>` <- `compile`|`bundle` <- `build`, `watch`
    pub fn task_graph(self: &Arc<Self>) -> Result<TaskGraph> {
        let mut graph = TaskGraph::new();
        let clean_name = self.clean_task_name();
        let transform_name = self.transform_task_name();

        let pipeline = Arc::clone(self);
        graph.register(Task::new(clean_name.clone()).with_action(move || {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.clean().await.map(|_| ()) }
        }))?;

        let pipeline = Arc::clone(self);
        graph.register(
            Task::new(transform_name)
                .depends_on(clean_name)
                .with_action(move || {
                    let pipeline = Arc::clone(&pipeline);
                    async move {
                        let outcome = pipeline.transform().await?;
                        KilnUI::show_outcome(&outcome, pipeline.paths());
                        Ok(())
                    }
                }),
        )?;

        graph.register(Task::new("build").depends_on(transform_name))?;

        let pipeline = Arc::clone(self);
        graph.register(Task::new("watch").depends_on(transform_name).with_action(move || {
            let pipeline = Arc::clone(&pipeline);
            async move {
                let watcher = pipeline.watcher();
                let rebuilds = watcher.watch(pipeline.as_ref()).await?;
                Logger::debug(&format!("Watch loop ran {} rebuilds", rebuilds));
                Ok(())
            }
        }))?;

        Ok(graph)
    }

    /// Run a named task and its dependencies
    pub async fn run(self: &Arc<Self>, task: &str) -> Result<Vec<String>> {
        let graph = self.task_graph()?;
        if !graph.contains(task) {
            return Err(KilnError::UnknownTask(task.to_string()));
        }
        graph.run(task).await
    }
}

#[async_trait]
impl BuildService for BuildPipeline {
    async fn rebuild(&self) -> Result<BuildOutcome> {
        let outcome = self.transform().await?;
        KilnUI::show_outcome(&outcome, &self.paths);
        Ok(outcome)
    }
}
