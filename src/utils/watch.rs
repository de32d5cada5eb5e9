// Watch mode
// Monitors the source tree and re-runs the transform stage on every change

use crate::core::interfaces::BuildService;
use crate::utils::{KilnError, Logger, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Configuration for watch mode
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directory watched recursively
    pub watch_path: PathBuf,
    /// Extensions that trigger a rebuild; `None` means every file
    pub extensions: Option<Vec<String>>,
    /// Quiet period after the last event before rebuilding
    pub debounce_ms: u64,
}

impl WatchConfig {
    pub fn new(watch_path: PathBuf) -> Self {
        Self {
            watch_path,
            extensions: None,
            debounce_ms: 100,
        }
    }

    pub fn with_extensions(mut self, extensions: &[String]) -> Self {
        self.extensions = Some(
            extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        );
        self
    }

    pub fn with_debounce(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }
}

/// File watcher that re-invokes a build service on change
pub struct SourceWatcher {
    config: WatchConfig,
}

impl SourceWatcher {
    pub fn new(config: WatchConfig) -> Self {
        Self { config }
    }

    /// Start the platform watcher. Events flow into the returned channel for
    /// as long as the watcher is kept alive.
    pub fn subscribe(&self) -> Result<(RecommendedWatcher, UnboundedReceiver<Event>)> {
        let (tx, rx) = unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            },
            notify::Config::default(),
        )
        .map_err(|e| KilnError::Watch(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&self.config.watch_path, RecursiveMode::Recursive)
            .map_err(|e| {
                KilnError::Watch(format!(
                    "Failed to watch {}: {}",
                    self.config.watch_path.display(),
                    e
                ))
            })?;

        Ok((watcher, rx))
    }

    /// Watch until Ctrl+C
    pub async fn watch<B: BuildService + ?Sized>(&self, service: &B) -> Result<usize> {
        let (_watcher, rx) = self.subscribe()?;

        Logger::info(&format!(
            "👀 Watching {} for changes (Ctrl+C to stop)",
            self.config.watch_path.display()
        ));

        self.run(rx, service, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Drive rebuilds from an event stream until `shutdown` resolves or the
    /// stream closes. Returns how many rebuilds ran.
    pub async fn run<B, S>(&self, mut events: UnboundedReceiver<Event>, service: &B, shutdown: S) -> Result<usize>
    where
        B: BuildService + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let debounce = Duration::from_millis(self.config.debounce_ms);
        let mut pending: HashSet<PathBuf> = HashSet::new();
        let mut rebuilds = 0;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    Logger::info("👋 Stopping watch mode");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => pending.extend(self.relevant_paths(&event)),
                    None => {
                        if !pending.is_empty() {
                            self.trigger_rebuild(&pending, service).await;
                            rebuilds += 1;
                        }
                        Logger::debug("Watch channel closed");
                        break;
                    }
                },
                _ = tokio::time::sleep(debounce), if !pending.is_empty() => {
                    self.trigger_rebuild(&pending, service).await;
                    pending.clear();
                    rebuilds += 1;
                }
            }
        }

        Ok(rebuilds)
    }

    async fn trigger_rebuild<B: BuildService + ?Sized>(&self, changed: &HashSet<PathBuf>, service: &B) {
        Logger::info(&format!("🔄 Rebuilding... ({} files changed)", changed.len()));
        for path in changed {
            Logger::debug(&format!("  • {}", path.display()));
        }

        let start = Instant::now();
        match service.rebuild().await {
            Ok(outcome) if outcome.success() => {
                Logger::info(&format!("✅ Rebuild complete in {:.0}ms", start.elapsed().as_millis()));
            }
            Ok(_) => Logger::warn("Rebuild finished with errors"),
            Err(e) => Logger::error(&format!("❌ Rebuild failed: {}", e)),
        }
    }

    fn relevant_paths<'a>(&'a self, event: &'a Event) -> impl Iterator<Item = PathBuf> + 'a {
        let ignored = matches!(event.kind, EventKind::Access(_) | EventKind::Other);
        event
            .paths
            .iter()
            .filter(move |p| !ignored && self.is_watched_file(p))
            .cloned()
    }

    fn is_watched_file(&self, path: &Path) -> bool {
        let name = path.to_string_lossy();
        // editor swap and backup files
        if name.ends_with('~') || name.ends_with(".swp") || name.ends_with(".tmp") {
            return false;
        }

        match &self.config.extensions {
            None => true,
            Some(extensions) => path
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{BuildOutcome, CompileReport};
    use async_trait::async_trait;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingService {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BuildService for CountingService {
        async fn rebuild(&self) -> Result<BuildOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BuildOutcome::Compiled(CompileReport::default()))
        }
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    fn watcher(extensions: Option<&[&str]>) -> SourceWatcher {
        let mut config = WatchConfig::new(PathBuf::from("src")).with_debounce(20);
        if let Some(exts) = extensions {
            let exts: Vec<String> = exts.iter().map(|e| e.to_string()).collect();
            config = config.with_extensions(&exts);
        }
        SourceWatcher::new(config)
    }

    #[tokio::test]
    async fn test_burst_of_events_yields_one_rebuild() {
        let watcher = watcher(None);
        let service = CountingService::default();
        let (tx, rx) = unbounded_channel();

        for _ in 0..5 {
            tx.send(event(EventKind::Modify(ModifyKind::Any), "src/a.js")).unwrap();
        }
        drop(tx);

        let rebuilds = watcher.run(rx, &service, std::future::pending()).await.unwrap();
        assert_eq!(rebuilds, 1);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_separate_changes_rebuild_separately() {
        let watcher = watcher(None);
        let service = CountingService::default();
        let (tx, rx) = unbounded_channel();

        let sender = tokio::spawn(async move {
            tx.send(event(EventKind::Create(CreateKind::File), "src/a.js")).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            tx.send(event(EventKind::Modify(ModifyKind::Any), "src/b.js")).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let rebuilds = watcher.run(rx, &service, std::future::pending()).await.unwrap();
        sender.await.unwrap();
        assert_eq!(rebuilds, 2);
    }

    #[tokio::test]
    async fn test_access_events_and_other_extensions_are_ignored() {
        let watcher = watcher(Some(&["ts", "js", "json"]));
        let service = CountingService::default();
        let (tx, rx) = unbounded_channel();

        tx.send(event(EventKind::Access(AccessKind::Any), "src/a.js")).unwrap();
        tx.send(event(EventKind::Modify(ModifyKind::Any), "src/style.css")).unwrap();
        tx.send(event(EventKind::Modify(ModifyKind::Any), "src/a.js.swp")).unwrap();
        drop(tx);

        let rebuilds = watcher.run(rx, &service, std::future::pending()).await.unwrap();
        assert_eq!(rebuilds, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let watcher = watcher(None);
        let service = CountingService::default();
        let (_tx, rx) = unbounded_channel::<Event>();

        let rebuilds = watcher.run(rx, &service, async {}).await.unwrap();
        assert_eq!(rebuilds, 0);
    }

    #[test]
    fn test_extension_filter() {
        let all = watcher(None);
        assert!(all.is_watched_file(Path::new("src/logo.png")));

        let scripts = watcher(Some(&[".ts", "js"]));
        assert!(scripts.is_watched_file(Path::new("src/a.TS")));
        assert!(!scripts.is_watched_file(Path::new("src/logo.png")));
        assert!(!scripts.is_watched_file(Path::new("src/Makefile")));
    }
}
