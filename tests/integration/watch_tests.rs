use crate::common::{readable, Project};
use kiln::core::models::{BuildConfig, Variant};
use notify::event::{DataChange, EventKind, ModifyKind};
use notify::Event;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

fn modified(path: std::path::PathBuf) -> Event {
    Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path)
}

#[tokio::test]
async fn test_single_change_triggers_one_per_file_rebuild() {
    let project = Project::new();
    project
        .write("src/a.js", "export const message = 'v1';\n")
        .write("src/b.js", "export const other = 1;\n");

    let pipeline = project.pipeline(readable(Variant::PerFile)).await;
    pipeline.run("build").await.unwrap();
    project.write("bin/marker.txt", "survives because clean does not run again");

    project.write("src/a.js", "export const message = 'v2';\n");
    let (tx, rx) = unbounded_channel();
    tx.send(modified(project.path("src/a.js"))).unwrap();
    drop(tx);

    let rebuilds = pipeline
        .watcher()
        .run(rx, pipeline.as_ref(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(rebuilds, 1);
    assert!(project.read("bin/a.js").contains("v2"));
    assert!(project.exists("bin/b.js"));
    assert!(project.exists("bin/marker.txt"));
}

#[tokio::test]
async fn test_single_change_regenerates_bundle() {
    let project = Project::new();
    project
        .write("src/index.js", "import { name } from './name';\nexport default 'hello ' + name;\n")
        .write("src/name.js", "export const name = 'world';\n");

    let pipeline = project.pipeline(readable(Variant::Bundle)).await;
    pipeline.run("build").await.unwrap();
    assert!(project.read("bin/bundle.js").contains("world"));

    project.write("src/name.js", "export const name = 'forge';\n");
    let (tx, rx) = unbounded_channel();
    tx.send(modified(project.path("src/name.js"))).unwrap();
    // not one of the bundle extensions
    tx.send(modified(project.path("src/notes.md"))).unwrap();
    drop(tx);

    let rebuilds = pipeline
        .watcher()
        .run(rx, pipeline.as_ref(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(rebuilds, 1);
    let bundle = project.read("bin/bundle.js");
    assert!(bundle.contains("forge"));
    assert!(!bundle.contains("world"));
}

#[tokio::test]
async fn test_platform_watcher_picks_up_changes() {
    let project = Project::new();
    project.write("src/a.js", "export const message = 'before';\n");

    let pipeline = project.pipeline(BuildConfig {
        debounce_ms: 50,
        ..readable(Variant::PerFile)
    })
    .await;
    pipeline.run("build").await.unwrap();

    let watcher = pipeline.watcher();
    let (_guard, rx) = watcher.subscribe().unwrap();

    let output = project.path("bin/a.js");
    let source = project.path("src/a.js");
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(source, "export const message = 'after';\n").unwrap();
    });

    let shutdown = async move {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while tokio::time::Instant::now() < deadline {
            if std::fs::read_to_string(&output).map(|s| s.contains("after")).unwrap_or(false) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };

    let rebuilds = watcher.run(rx, pipeline.as_ref(), shutdown).await.unwrap();
    writer.await.unwrap();

    assert!(rebuilds >= 1);
    assert!(project.read("bin/a.js").contains("after"));
}
