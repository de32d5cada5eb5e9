use crate::common::{readable, Project};
use kiln::core::interfaces::BuildService;
use kiln::core::models::{BuildConfig, BuildOutcome, StageKind, Variant};
use kiln::core::CleanStage;
use kiln::infrastructure::TokioFileSystemService;
use std::sync::Arc;

fn per_file_report(outcome: BuildOutcome) -> kiln::core::models::CompileReport {
    match outcome {
        BuildOutcome::Compiled(report) => report,
        BuildOutcome::Bundled(_) => panic!("expected a per-file run"),
    }
}

#[tokio::test]
async fn test_build_mirrors_source_tree() {
    let project = Project::new();
    project
        .write("src/index.ts", "// entry\nimport { greet } from './lib/greet';\nexport const out: string = greet('kiln');\n")
        .write("src/lib/greet.ts", "export function greet(name: string): string {\n  return `hi ${name}`;\n}\n")
        .write("src/data/config.json", "{\"debug\": false}\n")
        .write("src/.env.example", "KEY=value\n");

    let pipeline = project.pipeline(BuildConfig::default()).await;
    let ran = pipeline.run("build").await.unwrap();
    assert_eq!(ran, vec!["clean:bin", "compile", "build"]);

    let index = project.read("bin/index.js");
    assert!(!index.contains("// entry"));
    assert!(!index.contains(": string"));
    assert!(index.contains("./lib/greet"));
    assert!(project.exists("bin/lib/greet.js"));
    assert!(!project.exists("bin/lib/greet.ts"));
    assert_eq!(project.read("bin/data/config.json"), "{\"debug\": false}\n");
    assert_eq!(project.read("bin/.env.example"), "KEY=value\n");
}

#[tokio::test]
async fn test_clean_is_idempotent() {
    let project = Project::new();
    project
        .write("bin/old.js", "stale")
        .write("bin/nested/deep/old.css", "stale");

    let config = BuildConfig::default();
    let clean = CleanStage::new(Arc::new(TokioFileSystemService), &project.paths(&config));

    assert_eq!(clean.run().await.unwrap(), 2);
    assert_eq!(std::fs::read_dir(project.path("bin")).unwrap().count(), 0);

    assert_eq!(clean.run().await.unwrap(), 0);
    assert_eq!(std::fs::read_dir(project.path("bin")).unwrap().count(), 0);

    // a missing output directory is already clean
    std::fs::remove_dir(project.path("bin")).unwrap();
    assert_eq!(clean.run().await.unwrap(), 0);
}

#[tokio::test]
async fn test_clean_task_alone() {
    let project = Project::new();
    project.write("src/a.js", "1;\n").write("bin/a.js", "stale");

    let pipeline = project.pipeline(BuildConfig::default()).await;
    let ran = pipeline.run("clean:bin").await.unwrap();

    assert_eq!(ran, vec!["clean:bin"]);
    assert!(!project.exists("bin/a.js"));
}

#[tokio::test]
async fn test_build_output_reflects_only_current_sources() {
    let project = Project::new();
    project
        .write("src/current.js", "export const now = 1;\n")
        .write("bin/removed-long-ago.js", "stale")
        .write("bin/current.js", "stale content");

    let pipeline = project.pipeline(readable(Variant::PerFile)).await;
    pipeline.run("build").await.unwrap();

    assert!(!project.exists("bin/removed-long-ago.js"));
    assert!(project.read("bin/current.js").contains("export const now = 1"));
}

#[tokio::test]
async fn test_failing_file_does_not_halt_the_run() {
    let project = Project::new();
    project
        .write("src/a.js", "export const a = 1;\n")
        .write("src/b.js", "export const b = ;\n")
        .write("src/c.js", "export const c = 3;\n")
        .write("src/d.ts", "export const d: number = 4;\n");

    let pipeline = project.pipeline(BuildConfig::default()).await;
    let report = per_file_report(pipeline.rebuild().await.unwrap());

    assert_eq!(report.artifacts().count(), 3);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].path, project.paths(&BuildConfig::default()).source_root().join("b.js"));
    assert_eq!(failures[0].stage, StageKind::Transpile);

    assert!(project.exists("bin/a.js"));
    assert!(!project.exists("bin/b.js"));
    assert!(project.exists("bin/c.js"));
    assert!(project.exists("bin/d.js"));

    // the build task itself still succeeds
    assert!(pipeline.run("build").await.is_ok());
}

#[tokio::test]
async fn test_stage_toggles() {
    let project = Project::new();
    project.write("src/a.js", "/*! keep me */\nexport const value = 1 + 1;\n");

    let pipeline = project.pipeline(readable(Variant::PerFile)).await;
    pipeline.run("build").await.unwrap();

    assert!(project.read("bin/a.js").contains("keep me"));
}

#[tokio::test]
async fn test_bad_target_is_a_setup_error() {
    let project = Project::new();
    let config = BuildConfig {
        target: "es1999".to_string(),
        ..Default::default()
    };
    let paths = project.paths(&config);

    let err = kiln::core::BuildPipeline::new(paths, config, Arc::new(TokioFileSystemService))
        .await
        .err()
        .unwrap();
    assert!(err.is_fatal_setup());
}
