use crate::common::{readable, Project};
use kiln::core::interfaces::BuildService;
use kiln::core::models::{BuildConfig, BuildOutcome, BundleReport, Variant};
use kiln::core::BundleSession;
use kiln::infrastructure::TokioFileSystemService;
use std::path::PathBuf;
use std::sync::Arc;

fn bundle_report(outcome: BuildOutcome) -> BundleReport {
    match outcome {
        BuildOutcome::Bundled(report) => report,
        BuildOutcome::Compiled(_) => panic!("expected a bundle run"),
    }
}

fn app(project: &Project) {
    project
        .write(
            "src/index.js",
            "import { double } from './math';\nimport settings from './settings.json';\nimport label from './label';\nexport default double(settings.base) + label;\n",
        )
        .write("src/math.ts", "import { factor } from './factor';\nexport const double = (n: number): number => n * factor;\n")
        .write("src/factor.js", "export const factor = 2;\n")
        .write("src/settings.json", "{ \"base\": 21 }\n")
        .write("src/label.js", "module.exports = ' units';\n");
}

#[tokio::test]
async fn test_bundle_build_writes_single_artifact() {
    let project = Project::new();
    app(&project);
    project.write("bin/leftover.js", "stale");

    let pipeline = project.pipeline(BuildConfig {
        variant: Variant::Bundle,
        ..Default::default()
    })
    .await;
    let ran = pipeline.run("build").await.unwrap();
    assert_eq!(ran, vec!["clean:bin", "bundle", "build"]);

    let entries: Vec<_> = std::fs::read_dir(project.path("bin"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["bundle.js"]);

    let bundle = project.read("bin/bundle.js");
    assert!(!bundle.contains(": number"));
    assert!(!bundle.contains("import "));
}

#[tokio::test]
async fn test_bundle_declares_host_globals_undefined() {
    let project = Project::new();
    project.write("src/index.js", "module.exports = typeof process;\n");

    let pipeline = project.pipeline(readable(Variant::Bundle)).await;
    pipeline.run("build").await.unwrap();

    let bundle = project.read("bin/bundle.js");
    let header = bundle.lines().next().unwrap();
    for global in ["process", "global", "Buffer", "__dirname", "__filename", "setImmediate", "clearImmediate"] {
        assert!(header.contains(global), "{} missing from {}", global, header);
    }
}

#[tokio::test]
async fn test_failed_bundle_leaves_previous_bundle_intact() {
    let project = Project::new();
    app(&project);

    let pipeline = project.pipeline(readable(Variant::Bundle)).await;
    assert!(bundle_report(pipeline.rebuild().await.unwrap()).success());
    let good = project.read("bin/bundle.js");

    // breaks after resolution, while compiling a dependency
    project.write("src/factor.js", "export const factor = ;\n");
    let report = bundle_report(pipeline.rebuild().await.unwrap());

    assert!(!report.success());
    assert!(report.artifact.is_none());
    assert_eq!(project.read("bin/bundle.js"), good);
    let names: Vec<_> = std::fs::read_dir(project.path("bin"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 1, "no temp file may be left behind: {:?}", names);
}

#[tokio::test]
async fn test_failed_first_bundle_writes_nothing() {
    let project = Project::new();
    project.write("src/index.js", "import './does-not-exist';\n");

    let pipeline = project.pipeline(readable(Variant::Bundle)).await;
    let report = bundle_report(pipeline.rebuild().await.unwrap());

    assert!(!report.success());
    assert!(!project.exists("bin/bundle.js"));
}

#[tokio::test]
async fn test_incremental_bundle_matches_full_bundle() {
    let project = Project::new();
    app(&project);
    let config = readable(Variant::Bundle);
    let source = |rel: &str| project.paths(&config).source_root().join(rel);

    let mut session = BundleSession::open(project.paths(&config), config.clone(), Arc::new(TokioFileSystemService))
        .await
        .unwrap();
    let first = session.rebuild().await;
    assert!(first.success());
    assert_eq!(first.recompiled.len(), 5);

    project.write("src/factor.js", "export const factor = 3;\n");
    let second = session.rebuild().await;

    assert!(second.success());
    assert_eq!(second.recompiled, vec![source("factor.js")]);
    assert_eq!(second.reused, 4);
    let mut expected_affected: Vec<PathBuf> = vec![source("factor.js"), source("index.js"), source("math.ts")];
    expected_affected.sort();
    assert_eq!(second.affected, expected_affected);

    let scratch = tempfile::tempdir().unwrap();
    let mut fresh = BundleSession::open_with_cache(
        project.paths(&config),
        config.clone(),
        Arc::new(TokioFileSystemService),
        scratch.path().join("cache.bin"),
    )
    .await
    .unwrap();
    let full = fresh.rebuild().await;

    assert_eq!(full.recompiled.len(), 5);
    assert_eq!(
        second.artifact.unwrap().content,
        full.artifact.unwrap().content,
        "incremental output must equal a from-scratch bundle"
    );
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let project = Project::new();
    app(&project);
    let config = readable(Variant::Bundle);

    {
        let pipeline = project.pipeline(config.clone()).await;
        pipeline.run("build").await.unwrap();
    }
    assert!(project.exists(".kiln-cache/bundle-cache.bin"));

    let mut restarted = BundleSession::open(project.paths(&config), config, Arc::new(TokioFileSystemService))
        .await
        .unwrap();
    let report = restarted.rebuild().await;

    assert!(report.success());
    assert!(report.recompiled.is_empty());
    assert_eq!(report.reused, 5);
}

#[tokio::test]
async fn test_changed_import_list_updates_graph() {
    let project = Project::new();
    app(&project);
    let config = readable(Variant::Bundle);
    let mut session = BundleSession::open(project.paths(&config), config.clone(), Arc::new(TokioFileSystemService))
        .await
        .unwrap();
    assert_eq!(session.rebuild().await.modules, 5);

    project
        .write("src/extra.js", "export const extra = 1;\n")
        .write("src/math.ts", "import { factor } from './factor';\nimport { extra } from './extra';\nexport const double = (n: number): number => n * factor + extra;\n");
    let report = session.rebuild().await;

    assert_eq!(report.modules, 6);
    assert_eq!(report.recompiled.len(), 2);
    assert!(project.read("bin/bundle.js").contains("\"extra.js\""));

    let math = project.paths(&config).source_root().join("math.ts");
    let extra = project.paths(&config).source_root().join("extra.js");
    assert!(session.graph().get_dependencies(&math).unwrap().contains(&extra));
}

#[tokio::test]
async fn test_changed_target_invalidates_persisted_cache() {
    let project = Project::new();
    project.write("src/index.js", "export const pow = (a, b) => a ** b;\n");

    let modern = BuildConfig {
        target: "es2020".to_string(),
        ..readable(Variant::Bundle)
    };
    let mut first = BundleSession::open(project.paths(&modern), modern.clone(), Arc::new(TokioFileSystemService))
        .await
        .unwrap();
    assert!(first.rebuild().await.success());

    let legacy = BuildConfig {
        target: "es2015".to_string(),
        ..readable(Variant::Bundle)
    };
    let mut second = BundleSession::open(project.paths(&legacy), legacy.clone(), Arc::new(TokioFileSystemService))
        .await
        .unwrap();
    let report = second.rebuild().await;

    assert!(report.success());
    assert_eq!(report.reused, 0);
    assert_eq!(report.recompiled.len(), 1);

    let scratch = tempfile::tempdir().unwrap();
    let mut fresh = BundleSession::open_with_cache(
        project.paths(&legacy),
        legacy,
        Arc::new(TokioFileSystemService),
        scratch.path().join("cache.bin"),
    )
    .await
    .unwrap();

    assert_eq!(
        report.artifact.unwrap().content,
        fresh.rebuild().await.artifact.unwrap().content
    );
}

#[tokio::test]
async fn test_same_relative_path_inside_and_outside_source_are_distinct_modules() {
    let project = Project::new();
    project
        .write(
            "src/index.js",
            "import { inner } from './lib/x';\nimport { outer } from '../lib/x';\nexport default inner + outer;\n",
        )
        .write("src/lib/x.js", "export const inner = 'inner';\n")
        .write("lib/x.js", "export const outer = 'outer';\n");

    let pipeline = project.pipeline(readable(Variant::Bundle)).await;
    let report = bundle_report(pipeline.rebuild().await.unwrap());
    assert!(report.success(), "{:?}", report.error);
    assert_eq!(report.modules, 3);

    let bundle = project.read("bin/bundle.js");
    assert_eq!(bundle.matches("\"lib/x.js\": [function").count(), 1);
    assert_eq!(bundle.matches("\"../lib/x.js\": [function").count(), 1);
    assert!(bundle.contains(r#"{"../lib/x":"../lib/x.js","./lib/x":"lib/x.js"}"#));
}
