use crate::core::models::{BuildOutcome, BundleReport, CompileReport, OutputArtifact};
use crate::core::paths::ProjectPaths;
use colored::*;

/// Terminal summary printed after each transform run
pub struct KilnUI;

impl KilnUI {
    pub fn show_banner(variant: &str) {
        println!(
            "\n  {} {} {}",
            "KILN".bright_cyan().bold(),
            format!("v{}", env!("CARGO_PKG_VERSION")).bright_white(),
            format!("({})", variant).bright_black()
        );
        println!();
    }

    pub fn show_outcome(outcome: &BuildOutcome, paths: &ProjectPaths) {
        match outcome {
            BuildOutcome::Compiled(report) => Self::show_compile_report(report, paths),
            BuildOutcome::Bundled(report) => Self::show_bundle_report(report, paths),
        }
    }

    pub fn show_compile_report(report: &CompileReport, paths: &ProjectPaths) {
        println!();
        for artifact in report.artifacts() {
            Self::show_artifact(artifact, paths);
        }

        for failure in report.failures() {
            println!(
                "  {} {} {}",
                "✗".bright_red(),
                paths.display(&failure.path).bright_red(),
                format!("[{}] {}", failure.stage, failure.message).bright_black()
            );
        }

        if !report.pruned.is_empty() {
            println!(
                "  {} {} stale output(s) removed",
                "-".bright_black(),
                report.pruned.len()
            );
        }

        let failures = report.failures().count();
        println!();
        if failures == 0 {
            println!(
                "  {} compiled in {}",
                "✓".bright_green(),
                format!("{:.0}ms", report.elapsed.as_secs_f64() * 1000.0).bright_white().bold()
            );
        } else {
            println!(
                "  {} {} file(s) failed, {} emitted in {}",
                "!".bright_yellow(),
                failures.to_string().bright_red().bold(),
                report.artifacts().count(),
                format!("{:.0}ms", report.elapsed.as_secs_f64() * 1000.0).bright_white()
            );
        }
    }

    pub fn show_bundle_report(report: &BundleReport, paths: &ProjectPaths) {
        println!();
        if let Some(artifact) = &report.artifact {
            Self::show_artifact(artifact, paths);
        }

        println!(
            "  {} {} modules ({} recompiled, {} cached)",
            "📦".bright_cyan(),
            report.modules.to_string().bright_cyan().bold(),
            report.recompiled.len(),
            report.reused
        );

        println!();
        match &report.error {
            None => println!(
                "  {} bundled in {}",
                "✓".bright_green(),
                format!("{:.0}ms", report.elapsed.as_secs_f64() * 1000.0).bright_white().bold()
            ),
            Some(error) => println!("  {} {}", "✗".bright_red(), error.bright_red()),
        }
    }

    fn show_artifact(artifact: &OutputArtifact, paths: &ProjectPaths) {
        println!(
            "  {} {}",
            paths.display(&artifact.path).bright_cyan(),
            format!("({})", format_size(artifact.size)).bright_black()
        );
    }
}

pub fn format_size(bytes: usize) -> String {
    let kb = bytes as f64 / 1024.0;
    if kb < 1.0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} kB", kb)
    }
}
