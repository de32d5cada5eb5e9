/// Helpers shared by the oxc-backed processors
use crate::core::models::StageKind;
use crate::utils::{ErrorContext, KilnError};
use oxc_diagnostics::OxcDiagnostic;
use oxc_span::SourceType;
use std::path::{Path, PathBuf};

/// Extensions the oxc pipeline understands
pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx"];

/// Extensions whose transpiled output is plain JavaScript with a `.js` name
const RENAMED_EXTENSIONS: &[&str] = &["jsx", "ts", "mts", "cts", "tsx"];

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

pub fn is_script(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SCRIPT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_json(path: &Path) -> bool {
    extension_of(path).as_deref() == Some("json")
}

/// `app.ts` -> `app.js`; files that already are JavaScript keep their name
pub fn javascript_output_path(path: &Path) -> PathBuf {
    match extension_of(path) {
        Some(ext) if RENAMED_EXTENSIONS.contains(&ext.as_str()) => path.with_extension("js"),
        _ => path.to_path_buf(),
    }
}

pub fn source_type_for(path: &Path) -> SourceType {
    SourceType::from_path(path).unwrap_or_default()
}

pub fn describe_diagnostics(errors: &[OxcDiagnostic]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn parse_error(path: &Path, stage: StageKind, errors: &[OxcDiagnostic]) -> KilnError {
    KilnError::parse_with_context(
        describe_diagnostics(errors),
        ErrorContext::new()
            .with_file(path.to_path_buf())
            .with_stage(stage.to_string()),
    )
}

pub fn stage_error(path: &Path, stage: StageKind, message: String) -> KilnError {
    KilnError::build_with_context(
        message,
        ErrorContext::new()
            .with_file(path.to_path_buf())
            .with_stage(stage.to_string()),
    )
}
