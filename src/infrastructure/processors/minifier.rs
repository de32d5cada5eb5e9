use super::common::{is_script, parse_error, source_type_for};
use crate::core::interfaces::Transform;
use crate::core::models::StageKind;
use crate::utils::{Logger, Result};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, MangleOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use std::path::Path;

/// JavaScript minification using oxc (compress + mangle)
#[derive(Debug, Clone)]
pub struct OxcMinifier;

impl OxcMinifier {
    pub fn new() -> Self {
        Self
    }

    pub fn minify(&self, source_code: &str, path: &Path) -> Result<String> {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source_code, source_type_for(path)).parse();

        if parsed.panicked || !parsed.errors.is_empty() {
            return Err(parse_error(path, StageKind::Minify, &parsed.errors));
        }

        let options = MinifierOptions {
            mangle: Some(MangleOptions::default()),
            compress: Some(CompressOptions::default()),
        };

        let mut program = parsed.program;
        let minified = Minifier::new(options).minify(&allocator, &mut program);

        let code = Codegen::new()
            .with_options(CodegenOptions::minify())
            .with_scoping(minified.scoping)
            .build(&program)
            .code;

        Logger::debug(&format!(
            "Minified {}: {}",
            path.display(),
            MinificationStats::new(source_code, &code)
        ));

        Ok(code)
    }
}

impl Default for OxcMinifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for OxcMinifier {
    fn stage(&self) -> StageKind {
        StageKind::Minify
    }

    fn applies_to(&self, path: &Path) -> bool {
        is_script(path)
    }

    fn apply(&self, source: &str, path: &Path) -> Result<String> {
        self.minify(source, path)
    }
}

#[derive(Debug, Clone)]
pub struct MinificationStats {
    pub original_size: usize,
    pub minified_size: usize,
    pub reduction_percentage: f64,
}

impl MinificationStats {
    pub fn new(original: &str, minified: &str) -> Self {
        let original_size = original.len();
        let minified_size = minified.len();
        let reduction_percentage = if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - minified_size as f64) / original_size as f64) * 100.0
        };

        Self {
            original_size,
            minified_size,
            reduction_percentage,
        }
    }
}

impl std::fmt::Display for MinificationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.1}% reduction ({} → {} bytes)",
            self.reduction_percentage, self.original_size, self.minified_size
        )
    }
}
