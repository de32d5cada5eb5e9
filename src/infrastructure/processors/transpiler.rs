use super::common::{is_script, javascript_output_path, parse_error, source_type_for, stage_error, describe_diagnostics};
use crate::core::interfaces::Transform;
use crate::core::models::StageKind;
use crate::utils::{KilnError, Result};
use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_transformer::{TransformOptions, Transformer};
use std::path::{Path, PathBuf};

/// Lowers TypeScript, JSX and newer syntax to the configured ECMAScript target.
/// ES module syntax is preserved.
#[derive(Debug, Clone)]
pub struct OxcTranspiler {
    target: String,
}

impl OxcTranspiler {
    pub fn new(target: &str) -> Result<Self> {
        // Reject bad targets at setup time rather than once per file
        TransformOptions::from_target(target).map_err(|e| {
            KilnError::config(format!("Invalid transpile target '{}': {}", target, e))
        })?;

        Ok(Self {
            target: target.to_string(),
        })
    }

    pub fn transpile(&self, source: &str, path: &Path) -> Result<String> {
        let allocator = Allocator::default();
        let source_type = source_type_for(path);

        let parsed = Parser::new(&allocator, source, source_type).parse();
        if parsed.panicked || !parsed.errors.is_empty() {
            return Err(parse_error(path, StageKind::Transpile, &parsed.errors));
        }

        let mut program = parsed.program;
        let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();

        let options = TransformOptions::from_target(&self.target).map_err(|e| {
            stage_error(path, StageKind::Transpile, format!("invalid target: {}", e))
        })?;

        let transformed = Transformer::new(&allocator, path, &options)
            .build_with_scoping(scoping, &mut program);
        if !transformed.errors.is_empty() {
            return Err(stage_error(
                path,
                StageKind::Transpile,
                describe_diagnostics(&transformed.errors),
            ));
        }

        Ok(Codegen::new().build(&program).code)
    }
}

impl Transform for OxcTranspiler {
    fn stage(&self) -> StageKind {
        StageKind::Transpile
    }

    fn applies_to(&self, path: &Path) -> bool {
        is_script(path)
    }

    fn output_path(&self, path: &Path) -> PathBuf {
        javascript_output_path(path)
    }

    fn apply(&self, source: &str, path: &Path) -> Result<String> {
        self.transpile(source, path)
    }
}
