use super::common::{is_script, parse_error, source_type_for};
use crate::core::interfaces::Transform;
use crate::core::models::StageKind;
use crate::utils::Result;
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc_parser::Parser;
use std::path::Path;

/// Re-prints a script with comment emission turned off
#[derive(Debug, Clone, Default)]
pub struct OxcCommentStripper;

impl OxcCommentStripper {
    pub fn new() -> Self {
        Self
    }

    pub fn strip(&self, source: &str, path: &Path) -> Result<String> {
        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, source_type_for(path)).parse();

        if parsed.panicked || !parsed.errors.is_empty() {
            return Err(parse_error(path, StageKind::StripComments, &parsed.errors));
        }

        let options = CodegenOptions {
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        };

        Ok(Codegen::new().with_options(options).build(&parsed.program).code)
    }
}

impl Transform for OxcCommentStripper {
    fn stage(&self) -> StageKind {
        StageKind::StripComments
    }

    fn applies_to(&self, path: &Path) -> bool {
        is_script(path)
    }

    fn apply(&self, source: &str, path: &Path) -> Result<String> {
        self.strip(source, path)
    }
}
