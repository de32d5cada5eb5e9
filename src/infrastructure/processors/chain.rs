use super::{OxcCommentStripper, OxcMinifier, OxcTranspiler};
use crate::core::interfaces::Transform;
use crate::core::models::{BuildConfig, StageKind, TransformFailure};
use crate::utils::{Logger, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What came out of the chain for one file
#[derive(Debug, Clone)]
pub struct ChainOutput {
    /// Output path relative to the output root; a stage may rename the file
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// Ordered transform stages applied to a single file
#[derive(Clone, Default)]
pub struct TransformChain {
    stages: Vec<Arc<dyn Transform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn with_stage(mut self, stage: Arc<dyn Transform>) -> Self {
        self.stages.push(stage);
        self
    }

    /// transpile → strip comments → minify, per configuration
    pub fn per_file(config: &BuildConfig) -> Result<Self> {
        let chain = Self::new().with_stage(Arc::new(OxcTranspiler::new(&config.target)?));
        Ok(chain.with_finishing_stages(config))
    }

    /// The stages that run over a whole bundle after it is assembled
    pub fn finishing(config: &BuildConfig) -> Self {
        Self::new().with_finishing_stages(config)
    }

    fn with_finishing_stages(mut self, config: &BuildConfig) -> Self {
        if config.strip_comments {
            self = self.with_stage(Arc::new(OxcCommentStripper::new()));
        }
        if config.minify {
            self = self.with_stage(Arc::new(OxcMinifier::new()));
        }
        self
    }

    pub fn stages(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.stage()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Push one file through every applicable stage. Files no stage applies to
    /// are passed through byte for byte.
    pub fn run(&self, path: &Path, content: Vec<u8>) -> std::result::Result<ChainOutput, TransformFailure> {
        let mut current_path = path.to_path_buf();
        let mut text: Option<String> = None;
        let mut raw = Some(content);

        for stage in &self.stages {
            if !stage.applies_to(&current_path) {
                continue;
            }

            let source = match text.take() {
                Some(source) => source,
                None => {
                    let bytes = raw.take().unwrap_or_default();
                    String::from_utf8(bytes).map_err(|e| TransformFailure {
                        path: path.to_path_buf(),
                        stage: stage.stage(),
                        message: format!("file is not valid UTF-8: {}", e),
                    })?
                }
            };

            Logger::processing_file(&current_path.display().to_string(), &stage.stage().to_string());

            let output = stage.apply(&source, &current_path).map_err(|e| TransformFailure {
                path: path.to_path_buf(),
                stage: stage.stage(),
                message: e.to_string(),
            })?;

            current_path = stage.output_path(&current_path);
            text = Some(output);
        }

        let content = match text {
            Some(text) => text.into_bytes(),
            None => raw.unwrap_or_default(),
        };

        Ok(ChainOutput {
            path: current_path,
            content,
        })
    }

    /// Run the chain over in-memory text, e.g. an assembled bundle
    pub fn run_text(&self, path: &Path, text: String) -> Result<String> {
        let mut current = text;
        for stage in &self.stages {
            if stage.applies_to(path) {
                current = stage.apply(&current, path)?;
            }
        }
        Ok(current)
    }
}
