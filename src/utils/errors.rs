use std::path::PathBuf;
use thiserror::Error;

/// Extra location details attached to parse and build errors
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub stage: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum KilnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Build error: {message}")]
    Build {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Bundle error: {0}")]
    Bundle(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    #[error("Task '{0}' is declared twice")]
    DuplicateTask(String),

    #[error("Task dependency cycle involving '{0}'")]
    CycleDetected(String),

    #[error("Task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<KilnError>,
    },
}

impl KilnError {
    pub fn parse(message: String) -> Self {
        Self::Parse {
            message,
            context: None,
        }
    }

    pub fn parse_with_context(message: String, context: ErrorContext) -> Self {
        Self::Parse {
            message,
            context: Some(context),
        }
    }

    pub fn build(message: String) -> Self {
        Self::Build {
            message,
            context: None,
        }
    }

    pub fn build_with_context(message: String, context: ErrorContext) -> Self {
        Self::Build {
            message,
            context: Some(context),
        }
    }

    pub fn config(message: String) -> Self {
        Self::Config(message)
    }

    /// True for errors that must abort the invocation before any stage runs
    pub fn is_fatal_setup(&self) -> bool {
        matches!(self, KilnError::InvalidPath(_) | KilnError::Config(_))
    }

    /// Format error with enhanced context display
    pub fn format_detailed(&self) -> String {
        match self {
            KilnError::Parse { message, context } => {
                Self::format_error_with_context("Parse Error", message, context)
            }
            KilnError::Build { message, context } => {
                Self::format_error_with_context("Build Error", message, context)
            }
            KilnError::TaskFailed { task, source } => {
                format!("Task '{}' failed\n{}", task, source.format_detailed())
            }
            _ => self.to_string(),
        }
    }

    fn format_error_with_context(
        error_type: &str,
        message: &str,
        context: &Option<ErrorContext>,
    ) -> String {
        let mut output = format!("{}: {}", error_type, message);

        if let Some(ctx) = context {
            if let Some(ref file_path) = ctx.file_path {
                output.push_str(&format!("\n  File: {}", file_path.display()));
            }
            if let Some(ref stage) = ctx.stage {
                output.push_str(&format!("\n  Stage: {}", stage));
            }
        }

        output
    }
}

pub type Result<T> = std::result::Result<T, KilnError>;

impl From<regex::Error> for KilnError {
    fn from(err: regex::Error) -> Self {
        KilnError::parse(format!("Regex error: {}", err))
    }
}

impl From<serde_json::Error> for KilnError {
    fn from(err: serde_json::Error) -> Self {
        KilnError::parse(format!("JSON error: {}", err))
    }
}

impl From<notify::Error> for KilnError {
    fn from(err: notify::Error) -> Self {
        KilnError::Watch(err.to_string())
    }
}
