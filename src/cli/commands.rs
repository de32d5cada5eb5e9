use crate::core::paths;
use crate::core::{BuildPipeline, ProjectPaths, Variant};
use crate::infrastructure::TokioFileSystemService;
use crate::utils::{CliOverrides, ConfigLoader, KilnUI, Logger, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kiln", version)]
#[command(about = "Clean, transpile, bundle, minify and watch JavaScript/TypeScript sources")]
pub struct Cli {
    /// Project root (default: the current directory)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Transform variant; overrides the config file
    #[arg(long, value_enum, global = true)]
    pub variant: Option<Variant>,

    /// Config file (default: <root>/kiln.config.json when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Clean the output directory, then run the transform once
    Build,
    /// Build, then rebuild on every change until interrupted
    Watch,
    /// Only clean the output directory
    Clean,
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        Logger::init();
        let cli = Cli::parse();
        self.execute(cli).await
    }

    /// Fatal setup problems are returned; stage failures are logged and the
    /// invocation still succeeds
    pub async fn execute(&self, cli: Cli) -> Result<()> {
        let root = match &cli.root {
            Some(root) => root.clone(),
            None => paths::working_dir()?,
        };

        let overrides = CliOverrides {
            variant: cli.variant,
        };
        let config = ConfigLoader::resolve(&root, cli.config.as_ref(), &overrides)?;
        let paths = ProjectPaths::resolve(&root, &config)?;

        KilnUI::show_banner(&config.variant.to_string());
        Logger::debug(&format!(
            "source {} -> output {}",
            paths.source_root().display(),
            paths.output_root().display()
        ));

        let pipeline = Arc::new(BuildPipeline::new(paths, config, Arc::new(TokioFileSystemService)).await?);

        let task = match cli.command {
            Commands::Build => "build".to_string(),
            Commands::Watch => "watch".to_string(),
            Commands::Clean => pipeline.clean_task_name(),
        };

        match pipeline.run(&task).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal_setup() => Err(e),
            Err(e) => {
                Logger::error(&e.format_detailed());
                Ok(())
            }
        }
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}
