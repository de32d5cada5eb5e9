//! kiln: a task-graph build orchestrator for JavaScript and TypeScript
//! sources. It cleans an output directory, then transpiles, strips comments
//! and minifies either file by file or into one bundle, and can keep doing so
//! on every change.

pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod utils;

pub use crate::core::{BuildPipeline, BundleSession, ProjectPaths, TaskGraph};
pub use crate::utils::{KilnError, Result};
