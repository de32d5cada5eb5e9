// Processors module
pub mod chain;
pub mod comment_stripper;
pub mod common;
pub mod minifier;
pub mod module_rewriter;
pub mod transpiler;

pub use chain::*;
pub use comment_stripper::*;
pub use minifier::*;
pub use module_rewriter::*;
pub use transpiler::*;
