// Shared utilities module
pub mod config_loader;
pub mod errors;
pub mod incremental;
pub mod logging;
pub mod ui;
pub mod watch;

pub use config_loader::*;
pub use errors::*;
pub use incremental::*;
pub use logging::*;
pub use ui::*;
pub use watch::*;
