// Core domain layer
pub mod bundle;
pub mod interfaces;
pub mod models;
pub mod paths;
pub mod services;
pub mod tasks;

pub use bundle::*;
pub use interfaces::*;
pub use models::*;
pub use paths::*;
pub use services::*;
pub use tasks::*;
