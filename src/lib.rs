pub mod collector;
pub mod config;
pub mod matcher;
pub mod models;
pub mod orchestrator;
pub mod pricing;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use models::{CatalogReference, ScrapedRecord};
pub use orchestrator::{Orchestrator, RunSummary};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
