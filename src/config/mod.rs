pub mod env;
mod loader;

pub use env::{AppConfig, ArchiveConfig, DirectoryConfig, SourceConfig};
pub use loader::load_config;
