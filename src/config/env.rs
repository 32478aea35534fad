use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub admin_group_id: Option<i64>,
    pub source: SourceConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub timezone: String,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub api_base: String,
    pub api_token: String,
    pub page_size: u8,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub db_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Keep records in the store after delivery instead of deleting them.
    pub retain_records: bool,
    pub retention_days: u32,
    pub purge_crons: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
