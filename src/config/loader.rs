use std::{env, str::FromStr, time::Duration};

use url::Url;

use crate::tasks::fetcher::MAX_PAGE_SIZE;

use super::env::{
    AppConfig, ArchiveConfig, ConfigError, DirectoryConfig, LoggingConfig, SourceConfig,
};

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let admin_group_id = parse_or::<i64>("ADMIN_GROUP_ID", None)?
            .map(|id| if id > 0 { -id } else { id });

        let api_base = env::var("SOURCE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        if Url::parse(&api_base).is_err() {
            return Err(ConfigError::Invalid {
                key: "SOURCE_API_BASE",
                value: api_base,
            });
        }
        let page_size = parse_or("SOURCE_PAGE_SIZE", Some(MAX_PAGE_SIZE))?.unwrap_or(MAX_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid {
                key: "SOURCE_PAGE_SIZE",
                value: page_size.to_string(),
            });
        }
        let source = SourceConfig {
            api_base,
            api_token: required("SOURCE_API_TOKEN")?,
            page_size,
            request_timeout: Duration::from_millis(
                parse_or("SOURCE_REQUEST_TIMEOUT", Some(15_000u64))?.unwrap_or(15_000),
            ),
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            db_filename: env::var("DB_FILENAME").unwrap_or_else(|_| "archives.db".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let timezone = env::var("BOT_TIMEZONE").unwrap_or_else(|_| "UTC".to_string());
        if timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Invalid {
                key: "BOT_TIMEZONE",
                value: timezone,
            });
        }

        let archive = ArchiveConfig {
            retain_records: parse_bool("ARCHIVE_RETAIN_RECORDS")?,
            retention_days: parse_or("ARCHIVE_RETENTION_DAYS", Some(30u32))?.unwrap_or(30),
            purge_crons: env::var("ARCHIVE_PURGE_CRONS")
                .map(|value| split_specs(&value))
                .unwrap_or_else(|_| vec!["0 0 3 * * *".to_string()]),
        };

        Ok(Self {
            telegram_bot_token,
            admin_group_id,
            source,
            directories,
            logging,
            timezone,
            archive,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<T: FromStr>(key: &'static str, default: Option<T>) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(default),
    }
}

fn parse_bool(key: &'static str) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        },
        Err(_) => Ok(false),
    }
}

fn split_specs(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_specs_are_split_on_semicolons() {
        assert_eq!(
            split_specs("0 0 3 * * *; ;0 30 12 * * *"),
            vec!["0 0 3 * * *".to_string(), "0 30 12 * * *".to_string()]
        );
    }
}
