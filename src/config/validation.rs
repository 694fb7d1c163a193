use crate::config::types::{Config, CrawlerConfig, OutputConfig};
use crate::ConfigError;
use std::path::{Component, Path, PathBuf};

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    for &code in &config.retry_http_codes {
        if !(100..=599).contains(&code) {
            return Err(ConfigError::Validation(format!(
                "retry-http-codes entry {} is not an HTTP status",
                code
            )));
        }

        // A 2xx always proceeds to extraction, so listing one here does nothing
        if (200..300).contains(&code) {
            return Err(ConfigError::Validation(format!(
                "retry-http-codes cannot contain success status {}",
                code
            )));
        }
    }

    if config.second_level_segments < 1 {
        return Err(ConfigError::Validation(
            "second-level-segments must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    if config.state_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "state-dir cannot be empty".to_string(),
        ));
    }

    if normalize_dir(&config.data_dir)? == normalize_dir(&config.state_dir)? {
        return Err(ConfigError::Validation(format!(
            "data-dir '{}' and state-dir '{}' name the same directory",
            config.data_dir, config.state_dir
        )));
    }

    if config.flush_every < 1 {
        return Err(ConfigError::Validation(format!(
            "flush-every must be >= 1, got {}",
            config.flush_every
        )));
    }

    Ok(())
}

/// Makes `dir` absolute and folds `.` and `..` without touching the disk
fn normalize_dir(dir: &str) -> Result<PathBuf, ConfigError> {
    let absolute = std::path::absolute(Path::new(dir))?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}
