use std::path::{Path, PathBuf};

use crate::config::types::RunletConfig;
use crate::error::{Result, RunletError};
use crate::model::Language;

/// Get the default configuration file path
pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "runlet", "runlet") {
        proj_dirs.config_dir().join("config.toml")
    } else {
        // Fallback to home directory
        dirs_fallback().join(".runlet").join("config.toml")
    }
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(config_path: Option<&Path>) -> Result<RunletConfig> {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    if !path.exists() {
        // An explicitly requested file must exist
        if config_path.is_some() {
            return Err(RunletError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        return Ok(RunletConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config: RunletConfig =
        toml::from_str(&content).map_err(|e| RunletError::TomlParse(e.to_string()))?;

    Ok(config)
}

/// Values supplied through the environment or command line.
///
/// Anything set here wins over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub language: Option<Language>,
    pub queue_url: Option<String>,
    pub queue_name: Option<String>,
    pub region: Option<String>,
    pub cache_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    pub max_concurrency: Option<usize>,
}

pub fn apply_overrides(config: &mut RunletConfig, overrides: ConfigOverrides) {
    if let Some(language) = overrides.language {
        config.worker.language = language;
    }
    if let Some(url) = overrides.queue_url {
        config.queue.url = Some(url);
    }
    if let Some(name) = overrides.queue_name {
        config.queue.name = name;
    }
    if let Some(region) = overrides.region {
        config.queue.region = Some(region);
    }
    if let Some(url) = overrides.cache_url {
        config.cache.url = url;
    }
    if let Some(timeout) = overrides.timeout_secs {
        config.sandbox.timeout_secs = timeout;
    }
    if let Some(memory) = overrides.memory_limit_mb {
        config.sandbox.memory_limit_mb = memory;
    }
    if let Some(concurrency) = overrides.max_concurrency {
        config.worker.max_concurrency = concurrency;
    }
}
