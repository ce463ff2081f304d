//! Configuration loader
//!
//! Builds an [`EngineConfig`] in layers:
//! 1. a config file, when one is given or found by [`find_config_paths`]
//!    (otherwise the built-in defaults)
//! 2. `PARTSOURCE_*` environment variables on top
//! 3. validation of the merged result
//!
//! ## Environment Variables
//! - `PARTSOURCE_DB_PATH`: Database file path
//! - `PARTSOURCE_DB_POOL_SIZE`: Connection pool size
//! - `PARTSOURCE_MAX_CONCURRENT_CALLS`: Vendor call worker pool size
//! - `PARTSOURCE_QUOTING_DEADLINE_SECS`: Default quoting deadline
//! - `PARTSOURCE_HEALTH_INTERVAL_SECS`: Vendor health check interval
//! - `PARTSOURCE_LOG_LEVEL`: Log filter directive
//! - `PARTSOURCE_LOG_JSON`: JSON log output (true/false)
//!
//! ## File Locations
//! The loader searches the working directory, then the executable's directory,
//! for `partsource.toml`, `partsource.json`, `config.toml` and `config.json`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use partsource_domain::{EngineConfig, PartSourceError, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["partsource.toml", "partsource.json", "config.toml", "config.json"];

/// Load configuration from the discovered file (if any) plus the environment
///
/// # Errors
/// Returns `PartSourceError::Config` if a file cannot be parsed, an
/// environment value is malformed or the merged config fails validation.
pub fn load() -> Result<EngineConfig> {
    load_with_path(None)
}

/// Like [`load`], but reads `path` instead of probing when one is given
pub fn load_with_path(path: Option<PathBuf>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => load_from_file(&path)?,
        None => match find_config_paths() {
            Some(path) => load_from_file(&path)?,
            None => {
                tracing::debug!("no config file found, using defaults");
                EngineConfig::default()
            }
        },
    };
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Defaults overlaid with the environment; no file is read
pub fn load_from_env() -> Result<EngineConfig> {
    let mut config = EngineConfig::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Read and parse a TOML or JSON config file
///
/// # Errors
/// Returns `PartSourceError::Config` if the file is missing, unreadable or
/// not valid for its format.
pub fn load_from_file(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Err(PartSourceError::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    tracing::info!(path = %path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| PartSourceError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, path)
}

/// Format is detected by file extension (`.json` or `.toml`)
fn parse_config(contents: &str, path: &Path) -> Result<EngineConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| PartSourceError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| PartSourceError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(PartSourceError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the working or executable directory
pub fn find_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn apply_env_overrides(config: &mut EngineConfig) -> Result<()> {
    if let Some(path) = env_string("PARTSOURCE_DB_PATH") {
        config.database.path = path;
    }
    if let Some(size) = env_parse("PARTSOURCE_DB_POOL_SIZE")? {
        config.database.pool_size = size;
    }
    if let Some(calls) = env_parse("PARTSOURCE_MAX_CONCURRENT_CALLS")? {
        config.orchestration.max_concurrent_calls = calls;
    }
    if let Some(secs) = env_parse("PARTSOURCE_QUOTING_DEADLINE_SECS")? {
        config.orchestration.default_quoting_deadline_secs = secs;
    }
    if let Some(secs) = env_parse("PARTSOURCE_HEALTH_INTERVAL_SECS")? {
        config.health.interval_secs = secs;
    }
    if let Some(level) = env_string("PARTSOURCE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = env_bool("PARTSOURCE_LOG_JSON") {
        config.logging.json = json;
    }
    Ok(())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|value| value.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| PartSourceError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
