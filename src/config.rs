#![forbid(unsafe_code)]

//! Runtime settings. Values come from CLI overrides first, then the process
//! environment, then a `.env` file, then the defaults below.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
pub const DEFAULT_EXTRACTOR_COMMAND: &str = "yt-dlp";
pub const DEFAULT_EXTRACTOR_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_DELETE_DELAY_MS: u64 = 1000;
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:8080",
];

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub download_dir: PathBuf,
    pub extractor_command: PathBuf,
    pub extractor_timeout: Duration,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub delete_delay: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub download_dir: Option<PathBuf>,
    pub extractor_command: Option<PathBuf>,
    pub extractor_timeout_secs: Option<u64>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_runtime_settings_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeSettings {
    build_runtime_settings_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let download_dir = overrides
        .download_dir
        .or_else(|| lookup("DOWNLOAD_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR));
    let extractor_command = overrides
        .extractor_command
        .or_else(|| lookup("YTDLP_COMMAND").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXTRACTOR_COMMAND));
    let timeout_secs = overrides
        .extractor_timeout_secs
        .or_else(|| lookup("YTDLP_TIMEOUT_SECS").and_then(|value| value.parse().ok()))
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_EXTRACTOR_TIMEOUT_SECS);
    let port = overrides
        .port
        .or_else(|| lookup("VIDGRAB_PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_PORT);
    let host = overrides
        .host
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        })
        .or_else(|| lookup("VIDGRAB_HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let allowed_origins = lookup("VIDGRAB_ALLOWED_ORIGINS")
        .map(|value| parse_origin_list(&value))
        .filter(|origins| !origins.is_empty())
        .unwrap_or_else(|| {
            DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| origin.to_string())
                .collect()
        });
    let delete_delay_ms = lookup("VIDGRAB_DELETE_DELAY_MS")
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(DEFAULT_DELETE_DELAY_MS);

    RuntimeSettings {
        download_dir,
        extractor_command,
        extractor_timeout: Duration::from_secs(timeout_secs),
        host,
        port,
        allowed_origins,
        delete_delay: Duration::from_millis(delete_delay_ms),
    }
}

fn parse_origin_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| origin.trim_end_matches('/').to_string())
        .collect()
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
