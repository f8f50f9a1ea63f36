use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::settings::Settings;

pub const BASE_URL_ENV: &str = "ACE_LLM_LOGIC_BASE_URL";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write settings to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("ace-llm-logic");
    path.push("settings.json");
    path
}

/// Load settings from `path`, or defaults when the file does not exist.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let mut settings = match fs::read_to_string(path) {
        Ok(json) => serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("no settings at {}, using defaults", path.display());
            Settings::default()
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(base_url) = env::var(BASE_URL_ENV) {
        if !base_url.trim().is_empty() {
            settings.llm.base_url = base_url.trim().to_string();
        }
    }
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })
}
