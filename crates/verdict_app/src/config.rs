use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use verdict_core::{IngestSettings, VerdictMarkers};
use verdict_engine::ClassifierSettings;
use verdict_logging::{verdict_info, verdict_warn};

pub(crate) const DEFAULT_CONFIG_FILE: &str = "verdict.ron";
pub(crate) const AUTH_TOKEN_ENV: &str = "VERDICT_AUTH_TOKEN";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ron::error::SpannedError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    /// Directory holding the persisted run state.
    pub state_dir: PathBuf,
    pub export_dir: PathBuf,
    pub classifier: ClassifierSettings,
    pub ingest: IngestSettings,
    pub markers: VerdictMarkers,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".verdict"),
            export_dir: PathBuf::from("reports"),
            classifier: ClassifierSettings::default(),
            ingest: IngestSettings::default(),
            markers: VerdictMarkers::default(),
        }
    }
}

/// Reads the RON config at `path`. A missing file yields the defaults.
pub(crate) fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            verdict_info!("No config at {:?}, using defaults", path);
            return Ok(AppConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };
    let config = ron::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    verdict_info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Applies environment overrides; `lookup` is `std::env::var` outside tests.
pub(crate) fn apply_env(mut config: AppConfig, lookup: impl Fn(&str) -> Option<String>) -> AppConfig {
    if let Some(token) = lookup(AUTH_TOKEN_ENV).filter(|token| !token.trim().is_empty()) {
        if config.classifier.auth_token.is_some() {
            verdict_warn!("{} overrides the auth token from the config file", AUTH_TOKEN_ENV);
        }
        config.classifier.auth_token = Some(token.trim().to_string());
    }
    config
}
