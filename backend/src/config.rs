//! # Application Configuration
//!
//! Settings are read from an optional YAML file and then overridden from the
//! environment for addresses and secrets.
//!
//! ## YAML Format
//!
//! ```yaml
//! server:
//!   host: "127.0.0.1"
//!   port: 3000
//!   cors_origin: "http://localhost:8080"
//! database_url: "sqlite:guardian.db"
//! geofence:
//!   sync_strategy: full_replace
//!   dwell_delay_secs: 300
//!   max_regions: 100
//!   location_permission_granted: true
//! analysis:
//!   endpoint: "https://generativelanguage.googleapis.com/v1beta"
//!   model: "gemini-2.5-flash"
//!   api_key: "..."
//!   sample_size: 100
//!   timeout_secs: 60
//! log_level: "info"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::analysis_service::DEFAULT_SAMPLE_SIZE;
use crate::domain::SyncStrategy;
use crate::platform::TransitionMask;

pub const CONFIG_ENV_VAR: &str = "GUARDIAN_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "guardian.yaml";
pub const DATABASE_URL_ENV_VAR: &str = "GUARDIAN_DATABASE_URL";
pub const PORT_ENV_VAR: &str = "GUARDIAN_PORT";
pub const API_KEY_ENV_VAR: &str = "GUARDIAN_GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_origin: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    pub sync_strategy: SyncStrategy,
    /// Dwell transitions are reported only when a delay is configured
    pub dwell_delay_secs: Option<u64>,
    pub max_regions: usize,
    pub location_permission_granted: bool,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            sync_strategy: SyncStrategy::FullReplace,
            dwell_delay_secs: None,
            max_regions: 100,
            location_permission_granted: true,
        }
    }
}

impl GeofenceConfig {
    pub fn transition_mask(&self) -> TransitionMask {
        match self.dwell_delay_secs {
            Some(_) => TransitionMask::default().union(TransitionMask::DWELL),
            None => TransitionMask::default(),
        }
    }

    pub fn dwell_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dwell_delay_secs.unwrap_or(0) as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub sample_size: usize,
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            sample_size: DEFAULT_SAMPLE_SIZE,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub geofence: GeofenceConfig,
    pub analysis: AnalysisConfig,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_url: "sqlite:guardian.db".to_string(),
            geofence: GeofenceConfig::default(),
            analysis: AnalysisConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `GUARDIAN_CONFIG` (or `guardian.yaml` when present), then
    /// apply environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .ok()
            .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                info!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml_content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: AppConfig =
            serde_yaml::from_str(&yaml_content).with_context(|| format!("Invalid config file {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Override settings from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_ENV_VAR) {
            debug!("Database URL overridden from {}", DATABASE_URL_ENV_VAR);
            self.database_url = url;
        }
        if let Some(port) = lookup(PORT_ENV_VAR) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} is not a valid port: {}", PORT_ENV_VAR, port))?;
        }
        if let Some(key) = lookup(API_KEY_ENV_VAR).filter(|k| !k.trim().is_empty()) {
            self.analysis.api_key = Some(key);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
