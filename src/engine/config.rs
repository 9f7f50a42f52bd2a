//! Covenant Configuration Module
//! Handles loading and validating covenant.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "covenant.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub service: ServiceConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

/// Risk scoring knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// ISO 3166-1 alpha-2 codes treated as high risk
    #[serde(default = "default_high_risk_countries")]
    pub high_risk_countries: Vec<String>,
    #[serde(default = "default_high_risk_penalty")]
    pub high_risk_penalty: u8,
    #[serde(default = "default_invalid_id_penalty")]
    pub invalid_id_penalty: u8,
    /// Upper bound (inclusive) of the random component
    #[serde(default = "default_max_variance")]
    pub max_variance: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
}

fn default_port() -> u16 {
    54380
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_high_risk_countries() -> Vec<String> {
    ["AF", "IR", "KP", "MM", "SY", "YE"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_high_risk_penalty() -> u8 {
    30
}

fn default_invalid_id_penalty() -> u8 {
    25
}

fn default_max_variance() -> u8 {
    20
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("./audit")
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_risk_countries: default_high_risk_countries(),
            high_risk_penalty: default_high_risk_penalty(),
            invalid_id_penalty: default_invalid_id_penalty(),
            max_variance: default_max_variance(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: PathBuf::from("./data/covenant.db"),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            dir: default_audit_dir(),
        }
    }
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Penalties above 100 would make the clamp meaningless for a single factor
    pub fn validate(&self) -> Result<(), ConfigError> {
        let risk = &self.risk;
        for (name, value) in [
            ("high_risk_penalty", risk.high_risk_penalty),
            ("invalid_id_penalty", risk.invalid_id_penalty),
            ("max_variance", risk.max_variance),
        ] {
            if value > 100 {
                return Err(ConfigError::Invalid(format!(
                    "risk.{} must be within 0..=100, got {}",
                    name, value
                )));
            }
        }
        if risk.high_risk_countries.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "risk.high_risk_countries contains an empty code".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_for_service(name: &str) -> Self {
        Self {
            version: "0.1.0".to_string(),
            service: ServiceConfig {
                name: name.to_string(),
                id: format!("covenant-{}", name),
            },
            api: ApiConfig {
                port: default_port(),
                host: default_host(),
            },
            risk: RiskConfig::default(),
            storage: StorageConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}
