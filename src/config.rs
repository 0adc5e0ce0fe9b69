use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::api::monday::{DEFAULT_API_URL, DEFAULT_API_VERSION};
use crate::api::RetryPolicy;
use crate::model::event::NAME_COLUMN;
use crate::sync::derive::ShiftDirection;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no API token configured: set MONDAY_API_TOKEN or [monday].api_token")]
    MissingToken,
    #[error("duplicate automation name {0:?}")]
    DuplicateName(String),
    #[error("automation {name:?} writes to trigger column {column:?} but has no marker_column")]
    MissingMarker { name: String, column: String },
    #[error("automation {0:?}: email_source_column and email_target_column must be set together")]
    IncompleteEmailMirror(String),
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub monday: MondayConfig,
    pub retry: RetrySettings,
    pub backfill: BackfillConfig,
    pub date_copy: Vec<DateCopyConfig>,
    pub crew_link: Vec<CrewLinkConfig>,
    pub contact_name: Vec<ContactNameConfig>,
    pub reports: ReportsConfig,
    pub activity: ActivityConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MondayConfig {
    pub api_token: Option<String>,
    pub api_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl Default for MondayConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout_secs: 10,
        }
    }
}

impl MondayConfig {
    pub fn token(&self) -> Result<&str, ConfigError> {
        self.api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::DEFAULT;
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    pub time_budget_secs: u64,
    pub page_size: u32,
    pub write_delay_ms: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: 50,
            page_size: 50,
            write_delay_ms: 150,
        }
    }
}

/// Copy a date into another column, a day earlier or later unless the status
/// is the exempt label.
#[derive(Debug, Clone, Deserialize)]
pub struct DateCopyConfig {
    pub name: String,
    pub board_id: u64,
    pub source_column: String,
    pub status_column: String,
    pub target_column: String,
    pub exempt_label: String,
    #[serde(default = "default_direction")]
    pub direction: ShiftDirection,
    #[serde(default)]
    pub marker_column: Option<String>,
    /// Defaults to the source and status columns.
    #[serde(default)]
    pub trigger_columns: Option<Vec<String>>,
}

fn default_direction() -> ShiftDirection {
    ShiftDirection::Backward
}

impl DateCopyConfig {
    pub fn triggers(&self) -> Vec<String> {
        self.trigger_columns
            .clone()
            .unwrap_or_else(|| vec![self.source_column.clone(), self.status_column.clone()])
    }
}

/// Follow a relation to a job item and copy the job id out of its URL.
#[derive(Debug, Clone, Deserialize)]
pub struct CrewLinkConfig {
    pub name: String,
    pub board_id: u64,
    pub relation_column: String,
    /// Link column on the related job item.
    pub job_url_column: String,
    /// Text column receiving the job id.
    pub target_column: String,
    /// Optional link column receiving the job URL, labelled with the id.
    #[serde(default)]
    pub link_column: Option<String>,
    #[serde(default)]
    pub marker_column: Option<String>,
}

/// Split a contact's first name out of the item name.
#[derive(Debug, Clone, Deserialize)]
pub struct ContactNameConfig {
    pub name: String,
    pub board_id: u64,
    pub first_name_column: String,
    #[serde(default)]
    pub email_source_column: Option<String>,
    #[serde(default)]
    pub email_target_column: Option<String>,
    #[serde(default)]
    pub marker_column: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub packages: Vec<PackagePin>,
    pub runtimes: Vec<RuntimePin>,
    pub warn_days: i64,
    pub registry_url: String,
    pub eol_url: String,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            runtimes: Vec::new(),
            warn_days: 90,
            registry_url: "https://registry.npmjs.org".to_string(),
            eol_url: "https://endoflife.date/api".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackagePin {
    pub name: String,
    pub current: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimePin {
    pub product: String,
    pub cycle: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl ActivityConfig {
    pub fn log_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| data_dir().join("sync-activity.jsonl"))
    }
}

impl AppConfig {
    /// Reject definitions that would loop or collide.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        let all_names = self
            .date_copy
            .iter()
            .map(|a| &a.name)
            .chain(self.crew_link.iter().map(|a| &a.name))
            .chain(self.contact_name.iter().map(|a| &a.name));
        for name in all_names {
            if !names.insert(name.as_str()) {
                return Err(ConfigError::DuplicateName(name.clone()));
            }
        }

        for a in &self.date_copy {
            require_marker(&a.name, &[&a.target_column], &a.triggers(), &a.marker_column)?;
        }
        for a in &self.crew_link {
            let mut targets = vec![a.target_column.as_str()];
            targets.extend(a.link_column.as_deref());
            require_marker(&a.name, &targets, &[a.relation_column.clone()], &a.marker_column)?;
        }
        for a in &self.contact_name {
            if a.email_source_column.is_some() != a.email_target_column.is_some() {
                return Err(ConfigError::IncompleteEmailMirror(a.name.clone()));
            }
            let mut targets = vec![a.first_name_column.as_str()];
            targets.extend(a.email_target_column.as_deref());
            let mut triggers = vec![NAME_COLUMN.to_string()];
            triggers.extend(a.email_source_column.clone());
            require_marker(&a.name, &targets, &triggers, &a.marker_column)?;
        }
        Ok(())
    }

    /// Token from the environment wins over the file.
    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("MONDAY_API_TOKEN") {
            if !token.trim().is_empty() {
                self.monday.api_token = Some(token);
            }
        }
    }
}

fn require_marker(
    name: &str,
    targets: &[&str],
    triggers: &[String],
    marker: &Option<String>,
) -> Result<(), ConfigError> {
    if marker.is_some() {
        return Ok(());
    }
    match targets.iter().find(|t| triggers.iter().any(|tr| tr == *t)) {
        Some(column) => Err(ConfigError::MissingMarker {
            name: name.to_string(),
            column: column.to_string(),
        }),
        None => Ok(()),
    }
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".board-sync")
}

pub fn config_path() -> PathBuf {
    std::env::var_os("BOARD_SYNC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir().join("config.toml"))
}

pub fn load_config() -> Result<AppConfig> {
    let path = config_path();
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        parse_config(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        AppConfig::default()
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents)?;
    Ok(config)
}
