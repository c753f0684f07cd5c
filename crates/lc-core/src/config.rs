use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::types::{AssigneeId, Complexity, DisputeType};

/// Top-level configuration loaded from `~/.landcase/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub assignment: AssignmentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub valuation: ValuationConfig,
}

impl Config {
    /// Load config from `~/.landcase/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not expressible via types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.orchestrator.validate()?;
        self.assignment.validate()?;
        self.scheduler.validate()?;
        self.valuation.validate()?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".landcase")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_project_name() -> String {
    "landcase".into()
}
fn default_log_level() -> String {
    "info".into()
}

/// Defaults applied to automation requests that leave fields unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    #[serde(default)]
    pub default_dispute_type: DisputeType,
    #[serde(default)]
    pub default_complexity: Complexity,
    #[serde(default = "default_location")]
    pub default_location: String,
    #[serde(default = "default_area_acres")]
    pub default_area_acres: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: default_handler_timeout_secs(),
            default_dispute_type: DisputeType::default(),
            default_complexity: Complexity::default(),
            default_location: default_location(),
            default_area_acres: default_area_acres(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handler_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "orchestrator.handler_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !(self.default_area_acres.is_finite() && self.default_area_acres > 0.0) {
            return Err(ConfigError::Validation(format!(
                "orchestrator.default_area_acres must be positive, got {}",
                self.default_area_acres
            )));
        }
        Ok(())
    }

    pub fn handler_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.handler_timeout_secs)
    }
}

fn default_handler_timeout_secs() -> u64 {
    30
}
fn default_location() -> String {
    "delhi".into()
}
fn default_area_acres() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeEntry {
    pub id: AssigneeId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub initial_workload: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentConfig {
    #[serde(default = "default_assignees")]
    pub assignees: Vec<AssigneeEntry>,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            assignees: default_assignees(),
        }
    }
}

impl AssignmentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.assignees {
            if !seen.insert(entry.id) {
                return Err(ConfigError::Validation(format!(
                    "assignment.assignees contains duplicate id {}",
                    entry.id
                )));
            }
        }
        Ok(())
    }

    /// Roster as an id → workload map.
    pub fn workloads(&self) -> BTreeMap<AssigneeId, u32> {
        self.assignees
            .iter()
            .map(|a| (a.id, a.initial_workload))
            .collect()
    }
}

fn default_assignees() -> Vec<AssigneeEntry> {
    [(1, 5), (2, 3), (3, 8), (4, 2)]
        .into_iter()
        .map(|(id, initial_workload)| AssigneeEntry {
            id,
            name: None,
            initial_workload,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_overdue_sweep_secs")]
    pub overdue_sweep_secs: u64,
    #[serde(default = "default_pending_summary_secs")]
    pub pending_summary_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            overdue_sweep_secs: default_overdue_sweep_secs(),
            pending_summary_secs: default_pending_summary_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overdue_sweep_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler.overdue_sweep_secs must be greater than 0".to_string(),
            ));
        }
        if self.pending_summary_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler.pending_summary_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_overdue_sweep_secs() -> u64 {
    60
}
fn default_pending_summary_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
        }
    }
}

fn default_history_capacity() -> usize {
    100
}

/// Extra per-location land rates (lakh per acre), merged over the built-in
/// table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValuationConfig {
    #[serde(default)]
    pub location_rates: BTreeMap<String, f64>,
}

impl ValuationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (location, rate) in &self.location_rates {
            if !(rate.is_finite() && *rate > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "valuation.location_rates.{location} must be positive, got {rate}"
                )));
            }
        }
        Ok(())
    }
}
