//! Line configuration - engine defaults and deployment settings as TOML
//!
//! Engines take their parameters explicitly; this struct only supplies the
//! values the binary passes in. Each section implements `Default` so a
//! missing file or section behaves like the built-in constants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::anomaly::{DEFAULT_ALERT_THRESHOLD, DEFAULT_SENSITIVITY, DEFAULT_WINDOW_HOURS};
use crate::forecast::{DEFAULT_FIT_BUDGET, DEFAULT_HORIZON_DAYS, MIN_SAMPLES_EXPLORATORY, MIN_SAMPLES_STRICT};
use crate::spc::DEFAULT_N_SIGMA;
use crate::types::SpecLimits;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "LINEWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "linewatch.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one production line.
///
/// Load with `LinewatchConfig::load()` which searches:
/// 1. `$LINEWATCH_CONFIG`
/// 2. `./linewatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinewatchConfig {
    #[serde(default)]
    pub line: LineInfo,

    #[serde(default)]
    pub control_limits: ControlLimitsConfig,

    #[serde(default)]
    pub capability: CapabilityConfig,

    #[serde(default)]
    pub anomaly: AnomalyDefaults,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub source: SourceConfig,
}

impl LinewatchConfig {
    /// Load configuration using the standard search order.
    ///
    /// A file that fails to read, parse or validate is logged and skipped.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), line = %config.line.name, "Loaded config from LINEWATCH_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from LINEWATCH_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "LINEWATCH_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(line = %config.line.name, "Loaded config from ./linewatch.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./linewatch.toml, using defaults");
                }
            }
        }

        info!("No linewatch.toml found, using built-in defaults");
        Self::default()
    }

    /// Load and validate a specific TOML file. Unknown keys are logged as warnings.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
                other => other,
            })?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Spec limits for `parameter`, empty when none are configured.
    pub fn spec_limits_for(&self, parameter: &str) -> SpecLimits {
        self.capability
            .spec_limits
            .get(parameter)
            .copied()
            .unwrap_or_default()
    }

    /// Check every value for internal consistency, collecting all failures.
    ///
    /// Rules:
    /// - all numeric values finite
    /// - `n_sigma`, `default_threshold`, `horizon_days`, `window_hours` > 0
    /// - `default_sensitivity` in (0, 1]
    /// - `lsl < usl` when both are set
    /// - `2 <= exploratory_min_samples <= min_samples`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        Self::check_positive(self.control_limits.n_sigma, "control_limits.n_sigma", &mut errors);
        Self::check_positive(self.anomaly.default_threshold, "anomaly.default_threshold", &mut errors);

        let s = self.anomaly.default_sensitivity;
        if !s.is_finite() || s <= 0.0 || s > 1.0 {
            errors.push(format!("anomaly.default_sensitivity = {s} must be in (0, 1]"));
        }
        if self.anomaly.window_hours <= 0 {
            errors.push(format!(
                "anomaly.window_hours = {} must be > 0",
                self.anomaly.window_hours
            ));
        }
        if self.anomaly.monitor_interval_secs == 0 {
            errors.push("anomaly.monitor_interval_secs must be > 0".to_string());
        }

        for (parameter, limits) in &self.capability.spec_limits {
            let name = format!("capability.spec_limits.{parameter}");
            for (side, v) in [("lsl", limits.lsl), ("usl", limits.usl)] {
                if v.is_some_and(|v| !v.is_finite()) {
                    errors.push(format!("{name}.{side} must be finite"));
                }
            }
            if let (Some(lsl), Some(usl)) = (limits.lsl, limits.usl) {
                if lsl >= usl {
                    errors.push(format!("{name}: lsl ({lsl}) must be < usl ({usl})"));
                }
            }
        }

        let f = &self.forecast;
        if f.horizon_days == 0 {
            errors.push("forecast.horizon_days must be > 0".to_string());
        }
        if f.exploratory_min_samples < 2 {
            errors.push(format!(
                "forecast.exploratory_min_samples = {} must be >= 2",
                f.exploratory_min_samples
            ));
        }
        if f.exploratory_min_samples > f.min_samples {
            errors.push(format!(
                "forecast.exploratory_min_samples ({}) must be <= min_samples ({})",
                f.exploratory_min_samples, f.min_samples
            ));
        }
        if f.fit_budget_ms == 0 {
            errors.push("forecast.fit_budget_ms must be > 0".to_string());
        }

        if self.storage.path.as_os_str().is_empty() {
            errors.push("storage.path must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() {
            errors.push(format!("{name}: value must be finite (got {value})"));
        } else if value <= 0.0 {
            errors.push(format!("{name} = {value} must be > 0"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Sections
// ============================================================================

/// Identification metadata; appears in logs and reports only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInfo {
    #[serde(default = "default_line_name")]
    pub name: String,
    #[serde(default)]
    pub site: String,
}

fn default_line_name() -> String {
    "LINE-1".to_string()
}

impl Default for LineInfo {
    fn default() -> Self {
        Self {
            name: default_line_name(),
            site: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlLimitsConfig {
    /// Sigma multiple for individual-value limits
    #[serde(default = "default_n_sigma")]
    pub n_sigma: f64,
}

fn default_n_sigma() -> f64 {
    DEFAULT_N_SIGMA
}

impl Default for ControlLimitsConfig {
    fn default() -> Self {
        Self {
            n_sigma: default_n_sigma(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Per-parameter specification limits, keyed by parameter name
    #[serde(default)]
    pub spec_limits: BTreeMap<String, SpecLimits>,
}

/// Defaults for new anomaly configurations and the monitor loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDefaults {
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    #[serde(default = "default_sensitivity")]
    pub default_sensitivity: f64,
    /// Lookback of each monitoring run
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    /// Pause between monitoring runs
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

fn default_threshold() -> f64 {
    DEFAULT_ALERT_THRESHOLD
}
fn default_sensitivity() -> f64 {
    DEFAULT_SENSITIVITY
}
fn default_window_hours() -> i64 {
    DEFAULT_WINDOW_HOURS
}
fn default_monitor_interval_secs() -> u64 {
    900
}

impl Default for AnomalyDefaults {
    fn default() -> Self {
        Self {
            default_threshold: default_threshold(),
            default_sensitivity: default_sensitivity(),
            window_hours: default_window_hours(),
            monitor_interval_secs: default_monitor_interval_secs(),
        }
    }
}

impl AnomalyDefaults {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_horizon_days")]
    pub horizon_days: usize,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_exploratory_min_samples")]
    pub exploratory_min_samples: usize,
    /// Wall-clock allowance per model fit
    #[serde(default = "default_fit_budget_ms")]
    pub fit_budget_ms: u64,
}

fn default_horizon_days() -> usize {
    DEFAULT_HORIZON_DAYS
}
fn default_min_samples() -> usize {
    MIN_SAMPLES_STRICT
}
fn default_exploratory_min_samples() -> usize {
    MIN_SAMPLES_EXPLORATORY
}
fn default_fit_budget_ms() -> u64 {
    DEFAULT_FIT_BUDGET.as_millis() as u64
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            min_samples: default_min_samples(),
            exploratory_min_samples: default_exploratory_min_samples(),
            fit_budget_ms: default_fit_budget_ms(),
        }
    }
}

impl ForecastConfig {
    pub fn fit_budget(&self) -> Duration {
        Duration::from_millis(self.fit_budget_ms)
    }

    /// Minimum sample count for the chosen mode.
    pub fn min_samples_for(&self, exploratory: bool) -> usize {
        if exploratory {
            self.exploratory_min_samples
        } else {
            self.min_samples
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database directory
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/linewatch.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// CSV export of the line log
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
}

fn default_timestamp_column() -> String {
    "timestamp".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            csv_path: None,
            timestamp_column: default_timestamp_column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = LinewatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.line.name, "LINE-1");
        assert_eq!(config.anomaly.window_hours, 24);
        assert_eq!(config.forecast.fit_budget_ms, 2000);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = LinewatchConfig::from_toml_str(
            r#"
[line]
name = "FILLER-3"

[capability.spec_limits.brix]
lsl = 10.0
usl = 11.0

[capability.spec_limits.net_content]
lsl = 495.0
"#,
        )
        .unwrap();
        assert_eq!(config.line.name, "FILLER-3");
        assert_eq!(config.control_limits.n_sigma, 3.0);
        assert_eq!(config.spec_limits_for("brix"), SpecLimits::two_sided(10.0, 11.0));
        assert_eq!(config.spec_limits_for("net_content").usl, None);
        assert!(config.spec_limits_for("torque").is_empty());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = LinewatchConfig::default();
        config.control_limits.n_sigma = 0.0;
        config.anomaly.default_sensitivity = 1.5;
        config.forecast.exploratory_min_samples = 40;
        config
            .capability
            .spec_limits
            .insert("brix".to_string(), SpecLimits::two_sided(11.0, 10.0));
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_nan_rejected() {
        let mut config = LinewatchConfig::default();
        config.anomaly.default_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linewatch.toml");
        let mut config = LinewatchConfig::default();
        config.source.csv_path = Some(PathBuf::from("/var/log/line.csv"));
        config.save_to_file(&path).unwrap();
        assert_eq!(LinewatchConfig::load_from_file(&path).unwrap(), config);
    }
}
