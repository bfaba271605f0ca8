//! Loadwatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::SimulatedConfig;
use crate::loading::CoordinatorConfig;

/// Main Loadwatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Loading coordinator settings
    pub loading: CoordinatorConfig,

    /// Analysis backend settings
    pub api: ApiConfig,

    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Reject values that would silently disable loading deadlines
    pub fn validate(&self) -> Result<()> {
        self.api.validate()
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .loadwatch.yml
        let local_config = PathBuf::from(".loadwatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/loadwatch/loadwatch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("loadwatch").join("loadwatch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed; the full `load` reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|config| config.log_level)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Analysis backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Transport timeout per HTTP request in milliseconds
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// Retries for idempotent reads
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Expected response times per call
    pub targets: PerformanceTargets,

    /// Loading deadline = target * multiplier
    #[serde(rename = "deadline-multiplier")]
    pub deadline_multiplier: f64,

    /// Knobs for `--simulate`
    pub simulated: SimulatedConfig,
}

impl ApiConfig {
    /// The multiplier must keep every deadline finite and non-zero
    pub fn validate(&self) -> Result<()> {
        let multiplier = self.deadline_multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(eyre::eyre!(
                "api.deadline-multiplier must be a positive number, got {}",
                multiplier
            ));
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 30_000,
            max_retries: 2,
            targets: PerformanceTargets::default(),
            deadline_multiplier: 3.0,
            simulated: SimulatedConfig::default(),
        }
    }
}

/// Response-time targets of the analysis service, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceTargets {
    #[serde(rename = "comment-ms")]
    pub comment_ms: u64,

    #[serde(rename = "dashboard-ms")]
    pub dashboard_ms: u64,

    #[serde(rename = "wordcloud-ms")]
    pub wordcloud_ms: u64,

    /// Everything else
    #[serde(rename = "default-ms")]
    pub default_ms: u64,
}

impl Default for PerformanceTargets {
    fn default() -> Self {
        Self {
            comment_ms: 2_000,
            dashboard_ms: 3_000,
            wordcloud_ms: 10_000,
            default_ms: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.loading.default_timeout_ms, 30_000);
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.api.targets.wordcloud_ms, 10_000);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

loading:
  default-timeout-ms: 10000
  history-capacity: 20
  debug-mode: true

api:
  base-url: https://sentiment.example.com
  max-retries: 0
  deadline-multiplier: 1.5
  targets:
    comment-ms: 1500
  simulated:
    latency-ms: 0
    failure-rate: 0.25
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.loading.default_timeout_ms, 10_000);
        assert_eq!(config.loading.history_capacity, 20);
        assert!(config.loading.debug_mode);
        assert_eq!(config.api.base_url, "https://sentiment.example.com");
        assert_eq!(config.api.max_retries, 0);
        assert_eq!(config.api.deadline_multiplier, 1.5);
        assert_eq!(config.api.targets.comment_ms, 1500);
        assert_eq!(config.api.simulated.failure_rate, 0.25);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
api:
  base-url: http://10.0.0.5:8000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.api.base_url, "http://10.0.0.5:8000");

        // Defaults for unspecified
        assert_eq!(config.api.targets, PerformanceTargets::default());
        assert_eq!(config.loading, CoordinatorConfig::default());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log-level: warn\nloading:\n  history-capacity: 5").unwrap();

        let path = file.path().to_path_buf();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.loading.history_capacity, 5);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_explicit_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yml");
        assert!(Config::load(Some(&missing)).is_err());
        assert!(Config::load_log_level(Some(&missing)).is_none());

        let broken = dir.path().join("broken.yml");
        fs::write(&broken, "loading: [not, a, map]").unwrap();
        assert!(Config::load(Some(&broken)).is_err());
    }

    #[test]
    fn test_deadline_multiplier_must_be_positive() {
        assert!(Config::default().validate().is_ok());

        let dir = tempfile::tempdir().unwrap();
        for value in ["0", "-2.5", ".nan", ".inf"] {
            let path = dir.path().join("multiplier.yml");
            fs::write(&path, format!("api:\n  deadline-multiplier: {}\n", value)).unwrap();
            let err = Config::load(Some(&path)).unwrap_err();
            assert!(
                err.chain().any(|cause| cause.to_string().contains("deadline-multiplier")),
                "value {} gave: {:?}",
                value,
                err
            );
        }
    }
}
