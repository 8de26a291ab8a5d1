mod env_manager;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{AnalyzerError, Result};
use crate::utils::retry::RetryPolicy;

pub use env_manager::{resolve_api_key, EnvOverrides, API_KEY_ENV};

/// Default directory for generated reports, relative to the working directory
pub const DEFAULT_REPORTS_DIR: &str = "reports";

/// Main configuration struct for the application
///
/// This structure holds all configuration settings: the Gemini connection,
/// chunking limits, retry policy, web-server settings and PDF export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory where reports are written
    pub output_dir: PathBuf,
    /// Remote text-generation settings
    pub gemini: GeminiSettings,
    /// Corpus and chunk limits
    pub limits: Limits,
    /// Retry policy for remote calls
    pub retry: RetrySettings,
    /// Web interface settings
    pub server: ServerSettings,
    /// PDF export settings
    pub pdf: PdfSettings,
}

/// Connection and generation settings for the Gemini API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    /// API key, usually supplied through `GEMINI_API_KEY`
    pub api_key: Option<String>,
    /// Preferred model
    pub model: String,
    /// Models tried in order when the preferred one is unknown to the API
    pub fallback_models: Vec<String>,
    /// Base URL of the models endpoint
    pub base_url: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens per call
    pub max_output_tokens: u32,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Client-side request budget per minute, 0 disables the limiter
    pub requests_per_minute: u32,
}

/// Limits that bound memory use and request size
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum characters per chunk sent to the model
    pub max_chunk_chars: usize,
    /// Files larger than this are skipped
    pub max_file_bytes: u64,
    /// Budget for the rolling summary carried between chunks
    pub rolling_summary_chars: usize,
    /// Directory names skipped during collection, on top of VCS metadata
    pub ignored_dirs: Vec<String>,
}

/// Retry policy for transient API failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per call, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

/// Settings of the web interface and its job registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to bind
    pub bind: String,
    /// Number of concurrent analysis workers
    pub workers: usize,
    /// Capacity of the pending job queue
    pub queue_capacity: usize,
    /// How long finished jobs stay in the registry
    pub retention_secs: u64,
    /// Interval between registry sweeps
    pub sweep_interval_secs: u64,
    /// Follow-up questions allowed per job
    pub question_quota: u32,
}

/// PDF export settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    /// Explicit path to `wkhtmltopdf`; looked up on `PATH` when unset
    pub wkhtmltopdf_path: Option<PathBuf>,
}

impl Config {
    /// Creates a new configuration with the specified output directory
    ///
    /// # Arguments
    /// * `output_dir` - The directory where reports will be stored
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            gemini: GeminiSettings::default(),
            limits: Limits::default(),
            retry: RetrySettings::default(),
            server: ServerSettings::default(),
            pdf: PdfSettings::default(),
        }
    }

    /// Location of the user configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reposcribe").join("config.toml"))
    }

    /// Loads configuration from the default config file location
    ///
    /// If the config file doesn't exist, returns the default configuration.
    /// Environment overrides are applied on top in both cases.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        EnvOverrides::from_env().apply(&mut config);
        Ok(config)
    }

    /// Loads configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AnalyzerError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AnalyzerError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Validates the configuration and prepares the output directory
    pub async fn validate(&self) -> Result<()> {
        self.check_limits()?;
        self.ensure_directories_exist().await
    }

    /// Rejects settings that would make the pipeline loop or never call out
    pub fn check_limits(&self) -> Result<()> {
        if self.limits.max_chunk_chars == 0 {
            return Err(AnalyzerError::Config("limits.max_chunk_chars must be greater than zero".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(AnalyzerError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.server.workers == 0 || self.server.queue_capacity == 0 {
            return Err(AnalyzerError::Config("server.workers and server.queue_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Ensures the output directory exists
    pub async fn ensure_directories_exist(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.output_dir).await? {
            tokio::fs::create_dir_all(&self.output_dir).await?;
        }
        Ok(())
    }

    /// Retry policy derived from the retry settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash-lite".to_string(),
            fallback_models: vec!["gemini-1.5-pro".to_string(), "gemini-pro".to_string()],
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            temperature: 0.4,
            max_output_tokens: 8192,
            timeout_secs: 120,
            requests_per_minute: 30,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_chunk_chars: 10_000,
            max_file_bytes: 1024 * 1024,
            rolling_summary_chars: 1_500,
            ignored_dirs: ["node_modules", "target", "__pycache__", ".venv", "venv", "dist", "build"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            workers: 2,
            queue_capacity: 32,
            retention_secs: 24 * 60 * 60,
            sweep_interval_secs: 600,
            question_quota: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let output_dir = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(DEFAULT_REPORTS_DIR);
        Self::new(output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_validation() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = Config::new(temp_dir.path().join("reports"));

        config.validate().await?;
        assert!(config.output_dir.is_dir());
        Ok(())
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = Config::new(PathBuf::from("reports"));
        config.limits.max_chunk_chars = 0;
        assert!(matches!(config.check_limits(), Err(AnalyzerError::Config(_))));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let config = Config::from_toml(
            r#"
            output_dir = "out"

            [limits]
            max_chunk_chars = 4000

            [server]
            question_quota = 3
            "#,
        )?;

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.limits.max_chunk_chars, 4000);
        assert_eq!(config.limits.max_file_bytes, 1024 * 1024);
        assert_eq!(config.server.question_quota, 3);
        assert_eq!(config.server.workers, 2);
        assert_eq!(config.gemini.model, "gemini-2.0-flash-lite");
        Ok(())
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = Config::from_toml("limits = 5");
        assert!(matches!(result, Err(AnalyzerError::Config(_))));
    }
}
