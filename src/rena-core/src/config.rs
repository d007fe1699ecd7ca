use crate::paths::AppDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub info: InfoConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            logging: LoggingConfig::default(),
            info: InfoConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
    #[serde(default = "default_true")]
    pub stdout: bool,
    #[serde(default = "default_true")]
    pub file: bool,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_log_files: default_max_log_files(),
            stdout: true,
            file: true,
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Song-info settings: where the cache lives and how the metadata provider is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoConfig {
    /// Overrides `<user cache>/rena/info`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Language requested for artist biographies; "auto" lets the provider detect it.
    #[serde(default = "default_bio_language")]
    pub bio_language: String,
    #[serde(default)]
    pub provider: Option<ProviderCommandConfig>,
}

impl Default for InfoConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            bio_language: default_bio_language(),
            provider: None,
        }
    }
}

/// External helper executable answering metadata queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderCommandConfig {
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(ValidationError),
    #[error("failed to prepare configuration directories: {0}")]
    Directories(#[from] crate::paths::DirsError),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported config_version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("info.bio_language must not be empty")]
    EmptyBioLanguage,
    #[error("info.provider.command must not be empty")]
    EmptyProviderCommand,
    #[error("info.provider.timeout_seconds must be greater than zero")]
    ZeroProviderTimeout,
}

impl Config {
    pub fn load_or_default(dirs: &AppDirs) -> Result<Self, ConfigError> {
        dirs.ensure_exists()?;
        let path = Self::config_path(dirs);
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|err| match err {
            ParseOrInvalid::Parse(source) => ConfigError::Parse { path, source },
            ParseOrInvalid::Invalid(err) => ConfigError::Validation(err),
        })
    }

    fn from_toml(contents: &str) -> Result<Self, ParseOrInvalid> {
        let config: Config = toml::from_str(contents).map_err(ParseOrInvalid::Parse)?;
        config.validate().map_err(ParseOrInvalid::Invalid)?;
        Ok(config)
    }

    pub fn config_path(dirs: &AppDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    /// Cache root after applying the `info.cache_dir` override.
    pub fn info_cache_dir(&self, dirs: &AppDirs) -> PathBuf {
        self.info
            .cache_dir
            .clone()
            .unwrap_or_else(|| dirs.info_cache_dir())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config_version != CURRENT_CONFIG_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                found: self.config_version,
                expected: CURRENT_CONFIG_VERSION,
            });
        }
        if self.info.bio_language.trim().is_empty() {
            return Err(ValidationError::EmptyBioLanguage);
        }
        if let Some(provider) = &self.info.provider {
            if provider.command.as_os_str().is_empty() {
                return Err(ValidationError::EmptyProviderCommand);
            }
            if provider.timeout_seconds == 0 {
                return Err(ValidationError::ZeroProviderTimeout);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
enum ParseOrInvalid {
    Parse(toml::de::Error),
    Invalid(ValidationError),
}

fn default_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_max_log_files() -> usize {
    7
}

fn default_true() -> bool {
    true
}

fn default_bio_language() -> String {
    "auto".to_string()
}

fn default_provider_timeout() -> u64 {
    20
}
