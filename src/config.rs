use crate::recorder::Container;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Application id and well-known bus name of the agent.
pub const APPLICATION_ID: &str = "org.hwangsaeul.Hwangsae1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config directory")]
    NoConfigDir,

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which message bus the agent connects to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

impl std::fmt::Display for BusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusKind::Session => write!(f, "session"),
            BusKind::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BusConfig {
    /// Bus to register on
    #[serde(default)]
    pub kind: BusKind,

    /// Well-known name requested on the bus
    #[serde(default = "default_bus_name")]
    pub name: String,

    /// Let another process take the name over (`--replace` style hand-off)
    #[serde(default)]
    pub allow_replacement: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::default(),
            name: default_bus_name(),
            allow_replacement: false,
        }
    }
}

fn default_bus_name() -> String {
    APPLICATION_ID.to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RecorderConfig {
    /// Container handed to the engine for new recordings
    #[serde(default)]
    pub container: Container,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rotated log files. Logs go to stderr only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("org", "hwangsaeul", "hwangsae-agent")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Get the data directory path (crash reports)
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("org", "hwangsaeul", "hwangsae-agent")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from `path`, writing defaults there if the file is missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if zbus::names::WellKnownName::try_from(self.bus.name.as_str()).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "bus name '{}' is not a valid well-known name",
                self.bus.name
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }
}

/// Resolve an explicit `--config` path or fall back to the default location
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::config_path(),
    }
}

/// Show current configuration
pub fn show(explicit: Option<&Path>) -> anyhow::Result<()> {
    let path = resolve_path(explicit)?;
    let config = Config::load_from(&path)?;

    println!("Config file: {}\n", path.display());
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

/// Update configuration
pub fn update(
    explicit: Option<&Path>,
    bus: Option<BusKind>,
    container: Option<Container>,
    log_level: Option<String>,
) -> anyhow::Result<()> {
    let path = resolve_path(explicit)?;
    let mut config = Config::load_from(&path)?;
    let mut changed = false;

    if let Some(kind) = bus {
        config.bus.kind = kind;
        changed = true;
    }

    if let Some(c) = container {
        config.recorder.container = c;
        changed = true;
    }

    if let Some(level) = log_level {
        config.logging.level = level;
        changed = true;
    }

    if changed {
        config.validate()?;
        config.save_to(&path)?;
        println!("Configuration updated.");
    } else {
        println!("No changes specified. Use --show to view current config.");
    }

    Ok(())
}
