use crate::error::{Error, Result};
use crate::services::main_feature::Selection;
use crate::services::open_process::{DEFAULT_KILL_TIMEOUT, DEFAULT_POLL_INTERVAL};
use log::debug;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "autorip";
const CONFIG_FILE: &str = "autorip.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logger: LoggerConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    pub devices: Vec<String>,
    /// Replay `<logging_dir>/stdout.log` instead of reading the drive.
    #[serde(default)]
    pub read_from_log: bool,
    /// Path to the makemkvcon binary when it is not on the PATH.
    pub makemkvcon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub languages: Vec<String>,
    pub logging_dir: PathBuf,
    pub temporary_rip_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    #[serde(default = "default_kill_timeout", deserialize_with = "human_duration")]
    pub kill_timeout: Duration,
    #[serde(default = "default_poll_interval", deserialize_with = "human_duration")]
    pub poll_interval: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

fn default_kill_timeout() -> Duration {
    DEFAULT_KILL_TIMEOUT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

/// Reads durations written like `1s` or `50ms`.
fn human_duration<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankingConfig {
    #[serde(default)]
    pub selection: Selection,
}

impl Config {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(toml_str).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Where the config file is expected, in order of preference.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(CONFIG_DIR).join(CONFIG_FILE));
        }
        paths.push(Path::new("/etc").join(CONFIG_DIR).join(CONFIG_FILE));
        paths
    }

    /// Loads the first config file found in [`Config::search_paths`].
    pub fn locate() -> Result<Self> {
        let paths = Self::search_paths();
        match paths.iter().find(|path| path.exists()) {
            Some(path) => Self::load(path),
            None => Err(Error::Config(format!(
                "no config file found, looked in {}",
                paths
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.input.devices.is_empty() {
            return Err(Error::Config("input.devices must not be empty".to_string()));
        }
        if self.output.languages.is_empty() {
            return Err(Error::Config(
                "output.languages must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The drive that gets ripped.
    pub fn device(&self) -> &str {
        self.input
            .devices
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.output.logging_dir.join("stdout.log")
    }
}
