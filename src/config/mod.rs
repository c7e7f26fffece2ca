//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the `trax` binary)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraxError};
use crate::transport::LogMode;

/// Environment variable holding the tracker command line
pub const ENV_TRACKER: &str = "TRAX_TRACKER";
/// Environment variable selecting the protocol log mode
pub const ENV_LOG_MODE: &str = "TRAX_LOG_MODE";
/// Environment variable naming the protocol log file
pub const ENV_LOG_FILE: &str = "TRAX_LOG_FILE";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tracker process configuration
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Protocol logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TraxError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(line) = std::env::var(ENV_TRACKER) {
            config.tracker = TrackerConfig::from_command_line(&line);
        }

        if let Ok(mode) = std::env::var(ENV_LOG_MODE) {
            match mode.parse() {
                Ok(mode) => config.logging.mode = mode,
                Err(e) => {
                    tracing::warn!(variable = ENV_LOG_MODE, error = %e, "ignoring invalid log mode");
                },
            }
        }
        if let Ok(file) = std::env::var(ENV_LOG_FILE) {
            config.logging.file = Some(PathBuf::from(file));
        }

        config
    }

    /// Merge with another config (other takes precedence where set)
    pub fn merge(self, other: Self) -> Self {
        Self {
            tracker: self.tracker.merge(other.tracker),
            logging: LoggingConfig {
                mode: if other.logging.mode != LogMode::default() {
                    other.logging.mode
                } else {
                    self.logging.mode
                },
                file: other.logging.file.or(self.logging.file),
            },
        }
    }

    /// Default location of the config file, `<config dir>/trax/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("trax").join("config.toml"))
    }

    /// Resolve the effective configuration.
    ///
    /// Uses `explicit` if given, else the default file when it exists, else
    /// the defaults. Environment variables are applied on top.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let base = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => {
                    tracing::debug!(path = %path.display(), "loading default config");
                    Self::from_file(path)?
                },
                _ => Self::default(),
            },
        };

        Ok(base.merge(Self::from_env()))
    }
}

/// How to start the tracker process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Executable to run
    pub command: Option<String>,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Working directory of the tracker
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

impl TrackerConfig {
    /// Build from a whitespace-separated command line.
    pub fn from_command_line(line: &str) -> Self {
        let mut parts = line.split_whitespace().map(str::to_string);
        Self {
            command: parts.next(),
            args: parts.collect(),
            ..Self::default()
        }
    }

    /// Replace the command and its arguments, keeping the working
    /// directory and environment.
    pub fn with_command_line(self, line: &str) -> Self {
        self.merge(Self::from_command_line(line))
    }

    /// Merge with another tracker config.
    ///
    /// A command in `other` replaces the command and arguments together.
    /// The working directory is taken from `other` when set, and the
    /// environments are combined with `other` winning on conflicts.
    pub fn merge(self, other: Self) -> Self {
        let (command, args) = if other.command.is_some() {
            (other.command, other.args)
        } else {
            (self.command, self.args)
        };

        Self {
            command,
            args,
            working_dir: other.working_dir.or(self.working_dir),
            env: self.env.into_iter().chain(other.env).collect(),
        }
    }
}

/// Protocol log configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Which direction of the stream to copy
    pub mode: LogMode,

    /// Destination file; stderr when unset
    pub file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracker.command, None);
        assert!(config.tracker.args.is_empty());
        assert_eq!(config.logging.mode, LogMode::None);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [tracker]
            command = "python3"
            args = ["ncc.py", "--fast"]
            working_dir = "/opt/trackers"

            [tracker.env]
            PYTHONUNBUFFERED = "1"

            [logging]
            mode = "incoming"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.tracker.command.as_deref(), Some("python3"));
        assert_eq!(config.tracker.args, vec!["ncc.py", "--fast"]);
        assert_eq!(config.tracker.working_dir, Some(PathBuf::from("/opt/trackers")));
        assert_eq!(config.tracker.env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        assert_eq!(config.logging.mode, LogMode::Incoming);
        assert_eq!(config.logging.file, None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nmode = \"all\"\nfile = \"trax.log\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.logging.mode, LogMode::All);
        assert_eq!(config.logging.file, Some(PathBuf::from("trax.log")));
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            Config::from_file("/nonexistent/trax.toml"),
            Err(TraxError::Config(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nmode = \"sideways\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(TraxError::Config(_))
        ));
    }

    #[test]
    fn test_command_line_split() {
        let tracker = TrackerConfig::from_command_line("  ./tracker -v  --model x ");
        assert_eq!(tracker.command.as_deref(), Some("./tracker"));
        assert_eq!(tracker.args, vec!["-v", "--model", "x"]);

        assert_eq!(TrackerConfig::from_command_line("   ").command, None);
    }

    #[test]
    fn test_merge_prefers_other() {
        let base = Config {
            tracker: TrackerConfig::from_command_line("base-tracker"),
            logging: LoggingConfig {
                mode: LogMode::All,
                file: Some(PathBuf::from("base.log")),
            },
        };

        let merged = base.clone().merge(Config::default());
        assert_eq!(merged, base);

        let other = Config {
            tracker: TrackerConfig::from_command_line("other-tracker --x"),
            logging: LoggingConfig {
                mode: LogMode::Outgoing,
                file: None,
            },
        };
        let merged = base.merge(other);
        assert_eq!(merged.tracker.command.as_deref(), Some("other-tracker"));
        assert_eq!(merged.tracker.args, vec!["--x"]);
        assert_eq!(merged.logging.mode, LogMode::Outgoing);
        assert_eq!(merged.logging.file, Some(PathBuf::from("base.log")));
    }

    #[test]
    fn test_merge_command_keeps_tracker_environment() {
        let base: Config = toml::from_str(
            r#"
            [tracker]
            command = "python3"
            args = ["ncc.py"]
            working_dir = "/opt/trackers"

            [tracker.env]
            PYTHONUNBUFFERED = "1"
            MODEL = "small"
        "#,
        )
        .unwrap();

        let mut other = Config {
            tracker: TrackerConfig::from_command_line("other --x"),
            ..Config::default()
        };
        other.tracker.env.insert("MODEL".to_string(), "large".to_string());

        let merged = base.clone().merge(other);
        assert_eq!(merged.tracker.command.as_deref(), Some("other"));
        assert_eq!(merged.tracker.args, vec!["--x"]);
        assert_eq!(merged.tracker.working_dir, Some(PathBuf::from("/opt/trackers")));
        assert_eq!(merged.tracker.env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        assert_eq!(merged.tracker.env.get("MODEL").map(String::as_str), Some("large"));

        let replaced = base.tracker.with_command_line("./tracker -v");
        assert_eq!(replaced.command.as_deref(), Some("./tracker"));
        assert_eq!(replaced.args, vec!["-v"]);
        assert_eq!(replaced.working_dir, Some(PathBuf::from("/opt/trackers")));
        assert_eq!(replaced.env.len(), 2);
    }

    #[test]
    fn test_default_path() {
        if let Some(path) = Config::default_path() {
            assert!(path.ends_with("trax/config.toml"));
        }
    }
}
