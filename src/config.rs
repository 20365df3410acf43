//! Configuration file handling for ptykeeper.
//!
//! Loads configuration from `<config dir>/ptykeeper/config.toml` or a custom path.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::child::{HoldPolicy, LaunchSettings};
use crate::paths::PathStyle;

/// Configuration file structure for ptykeeper.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub paths: PathStyle,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct SessionConfig {
    /// Command line to run (default: $SHELL or /bin/sh)
    pub command: Option<String>,
    #[serde(default)]
    pub hold: HoldPolicy,
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub utmp: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TerminalConfig {
    #[serde(default = "default_term")]
    pub term: String,
    #[serde(default)]
    pub backspace_sends_bs: bool,
    #[serde(default)]
    pub locale: Option<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            term: default_term(),
            backspace_sends_bs: false,
            locale: None,
        }
    }
}

fn default_term() -> String {
    "xterm".to_string()
}

/// Default config file written by `config init`.
pub const DEFAULT_CONFIG: &str = r#"# ptykeeper configuration

[session]
# Command to run (default: $SHELL, then /bin/sh)
# command = "/bin/bash -l"
# Keep the window open after the command ends: never, default, error
hold = "default"
# Append everything the command prints to this file
# log_file = "/tmp/ptykeeper.log"
# Write a login record for the session
utmp = false

[terminal]
# Value of TERM for the command
term = "xterm"
# Backspace sends ^H instead of DEL
backspace_sends_bs = false
# Locale for the command, e.g. "en_US.UTF-8"
# locale = "C.UTF-8"

[paths]
# Native path style: posix or windows
style = "posix"
# windows_root = 'C:\cygwin64'
"#;

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            Self::parse(&content).map_err(|e| ConfigError::Parse { path, source: e })
        } else {
            log::debug!("No config file at {}", path.display());
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Settings handed to the child at launch.
    pub fn launch_settings(&self) -> LaunchSettings {
        LaunchSettings {
            term: self.terminal.term.clone(),
            backspace_sends_bs: self.terminal.backspace_sends_bs,
            locale: self.terminal.locale.clone(),
            utmp: self.session.utmp,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("ptykeeper").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/ptykeeper/config.toml")
        })
}
