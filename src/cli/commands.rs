//! Subcommand handlers for config actions.

use std::io::{self, Write};
use std::path::Path;

use super::args::ConfigAction;
use crate::config::{Config, ConfigError, DEFAULT_CONFIG};
use crate::paths::PathStyle;

/// Handle config subcommand actions, printing to `out`.
pub fn handle_config_action(
    action: ConfigAction,
    config: &Config,
    command: &[String],
    config_path: &Path,
    out: &mut dyn Write,
) -> Result<(), ConfigError> {
    let io_err = |source: io::Error| ConfigError::Io {
        path: config_path.to_path_buf(),
        source,
    };
    match action {
        ConfigAction::Show => show(config, command, config_path, out).map_err(io_err),
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(io_err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "config file already exists, see 'ptykeeper config show'",
                )));
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            std::fs::write(config_path, DEFAULT_CONFIG).map_err(io_err)?;
            writeln!(out, "Created config file: {}", config_path.display()).map_err(io_err)
        }
    }
}

fn show(config: &Config, command: &[String], path: &Path, out: &mut dyn Write) -> io::Result<()> {
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    writeln!(out, "Current configuration:")?;
    writeln!(out, "  Command: {}", command.join(" "))?;
    writeln!(out, "  Hold: {:?}", config.session.hold)?;
    match &config.session.log_file {
        Some(log) => writeln!(out, "  Log file: {}", log.display())?,
        None => writeln!(out, "  Log file: none")?,
    }
    writeln!(out, "  Login record: {}", yes_no(config.session.utmp))?;
    writeln!(out, "  TERM: {}", config.terminal.term)?;
    writeln!(
        out,
        "  Backspace sends ^H: {}",
        yes_no(config.terminal.backspace_sends_bs)
    )?;
    writeln!(
        out,
        "  Locale: {}",
        config.terminal.locale.as_deref().unwrap_or("inherited")
    )?;
    match &config.paths {
        PathStyle::Posix => writeln!(out, "  Paths: posix")?,
        PathStyle::Windows { root } => writeln!(out, "  Paths: windows (root {})", root)?,
    }
    writeln!(out)?;

    if path.exists() {
        writeln!(out, "Config file: {} (exists)", path.display())
    } else {
        writeln!(out, "Config file: {} (not found)", path.display())
    }
}
