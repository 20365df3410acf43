//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::Hold;
use super::shell::select_shell;
use crate::config::Config;

/// Run a command on a pseudo-terminal and keep an eye on it
#[derive(Parser, Debug)]
#[command(name = "ptykeeper")]
#[command(version, about = "Pty child-process supervisor", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Keep the session open after the command ends
    #[arg(long)]
    pub hold: Option<Hold>,

    /// Append the command's output to this file
    #[arg(long, short)]
    pub log: Option<PathBuf>,

    /// Write a login record for the session
    #[arg(long)]
    pub utmp: bool,

    /// Value of TERM for the command
    #[arg(long)]
    pub term: Option<String>,

    /// Backspace sends ^H instead of DEL
    #[arg(long)]
    pub backspace_sends_bs: bool,

    /// Config file path
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Command to run, with its arguments (default: $SHELL)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub program: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

impl Args {
    /// Apply command-line overrides on top of the loaded file.
    pub fn apply(&self, config: &mut Config) {
        if let Some(hold) = self.hold {
            config.session.hold = hold.into();
        }
        if let Some(log) = &self.log {
            config.session.log_file = Some(log.clone());
        }
        if self.utmp {
            config.session.utmp = true;
        }
        if let Some(term) = &self.term {
            config.terminal.term = term.clone();
        }
        if self.backspace_sends_bs {
            config.terminal.backspace_sends_bs = true;
        }
    }

    /// Argument vector of the command to run.
    pub fn command_line(&self, config: &Config) -> Vec<String> {
        if !self.program.is_empty() {
            return self.program.clone();
        }
        let words: Vec<String> = config
            .session
            .command
            .as_deref()
            .map(|c| c.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        if words.is_empty() {
            vec![select_shell()]
        } else {
            words
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::child::HoldPolicy;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["ptykeeper"]);
        assert!(args.hold.is_none());
        assert!(args.log.is_none());
        assert!(!args.utmp);
        assert!(args.term.is_none());
        assert!(!args.backspace_sends_bs);
        assert!(args.config.is_none());
        assert!(args.program.is_empty());
        assert!(args.command.is_none());
    }

    #[test]
    fn test_args_hold_values() {
        let args = Args::parse_from(["ptykeeper", "--hold", "never"]);
        assert_eq!(args.hold, Some(Hold::Never));

        let args = Args::parse_from(["ptykeeper", "--hold", "error"]);
        assert_eq!(args.hold, Some(Hold::Error));
    }

    #[test]
    fn test_args_trailing_command_keeps_its_flags() {
        let args = Args::parse_from(["ptykeeper", "--utmp", "vim", "-u", "NONE", "file"]);
        assert!(args.utmp);
        assert_eq!(args.program, ["vim", "-u", "NONE", "file"]);
    }

    #[test]
    fn test_args_config_show_subcommand() {
        let args = Args::parse_from(["ptykeeper", "config", "show"]);
        match args.command {
            Some(Command::Config {
                action: ConfigAction::Show,
            }) => (),
            _ => panic!("Expected Config Show subcommand"),
        }
    }

    #[test]
    fn test_args_config_init_subcommand() {
        let args = Args::parse_from(["ptykeeper", "config", "init"]);
        assert!(matches!(
            args.command,
            Some(Command::Config {
                action: ConfigAction::Init
            })
        ));
    }

    #[test]
    fn test_apply_overrides_file_values() {
        let mut config = Config::parse("[session]\nhold = \"never\"\n").unwrap();
        let args = Args::parse_from([
            "ptykeeper",
            "--hold",
            "error",
            "--log",
            "/tmp/out.log",
            "--term",
            "vt100",
            "--backspace-sends-bs",
        ]);
        args.apply(&mut config);
        assert_eq!(config.session.hold, HoldPolicy::Error);
        assert_eq!(config.session.log_file, Some(PathBuf::from("/tmp/out.log")));
        assert_eq!(config.terminal.term, "vt100");
        assert!(config.terminal.backspace_sends_bs);
    }

    #[test]
    fn test_apply_without_flags_keeps_file_values() {
        let mut config = Config::parse("[session]\nhold = \"never\"\nutmp = true\n").unwrap();
        let before = config.clone();
        Args::parse_from(["ptykeeper"]).apply(&mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn test_command_line_precedence() {
        let mut config = Config::default();
        config.session.command = Some("/bin/bash -l".to_string());

        let args = Args::parse_from(["ptykeeper", "top"]);
        assert_eq!(args.command_line(&config), ["top"]);

        let args = Args::parse_from(["ptykeeper"]);
        assert_eq!(args.command_line(&config), ["/bin/bash", "-l"]);

        config.session.command = Some("   ".to_string());
        assert_eq!(args.command_line(&config).len(), 1);
    }
}
