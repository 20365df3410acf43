//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;
mod shell;

pub use args::{Args, Command, ConfigAction};
pub use commands::handle_config_action;
pub use enums::Hold;
pub use shell::select_shell;
