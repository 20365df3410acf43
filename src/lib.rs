//! ptykeeper library crate.
//!
//! Runs one command on a pseudo-terminal, keeps its lifecycle straight under
//! signal delivery, and bridges its output to a terminal, an optional
//! transcript and the host program's event loop.

pub mod child;
pub mod cli;
pub mod config;
pub mod event_loop;
pub mod paths;
pub mod platform;
pub mod relaunch;
pub mod session;
pub mod terminal;
pub mod transcript;

pub use child::{HoldPolicy, PtySize, SessionError};
pub use config::Config;
pub use session::Session;
