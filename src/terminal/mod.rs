//! Terminal side of the session - the display consumer and raw mode with cleanup.

mod consumer;
mod raw_mode;

pub use consumer::{StreamConsumer, TerminalConsumer};
pub use raw_mode::{restore_at_exit, RawModeGuard};
