//! CLI enum types.

use clap::ValueEnum;

use crate::child::HoldPolicy;

/// When to keep the session open after the command ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Hold {
    /// Close as soon as the command ends
    Never,
    /// Keep open if the command could not start or was killed by a signal
    #[default]
    Default,
    /// Keep open on any failure except a crash
    Error,
}

impl From<Hold> for HoldPolicy {
    fn from(h: Hold) -> Self {
        match h {
            Hold::Never => HoldPolicy::Never,
            Hold::Default => HoldPolicy::Default,
            Hold::Error => HoldPolicy::Error,
        }
    }
}
