//! Child process supervision.
//!
//! # Structure
//!
//! - [`lifecycle`] - hold policy and the lifecycle transition table
//! - [`record`] - the signal-safe child status record
//! - [`signals`] - signal handlers feeding the record
//! - [`supervisor`] - spawn, kill and inspect the child on its pty
//! - [`launch`] - launch settings and the exec half of the fork
//! - [`accounting`] - login records

pub mod accounting;
mod error;
mod launch;
pub mod lifecycle;
mod record;
mod signals;
mod size;
mod supervisor;

pub use error::{describe, failure_message, SessionError};
pub use launch::LaunchSettings;
pub(crate) use launch::CStringArray;
pub use lifecycle::{
    decide, transition, Action, ChildState, HoldPolicy, LifecycleEvent, Verdict, WaitOutcome,
    EXEC_FAILED, FAULT_SIGNALS,
};
pub use record::ChildRecord;
pub use signals::{SignalBridge, TERMINATION_SIGNALS};
pub use size::PtySize;
pub(crate) use supervisor::set_nonblocking;
pub use supervisor::{has_child_process, parent_of, KillOutcome, Supervisor};
