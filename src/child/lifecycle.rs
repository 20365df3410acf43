//! Child lifecycle: termination policy and the state transition table.
//!
//! Everything here is plain data and pure functions. The signal handler feeds
//! already-captured values through [`transition`]; nothing in this module
//! allocates, locks or performs I/O, so it is callable from that context.

use nix::sys::wait::WaitStatus;
use serde::Deserialize;

/// Whether the session outlives its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldPolicy {
    /// Exit as soon as the child is gone.
    Never,
    /// Hold only when exec failed or the child was killed by a signal.
    #[default]
    Default,
    /// Hold on any failure, except the fault signals in [`FAULT_SIGNALS`].
    Error,
}

impl HoldPolicy {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            HoldPolicy::Never => 0,
            HoldPolicy::Default => 1,
            HoldPolicy::Error => 2,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            0 => HoldPolicy::Never,
            2 => HoldPolicy::Error,
            _ => HoldPolicy::Default,
        }
    }
}

/// Exit code a child uses to report that exec failed.
pub const EXEC_FAILED: i32 = 255;

/// Signals that count as a genuine crash under [`HoldPolicy::Error`].
pub const FAULT_SIGNALS: [i32; 8] = [
    libc::SIGILL,
    libc::SIGTRAP,
    libc::SIGABRT,
    libc::SIGFPE,
    libc::SIGBUS,
    libc::SIGSEGV,
    libc::SIGPIPE,
    libc::SIGSYS,
];

/// How a reaped child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl WaitOutcome {
    /// Decode a raw `waitpid` status.
    pub fn from_raw(status: i32) -> Self {
        if libc::WIFSIGNALED(status) {
            WaitOutcome::Signaled(libc::WTERMSIG(status))
        } else {
            WaitOutcome::Exited(libc::WEXITSTATUS(status))
        }
    }

    /// Encode in `waitpid` layout, so the outcome fits one atomic word.
    pub fn to_raw(self) -> i32 {
        match self {
            WaitOutcome::Exited(code) => (code & 0xff) << 8,
            WaitOutcome::Signaled(sig) => sig & 0x7f,
        }
    }

    /// Termination carried by a wait status; stops and continues are not one.
    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(WaitOutcome::Exited(code)),
            WaitStatus::Signaled(_, sig, _) => Some(WaitOutcome::Signaled(sig as i32)),
            _ => None,
        }
    }

    /// One-line report for the terminal, if this outcome deserves one.
    ///
    /// Clean exits and failed execs (which already printed their own error)
    /// produce nothing.
    pub fn status_message(&self, command: &str) -> Option<String> {
        match *self {
            WaitOutcome::Exited(0) | WaitOutcome::Exited(EXEC_FAILED) => None,
            WaitOutcome::Exited(code) => Some(format!("{}: Exit {}", command, code)),
            WaitOutcome::Signaled(sig) => Some(format!("{}: {}", command, signal_name(sig))),
        }
    }
}

/// Human readable description of a signal, as `strsignal(3)` gives it.
pub fn signal_name(sig: i32) -> String {
    // SAFETY: strsignal returns a pointer to a NUL terminated string that
    // stays valid until the next call; it is copied out immediately.
    let ptr = unsafe { libc::strsignal(sig) };
    if ptr.is_null() {
        return format!("Signal {}", sig);
    }
    unsafe { std::ffi::CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

/// What to do with the session once the child is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Exit,
    Hold,
}

/// Apply the hold policy to a terminated child that nobody asked to kill.
pub fn decide(policy: HoldPolicy, outcome: WaitOutcome) -> Verdict {
    match (policy, outcome) {
        (HoldPolicy::Never, _) => Verdict::Exit,
        (HoldPolicy::Default, WaitOutcome::Signaled(_)) => Verdict::Hold,
        (HoldPolicy::Default, WaitOutcome::Exited(EXEC_FAILED)) => Verdict::Hold,
        (HoldPolicy::Default, WaitOutcome::Exited(_)) => Verdict::Exit,
        (HoldPolicy::Error, WaitOutcome::Exited(0)) => Verdict::Exit,
        (HoldPolicy::Error, WaitOutcome::Exited(_)) => Verdict::Hold,
        (HoldPolicy::Error, WaitOutcome::Signaled(sig)) => {
            if FAULT_SIGNALS.contains(&sig) {
                Verdict::Exit
            } else {
                Verdict::Hold
            }
        }
    }
}

/// Where the tracked child is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    /// No child: before spawn, or after its final status was reported.
    Idle,
    Running,
    /// Termination was requested; the reap finishes the job.
    Killing,
    /// Reaped, session kept open so the user can read the output.
    Held,
    Exiting,
}

impl ChildState {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            ChildState::Idle => 0,
            ChildState::Running => 1,
            ChildState::Killing => 2,
            ChildState::Held => 3,
            ChildState::Exiting => 4,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ChildState::Running,
            2 => ChildState::Killing,
            3 => ChildState::Held,
            4 => ChildState::Exiting,
            _ => ChildState::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Spawned,
    KillRequested,
    Reaped(WaitOutcome),
    StatusReported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    HoldOpen,
    /// Terminate the whole process with success status.
    ExitProcess,
}

/// The lifecycle transition table.
pub fn transition(
    state: ChildState,
    event: LifecycleEvent,
    policy: HoldPolicy,
) -> (ChildState, Action) {
    use ChildState::*;
    use LifecycleEvent::*;

    match (state, event) {
        (Idle, Spawned) => (Running, Action::None),

        (Running, KillRequested) => (Killing, Action::None),
        // Nothing left to wait for.
        (Idle | Held, KillRequested) => (Exiting, Action::ExitProcess),

        (Killing, Reaped(_)) => (Exiting, Action::ExitProcess),
        (Running, Reaped(outcome)) => match decide(policy, outcome) {
            Verdict::Exit => (Exiting, Action::ExitProcess),
            Verdict::Hold => (Held, Action::HoldOpen),
        },

        (Held, StatusReported) => (Idle, Action::None),

        (state, _) => (state, Action::None),
    }
}
