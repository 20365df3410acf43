//! The process-status record shared between the session and the SIGCHLD handler.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use super::lifecycle::{transition, Action, ChildState, HoldPolicy, LifecycleEvent, WaitOutcome};

/// Marker for "no status captured".
const NO_STATUS: i32 = -1;

/// Status of the tracked child.
///
/// Every mutable field is a single atomic word so the signal handler can
/// interleave with the main loop at any instruction without anyone seeing a
/// half-written update.
#[derive(Debug)]
pub struct ChildRecord {
    /// 0 when there is no child (not spawned yet, or already reaped).
    pid: AtomicI32,
    /// Reaped outcome in `waitpid` layout, or [`NO_STATUS`].
    status: AtomicI32,
    kill_requested: AtomicBool,
    state: AtomicU8,
    policy: AtomicU8,
}

impl ChildRecord {
    pub fn new(policy: HoldPolicy) -> Self {
        Self {
            pid: AtomicI32::new(0),
            status: AtomicI32::new(NO_STATUS),
            kill_requested: AtomicBool::new(false),
            state: AtomicU8::new(ChildState::Idle.to_raw()),
            policy: AtomicU8::new(policy.to_raw()),
        }
    }

    /// The tracked child, if any.
    pub fn pid(&self) -> Option<i32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    pub fn policy(&self) -> HoldPolicy {
        HoldPolicy::from_raw(self.policy.load(Ordering::SeqCst))
    }

    pub fn state(&self) -> ChildState {
        ChildState::from_raw(self.state.load(Ordering::SeqCst))
    }

    pub fn kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::SeqCst)
    }

    /// Whether a captured exit status is waiting to be reported.
    pub fn has_pending_status(&self) -> bool {
        self.status.load(Ordering::SeqCst) != NO_STATUS
    }

    /// Feed an event through the transition table and store the new state.
    pub fn apply(&self, event: LifecycleEvent) -> Action {
        let policy = self.policy();
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            let (next, action) = transition(ChildState::from_raw(current), event, policy);
            match self.state.compare_exchange(
                current,
                next.to_raw(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return action,
                Err(actual) => current = actual,
            }
        }
    }

    /// Start tracking a freshly forked child.
    pub(crate) fn track(&self, pid: i32) {
        self.status.store(NO_STATUS, Ordering::SeqCst);
        self.kill_requested.store(false, Ordering::SeqCst);
        self.pid.store(pid, Ordering::SeqCst);
        self.apply(LifecycleEvent::Spawned);
    }

    /// Note that termination was asked for.
    pub(crate) fn request_kill(&self) -> Action {
        self.kill_requested.store(true, Ordering::SeqCst);
        self.apply(LifecycleEvent::KillRequested)
    }

    /// Collect every terminated child without blocking.
    ///
    /// Statuses of processes other than the tracked child are discarded.
    /// Interrupted waits are retried. Returns the tracked child's outcome when
    /// it was among the reaped; the pid is cleared at the same moment so the
    /// same child can never be reported twice.
    ///
    /// Only async-signal-safe calls are made, so this runs inside the SIGCHLD
    /// handler as well as in ordinary code.
    pub fn reap(&self) -> Option<WaitOutcome> {
        let mut captured = None;
        loop {
            let status = match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => return captured,
                Ok(status) => status,
                Err(Errno::EINTR) => continue,
                // ECHILD: nothing left to collect.
                Err(_) => return captured,
            };
            let Some(pid) = status.pid() else {
                continue;
            };
            if pid.as_raw() != self.pid.load(Ordering::SeqCst) {
                continue;
            }
            let Some(outcome) = WaitOutcome::from_wait_status(status) else {
                continue;
            };
            self.pid.store(0, Ordering::SeqCst);
            self.status.store(outcome.to_raw(), Ordering::SeqCst);
            captured = Some(outcome);
        }
    }

    /// Reap, and run the captured outcome through the lifecycle table.
    pub fn reap_and_decide(&self) -> Action {
        match self.reap() {
            Some(outcome) => self.apply(LifecycleEvent::Reaped(outcome)),
            None => Action::None,
        }
    }

    /// Hand out the captured status exactly once.
    pub fn take_status(&self) -> Option<WaitOutcome> {
        match self.status.swap(NO_STATUS, Ordering::SeqCst) {
            NO_STATUS => None,
            raw => {
                self.apply(LifecycleEvent::StatusReported);
                Some(WaitOutcome::from_raw(raw))
            }
        }
    }
}
