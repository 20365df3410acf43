//! Signal bridge: turns asynchronous signal delivery into record transitions.
//!
//! Two kinds of handler are installed:
//!
//! - SIGCHLD reaps and runs the outcome through the lifecycle table. When the
//!   table says so, the whole process exits right there with status 0.
//! - SIGINT, SIGTERM, SIGHUP and SIGQUIT hang up the child's process group,
//!   restore the default disposition and re-raise, so we die the way a parent
//!   shell expects.
//!
//! Handlers reach the record through a single atomic pointer owned by the
//! [`SignalBridge`] guard; they never allocate, lock or log.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::{self, killpg, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;

use super::lifecycle::Action;
use super::record::ChildRecord;

static ACTIVE: AtomicPtr<ChildRecord> = AtomicPtr::new(ptr::null_mut());
static EXIT_HOOK: AtomicUsize = AtomicUsize::new(0);

/// Signals treated as a request to terminate the session.
pub const TERMINATION_SIGNALS: [Signal; 4] =
    [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP, Signal::SIGQUIT];

/// Keeps the handlers installed; dropping it restores default dispositions.
#[derive(Debug)]
pub struct SignalBridge {
    record: Arc<ChildRecord>,
}

impl SignalBridge {
    /// Install the handlers for `record`.
    ///
    /// Only one bridge can be active per process.
    pub fn install(record: Arc<ChildRecord>) -> io::Result<Self> {
        let raw = Arc::into_raw(Arc::clone(&record)) as *mut ChildRecord;
        if ACTIVE
            .compare_exchange(ptr::null_mut(), raw, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // SAFETY: raw came from Arc::into_raw above and was never published.
            drop(unsafe { Arc::from_raw(raw) });
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a signal bridge is already installed",
            ));
        }

        for sig in TERMINATION_SIGNALS {
            set_handler(sig, SigHandler::Handler(on_termination_request), SaFlags::empty())?;
        }
        set_handler(
            Signal::SIGCHLD,
            SigHandler::Handler(on_child_exit),
            SaFlags::SA_NOCLDSTOP,
        )?;

        log::debug!("Signal bridge installed");
        Ok(Self { record })
    }

    pub fn record(&self) -> &Arc<ChildRecord> {
        &self.record
    }

    /// Run `hook` right before a handler ends the process, e.g. to put the
    /// outer terminal back. The hook must be async-signal-safe.
    pub fn set_exit_hook(&self, hook: extern "C" fn()) {
        EXIT_HOOK.store(hook as usize, Ordering::SeqCst);
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        for sig in TERMINATION_SIGNALS.into_iter().chain([Signal::SIGCHLD]) {
            let _ = set_handler(sig, SigHandler::SigDfl, SaFlags::empty());
        }
        EXIT_HOOK.store(0, Ordering::SeqCst);
        let raw = ACTIVE.swap(ptr::null_mut(), Ordering::SeqCst);
        if !raw.is_null() {
            // SAFETY: the pointer was produced by Arc::into_raw in install and
            // no handler can observe it any more.
            drop(unsafe { Arc::from_raw(raw) });
        }
    }
}

fn set_handler(sig: Signal, handler: SigHandler, flags: SaFlags) -> io::Result<()> {
    let action = SigAction::new(handler, flags | SaFlags::SA_RESTART, SigSet::empty());
    // SAFETY: the handlers only touch atomics and async-signal-safe calls.
    unsafe { signal::sigaction(sig, &action) }.map_err(io::Error::from)?;
    Ok(())
}

fn active_record() -> Option<&'static ChildRecord> {
    let raw = ACTIVE.load(Ordering::SeqCst);
    // SAFETY: non-null means the bridge still holds its Arc reference.
    unsafe { raw.as_ref() }
}

fn run_exit_hook() {
    let raw = EXIT_HOOK.load(Ordering::SeqCst);
    if raw != 0 {
        // SAFETY: only ever stored from an `extern "C" fn()` in set_exit_hook.
        let hook: extern "C" fn() = unsafe { std::mem::transmute(raw) };
        hook();
    }
}

extern "C" fn on_child_exit(_sig: libc::c_int) {
    let saved_errno = Errno::last_raw();
    if let Some(record) = active_record() {
        if record.reap_and_decide() == Action::ExitProcess {
            run_exit_hook();
            // SAFETY: _exit is async-signal-safe and does not return.
            unsafe { libc::_exit(0) };
        }
    }
    Errno::set_raw(saved_errno);
}

extern "C" fn on_termination_request(sig: libc::c_int) {
    if let Some(pid) = active_record().and_then(ChildRecord::pid) {
        let _ = killpg(Pid::from_raw(pid), Signal::SIGHUP);
    }
    run_exit_hook();
    let Ok(sig) = Signal::try_from(sig) else {
        return;
    };
    // SAFETY: restoring the default disposition from inside its own handler.
    let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    let _ = signal::raise(sig);
}
