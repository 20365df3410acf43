//! Raw terminal mode management with panic-safe cleanup.

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use nix::sys::termios::tcgetattr;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Static flag to track if raw mode is active (for panic handler)
pub(crate) static RAW_MODE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Attributes from before raw mode, for exit paths that cannot call crossterm.
static ORIGINAL: OnceLock<(RawFd, libc::termios)> = OnceLock::new();

/// Guard that ensures terminal is restored to normal mode on drop.
/// This handles both normal exits and panics.
pub struct RawModeGuard {
    /// Whether this guard is responsible for cleanup
    active: bool,
}

impl RawModeGuard {
    /// Enter raw mode and return a guard that will restore it on drop.
    ///
    /// # Errors
    /// Returns an error if enabling raw mode fails
    pub fn enter() -> io::Result<Self> {
        // Install panic hook before entering raw mode
        install_panic_hook();
        save_original();

        enable_raw_mode()?;
        RAW_MODE_ACTIVE.store(true, Ordering::SeqCst);

        Ok(Self { active: true })
    }

    /// Manually exit raw mode without dropping the guard.
    /// After calling this, the guard's drop will be a no-op.
    pub fn exit(&mut self) -> io::Result<()> {
        if self.active {
            self.active = false;
            RAW_MODE_ACTIVE.store(false, Ordering::SeqCst);
            disable_raw_mode()?;
        }
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            RAW_MODE_ACTIVE.store(false, Ordering::SeqCst);
            // Best-effort cleanup - ignore errors during drop
            let _ = disable_raw_mode();
        }
    }
}

/// Snapshot stdin's attributes once and register [`restore_at_exit`].
fn save_original() {
    if ORIGINAL.get().is_some() {
        return;
    }
    let stdin = io::stdin();
    let Ok(attrs) = tcgetattr(&stdin) else {
        return;
    };
    if ORIGINAL.set((stdin.as_raw_fd(), attrs.into())).is_ok() {
        // SAFETY: registering a plain extern "C" function.
        unsafe { libc::atexit(restore_at_exit) };
    }
}

/// Put the terminal back from a path that never unwinds, such as
/// `process::exit` or a signal handler. Async-signal-safe.
pub extern "C" fn restore_at_exit() {
    if !RAW_MODE_ACTIVE.swap(false, Ordering::SeqCst) {
        return;
    }
    if let Some((fd, original)) = ORIGINAL.get() {
        // SAFETY: tcsetattr is async-signal-safe; crossterm's restore is not.
        unsafe { libc::tcsetattr(*fd, libc::TCSANOW, original) };
    }
}

/// Install a panic hook that restores terminal state before panicking.
/// This ensures the terminal is usable even if the app panics.
pub(crate) fn install_panic_hook() {
    // Only install once - check if we've already installed
    static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        return; // Already installed
    }

    let original_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        // Restore terminal before showing panic message
        if RAW_MODE_ACTIVE.swap(false, Ordering::SeqCst) {
            let _ = disable_raw_mode();
        }

        // Call the original panic hook to print the panic message
        original_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_mode_guard_enter_and_drop() {
        // Raw mode requires a real TTY
        match RawModeGuard::enter() {
            Ok(guard) => {
                assert!(RAW_MODE_ACTIVE.load(Ordering::SeqCst));
                drop(guard);
                assert!(!RAW_MODE_ACTIVE.load(Ordering::SeqCst));
            }
            Err(e) => {
                eprintln!("Skipping test (no TTY): {}", e);
            }
        }
    }

    #[test]
    fn test_raw_mode_guard_manual_exit() {
        match RawModeGuard::enter() {
            Ok(mut guard) => {
                guard.exit().expect("Should exit raw mode");
                assert!(!RAW_MODE_ACTIVE.load(Ordering::SeqCst));

                // Drop should be a no-op now
                drop(guard);
                assert!(!RAW_MODE_ACTIVE.load(Ordering::SeqCst));
            }
            Err(e) => {
                eprintln!("Skipping test (no TTY): {}", e);
            }
        }
    }

    #[test]
    fn test_restore_at_exit_without_raw_mode_is_noop() {
        if !RAW_MODE_ACTIVE.load(Ordering::SeqCst) {
            restore_at_exit();
            assert!(!RAW_MODE_ACTIVE.load(Ordering::SeqCst));
        }
    }

    #[test]
    fn test_panic_hook_installation() {
        install_panic_hook();
        install_panic_hook(); // Second call should be no-op
    }
}
