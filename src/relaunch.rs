//! Start a detached duplicate of this program, e.g. for "new window".

use std::ffi::{CString, OsStr};
use std::os::fd::RawFd;

use nix::unistd::{close, fork, ForkResult};

use crate::child::{CStringArray, SessionError, EXEC_FAILED};
use crate::platform::RelaunchStrategy;

const SELF_EXE: &str = "/proc/self/exe";

/// `argv[0]` without enclosing double quotes.
pub fn unquote(program: &str) -> &str {
    program
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(program)
}

/// Fork and exec a copy of the running image with `args`.
///
/// `inherited` descriptors are closed in the copy first. Returns the pid of
/// the copy. An exec failure only ends the copy, with the exec-failed code;
/// the copy is never waited for here, the reap loop discards it.
pub fn relaunch<S: AsRef<OsStr>>(
    args: &[S],
    inherited: &[RawFd],
    strategy: RelaunchStrategy,
) -> Result<i32, SessionError> {
    let argv = CStringArray::from_args(args)?;
    let program = match strategy {
        RelaunchStrategy::SelfExe => CString::new(SELF_EXE).ok(),
        RelaunchStrategy::Argv0 => argv
            .first()
            .map(|a| unquote(&a.to_string_lossy()).to_string())
            .and_then(|p| CString::new(p).ok()),
    }
    .ok_or(SessionError::NoCommand)?;

    // SAFETY: the child only closes descriptors and execs, using data built
    // before the fork.
    let pid = match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            for &fd in inherited {
                let _ = close(fd);
            }
            // SAFETY: both arrays are NUL terminated and outlive the call.
            unsafe {
                match strategy {
                    RelaunchStrategy::SelfExe => libc::execv(program.as_ptr(), argv.as_ptr()),
                    RelaunchStrategy::Argv0 => libc::execvp(program.as_ptr(), argv.as_ptr()),
                };
                libc::_exit(EXEC_FAILED)
            }
        }
        Ok(ForkResult::Parent { child }) => child.as_raw(),
        Err(e) => {
            log::warn!("Relaunch fork failed: {}", e);
            return Err(SessionError::Relaunch(e.into()));
        }
    };
    log::info!("Relaunched as pid {} ({:?})", pid, strategy);
    Ok(pid)
}
