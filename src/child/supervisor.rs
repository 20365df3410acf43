//! Process supervisor: spawn, kill and inspect the primary child.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{killpg, SigSet, SigmaskHow, Signal};
use nix::unistd::{close, dup2, fork, setsid, ForkResult, Pid};

use super::accounting;
use super::error::SessionError;
use super::launch::{ExecPlan, LaunchSettings};
use super::lifecycle::{Action, HoldPolicy, EXEC_FAILED};
use super::record::ChildRecord;
use super::size::PtySize;
use crate::platform::{Capabilities, ProcessTable};

/// What a kill request amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// The whole process should exit now.
    ExitNow,
    /// The child was hung up; the reap will finish the job.
    Deferred,
}

/// Owns the child record and the master side of the pty.
#[derive(Debug)]
pub struct Supervisor {
    record: Arc<ChildRecord>,
    pty: Option<File>,
    settings: LaunchSettings,
    caps: Capabilities,
    proc_root: PathBuf,
}

impl Supervisor {
    pub fn new(policy: HoldPolicy, settings: LaunchSettings, caps: Capabilities) -> Self {
        Self {
            record: Arc::new(ChildRecord::new(policy)),
            pty: None,
            settings,
            caps,
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Look up the process table under `root` instead of `/proc`.
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    pub fn record(&self) -> &Arc<ChildRecord> {
        &self.record
    }

    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn pid(&self) -> Option<i32> {
        self.record.pid()
    }

    /// Master side of the pty while it is open.
    pub fn pty_fd(&self) -> Option<RawFd> {
        self.pty.as_ref().map(AsRawFd::as_raw_fd)
    }

    pub(crate) fn pty(&self) -> Option<&File> {
        self.pty.as_ref()
    }

    /// Stop using the pty. Reaping is left to the signal bridge.
    pub fn close_pty(&mut self) {
        if self.pty.take().is_some() {
            log::debug!("Pty closed");
        }
    }

    /// Allocate a pty and start `argv` on it.
    ///
    /// The exec happens in the child; if it fails, the child prints the reason
    /// on the pty and exits 255, so the caller only ever sees pty or fork
    /// failures here. Refused while a child is still tracked or its pty is
    /// still open.
    pub fn spawn<S: AsRef<OsStr>>(&mut self, argv: &[S], size: PtySize) -> Result<i32, SessionError> {
        if self.record.pid().is_some() || self.pty.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        let plan = ExecPlan::new(argv, &self.settings)?;
        let winsize: Winsize = size.into();
        let pty = openpty(Some(&winsize), None).map_err(|e| {
            log::warn!("openpty failed: {}", e);
            SessionError::Fork(e.into())
        })?;

        // SIGCHLD stays blocked until the pid is recorded, otherwise a child
        // that dies at once would be reaped as a stranger.
        let forked = with_sigchld_blocked(|| -> nix::Result<Pid> {
            // SAFETY: the child only runs async-signal-safe calls on data
            // prepared before the fork, then execs or exits.
            match unsafe { fork() }? {
                ForkResult::Child => {
                    unblock_all_signals();
                    attach_terminal(pty.master.as_raw_fd(), pty.slave.as_raw_fd());
                    plan.exec()
                }
                ForkResult::Parent { child } => {
                    self.record.track(child.as_raw());
                    Ok(child)
                }
            }
        });
        let pid = match forked {
            Ok(child) => child.as_raw(),
            Err(e) => {
                log::warn!("fork failed: {}", e);
                return Err(SessionError::Fork(e.into()));
            }
        };

        drop(pty.slave);
        let master = File::from(pty.master);
        set_nonblocking(master.as_raw_fd())?;

        if self.settings.utmp {
            accounting::record_login(master.as_raw_fd(), pid);
        }

        log::info!(
            "Spawned {:?} as pid {} on {}",
            plan_name(argv),
            pid,
            accounting::pty_device_name(master.as_raw_fd()).unwrap_or_else(|| "?".to_string())
        );
        self.pty = Some(master);
        Ok(pid)
    }

    /// Decide and carry out the signalling part of a kill request.
    ///
    /// `point_blank` sends SIGKILL and always asks for an immediate exit.
    /// Otherwise the child's process group is hung up and the exit is left to
    /// the reap, unless there is no child or the signal could not be sent.
    pub fn kill_request(&self, point_blank: bool) -> KillOutcome {
        let Some(pid) = self.record.pid() else {
            return KillOutcome::ExitNow;
        };
        let sig = if point_blank {
            Signal::SIGKILL
        } else {
            Signal::SIGHUP
        };
        if killpg(Pid::from_raw(pid), sig).is_err() || point_blank {
            return KillOutcome::ExitNow;
        }
        log::info!("Hung up child process group {}", pid);
        match self.record.request_kill() {
            Action::ExitProcess => KillOutcome::ExitNow,
            _ => KillOutcome::Deferred,
        }
    }

    /// Terminate the child; exits the whole process when nothing is left to wait for.
    pub fn kill(&self, point_blank: bool) {
        if self.kill_request(point_blank) == KillOutcome::ExitNow {
            log::info!("Exiting");
            std::process::exit(0);
        }
    }

    /// Whether the tracked child currently has children of its own, found by
    /// walking the process table for a matching parent id.
    ///
    /// False when there is no child or the table cannot be read.
    pub fn is_parent(&self) -> bool {
        match self.record.pid() {
            Some(pid) => has_child_process(&self.proc_root, self.caps.process_table, pid),
            None => false,
        }
    }

    /// Process group in the foreground of the pty, falling back to the child.
    pub fn foreground_pid(&self) -> Option<i32> {
        let fg = match self.pty_fd() {
            // SAFETY: tcgetpgrp on our own descriptor.
            Some(fd) => unsafe { libc::tcgetpgrp(fd) },
            None => 0,
        };
        if fg > 0 {
            Some(fg)
        } else {
            self.record.pid()
        }
    }

    /// Pass a new window size to the pty; no-op once it is closed.
    pub fn resize(&self, size: PtySize) -> Result<(), SessionError> {
        let Some(fd) = self.pty_fd() else {
            return Ok(());
        };
        let winsize: Winsize = size.into();
        // SAFETY: TIOCSWINSZ reads a winsize we own.
        if unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &winsize) } == -1 {
            return Err(SessionError::Resize(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Write as much of `bytes` as the pty takes right now, without side
    /// effects on failure. Returns how many bytes went out; a full pty gives 0.
    pub fn try_write(&self, bytes: &[u8]) -> Result<usize, SessionError> {
        let mut pty = self.pty.as_ref().ok_or(SessionError::NotRunning)?;
        let mut written = 0;
        while written < bytes.len() {
            match pty.write(&bytes[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(SessionError::Write(e)),
            }
        }
        Ok(written)
    }

    /// Write to the child without blocking. Losing the channel counts as
    /// child death and starts a graceful kill.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, SessionError> {
        match self.try_write(bytes) {
            Ok(n) => Ok(n),
            Err(err) => {
                log::debug!("Write to child failed: {}", err);
                self.close_pty();
                self.kill(false);
                Err(err)
            }
        }
    }
}

fn plan_name<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.first()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn with_sigchld_blocked<T>(f: impl FnOnce() -> T) -> T {
    let mut block = SigSet::empty();
    block.add(Signal::SIGCHLD);
    let previous = block.thread_swap_mask(SigmaskHow::SIG_BLOCK).ok();
    let result = f();
    if let Some(previous) = previous {
        let _ = previous.thread_set_mask();
    }
    result
}

fn unblock_all_signals() {
    let _ = SigSet::empty().thread_set_mask();
}

/// Runs in the forked child: make the slave our controlling terminal and
/// standard streams.
fn attach_terminal(master: RawFd, slave: RawFd) {
    let _ = close(master);
    if setsid().is_err() {
        // SAFETY: _exit never returns into the parent's code.
        unsafe { libc::_exit(EXEC_FAILED) };
    }
    // SAFETY: TIOCSCTTY on the slave descriptor we own.
    unsafe { libc::ioctl(slave, libc::TIOCSCTTY as _, 0) };
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if dup2(slave, target).is_err() {
            // SAFETY: as above.
            unsafe { libc::_exit(EXEC_FAILED) };
        }
    }
    if slave > libc::STDERR_FILENO {
        let _ = close(slave);
    }
}

pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)?;
    fcntl(
        fd,
        FcntlArg::F_SETFL(OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK),
    )?;
    Ok(())
}

/// Parent id of `pid` according to the given process table layout.
pub fn parent_of(proc_root: &Path, table: ProcessTable, pid: &str) -> Option<i32> {
    match table {
        ProcessTable::Stat => {
            let stat = std::fs::read_to_string(proc_root.join(pid).join("stat")).ok()?;
            // The command name may contain spaces and parentheses.
            let after_name = &stat[stat.rfind(')')? + 1..];
            after_name.split_whitespace().nth(1)?.parse().ok()
        }
        ProcessTable::PpidFile => std::fs::read_to_string(proc_root.join(pid).join("ppid"))
            .ok()?
            .trim()
            .parse()
            .ok(),
        ProcessTable::Unavailable => None,
    }
}

/// Whether any live process has `parent` as its parent id.
pub fn has_child_process(proc_root: &Path, table: ProcessTable, parent: i32) -> bool {
    if table == ProcessTable::Unavailable {
        return false;
    }
    let Ok(entries) = std::fs::read_dir(proc_root) else {
        return false;
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
        .any(|name| parent_of(proc_root, table, &name) == Some(parent))
}
