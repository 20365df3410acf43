//! One terminal session: a supervised child plus the bridge that feeds the
//! terminal from it.
//!
//! `Session` is what a host program holds. It reports spawn problems on the
//! terminal itself, as a terminal would, and keeps going without a child.

use std::ffi::OsStr;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;

use crate::child::{
    failure_message, KillOutcome, PtySize, SessionError, SignalBridge, Supervisor,
};
use crate::config::Config;
use crate::event_loop::IoBridge;
use crate::paths::{PathTranslator, SessionPaths};
use crate::platform::Capabilities;
use crate::relaunch::relaunch;
use crate::terminal::TerminalConsumer;
use crate::transcript::Transcript;

#[derive(Debug)]
pub struct Session {
    supervisor: Supervisor,
    bridge: IoBridge,
    paths: PathTranslator,
    home: String,
    log_file: Option<PathBuf>,
}

impl Session {
    /// `host` is the host program's notification descriptor.
    pub fn new(host: RawFd, config: &Config, caps: Capabilities) -> Self {
        let home = dirs::home_dir()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            supervisor: Supervisor::new(config.session.hold, config.launch_settings(), caps),
            bridge: IoBridge::new(host, "", caps.read),
            paths: PathTranslator::new(config.paths.clone()),
            home,
            log_file: config.session.log_file.clone(),
        }
    }

    /// Use `home` for tilde expansion instead of the user's home directory.
    pub fn with_home(mut self, home: impl Into<String>) -> Self {
        self.home = home.into();
        self
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn bridge(&self) -> &IoBridge {
        &self.bridge
    }

    /// Start the child and open the transcript.
    ///
    /// Failures are shown on `term`; the session stays usable without a child.
    pub fn spawn<S: AsRef<OsStr>>(
        &mut self,
        argv: &[S],
        size: PtySize,
        term: &mut dyn TerminalConsumer,
    ) -> Result<i32, SessionError> {
        let command = argv
            .first()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .unwrap_or_default();

        let pid = match self.supervisor.spawn(argv, size) {
            Ok(pid) => pid,
            Err(err) => {
                term.display(self.spawn_failure(&err).as_bytes());
                return Err(err);
            }
        };
        self.bridge.set_command(command);

        if let Some(path) = &self.log_file {
            match Transcript::open(path) {
                Ok(transcript) => self.bridge.set_transcript(transcript),
                Err(e) => {
                    log::warn!("Failed to open log file {}: {}", path.display(), e);
                    let err = SessionError::Transcript(e);
                    term.display(format!("{}\r\n", err).as_bytes());
                }
            }
        }
        Ok(pid)
    }

    fn spawn_failure(&self, err: &SessionError) -> String {
        match err {
            SessionError::Fork(e) => {
                let hint = if err.is_retryable() {
                    self.supervisor.capabilities().fork_retry_hint
                } else {
                    ""
                };
                format!("{}{}\r\n", failure_message("fork child process", e), hint)
            }
            other => format!("{}\r\n", other),
        }
    }

    /// Pump output until the host has an event pending.
    pub fn run(&mut self, term: &mut dyn TerminalConsumer) -> Result<(), SessionError> {
        self.bridge.run(&mut self.supervisor, term)
    }

    /// Input typed or pasted on the terminal.
    pub fn send(
        &mut self,
        term: &mut dyn TerminalConsumer,
        bytes: &[u8],
    ) -> Result<(), SessionError> {
        self.bridge.send(&mut self.supervisor, term, bytes)
    }

    /// Text input, sent as UTF-8.
    pub fn send_str(
        &mut self,
        term: &mut dyn TerminalConsumer,
        text: &str,
    ) -> Result<(), SessionError> {
        self.send(term, text.as_bytes())
    }

    /// Raw write to the child, queued behind earlier input. A lost channel
    /// starts a graceful kill.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.bridge.write(&mut self.supervisor, bytes)
    }

    pub fn resize(&self, size: PtySize) -> Result<(), SessionError> {
        self.supervisor.resize(size)
    }

    /// Terminate the child, exiting the process when nothing is left to wait for.
    pub fn kill(&self, point_blank: bool) {
        self.supervisor.kill(point_blank)
    }

    /// The decision `kill` would act on, without exiting.
    pub fn kill_request(&self, point_blank: bool) -> KillOutcome {
        self.supervisor.kill_request(point_blank)
    }

    /// Whether the child is currently running programs of its own.
    pub fn is_parent(&self) -> bool {
        self.supervisor.is_parent()
    }

    /// Turn a path seen on the terminal into a native path.
    pub fn translate_path(&self, logical: &str) -> String {
        let ctx = SessionPaths::new(&self.supervisor, &self.home);
        self.paths.translate(logical, &ctx)
    }

    /// Start a detached copy of this program with `args`.
    pub fn relaunch<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<i32, SessionError> {
        let mut inherited = vec![self.bridge.host_fd()];
        inherited.extend(self.supervisor.pty_fd());
        inherited.extend(self.bridge.transcript().map(AsRawFd::as_raw_fd));
        relaunch(args, &inherited, self.supervisor.capabilities().relaunch)
    }

    /// Hand the child record to the signal handlers. Child death and
    /// termination signals may exit the process from then on.
    pub fn install_signals(&self) -> io::Result<SignalBridge> {
        SignalBridge::install(self.supervisor.record().clone())
    }
}
