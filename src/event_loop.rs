//! I/O bridge: the blocking loop between the pty, the terminal, the
//! transcript and the host's notification channel.
//!
//! The loop runs on the caller's thread and only hands control back when the
//! host has something to process, which is also the caller's only way to
//! step or stop it. Its single wait point is `poll`; input for the child is
//! queued and written only as fast as the pty takes it, so a full pty never
//! stalls the loop.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::child::{SessionError, Supervisor};
use crate::platform::ReadStrategy;
use crate::terminal::TerminalConsumer;
use crate::transcript::Transcript;

/// Result of draining the pty once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    Data(usize),
    /// Nothing available right now.
    Empty,
    /// End of file or a hard error: the channel is gone.
    Closed,
}

/// Moves bytes from the child to the terminal and transcript, and queued
/// input from the terminal to the child.
#[derive(Debug)]
pub struct IoBridge {
    host: RawFd,
    command: String,
    read: ReadStrategy,
    transcript: Option<Transcript>,
    buf: Vec<u8>,
    /// Input accepted for the child that the pty has not taken yet.
    pending: Vec<u8>,
}

impl IoBridge {
    /// `host` is the externally owned notification descriptor; the bridge
    /// only waits on it and never reads it.
    pub fn new(host: RawFd, command: impl Into<String>, read: ReadStrategy) -> Self {
        Self {
            host,
            command: command.into(),
            read,
            transcript: None,
            buf: vec![0; read.chunk()],
            pending: Vec::new(),
        }
    }

    pub fn host_fd(&self) -> RawFd {
        self.host
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Name used in the exit status line.
    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = command.into();
    }

    pub fn set_transcript(&mut self, transcript: Transcript) {
        self.transcript = Some(transcript);
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    /// Bytes still waiting for room on the pty.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Pump the pty until the host notification descriptor is readable.
    pub fn run(
        &mut self,
        sup: &mut Supervisor,
        term: &mut dyn TerminalConsumer,
    ) -> Result<(), SessionError> {
        loop {
            if let Some(paste) = term.take_paste() {
                self.pending.extend_from_slice(&paste);
            }
            // A failed write already started the kill.
            let _ = self.flush(sup);

            self.report_exit(sup, term);

            let (host_ready, pty_events) = {
                // SAFETY: the host descriptor is owned by the caller and
                // outlives every call into the bridge.
                let host = unsafe { BorrowedFd::borrow_raw(self.host) };
                let mut fds = vec![PollFd::new(host, PollFlags::POLLIN)];
                if let Some(pty) = sup.pty() {
                    let mut events = PollFlags::POLLIN;
                    if !self.pending.is_empty() {
                        events |= PollFlags::POLLOUT;
                    }
                    fds.push(PollFd::new(pty.as_fd(), events));
                }

                match poll(&mut fds, PollTimeout::NONE) {
                    Ok(_) => {}
                    // Likely SIGCHLD; go round to report the exit.
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(SessionError::Io(e.into())),
                }
                let host_ready = fds[0].revents().is_some_and(|r| !r.is_empty());
                let pty_events = fds
                    .get(1)
                    .and_then(|fd| fd.revents())
                    .unwrap_or_else(PollFlags::empty);
                (host_ready, pty_events)
            };

            if pty_events.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR) {
                let drained = match sup.pty() {
                    Some(pty) => self.drain(pty),
                    None => Drain::Empty,
                };
                match drained {
                    Drain::Data(n) => self.forward(n, term),
                    Drain::Empty => {}
                    Drain::Closed => {
                        // Nobody is left to read queued input.
                        self.pending.clear();
                        sup.close_pty();
                    }
                }
            }

            if host_ready {
                return Ok(());
            }
        }
    }

    /// Terminal-side input: reset the view, echo if asked, then queue.
    pub fn send(
        &mut self,
        sup: &mut Supervisor,
        term: &mut dyn TerminalConsumer,
        bytes: &[u8],
    ) -> Result<(), SessionError> {
        term.reset_before_send();
        if term.echo_enabled() {
            term.display(bytes);
        }
        self.write(sup, bytes)
    }

    /// Queue `bytes` behind any earlier input and write what fits now.
    /// The rest goes out from [`IoBridge::run`] as the pty drains.
    pub fn write(&mut self, sup: &mut Supervisor, bytes: &[u8]) -> Result<(), SessionError> {
        self.pending.extend_from_slice(bytes);
        self.flush(sup)
    }

    fn flush(&mut self, sup: &mut Supervisor) -> Result<(), SessionError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        match sup.write(&self.pending) {
            Ok(n) => {
                self.pending.drain(..n);
                Ok(())
            }
            Err(err) => {
                self.pending.clear();
                Err(err)
            }
        }
    }

    /// Show the child's final status once its output is fully drained.
    fn report_exit(&self, sup: &Supervisor, term: &mut dyn TerminalConsumer) {
        if sup.pty_fd().is_some() || !sup.record().has_pending_status() {
            return;
        }
        if let Some(outcome) = sup.record().take_status() {
            log::info!("{} terminated: {:?}", self.command, outcome);
            if let Some(msg) = outcome.status_message(&self.command) {
                term.display(msg.as_bytes());
            }
        }
    }

    fn forward(&mut self, n: usize, term: &mut dyn TerminalConsumer) {
        let bytes = &self.buf[..n];
        term.display(bytes);
        if let Some(transcript) = &mut self.transcript {
            transcript.append(bytes);
        }
    }

    fn drain(&mut self, pty: &File) -> Drain {
        match self.read {
            ReadStrategy::Single { .. } => match read_once(pty, &mut self.buf) {
                ReadResult::Bytes(n) => Drain::Data(n),
                ReadResult::Again => Drain::Empty,
                ReadResult::Gone => Drain::Closed,
            },
            ReadStrategy::Accumulate { .. } => {
                let mut len = 0;
                while len < self.buf.len() {
                    match read_once(pty, &mut self.buf[len..]) {
                        ReadResult::Bytes(n) => len += n,
                        ReadResult::Again => break,
                        ReadResult::Gone if len == 0 => return Drain::Closed,
                        // Deliver what we have; the next readiness sees the end.
                        ReadResult::Gone => break,
                    }
                }
                if len > 0 {
                    Drain::Data(len)
                } else {
                    Drain::Empty
                }
            }
        }
    }
}

enum ReadResult {
    Bytes(usize),
    Again,
    Gone,
}

fn read_once(mut pty: &File, buf: &mut [u8]) -> ReadResult {
    loop {
        match pty.read(buf) {
            Ok(0) => return ReadResult::Gone,
            Ok(n) => return ReadResult::Bytes(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadResult::Again,
            // Linux reports a hung up pty as EIO.
            Err(_) => return ReadResult::Gone,
        }
    }
}
