//! The terminal side of the session.

use std::io::Write;

/// What the session needs from the terminal that displays the child.
pub trait TerminalConsumer {
    /// Show bytes produced by the child (or by the session itself).
    fn display(&mut self, bytes: &[u8]);

    /// Take the staged paste buffer, if any. Ownership moves to the caller.
    fn take_paste(&mut self) -> Option<Vec<u8>>;

    /// Whether locally typed input should be echoed before it is sent.
    fn echo_enabled(&self) -> bool;

    /// Called before input goes to the child, e.g. to scroll back to the bottom.
    fn reset_before_send(&mut self);
}

/// Consumer that writes straight to an output stream.
#[derive(Debug)]
pub struct StreamConsumer<W: Write> {
    out: W,
    paste: Option<Vec<u8>>,
    echo: bool,
}

impl<W: Write> StreamConsumer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            paste: None,
            echo: false,
        }
    }

    /// Stage bytes to be flushed to the child on the next loop iteration.
    pub fn stage_paste(&mut self, bytes: Vec<u8>) {
        match &mut self.paste {
            Some(pending) => pending.extend(bytes),
            None => self.paste = Some(bytes),
        }
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TerminalConsumer for StreamConsumer<W> {
    fn display(&mut self, bytes: &[u8]) {
        // The display has nowhere to report its own failure.
        let _ = self.out.write_all(bytes).and_then(|_| self.out.flush());
    }

    fn take_paste(&mut self) -> Option<Vec<u8>> {
        self.paste.take()
    }

    fn echo_enabled(&self) -> bool {
        self.echo
    }

    fn reset_before_send(&mut self) {}
}
