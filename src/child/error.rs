//! Session error types

/// Errors that can occur while supervising the child
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Failed to allocate the pty pair or fork the child
    #[error("Failed to fork child process: {0}")]
    Fork(#[source] std::io::Error),

    /// A command-line argument or environment entry contains a NUL byte
    #[error("Invalid argument: {0:?}")]
    InvalidArgument(String),

    /// Empty argument vector
    #[error("No command to run")]
    NoCommand,

    /// There is no child process
    #[error("Child process not running")]
    NotRunning,

    /// A child is still tracked, or its pty is still open
    #[error("Child process already running")]
    AlreadyRunning,

    /// The pty is gone or refused our input
    #[error("Failed to write to child: {0}")]
    Write(#[source] std::io::Error),

    /// Failed to resize the pty
    #[error("Failed to resize terminal: {0}")]
    Resize(#[source] std::io::Error),

    /// Failed to open the transcript file
    #[error("Failed to open log file: {}.", describe(.0))]
    Transcript(#[source] std::io::Error),

    /// Failed to start a duplicate of this program
    #[error("Failed to relaunch: {0}")]
    Relaunch(#[source] std::io::Error),

    /// Other I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the OS asked us to try again (EAGAIN).
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Fork(e) => e.raw_os_error() == Some(libc::EAGAIN),
            _ => false,
        }
    }
}

/// User-facing failure line, in the form `Failed to <action>: <reason>.`
pub fn failure_message(action: &str, err: &std::io::Error) -> String {
    format!("Failed to {}: {}.", action, describe(err))
}

/// `strerror` text for OS errors, the plain message otherwise.
pub fn describe(err: &std::io::Error) -> String {
    match err.raw_os_error() {
        Some(code) => {
            // SAFETY: strerror returns a NUL terminated string; copied out at once.
            let ptr = unsafe { libc::strerror(code) };
            if ptr.is_null() {
                err.to_string()
            } else {
                unsafe { std::ffi::CStr::from_ptr(ptr) }
                    .to_string_lossy()
                    .into_owned()
            }
        }
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fork_error_display() {
        let err = SessionError::Fork(std::io::Error::from_raw_os_error(libc::ENOMEM));
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to fork child process: "));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_eagain_fork_is_retryable() {
        let err = SessionError::Fork(std::io::Error::from_raw_os_error(libc::EAGAIN));
        assert!(err.is_retryable());
        assert!(!SessionError::NotRunning.is_retryable());
    }

    #[test]
    fn test_failure_message_uses_strerror() {
        let err = std::io::Error::from_raw_os_error(libc::ENOENT);
        let msg = failure_message("open log file", &err);
        assert!(msg.starts_with("Failed to open log file: "));
        assert!(msg.ends_with('.'));
        assert!(!msg.contains("os error"));
    }

    #[test]
    fn test_transcript_error_reads_like_a_failure_line() {
        let err = std::io::Error::from_raw_os_error(libc::EACCES);
        let expected = failure_message("open log file", &err);
        assert_eq!(SessionError::Transcript(err).to_string(), expected);
    }
}
