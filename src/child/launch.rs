//! Launch settings and the child half of the fork.
//!
//! Everything the child needs is prepared in the parent as C strings and
//! pointer arrays, so that the code running between `fork` and `exec` only
//! makes async-signal-safe calls.

use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use super::error::SessionError;

/// Opaque launch configuration supplied by the host program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Value for `TERM` in the child.
    pub term: String,
    /// Erase character is ^H instead of DEL.
    pub backspace_sends_bs: bool,
    /// Resolved locale; replaces `LANG` and clears `LC_ALL`/`LC_CTYPE`.
    pub locale: Option<String>,
    /// Write a login accounting record at spawn.
    pub utmp: bool,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            term: "xterm".to_string(),
            backspace_sends_bs: false,
            locale: None,
            utmp: false,
        }
    }
}

const CTRL_H: libc::cc_t = 0x08;
const DEL: libc::cc_t = 0x7f;

impl LaunchSettings {
    pub fn erase_char(&self) -> libc::cc_t {
        if self.backspace_sends_bs {
            CTRL_H
        } else {
            DEL
        }
    }

    /// Child environment: ours, with terminal type and locale applied.
    pub fn environment<I>(&self, inherited: I) -> Vec<(OsString, OsString)>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut env: Vec<(OsString, OsString)> = inherited
            .into_iter()
            .filter(|(key, _)| {
                key != "TERM"
                    && !(self.locale.is_some()
                        && (key == "LANG" || key == "LC_ALL" || key == "LC_CTYPE"))
            })
            .collect();
        env.push(("TERM".into(), self.term.clone().into()));
        if let Some(locale) = &self.locale {
            env.push(("LANG".into(), locale.clone().into()));
        }
        env
    }
}

fn cstring(bytes: &[u8]) -> Result<CString, SessionError> {
    CString::new(bytes)
        .map_err(|_| SessionError::InvalidArgument(String::from_utf8_lossy(bytes).into_owned()))
}

/// A NULL terminated `char *` array borrowing from owned C strings.
#[derive(Debug)]
pub(crate) struct CStringArray {
    owned: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl CStringArray {
    pub(crate) fn new(owned: Vec<CString>) -> Self {
        let mut ptrs: Vec<*const libc::c_char> = owned.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        Self { owned, ptrs }
    }

    pub(crate) fn from_args<S: AsRef<OsStr>>(args: &[S]) -> Result<Self, SessionError> {
        let owned = args
            .iter()
            .map(|a| cstring(a.as_ref().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(owned))
    }

    pub(crate) fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }

    pub(crate) fn first(&self) -> Option<&CString> {
        self.owned.first()
    }
}

/// Everything the forked child needs, built before `fork`.
#[derive(Debug)]
pub(crate) struct ExecPlan {
    program: CString,
    argv: CStringArray,
    envp: CStringArray,
    erase: libc::cc_t,
}

impl ExecPlan {
    pub(crate) fn new<S: AsRef<OsStr>>(
        argv: &[S],
        settings: &LaunchSettings,
    ) -> Result<Self, SessionError> {
        let argv = CStringArray::from_args(argv)?;
        let program = argv.first().cloned().ok_or(SessionError::NoCommand)?;

        let env = settings
            .environment(std::env::vars_os())
            .into_iter()
            .map(|(key, value)| {
                let mut entry = key.as_bytes().to_vec();
                entry.push(b'=');
                entry.extend_from_slice(value.as_bytes());
                cstring(&entry)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            program,
            argv,
            envp: CStringArray::new(env),
            erase: settings.erase_char(),
        })
    }

    /// Runs in the forked child: prepare the terminal, then exec.
    ///
    /// Never returns. On exec failure the reason goes to stderr, which is
    /// already the pty, and the child exits with the exec-failed code.
    pub(crate) fn exec(&self) -> ! {
        // SAFETY: only async-signal-safe libc calls on data prepared before fork.
        unsafe {
            for sig in [
                libc::SIGHUP,
                libc::SIGINT,
                libc::SIGQUIT,
                libc::SIGTERM,
                libc::SIGCHLD,
            ] {
                libc::signal(sig, libc::SIG_DFL);
            }
            // Job control signals are off, like login does it.
            for sig in [libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU] {
                libc::signal(sig, libc::SIG_IGN);
            }

            let mut attr: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(0, &mut attr) == 0 {
                attr.c_cc[libc::VERASE] = self.erase;
                attr.c_cc[libc::VSTOP] = 0;
                attr.c_cc[libc::VSTART] = 0;
                libc::tcsetattr(0, libc::TCSANOW, &attr);
            }

            environ = self.envp.as_ptr();
            libc::execvp(self.program.as_ptr(), self.argv.as_ptr());

            let errno = nix::errno::Errno::last_raw();
            write_stderr(self.program.as_bytes());
            write_stderr(b": ");
            let reason = libc::strerror(errno);
            if !reason.is_null() {
                write_stderr(std::ffi::CStr::from_ptr(reason).to_bytes());
            }
            write_stderr(b"\r\n");
            libc::_exit(super::lifecycle::EXEC_FAILED)
        }
    }
}

extern "C" {
    static mut environ: *const *const libc::c_char;
}

fn write_stderr(bytes: &[u8]) {
    // SAFETY: write(2) on a borrowed buffer.
    unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
}
