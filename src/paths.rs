//! Path translation for terminal-side requests such as "open this file".
//!
//! A logical path is expanded first (tilde, then relative to the foreground
//! process's working directory) and then converted to the host's native form.

use std::ffi::CString;
use std::path::PathBuf;

use serde::Deserialize;

use crate::child::Supervisor;

/// Length limit past which native paths keep their long-path prefix.
pub const MAX_PATH: usize = 260;

const LONG_PREFIX: &str = r"\\?\";
const LONG_UNC_PREFIX: &str = r"\\?\UNC\";

/// What the expansion step needs to know about the session.
pub trait PathContext {
    /// Home directory of the session user.
    fn home(&self) -> String;
    /// Home directory of a named account.
    fn account_home(&self, name: &str) -> Option<String>;
    /// Working directory of the terminal's foreground process.
    fn foreground_cwd(&self) -> Option<String>;
}

/// Native path representation of the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "style", rename_all = "lowercase")]
pub enum PathStyle {
    /// Native paths are the logical paths.
    #[default]
    Posix,
    /// Drive-letter paths, with POSIX absolute paths placed under `root`.
    Windows {
        #[serde(rename = "windows_root", default = "default_windows_root")]
        root: String,
    },
}

fn default_windows_root() -> String {
    r"C:\".to_string()
}

/// Expand a logical path to an absolute logical path.
pub fn expand(logical: &str, ctx: &dyn PathContext) -> String {
    if let Some(after) = logical.strip_prefix('~') {
        let (name, rest) = after.split_once('/').unwrap_or((after, ""));
        let base = if name.is_empty() {
            ctx.home()
        } else {
            ctx.account_home(name).unwrap_or_default()
        };
        format!("{}/{}", base, rest)
    } else if !logical.starts_with('/') {
        let base = ctx.foreground_cwd().unwrap_or_else(|| ctx.home());
        format!("{}/{}", base, logical)
    } else {
        logical.to_string()
    }
}

/// Convert an absolute logical path to the native form.
pub fn to_native(path: &str, style: &PathStyle) -> String {
    match style {
        PathStyle::Posix => path.to_string(),
        PathStyle::Windows { root } => strip_long_prefix(&to_windows(path, root)),
    }
}

fn to_windows(path: &str, root: &str) -> String {
    let backslashed = |s: &str| s.replace('/', "\\");

    if let Some(rest) = path.strip_prefix("/cygdrive/") {
        let (drive, tail) = rest.split_once('/').unwrap_or((rest, ""));
        if drive.len() == 1 && drive.chars().all(|c| c.is_ascii_alphabetic()) {
            return format!(
                "{}{}:\\{}",
                LONG_PREFIX,
                drive.to_ascii_uppercase(),
                backslashed(tail)
            );
        }
    }
    if let Some(unc) = path.strip_prefix("//") {
        return format!("{}{}", LONG_UNC_PREFIX, backslashed(unc));
    }
    let root = root.trim_end_matches('\\');
    format!("{}{}{}", LONG_PREFIX, root, backslashed(path))
}

/// Drop the long-path prefix when the path is short enough to do without,
/// since some programs cannot handle it.
pub fn strip_long_prefix(native: &str) -> String {
    if let Some(rest) = native.strip_prefix(LONG_UNC_PREFIX) {
        let short = format!(r"\\{}", rest);
        if utf16_len(&short) < MAX_PATH {
            return short;
        }
    } else if let Some(rest) = native.strip_prefix(LONG_PREFIX) {
        if utf16_len(rest) < MAX_PATH {
            return rest.to_string();
        }
    }
    native.to_string()
}

/// Length as Windows counts it, in UTF-16 units.
fn utf16_len(path: &str) -> usize {
    path.encode_utf16().count()
}

/// Expands and converts logical paths for one session.
#[derive(Debug, Clone, Default)]
pub struct PathTranslator {
    style: PathStyle,
}

impl PathTranslator {
    pub fn new(style: PathStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &PathStyle {
        &self.style
    }

    pub fn translate(&self, logical: &str, ctx: &dyn PathContext) -> String {
        to_native(&expand(logical, ctx), &self.style)
    }
}

/// Path context backed by the live session.
#[derive(Debug)]
pub struct SessionPaths<'a> {
    supervisor: &'a Supervisor,
    home: &'a str,
    proc_root: PathBuf,
}

impl<'a> SessionPaths<'a> {
    pub fn new(supervisor: &'a Supervisor, home: &'a str) -> Self {
        Self {
            supervisor,
            home,
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl PathContext for SessionPaths<'_> {
    fn home(&self) -> String {
        self.home.to_string()
    }

    fn account_home(&self, name: &str) -> Option<String> {
        account_home(name)
    }

    fn foreground_cwd(&self) -> Option<String> {
        if !self.supervisor.capabilities().cwd_lookup {
            return None;
        }
        let pid = self.supervisor.foreground_pid()?;
        let cwd = std::fs::canonicalize(self.proc_root.join(pid.to_string()).join("cwd")).ok()?;
        cwd.into_os_string().into_string().ok()
    }
}

/// Home directory of an account from the password database.
pub fn account_home(name: &str) -> Option<String> {
    let name = CString::new(name).ok()?;
    let mut buf = vec![0 as libc::c_char; 4096];
    // SAFETY: getpwnam_r writes into our passwd and buffer only.
    unsafe {
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = libc::getpwnam_r(
            name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        );
        if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
            log::debug!("No home directory for account {:?}", name);
            return None;
        }
        Some(
            std::ffi::CStr::from_ptr(pwd.pw_dir)
                .to_string_lossy()
                .into_owned(),
        )
    }
}
