//! Login accounting record written when a child is spawned.

use std::os::fd::RawFd;

/// Device name of the pty's slave side, e.g. `/dev/pts/3`.
pub fn pty_device_name(master: RawFd) -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let mut buf = [0 as libc::c_char; 128];
        // SAFETY: ptsname_r writes at most buf.len() bytes into our buffer.
        if unsafe { libc::ptsname_r(master, buf.as_mut_ptr(), buf.len()) } != 0 {
            return None;
        }
        let name = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
        Some(name.to_string_lossy().into_owned())
    }
    #[cfg(not(target_os = "linux"))]
    {
        // SAFETY: ptsname returns a static buffer, copied out immediately.
        let ptr = unsafe { libc::ptsname(master) };
        if ptr.is_null() {
            return None;
        }
        Some(
            unsafe { std::ffi::CStr::from_ptr(ptr) }
                .to_string_lossy()
                .into_owned(),
        )
    }
}

/// `ut_line` and `ut_id` for a device path.
///
/// The line is the device without `/dev/`; the id is the line without a
/// leading `pty` or `tty`.
pub fn line_and_id(device: &str) -> (String, String) {
    let line = device.strip_prefix("/dev/").unwrap_or(device);
    let id = line
        .strip_prefix("pty")
        .or_else(|| line.strip_prefix("tty"))
        .unwrap_or(line);
    (line.to_string(), id.to_string())
}

/// Login name of the session user, `?` when unknown.
pub fn login_name() -> String {
    // SAFETY: getlogin returns NULL or a static NUL terminated string.
    let ptr = unsafe { libc::getlogin() };
    if ptr.is_null() {
        return "?".to_string();
    }
    unsafe { std::ffi::CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn copy_field(dst: &mut [libc::c_char], src: &str) {
    for (d, s) in dst.iter_mut().zip(src.bytes()) {
        *d = s as libc::c_char;
    }
}

/// Write a USER_PROCESS entry for `pid` on the pty behind `master`.
///
/// Accounting is best effort: failures are logged, never returned.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn record_login(master: RawFd, pid: libc::pid_t) {
    let device = pty_device_name(master).unwrap_or_else(|| "?".to_string());
    let (line, id) = line_and_id(&device);
    let user = login_name();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    // SAFETY: utmpx is plain old data; the fields we do not set stay zero.
    unsafe {
        let mut ut: libc::utmpx = std::mem::zeroed();
        ut.ut_type = libc::USER_PROCESS;
        ut.ut_pid = pid;
        ut.ut_tv.tv_sec = now as _;
        copy_field(&mut ut.ut_line, &line);
        copy_field(&mut ut.ut_id, &id);
        copy_field(&mut ut.ut_user, &user);

        libc::setutxent();
        let written = libc::pututxline(&ut);
        libc::endutxent();
        if written.is_null() {
            log::warn!(
                "Failed to write login record for {}: {}",
                line,
                std::io::Error::last_os_error()
            );
        } else {
            log::debug!("Login record written for {} ({})", line, user);
        }
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub fn record_login(_master: RawFd, _pid: libc::pid_t) {
    log::debug!("Login accounting not supported on this host");
}
