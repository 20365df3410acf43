//! Shell selection utilities

/// Select shell based on priority:
/// 1. $SHELL environment variable
/// 2. /bin/sh
pub fn select_shell() -> String {
    match std::env::var("SHELL") {
        Ok(shell) if !shell.is_empty() => shell,
        _ => "/bin/sh".to_string(),
    }
}
