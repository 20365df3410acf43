//! Host capability negotiation.
//!
//! Everything that differs between hosts is resolved once, when the session
//! starts, into a [`Capabilities`] value. The rest of the crate picks a
//! strategy from it instead of probing the system again.

use std::path::Path;

/// How output is pulled from the pty on each readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStrategy {
    /// One `read()` per readiness, up to `chunk` bytes.
    Single { chunk: usize },
    /// Keep reading until `chunk` bytes have accumulated or the device has
    /// nothing more. For drivers that hand out a few bytes at a time.
    Accumulate { chunk: usize },
}

impl ReadStrategy {
    pub fn chunk(&self) -> usize {
        match *self {
            ReadStrategy::Single { chunk } | ReadStrategy::Accumulate { chunk } => chunk,
        }
    }
}

impl Default for ReadStrategy {
    fn default() -> Self {
        ReadStrategy::Single { chunk: 4096 }
    }
}

/// Where parent process ids can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTable {
    /// `/proc/<pid>/stat`, parent id in the fourth field.
    Stat,
    /// `/proc/<pid>/ppid`, a bare decimal number.
    PpidFile,
    /// No enumerable process table.
    Unavailable,
}

/// How the running program image is located for a relaunch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaunchStrategy {
    /// Exec `/proc/self/exe`.
    SelfExe,
    /// Exec `argv[0]`, looked up on `PATH`.
    Argv0,
}

/// Capabilities of the host, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub read: ReadStrategy,
    pub process_table: ProcessTable,
    /// Whether `/proc/<pid>/cwd` can be resolved.
    pub cwd_lookup: bool,
    pub relaunch: RelaunchStrategy,
    /// Appended to the fork error when the OS asked us to retry.
    pub fork_retry_hint: &'static str,
}

const PROCESS_LIMIT_HINT: &str =
    "\r\nThe process limit may have been reached. See 'ulimit -u'.";

impl Capabilities {
    /// Inspect the running host.
    pub fn detect() -> Self {
        Self::detect_in(Path::new("/proc"))
    }

    /// Inspect a given proc filesystem root.
    pub fn detect_in(proc_root: &Path) -> Self {
        let self_dir = proc_root.join("self");

        let process_table = if self_dir.join("stat").exists() {
            ProcessTable::Stat
        } else if self_dir.join("ppid").exists() {
            ProcessTable::PpidFile
        } else {
            ProcessTable::Unavailable
        };

        let relaunch = if self_dir.join("exe").exists() {
            RelaunchStrategy::SelfExe
        } else {
            RelaunchStrategy::Argv0
        };

        let caps = Self {
            read: ReadStrategy::default(),
            process_table,
            cwd_lookup: self_dir.join("cwd").exists(),
            relaunch,
            fork_retry_hint: PROCESS_LIMIT_HINT,
        };
        log::debug!("Host capabilities: {:?}", caps);
        caps
    }

    /// Same capabilities with a different read strategy.
    pub fn with_read(mut self, read: ReadStrategy) -> Self {
        self.read = read;
        self
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_in_empty_root_has_no_proc_features() {
        let dir = tempfile::tempdir().unwrap();
        let caps = Capabilities::detect_in(dir.path());
        assert_eq!(caps.process_table, ProcessTable::Unavailable);
        assert_eq!(caps.relaunch, RelaunchStrategy::Argv0);
        assert!(!caps.cwd_lookup);
    }

    #[test]
    fn test_detect_in_prefers_stat_over_ppid() {
        let dir = tempfile::tempdir().unwrap();
        let self_dir = dir.path().join("self");
        std::fs::create_dir_all(&self_dir).unwrap();
        std::fs::write(self_dir.join("ppid"), "1\n").unwrap();
        assert_eq!(
            Capabilities::detect_in(dir.path()).process_table,
            ProcessTable::PpidFile
        );

        std::fs::write(self_dir.join("stat"), "1 (init) S 0").unwrap();
        assert_eq!(
            Capabilities::detect_in(dir.path()).process_table,
            ProcessTable::Stat
        );
    }

    #[test]
    fn test_read_strategy_chunk() {
        assert_eq!(ReadStrategy::default().chunk(), 4096);
        assert_eq!(ReadStrategy::Accumulate { chunk: 512 }.chunk(), 512);
    }

    #[test]
    fn test_with_read_overrides_strategy() {
        let caps = Capabilities::detect().with_read(ReadStrategy::Accumulate { chunk: 64 });
        assert_eq!(caps.read, ReadStrategy::Accumulate { chunk: 64 });
    }
}
