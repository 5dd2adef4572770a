use crate::status::Termination;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable state of one shell session that built-ins and the execution
/// engine share.
///
/// The environment contains:
/// - `current_dir`: the working directory, kept in sync by `cd`.
/// - `home`: where `cd` without arguments goes.
/// - `last_status`: how the most recent foreground command ended.
/// - `should_exit`: set by `exit`; the loop stops after the current cycle.
#[derive(Debug, Clone)]
pub struct Environment {
    pub current_dir: PathBuf,
    pub home: Option<PathBuf>,
    pub last_status: Termination,
    pub should_exit: bool,
    pid: u32,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// `home` is read from the `HOME` variable once; the shell has no way to
    /// change it afterwards.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            home: stdenv::var_os("HOME").map(PathBuf::from),
            last_status: Termination::default(),
            should_exit: false,
            pid: std::process::id(),
        }
    }

    /// Process id of the shell, the value `$$` expands to.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
