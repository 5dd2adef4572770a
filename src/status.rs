use nix::sys::wait::WaitStatus;
use std::fmt;

/// How a child process ended.
///
/// Formats the way the shell reports it everywhere: `exit value C` or
/// `terminated by signal S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited normally with the given code.
    Exited(i32),
    /// Killed by the given signal number.
    Signaled(i32),
}

impl Termination {
    /// Extract a termination from a `waitpid` result.
    ///
    /// Returns `None` while the process is still alive (or merely stopped or
    /// continued), since none of those end it.
    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Termination::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Termination::Signaled(signal as i32)),
            _ => None,
        }
    }

    pub fn is_signaled(&self) -> bool {
        matches!(self, Termination::Signaled(_))
    }
}

impl Default for Termination {
    /// Before any foreground command ran, `status` reports a clean exit.
    fn default() -> Self {
        Termination::Exited(0)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exit value {code}"),
            Termination::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use nix::unistd::Pid;

    #[test]
    fn test_formats_both_cases() {
        assert_eq!(Termination::Exited(3).to_string(), "exit value 3");
        assert_eq!(Termination::Signaled(9).to_string(), "terminated by signal 9");
        assert_eq!(Termination::default().to_string(), "exit value 0");
    }

    #[test]
    fn test_from_wait_status() {
        let pid = Pid::from_raw(1234);
        assert_eq!(
            Termination::from_wait_status(WaitStatus::Exited(pid, 7)),
            Some(Termination::Exited(7))
        );
        assert_eq!(
            Termination::from_wait_status(WaitStatus::Signaled(pid, Signal::SIGTERM, false)),
            Some(Termination::Signaled(15))
        );
        assert_eq!(Termination::from_wait_status(WaitStatus::StillAlive), None);
        assert_eq!(
            Termination::from_wait_status(WaitStatus::Stopped(pid, Signal::SIGSTOP)),
            None
        );
    }
}
