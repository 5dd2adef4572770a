use crate::command::CommandLine;
use crate::error::{ExecError, JobError};
use crate::jobs::{JobTable, ProcessControl};
use crate::signals::{self, StopToggleBlock};
use crate::status::Termination;
use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::libc;
use nix::sys::stat::Mode;
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, close, dup2, execvp, fork};
use std::ffi::CString;
use std::io::Write;
use std::os::fd::RawFd;
use tracing::debug;

/// Where background jobs read from and write to unless redirected.
const DEV_NULL: &str = "/dev/null";
/// Exit status of a child that could not set up redirection or exec.
const CHILD_FAILURE: i32 = 1;

/// Launch a non-built-in command.
///
/// Foreground commands are waited for and their termination stored in
/// `last_status`; a command killed by a signal is reported right away.
/// Background commands are registered in `jobs` and reported as running.
///
/// A full job table or a malformed argument aborts the command before
/// anything is spawned. Only a failed fork is fatal to the shell, see
/// [`ExecError::is_fatal`].
pub(crate) fn execute<C: ProcessControl>(
    command: &CommandLine,
    jobs: &mut JobTable<C>,
    last_status: &mut Termination,
    out: &mut dyn Write,
) -> Result<(), ExecError> {
    let background = command.is_background();
    if background && jobs.is_full() {
        return Err(JobError::Full(jobs.capacity()).into());
    }

    // Everything the child needs is allocated before forking.
    let argv = command
        .argv()
        .iter()
        .map(|arg| CString::new(arg.as_str()).map_err(|_| ExecError::NulInArgument(arg.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    out.flush()?;

    let block = StopToggleBlock::new().map_err(ExecError::SignalMask)?;
    // SAFETY: the shell is single-threaded and the child only performs
    // signal setup, open/dup2 and exec before it leaves.
    match unsafe { fork() } {
        Err(errno) => Err(ExecError::Fork(errno)),
        Ok(ForkResult::Child) => run_child(command, &argv),
        Ok(ForkResult::Parent { child }) if background => {
            jobs.add(child)?;
            block.release().map_err(ExecError::SignalMask)?;
            jobs.poll(child);
            writeln!(out, "background pid {child} is running")?;
            out.flush()?;
            Ok(())
        }
        Ok(ForkResult::Parent { child }) => {
            debug!(pid = %child, program = command.program(), "waiting for foreground job");
            let termination = wait_for(child)?;
            block.release().map_err(ExecError::SignalMask)?;
            *last_status = termination;
            if termination.is_signaled() {
                writeln!(out, "{termination}")?;
                out.flush()?;
            }
            Ok(())
        }
    }
}

/// Block until `child` terminates.
fn wait_for(child: Pid) -> Result<Termination, ExecError> {
    loop {
        match waitpid(child, None) {
            Ok(status) => {
                if let Some(termination) = Termination::from_wait_status(status) {
                    return Ok(termination);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(ExecError::Wait(child, errno)),
        }
    }
}

/// Body of the forked child. Never returns to the shell.
fn run_child(command: &CommandLine, argv: &[CString]) -> ! {
    let background = command.is_background();
    if let Err(errno) = signals::prepare_child(background) {
        eprintln!("{}: cannot set up signals: {errno}", command.program());
        exit_child(CHILD_FAILURE);
    }

    let default = background.then_some(DEV_NULL);
    if let Some(path) = command.input().or(default) {
        redirect(path, OFlag::O_RDONLY, libc::STDIN_FILENO, "input");
    }
    if let Some(path) = command.output().or(default) {
        let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
        redirect(path, flags, libc::STDOUT_FILENO, "output");
    }

    let errno = match execvp(&argv[0], argv) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    eprintln!("{}: {}", command.program(), errno.desc());
    exit_child(CHILD_FAILURE)
}

/// Open `path` and make it the child's `target` descriptor, or exit.
fn redirect(path: &str, flags: OFlag, target: RawFd, what: &str) {
    let fd = match open(path, flags, Mode::from_bits_truncate(0o644)) {
        Ok(fd) => fd,
        Err(errno) => {
            eprintln!("cannot open {path} for {what}: {}", errno.desc());
            exit_child(CHILD_FAILURE);
        }
    };
    if let Err(errno) = dup2(fd, target) {
        eprintln!("cannot redirect {what} to {path}: {}", errno.desc());
        exit_child(CHILD_FAILURE);
    }
    if fd != target {
        let _ = close(fd);
    }
}

fn exit_child(code: i32) -> ! {
    // SAFETY: leaves without running the shell's atexit handlers or
    // flushing buffers inherited from the parent.
    unsafe { libc::_exit(code) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse_line};

    fn command(line: &str) -> CommandLine {
        let options = ParseOptions {
            shell_pid: std::process::id(),
            foreground_only: false,
            max_line: 2048,
            max_args: 512,
        };
        parse_line(line, &options).unwrap().unwrap()
    }

    #[test]
    fn test_full_table_rejects_background_launch() {
        let mut jobs = JobTable::new(0);
        let mut status = Termination::Exited(5);
        let mut out = Vec::new();

        let err = execute(&command("sleep 5 &"), &mut jobs, &mut status, &mut out).unwrap_err();

        assert!(matches!(err, ExecError::Jobs(JobError::Full(0))));
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "too many background jobs (at most 0)");
        assert_eq!(jobs.len(), 0);
        assert_eq!(status, Termination::Exited(5));
        assert!(out.is_empty());
    }

    #[test]
    fn test_nul_byte_is_rejected_before_fork() {
        let mut jobs = JobTable::new(1);
        let mut status = Termination::default();
        let mut out = Vec::new();

        let err = execute(&command("echo a\0b"), &mut jobs, &mut status, &mut out).unwrap_err();

        assert!(matches!(err, ExecError::NulInArgument(ref arg) if arg == "a\0b"));
        assert!(jobs.is_empty());
    }
}
