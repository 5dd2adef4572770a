use nix::errno::Errno;
use nix::unistd::Pid;
use rustyline::error::ReadlineError;
use std::io;
use thiserror::Error;

/// Errors produced while turning an input line into a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("input line longer than {0} bytes")]
    LineTooLong(usize),
    #[error("too many arguments (at most {0})")]
    TooManyArguments(usize),
    #[error("expected a file name after `{0}`")]
    MissingRedirectTarget(char),
}

/// Errors from the background job table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("too many background jobs (at most {0})")]
    Full(usize),
    #[error("process {0} is already tracked")]
    Duplicate(Pid),
    #[error("{0} is not a valid child pid")]
    InvalidPid(Pid),
}

/// Errors from launching an external command.
///
/// Only [`ExecError::Fork`] is fatal to the shell; everything else aborts the
/// current command and the loop goes on.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Jobs(#[from] JobError),
    #[error("argument contains a NUL byte: {0:?}")]
    NulInArgument(String),
    #[error("cannot fork: {0}")]
    Fork(Errno),
    #[error("cannot wait for process {0}: {1}")]
    Wait(Pid, Errno),
    #[error("cannot change signal mask: {0}")]
    SignalMask(Errno),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ExecError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecError::Fork(_))
    }
}

/// Errors that end the shell loop.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Exec(ExecError),
    #[error("cannot read input: {0}")]
    Input(#[from] ReadlineError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
