use crate::env::Environment;
use anyhow::Result;
use std::io::Write;

/// One parsed input line.
///
/// Built by [`crate::parser::parse_line`] and never modified afterwards. The
/// argument vector always starts with the program name, as `execvp` expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub(crate) argv: Vec<String>,
    pub(crate) input: Option<String>,
    pub(crate) output: Option<String>,
    pub(crate) background: bool,
}

impl CommandLine {
    /// Name of the program (or built-in) to run.
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Full argument vector, program name first.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Arguments after the program name.
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// File to read standard input from, if redirected with `<`.
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    /// File to write standard output to, if redirected with `>`.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn is_background(&self) -> bool {
        self.background
    }
}

/// Object-safe trait for a built-in that has already parsed its arguments.
pub trait ExecutableCommand {
    /// Runs the command inside the shell process.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<()>;
}

/// Factory that tries to create a built-in from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`, in which
/// case the command is launched as an external program.
pub trait CommandFactory {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
