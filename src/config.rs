//! Runtime limits of the shell.

/// Default capacity of the background job table.
pub const DEFAULT_MAX_JOBS: usize = 100;
/// Default longest accepted input line, in bytes.
pub const DEFAULT_MAX_LINE: usize = 2048;
/// Default largest number of arguments after the program name.
pub const DEFAULT_MAX_ARGS: usize = 512;

/// Prompt printed before every read.
pub const PROMPT: &str = ": ";

/// Limits and switches the interpreter runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How many background jobs may be tracked at once.
    pub max_jobs: usize,
    /// Lines longer than this are rejected.
    pub max_line: usize,
    /// Commands with more arguments than this are rejected.
    pub max_args: usize,
    /// Use the interactive line editor when stdin is a terminal.
    pub use_editor: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
            max_line: DEFAULT_MAX_LINE,
            max_args: DEFAULT_MAX_ARGS,
            use_editor: true,
        }
    }
}
