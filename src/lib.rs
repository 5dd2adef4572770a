//! A small interactive shell with background jobs.
//!
//! The shell reads one line at a time, runs the built-ins `exit`, `cd` and
//! `status` in-process and launches everything else as a child process,
//! either waiting for it (foreground) or tracking it in a bounded job table
//! (background, requested with a trailing ` &`). Input and output of a child
//! can be redirected with `<` and `>`, and `$$` expands to the shell's pid.
//!
//! SIGTSTP toggles a foreground-only mode in which the ` &` suffix is
//! ignored; SIGINT never reaches the shell itself, only its foreground child.
//!
//! The main entry point is [`Interpreter`], fed by a [`LineSource`].

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod external;
mod interpreter;
pub mod io_adapters;
pub mod jobs;
pub mod parser;
pub mod signals;
pub mod status;

/// Just a convenient re-export of the interactive shell loop.
pub use interpreter::Interpreter;
pub use io_adapters::LineSource;
