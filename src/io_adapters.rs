use crate::error::ShellError;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{BufRead, IsTerminal, Write};
use tracing::debug;

/// Where the shell loop gets its lines from.
pub trait LineSource {
    /// Show `prompt` and read one line.
    ///
    /// Returns `Ok(None)` once input is exhausted. The returned line carries
    /// no trailing newline.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError>;
}

/// Line editor for interactive terminals. History is not kept.
pub struct EditorInput {
    editor: DefaultEditor,
}

impl EditorInput {
    pub fn new() -> Result<Self, ShellError> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for EditorInput {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            // The shell ignores interrupts; Ctrl-C just abandons the line.
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Prompt-and-read over any buffered reader, for piped input and tests.
pub struct PlainInput<R, W> {
    reader: R,
    prompt_out: W,
}

impl<R: BufRead, W: Write> PlainInput<R, W> {
    pub fn new(reader: R, prompt_out: W) -> Self {
        Self { reader, prompt_out }
    }
}

impl<R: BufRead, W: Write> LineSource for PlainInput<R, W> {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError> {
        self.prompt_out.write_all(prompt.as_bytes())?;
        self.prompt_out.flush()?;

        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        match String::from_utf8(buf) {
            Ok(line) => Ok(Some(line)),
            Err(err) => {
                // The line is dropped, the session goes on.
                debug!(%err, "skipping undecodable line");
                eprintln!("smallsh: input is not valid UTF-8");
                Ok(Some(String::new()))
            }
        }
    }
}

/// Pick the input for the process's stdin: the line editor on a terminal
/// (unless disabled), plain buffered reads otherwise.
pub fn stdin_source(use_editor: bool) -> Box<dyn LineSource> {
    if use_editor && std::io::stdin().is_terminal() {
        match EditorInput::new() {
            Ok(editor) => return Box::new(editor),
            Err(err) => debug!(%err, "line editor unavailable, using plain input"),
        }
    }
    Box::new(PlainInput::new(std::io::stdin().lock(), std::io::stdout()))
}
