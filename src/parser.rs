//! Turns one raw input line into a [`CommandLine`].
//!
//! Grammar: `command [arg ...] [< input] [> output] [&]`, where the two
//! redirections may come in either order and anywhere after the command
//! name. Tokens are separated by whitespace; there is no quoting.

use crate::command::CommandLine;
use crate::error::ParseError;

/// Character that starts a comment line.
const COMMENT: char = '#';
/// Suffix that requests background execution.
const BACKGROUND_SUFFIX: &str = " &";
/// Sequence replaced with the shell's process id.
const PID_VARIABLE: &str = "$$";

/// Everything the parser needs to know about the shell besides the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Value substituted for `$$`.
    pub shell_pid: u32,
    /// When set, a trailing ` &` is stripped but ignored.
    pub foreground_only: bool,
    pub max_line: usize,
    pub max_args: usize,
}

struct TokenStream<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> TokenStream<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            tokens: line.split_whitespace().collect(),
            pos: 0,
        }
    }

    fn consume(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Next token as the target of the redirection operator `op`.
    fn redirect_target(&mut self, op: char) -> Result<String, ParseError> {
        self.consume()
            .map(str::to_owned)
            .ok_or(ParseError::MissingRedirectTarget(op))
    }
}

/// Parse one line of input.
///
/// Returns `Ok(None)` for lines that hold no command: empty lines,
/// whitespace-only lines and comments (first character `#`). A trailing
/// newline is ignored.
pub fn parse_line(line: &str, options: &ParseOptions) -> Result<Option<CommandLine>, ParseError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.len() > options.max_line {
        return Err(ParseError::LineTooLong(options.max_line));
    }
    if line.starts_with(COMMENT) {
        return Ok(None);
    }

    let (line, background) = match line.strip_suffix(BACKGROUND_SUFFIX) {
        Some(rest) => (rest, !options.foreground_only),
        None => (line, false),
    };

    let pid = options.shell_pid.to_string();
    let mut tokens = TokenStream::new(line);
    let Some(program) = tokens.consume() else {
        return Ok(None);
    };

    let mut argv = vec![expand_pid(program, &pid)];
    let mut input = None;
    let mut output = None;
    while let Some(token) = tokens.consume() {
        match token {
            "<" => input = Some(tokens.redirect_target('<')?),
            ">" => output = Some(tokens.redirect_target('>')?),
            word => {
                if argv.len() > options.max_args {
                    return Err(ParseError::TooManyArguments(options.max_args));
                }
                argv.push(expand_pid(word, &pid));
            }
        }
    }

    Ok(Some(CommandLine {
        argv,
        input,
        output,
        background,
    }))
}

/// Replace every `$$` in `word` with `pid`, left to right.
pub fn expand_pid(word: &str, pid: &str) -> String {
    word.replace(PID_VARIABLE, pid)
}
