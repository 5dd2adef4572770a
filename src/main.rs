use anyhow::Context;
use argh::FromArgs;
use smallsh::Interpreter;
use smallsh::config::{Config, DEFAULT_MAX_ARGS, DEFAULT_MAX_JOBS, DEFAULT_MAX_LINE};
use smallsh::{io_adapters, signals};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `SMALLSH_LOG=debug`.
const LOG_ENV: &str = "SMALLSH_LOG";

#[derive(FromArgs)]
/// A small interactive shell with background jobs.
struct Args {
    #[argh(option, default = "DEFAULT_MAX_JOBS")]
    /// how many background jobs may run at once
    max_jobs: usize,

    #[argh(option, default = "DEFAULT_MAX_LINE")]
    /// longest accepted input line, in bytes
    max_line: usize,

    #[argh(option, default = "DEFAULT_MAX_ARGS")]
    /// most arguments a command may have
    max_args: usize,

    #[argh(switch)]
    /// read plain lines even when stdin is a terminal
    no_editor: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            max_jobs: args.max_jobs,
            max_line: args.max_line,
            max_args: args.max_args,
            use_editor: !args.no_editor,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: Config) -> anyhow::Result<()> {
    signals::install_shell_handlers().context("cannot install signal handlers")?;

    let mut input = io_adapters::stdin_source(config.use_editor);
    let mut shell = Interpreter::new(config);
    let result = shell.repl(input.as_mut(), &mut std::io::stdout());
    shell.shutdown();
    Ok(result?)
}

fn main() {
    let args: Args = argh::from_env();
    init_logging();
    if let Err(err) = run(args.into()) {
        eprintln!("smallsh: {err:#}");
        std::process::exit(1);
    }
}
