use crate::command::{CommandFactory, CommandLine};
use crate::config::{Config, PROMPT};
use crate::env::Environment;
use crate::error::{ExecError, ShellError};
use crate::external;
use crate::io_adapters::LineSource;
use crate::jobs::{JobTable, ProcessControl, SystemProcesses};
use crate::parser::{self, ParseOptions};
use crate::signals;
use std::io::Write;
use tracing::debug;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only support commands defined in this crate, i.e. the built-ins.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The shell loop: reap, prompt, read, dispatch.
///
/// The interpreter owns the session [`Environment`], the background
/// [`JobTable`] and the built-in factories. Anything that is not a built-in
/// is launched as an external program.
///
/// Example
/// ```no_run
/// use smallsh::Interpreter;
/// use smallsh::config::Config;
/// use smallsh::io_adapters::PlainInput;
///
/// let mut sh = Interpreter::new(Config::default());
/// let mut input = PlainInput::new("status\n".as_bytes(), std::io::sink());
/// sh.repl(&mut input, &mut std::io::stdout()).unwrap();
/// ```
pub struct Interpreter<C = SystemProcesses> {
    env: Environment,
    jobs: JobTable<C>,
    commands: Vec<Box<dyn CommandFactory>>,
    config: Config,
}

impl Interpreter<SystemProcesses> {
    /// Create an interpreter with the default built-ins: `exit`, `cd` and `status`.
    pub fn new(config: Config) -> Self {
        Self::with_jobs(config.clone(), JobTable::new(config.max_jobs))
    }
}

impl<C: ProcessControl> Interpreter<C> {
    pub fn with_jobs(config: Config, jobs: JobTable<C>) -> Self {
        use crate::builtin::*;
        Self {
            env: Environment::new(),
            jobs,
            commands: vec![
                Box::new(Factory::<Exit>::default()),
                Box::new(Factory::<Cd>::default()),
                Box::new(Factory::<Status>::default()),
            ],
            config,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn jobs(&self) -> &JobTable<C> {
        &self.jobs
    }

    /// Run cycles until `exit` or end of input.
    ///
    /// Returns an error only when the shell cannot go on (fork failure or a
    /// broken input/output stream). Background jobs are left running; call
    /// [`Interpreter::shutdown`] afterwards.
    pub fn repl(&mut self, input: &mut dyn LineSource, out: &mut dyn Write) -> Result<(), ShellError> {
        while !self.env.should_exit {
            self.report_finished_jobs(out)?;
            let Some(line) = input.read_line(PROMPT)? else {
                debug!("end of input");
                break;
            };
            self.execute_line(&line, out)?;
        }
        Ok(())
    }

    /// Print a line for every background job that has finished.
    pub fn report_finished_jobs(&mut self, out: &mut dyn Write) -> Result<(), ShellError> {
        for reaped in self.jobs.reap() {
            writeln!(out, "{reaped}")?;
            out.flush()?;
        }
        Ok(())
    }

    /// Parse and run one input line.
    ///
    /// User errors are reported on stderr and swallowed.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<(), ShellError> {
        let options = ParseOptions {
            shell_pid: self.env.pid(),
            foreground_only: signals::foreground_only(),
            max_line: self.config.max_line,
            max_args: self.config.max_args,
        };
        match parser::parse_line(line, &options) {
            Ok(Some(command)) => self.execute(&command, out),
            Ok(None) => Ok(()),
            Err(err) => {
                eprintln!("smallsh: {err}");
                Ok(())
            }
        }
    }

    fn execute(&mut self, command: &CommandLine, out: &mut dyn Write) -> Result<(), ShellError> {
        let args: Vec<&str> = command.args().iter().map(String::as_str).collect();
        let builtin = self
            .commands
            .iter()
            .find_map(|factory| factory.try_create(command.program(), &args));
        if let Some(builtin) = builtin {
            if let Err(err) = builtin.execute(out, &mut self.env) {
                eprintln!("{err:#}");
            }
            return Ok(());
        }

        match external::execute(command, &mut self.jobs, &mut self.env.last_status, out) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(ShellError::Exec(err)),
            Err(ExecError::Io(err)) => Err(err.into()),
            Err(err) => {
                eprintln!("smallsh: {err}");
                Ok(())
            }
        }
    }

    /// Ask every background job still running to terminate.
    ///
    /// Returns how many were signalled.
    pub fn shutdown(&mut self) -> usize {
        let signalled = self.jobs.terminate_all();
        debug!(signalled, "terminated background jobs");
        signalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::io_adapters::PlainInput;
    use crate::status::Termination;
    use nix::unistd::Pid;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Background processes that finish on demand, shared with the test.
    #[derive(Clone, Default)]
    struct Scripted {
        finished: Rc<RefCell<Vec<(Pid, Termination)>>>,
        terminated: Rc<RefCell<Vec<Pid>>>,
    }

    impl ProcessControl for Scripted {
        fn try_wait(&mut self, pid: Pid) -> nix::Result<Option<Termination>> {
            let mut finished = self.finished.borrow_mut();
            Ok(finished
                .iter()
                .position(|(p, _)| *p == pid)
                .map(|i| finished.remove(i).1))
        }

        fn terminate(&mut self, pid: Pid) -> nix::Result<()> {
            self.terminated.borrow_mut().push(pid);
            Ok(())
        }
    }

    fn run(sh: &mut Interpreter<Scripted>, script: &str) -> String {
        let mut input = PlainInput::new(script.as_bytes(), std::io::sink());
        let mut out = Vec::new();
        sh.repl(&mut input, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn shell(capacity: usize) -> (Interpreter<Scripted>, Scripted) {
        let processes = Scripted::default();
        let jobs = JobTable::with_control(capacity, processes.clone());
        (Interpreter::with_jobs(Config::default(), jobs), processes)
    }

    #[test]
    fn test_status_starts_at_exit_value_zero() {
        let (mut sh, _) = shell(4);
        assert_eq!(run(&mut sh, "status\n"), "exit value 0\n");
    }

    #[test]
    fn test_comments_and_blank_lines_do_nothing() {
        let (mut sh, _) = shell(4);
        assert_eq!(run(&mut sh, "# status\n\n   \nstatus\n"), "exit value 0\n");
    }

    #[test]
    fn test_exit_stops_before_remaining_lines() {
        let (mut sh, _) = shell(4);
        assert_eq!(run(&mut sh, "exit\nstatus\n"), "");
        assert!(sh.env().should_exit);
    }

    #[test]
    fn test_builtins_ignore_background_flag() {
        let (mut sh, _) = shell(0);
        assert_eq!(run(&mut sh, "status &\n"), "exit value 0\n");
        assert!(sh.jobs().is_empty());
    }

    #[test]
    fn test_finished_jobs_reported_at_cycle_start() {
        let (mut sh, processes) = shell(4);
        let (a, b) = (Pid::from_raw(101), Pid::from_raw(102));
        sh.jobs.add(a).unwrap();
        sh.jobs.add(b).unwrap();
        processes.finished.borrow_mut().push((b, Termination::Signaled(15)));
        processes.finished.borrow_mut().push((a, Termination::Exited(0)));

        let out = run(&mut sh, "status\n");
        assert_eq!(
            out,
            "background pid 101 is done: exit value 0\n\
             background pid 102 is done: terminated by signal 15\n\
             exit value 0\n"
        );
        assert!(sh.jobs().is_empty());
    }

    #[test]
    fn test_shutdown_terminates_remaining_jobs() {
        let (mut sh, processes) = shell(4);
        sh.jobs.add(Pid::from_raw(201)).unwrap();
        run(&mut sh, "exit\n");
        assert_eq!(sh.shutdown(), 1);
        assert_eq!(*processes.terminated.borrow(), [Pid::from_raw(201)]);
    }

    #[test]
    fn test_full_table_keeps_shell_running() {
        let (mut sh, _) = shell(1);
        sh.jobs.add(Pid::from_raw(301)).unwrap();
        let mut out = Vec::new();
        let command = parser::parse_line(
            "sleep 1 &",
            &ParseOptions {
                shell_pid: 1,
                foreground_only: false,
                max_line: 2048,
                max_args: 512,
            },
        )
        .unwrap()
        .unwrap();
        let err = external::execute(&command, &mut sh.jobs, &mut sh.env.last_status, &mut out)
            .unwrap_err();
        assert!(matches!(err, ExecError::Jobs(JobError::Full(1))));
        assert_eq!(sh.jobs().len(), 1);
        assert!(out.is_empty());
    }
}
