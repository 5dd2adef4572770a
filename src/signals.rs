//! Signal dispositions of the shell and its children.
//!
//! The shell ignores SIGINT and uses SIGTSTP to toggle foreground-only mode.
//! The toggle is a pair of handlers that swap each other in on every
//! delivery, so successive signals alternate between entering and leaving
//! the mode. Handlers only touch an atomic flag, `sigaction` and a raw
//! `write(2)`, all of which are async-signal-safe.

use nix::libc;
use nix::sys::signal::{
    SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, sigaction, sigprocmask,
};
use nix::unistd;
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Printed when SIGTSTP turns foreground-only mode on.
pub const ENTER_FOREGROUND_ONLY: &str = "Entering foreground-only mode (& is now ignored)\n";
/// Printed when SIGTSTP turns foreground-only mode off.
pub const EXIT_FOREGROUND_ONLY: &str = "Exiting foreground-only mode\n";

/// Exit status of a foreground child interrupted before it could exec.
pub const INTERRUPTED_EXIT_CODE: i32 = 2;

static FOREGROUND_ONLY: AtomicBool = AtomicBool::new(false);

/// Whether a trailing ` &` is currently ignored.
pub fn foreground_only() -> bool {
    FOREGROUND_ONLY.load(Ordering::SeqCst)
}

/// Install the dispositions of the shell process itself: SIGINT ignored,
/// SIGTSTP entering foreground-only mode.
///
/// Must run before the first prompt.
pub fn install_shell_handlers() -> nix::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: ignoring a signal has no handler code to run.
    unsafe { sigaction(Signal::SIGINT, &ignore)? };
    arm_stop_toggle(enter_foreground_only)?;
    debug!("installed shell signal handlers");
    Ok(())
}

/// Set up signal state in a freshly forked child, before redirection and
/// exec.
///
/// SIGTSTP is ignored and unblocked so the shell's mask does not leak into
/// the program. Foreground children additionally die with
/// [`INTERRUPTED_EXIT_CODE`] on SIGINT until exec replaces the handler with
/// the default action. Background children keep SIGINT ignored.
pub(crate) fn prepare_child(background: bool) -> nix::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: ignoring a signal has no handler code to run.
    unsafe { sigaction(Signal::SIGTSTP, &ignore)? };
    // The runtime ignores SIGPIPE in the shell; programs get the default back.
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: restoring the default disposition installs no handler.
    unsafe { sigaction(Signal::SIGPIPE, &default)? };
    sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&stop_toggle_set()), None)?;

    if !background {
        let interrupt = SigAction::new(
            SigHandler::Handler(exit_on_interrupt),
            SaFlags::empty(),
            SigSet::all(),
        );
        // SAFETY: the handler only calls `_exit`.
        unsafe { sigaction(Signal::SIGINT, &interrupt)? };
    }
    Ok(())
}

/// SIGTSTP held back while a child is forked and accounted for.
///
/// A toggle delivered meanwhile stays pending and runs on release. Dropping
/// the guard without [`StopToggleBlock::release`] unblocks as well.
#[derive(Debug)]
pub struct StopToggleBlock {
    released: bool,
}

impl StopToggleBlock {
    pub fn new() -> nix::Result<Self> {
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&stop_toggle_set()), None)?;
        Ok(Self { released: false })
    }

    pub fn release(mut self) -> nix::Result<()> {
        self.released = true;
        sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&stop_toggle_set()), None)
    }
}

impl Drop for StopToggleBlock {
    fn drop(&mut self) {
        if !self.released {
            let _ = sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&stop_toggle_set()), None);
        }
    }
}

fn stop_toggle_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGTSTP);
    set
}

/// Make `handler` the SIGTSTP disposition. Safe to call from a handler.
fn arm_stop_toggle(handler: extern "C" fn(libc::c_int)) -> nix::Result<SigAction> {
    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::SA_RESTART,
        SigSet::all(),
    );
    // SAFETY: both toggle handlers are async-signal-safe.
    unsafe { sigaction(Signal::SIGTSTP, &action) }
}

/// Unbuffered write to stdout for use inside signal handlers.
fn write_raw(message: &str) {
    // SAFETY: fd 1 stays open for the life of the process.
    let stdout = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };
    let _ = unistd::write(stdout, message.as_bytes());
}

extern "C" fn enter_foreground_only(_: libc::c_int) {
    FOREGROUND_ONLY.store(true, Ordering::SeqCst);
    let _ = arm_stop_toggle(exit_foreground_only);
    write_raw(ENTER_FOREGROUND_ONLY);
}

extern "C" fn exit_foreground_only(_: libc::c_int) {
    FOREGROUND_ONLY.store(false, Ordering::SeqCst);
    let _ = arm_stop_toggle(enter_foreground_only);
    write_raw(EXIT_FOREGROUND_ONLY);
}

extern "C" fn exit_on_interrupt(_: libc::c_int) {
    // SAFETY: `_exit` is async-signal-safe and skips atexit handlers.
    unsafe { libc::_exit(INTERRUPTED_EXIT_CODE) }
}
