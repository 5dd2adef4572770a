//! Bounded table of running background processes.

use crate::error::JobError;
use crate::status::Termination;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::Pid;
use std::fmt;
use tracing::{debug, warn};

/// The operations the job table needs from the operating system.
///
/// [`SystemProcesses`] is the real implementation; tests substitute their
/// own to drive the table without spawning children.
pub trait ProcessControl {
    /// Non-blocking wait. `Ok(None)` while the process is still running.
    fn try_wait(&mut self, pid: Pid) -> nix::Result<Option<Termination>>;

    /// Ask the process to terminate, without waiting for it.
    fn terminate(&mut self, pid: Pid) -> nix::Result<()>;
}

/// [`ProcessControl`] backed by `waitpid(2)` and `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

impl ProcessControl for SystemProcesses {
    fn try_wait(&mut self, pid: Pid) -> nix::Result<Option<Termination>> {
        let status = waitpid(pid, Some(WaitPidFlag::WNOHANG))?;
        Ok(Termination::from_wait_status(status))
    }

    fn terminate(&mut self, pid: Pid) -> nix::Result<()> {
        kill(pid, Signal::SIGTERM)
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    pid: Pid,
    // Set when an earlier wait already collected the process.
    finished: Option<Termination>,
}

/// A background process that has been collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    pub pid: Pid,
    pub termination: Termination,
}

impl fmt::Display for Reaped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "background pid {} is done: {}", self.pid, self.termination)
    }
}

/// Fixed-capacity registry of background pids.
///
/// Only processes launched in the background are added, and an entry is
/// removed only once its process has been seen to terminate, so a pid is
/// reported exactly once.
pub struct JobTable<C = SystemProcesses> {
    slots: Box<[Option<Slot>]>,
    control: C,
}

impl JobTable<SystemProcesses> {
    pub fn new(capacity: usize) -> Self {
        Self::with_control(capacity, SystemProcesses)
    }
}

impl<C: ProcessControl> JobTable<C> {
    pub fn with_control(capacity: usize, control: C) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            control,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// True iff every slot is occupied; a background launch must then be refused.
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.position(pid).is_some()
    }

    /// Tracked pids in slot order.
    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.slots.iter().flatten().map(|slot| slot.pid)
    }

    /// Track `pid` in the first free slot and return that slot's index.
    pub fn add(&mut self, pid: Pid) -> Result<usize, JobError> {
        if pid.as_raw() <= 0 {
            return Err(JobError::InvalidPid(pid));
        }
        if self.contains(pid) {
            return Err(JobError::Duplicate(pid));
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(JobError::Full(self.capacity()))?;
        self.slots[index] = Some(Slot {
            pid,
            finished: None,
        });
        debug!(%pid, slot = index, "tracking background job");
        Ok(index)
    }

    /// Check a single tracked process without blocking.
    ///
    /// A termination found here is kept in the table and reported by the
    /// next [`JobTable::reap`]. Returns whether the process has finished.
    pub fn poll(&mut self, pid: Pid) -> bool {
        let Some(index) = self.position(pid) else {
            return false;
        };
        let Some(slot) = self.slots[index].as_mut() else {
            return false;
        };
        if slot.finished.is_none() {
            match self.control.try_wait(pid) {
                Ok(finished) => slot.finished = finished,
                Err(errno) => debug!(%pid, %errno, "poll failed"),
            }
        }
        slot.finished.is_some()
    }

    /// Collect every finished background process, in slot order.
    ///
    /// Finished entries are removed. A pid the kernel reports as not being
    /// our child is dropped without a report.
    pub fn reap(&mut self) -> Vec<Reaped> {
        let mut reaped = Vec::new();
        for entry in self.slots.iter_mut() {
            let Some(slot) = *entry else {
                continue;
            };
            let pid = slot.pid;
            let finished = match slot.finished {
                Some(termination) => Some(termination),
                None => match self.control.try_wait(pid) {
                    Ok(finished) => finished,
                    Err(Errno::ECHILD) => {
                        warn!(%pid, "background job vanished before it was reaped");
                        *entry = None;
                        continue;
                    }
                    Err(errno) => {
                        debug!(%pid, %errno, "wait failed, retrying next cycle");
                        None
                    }
                },
            };
            if let Some(termination) = finished {
                debug!(%pid, %termination, "reaped background job");
                *entry = None;
                reaped.push(Reaped { pid, termination });
            }
        }
        reaped
    }

    /// Send SIGTERM to every tracked process without waiting.
    ///
    /// Returns how many processes were signalled. Entries stay in the table.
    pub fn terminate_all(&mut self) -> usize {
        let mut signalled = 0;
        for slot in self.slots.iter().flatten() {
            if slot.finished.is_some() {
                continue;
            }
            match self.control.terminate(slot.pid) {
                Ok(()) => signalled += 1,
                Err(errno) => debug!(pid = %slot.pid, %errno, "terminate failed"),
            }
        }
        signalled
    }

    fn position(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_some_and(|slot| slot.pid == pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::process::Command;
    use std::time::{Duration, Instant};

    /// Processes that finish when the test says so.
    #[derive(Default)]
    struct FakeProcesses {
        finished: HashMap<Pid, Termination>,
        gone: Vec<Pid>,
        waits: Vec<Pid>,
        terminated: Vec<Pid>,
    }

    impl ProcessControl for FakeProcesses {
        fn try_wait(&mut self, pid: Pid) -> nix::Result<Option<Termination>> {
            self.waits.push(pid);
            if self.gone.contains(&pid) {
                return Err(Errno::ECHILD);
            }
            Ok(self.finished.remove(&pid))
        }

        fn terminate(&mut self, pid: Pid) -> nix::Result<()> {
            self.terminated.push(pid);
            Ok(())
        }
    }

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    fn table(capacity: usize) -> JobTable<FakeProcesses> {
        JobTable::with_control(capacity, FakeProcesses::default())
    }

    #[test]
    fn test_add_fills_first_free_slot() {
        let mut jobs = table(3);
        assert!(jobs.is_empty());
        assert_eq!(jobs.add(pid(10)), Ok(0));
        assert_eq!(jobs.add(pid(11)), Ok(1));
        assert_eq!(jobs.add(pid(12)), Ok(2));
        assert!(jobs.is_full());
        assert_eq!(jobs.add(pid(13)), Err(JobError::Full(3)));
        assert_eq!(jobs.len(), 3);

        jobs.control.finished.insert(pid(11), Termination::Exited(0));
        jobs.reap();
        assert!(!jobs.is_full());
        assert_eq!(jobs.add(pid(13)), Ok(1));
        assert_eq!(jobs.pids().collect::<Vec<_>>(), [pid(10), pid(13), pid(12)]);
    }

    #[test]
    fn test_add_rejects_duplicates_and_invalid_pids() {
        let mut jobs = table(4);
        jobs.add(pid(10)).unwrap();
        assert_eq!(jobs.add(pid(10)), Err(JobError::Duplicate(pid(10))));
        assert_eq!(jobs.add(pid(0)), Err(JobError::InvalidPid(pid(0))));
        assert_eq!(jobs.add(pid(-1)), Err(JobError::InvalidPid(pid(-1))));
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_always_full() {
        let jobs = table(0);
        assert!(jobs.is_full());
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_reap_reports_in_slot_order() {
        let mut jobs = table(4);
        for raw in [20, 21, 22, 23] {
            jobs.add(pid(raw)).unwrap();
        }
        jobs.control.finished.insert(pid(23), Termination::Signaled(15));
        jobs.control.finished.insert(pid(21), Termination::Exited(3));

        let reaped = jobs.reap();
        assert_eq!(
            reaped,
            [
                Reaped {
                    pid: pid(21),
                    termination: Termination::Exited(3)
                },
                Reaped {
                    pid: pid(23),
                    termination: Termination::Signaled(15)
                },
            ]
        );
        assert_eq!(
            reaped[0].to_string(),
            "background pid 21 is done: exit value 3"
        );
        assert_eq!(
            reaped[1].to_string(),
            "background pid 23 is done: terminated by signal 15"
        );
        assert_eq!(jobs.pids().collect::<Vec<_>>(), [pid(20), pid(22)]);
    }

    #[test]
    fn test_reap_is_idempotent() {
        let mut jobs = table(2);
        jobs.add(pid(30)).unwrap();
        jobs.control.finished.insert(pid(30), Termination::Exited(0));

        assert_eq!(jobs.reap().len(), 1);
        let waits = jobs.control.waits.len();
        assert!(jobs.reap().is_empty());
        assert_eq!(jobs.control.waits.len(), waits, "reaped pid waited on again");
        assert!(!jobs.contains(pid(30)));
    }

    #[test]
    fn test_poll_keeps_early_termination_for_reap() {
        let mut jobs = table(2);
        jobs.add(pid(40)).unwrap();
        assert!(!jobs.poll(pid(40)));

        jobs.control.finished.insert(pid(40), Termination::Exited(1));
        assert!(jobs.poll(pid(40)));
        assert!(jobs.contains(pid(40)));
        assert!(!jobs.poll(pid(41)));

        let reaped = jobs.reap();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].termination, Termination::Exited(1));
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_vanished_pid_is_dropped_silently() {
        let mut jobs = table(2);
        jobs.add(pid(50)).unwrap();
        jobs.control.gone.push(pid(50));
        assert!(jobs.reap().is_empty());
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_terminate_all_signals_running_jobs() {
        let mut jobs = table(3);
        jobs.add(pid(60)).unwrap();
        jobs.add(pid(61)).unwrap();
        assert_eq!(jobs.terminate_all(), 2);
        assert_eq!(jobs.control.terminated, [pid(60), pid(61)]);
        assert_eq!(jobs.len(), 2);
    }

    fn reap_until_done(jobs: &mut JobTable, child: Pid) -> Reaped {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(done) = jobs.reap().into_iter().find(|r| r.pid == child) {
                return done;
            }
            assert!(Instant::now() < deadline, "child {child} never finished");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_reaps_real_children() {
        let mut jobs = JobTable::new(4);
        let exiting = Command::new("sh").args(["-c", "exit 4"]).spawn().unwrap();
        let exiting = Pid::from_raw(exiting.id() as i32);
        jobs.add(exiting).unwrap();

        let done = reap_until_done(&mut jobs, exiting);
        assert_eq!(done.termination, Termination::Exited(4));
        assert!(!jobs.contains(exiting));
    }

    #[test]
    fn test_terminate_all_kills_real_children() {
        let mut jobs = JobTable::new(4);
        let sleeper = Command::new("sleep").arg("30").spawn().unwrap();
        let sleeper = Pid::from_raw(sleeper.id() as i32);
        jobs.add(sleeper).unwrap();
        assert!(jobs.reap().is_empty());

        assert_eq!(jobs.terminate_all(), 1);
        let done = reap_until_done(&mut jobs, sleeper);
        assert_eq!(done.termination, Termination::Signaled(Signal::SIGTERM as i32));
    }
}
