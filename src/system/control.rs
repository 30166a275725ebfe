//! Privileged process-control actions: signals, CPU affinity and niceness.
//!
//! Requests are validated before any syscall. Anything that reaches the OS,
//! successful or not, invalidates the snapshot cache.

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::cache::Invalidator;
use crate::error::ControlError;

use super::platform;

pub const MIN_NICE: i32 = -20;
pub const MAX_NICE: i32 = 19;

/// One control request, applied to any number of pids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlAction {
    Signal(i32),
    Affinity(Vec<usize>),
    Priority(i32),
}

/// Result of applying a [`ControlAction`] to one pid.
#[derive(Debug)]
pub struct ControlOutcome {
    pub pid: u32,
    pub result: Result<(), ControlError>,
}

#[derive(Clone, Debug)]
pub struct ProcessControl {
    core_count: usize,
    invalidator: Invalidator,
}

impl ProcessControl {
    pub fn new(core_count: usize, invalidator: Invalidator) -> Self {
        ProcessControl {
            core_count,
            invalidator,
        }
    }

    pub fn core_count(&self) -> usize {
        self.core_count
    }

    /// Delivery is asynchronous: success means the kernel accepted the signal.
    pub fn send_signal(&self, pid: u32, signal_number: i32) -> Result<(), ControlError> {
        let target = target_pid(pid)?;
        let signal = parse_signal(signal_number)?;

        let result = signal::kill(target, signal);
        self.invalidator.invalidate();
        result.map_err(|e| map_errno("kill", pid, e))?;

        tracing::info!(pid, signal = %signal, "signal delivered");
        Ok(())
    }

    /// On success the affinity mask is exactly `core_ids`.
    pub fn bind_affinity(&self, pid: u32, core_ids: &[usize]) -> Result<(), ControlError> {
        if core_ids.is_empty() {
            return Err(ControlError::InvalidRequest("empty core set".into()));
        }
        if let Some(&core) = core_ids.iter().find(|&&c| c >= self.core_count) {
            return Err(ControlError::InvalidCore {
                core,
                core_count: self.core_count,
            });
        }
        let target = target_pid(pid)?;

        let result = platform::set_affinity(target.as_raw(), core_ids);
        self.invalidator.invalidate();
        result.map_err(|e| match e {
            // every requested core is offline or outside the cpuset
            Errno::EINVAL => {
                ControlError::InvalidRequest(format!("no usable core in {core_ids:?}"))
            }
            other => map_errno("sched_setaffinity", pid, other),
        })?;

        tracing::info!(pid, cores = ?core_ids, "affinity updated");
        Ok(())
    }

    pub fn set_priority(&self, pid: u32, nice: i32) -> Result<(), ControlError> {
        if !(MIN_NICE..=MAX_NICE).contains(&nice) {
            return Err(ControlError::InvalidRequest(format!(
                "nice value {nice} outside {MIN_NICE}..={MAX_NICE}"
            )));
        }
        let target = target_pid(pid)?;

        let result = platform::set_nice(target.as_raw(), nice);
        self.invalidator.invalidate();
        result.map_err(|e| map_errno("setpriority", pid, e))?;

        tracing::info!(pid, nice, "priority updated");
        Ok(())
    }

    pub fn apply(&self, pid: u32, action: &ControlAction) -> Result<(), ControlError> {
        match action {
            ControlAction::Signal(number) => self.send_signal(pid, *number),
            ControlAction::Affinity(cores) => self.bind_affinity(pid, cores),
            ControlAction::Priority(nice) => self.set_priority(pid, *nice),
        }
    }

    /// Applies `action` to every pid in order. A failure for one pid does not
    /// stop the rest.
    pub fn apply_all(&self, pids: &[u32], action: &ControlAction) -> Vec<ControlOutcome> {
        pids.iter()
            .map(|&pid| ControlOutcome {
                pid,
                result: self.apply(pid, action),
            })
            .collect()
    }

    /// Current affinity mask. Read-only, so the cache is left alone.
    pub fn affinity(&self, pid: u32) -> Result<Vec<usize>, ControlError> {
        let target = target_pid(pid)?;
        platform::affinity(target.as_raw()).map_err(|e| map_errno("sched_getaffinity", pid, e))
    }
}

/// Pid 0 would address the caller's process group; pids past `i32::MAX`
/// cannot name a process.
fn target_pid(pid: u32) -> Result<Pid, ControlError> {
    if pid == 0 {
        return Err(ControlError::InvalidRequest(
            "pid 0 addresses a process group".into(),
        ));
    }
    let raw = i32::try_from(pid).map_err(|_| ControlError::NotFound(pid))?;
    Ok(Pid::from_raw(raw))
}

/// Standard signals only; realtime signals are rejected.
fn parse_signal(number: i32) -> Result<Signal, ControlError> {
    if !(1..=31).contains(&number) {
        return Err(ControlError::InvalidSignal(number));
    }
    Signal::try_from(number).map_err(|_| ControlError::InvalidSignal(number))
}

fn map_errno(op: &'static str, pid: u32, errno: Errno) -> ControlError {
    match errno {
        Errno::ESRCH => ControlError::NotFound(pid),
        Errno::EPERM | Errno::EACCES => ControlError::PermissionDenied(pid),
        source => ControlError::Os { op, pid, source },
    }
}
