use std::path::Path;

use nix::errno::Errno;
use nix::sched::{CpuSet, sched_getaffinity, sched_setaffinity};
use nix::unistd::Pid;

use super::{PidStat, PlatformExtensions};

const DEFAULT_CLK_TCK: u64 = 100;

pub struct Platform;

impl PlatformExtensions for Platform {
    fn process_stat(proc_root: &Path, pid: u32) -> Option<PidStat> {
        let contents = std::fs::read_to_string(proc_root.join(pid.to_string()).join("stat")).ok()?;
        parse_stat(&contents)
    }

    fn process_uid(proc_root: &Path, pid: u32) -> Option<u32> {
        let contents =
            std::fs::read_to_string(proc_root.join(pid.to_string()).join("status")).ok()?;
        parse_status_uid(&contents)
    }

    fn clock_ticks_per_sec() -> u64 {
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if ticks > 0 { ticks as u64 } else { DEFAULT_CLK_TCK }
    }

    fn set_affinity(pid: i32, cores: &[usize]) -> nix::Result<()> {
        let mut set = CpuSet::new();
        for &core in cores {
            set.set(core)?;
        }
        sched_setaffinity(Pid::from_raw(pid), &set)
    }

    fn affinity(pid: i32) -> nix::Result<Vec<usize>> {
        let set = sched_getaffinity(Pid::from_raw(pid))?;
        let mut cores = Vec::new();
        for core in 0..CpuSet::count() {
            if set.is_set(core)? {
                cores.push(core);
            }
        }
        Ok(cores)
    }

    fn set_nice(pid: i32, nice: i32) -> nix::Result<()> {
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, nice) };
        if rc == -1 { Err(Errno::last()) } else { Ok(()) }
    }
}

/// Parses `/proc/<pid>/stat`. The comm field may contain spaces and parens,
/// so fields are counted from the last `)`.
pub(crate) fn parse_stat(contents: &str) -> Option<PidStat> {
    let after_comm = contents.rfind(')')? + 1;
    let fields: Vec<&str> = contents[after_comm..].split_whitespace().collect();
    // state(0) ppid(1) pgrp(2) session(3) tty_nr(4) tpgid(5) flags(6)
    // minflt(7) cminflt(8) majflt(9) cmajflt(10) utime(11) stime(12)
    // cutime(13) cstime(14) priority(15) nice(16) num_threads(17)
    Some(PidStat {
        state: fields.first()?.chars().next()?,
        ppid: fields.get(1)?.parse().ok()?,
        utime_ticks: fields.get(11)?.parse().ok()?,
        stime_ticks: fields.get(12)?.parse().ok()?,
        priority: fields.get(15)?.parse().ok()?,
        nice: fields.get(16)?.parse().ok()?,
        num_threads: fields.get(17)?.parse().ok()?,
    })
}

/// Real uid from the `Uid:` line of `/proc/<pid>/status`.
pub(crate) fn parse_status_uid(contents: &str) -> Option<u32> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}
