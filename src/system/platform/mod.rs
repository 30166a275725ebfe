use std::path::Path;

/// Fields of `/proc/<pid>/stat` the process table needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PidStat {
    pub state: char,
    pub ppid: u32,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub priority: i32,
    pub nice: i32,
    pub num_threads: u32,
}

pub trait PlatformExtensions {
    /// `None` when the process is gone (or never existed).
    fn process_stat(proc_root: &Path, pid: u32) -> Option<PidStat>;
    /// Real uid of the process owner.
    fn process_uid(proc_root: &Path, pid: u32) -> Option<u32>;
    fn clock_ticks_per_sec() -> u64;
    fn set_affinity(pid: i32, cores: &[usize]) -> nix::Result<()>;
    fn affinity(pid: i32) -> nix::Result<Vec<usize>>;
    fn set_nice(pid: i32, nice: i32) -> nix::Result<()>;
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod unsupported;

#[cfg(target_os = "linux")]
use linux as platform_impl;
#[cfg(not(target_os = "linux"))]
use unsupported as platform_impl;

pub fn process_stat(proc_root: &Path, pid: u32) -> Option<PidStat> {
    platform_impl::Platform::process_stat(proc_root, pid)
}

pub fn process_uid(proc_root: &Path, pid: u32) -> Option<u32> {
    platform_impl::Platform::process_uid(proc_root, pid)
}

pub fn clock_ticks_per_sec() -> u64 {
    platform_impl::Platform::clock_ticks_per_sec()
}

pub fn set_affinity(pid: i32, cores: &[usize]) -> nix::Result<()> {
    platform_impl::Platform::set_affinity(pid, cores)
}

pub fn affinity(pid: i32) -> nix::Result<Vec<usize>> {
    platform_impl::Platform::affinity(pid)
}

pub fn set_nice(pid: i32, nice: i32) -> nix::Result<()> {
    platform_impl::Platform::set_nice(pid, nice)
}
