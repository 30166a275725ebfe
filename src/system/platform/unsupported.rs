use std::path::Path;

use nix::errno::Errno;

use super::{PidStat, PlatformExtensions};

/// Hosts without procfs or Linux scheduler calls: every read vanishes and
/// every control call reports `ENOSYS`.
pub struct Platform;

impl PlatformExtensions for Platform {
    fn process_stat(_proc_root: &Path, _pid: u32) -> Option<PidStat> {
        None
    }

    fn process_uid(_proc_root: &Path, _pid: u32) -> Option<u32> {
        None
    }

    fn clock_ticks_per_sec() -> u64 {
        100
    }

    fn set_affinity(_pid: i32, _cores: &[usize]) -> nix::Result<()> {
        Err(Errno::ENOSYS)
    }

    fn affinity(_pid: i32) -> nix::Result<Vec<usize>> {
        Err(Errno::ENOSYS)
    }

    fn set_nice(_pid: i32, _nice: i32) -> nix::Result<()> {
        Err(Errno::ENOSYS)
    }
}
