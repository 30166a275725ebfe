//! Raw counter sampling from procfs.
//!
//! A [`Sampler`] returns instantaneous, uninterpreted counters. Everything
//! rate-based (CPU usage, disk and network throughput) is derived later from
//! two samples by the aggregator.

use std::path::PathBuf;

use crate::error::SamplerError;

use super::io::{DiskCounters, NetCounters, parse_diskstats, parse_net_dev};

/// Cumulative tick counters for one CPU line of `/proc/stat`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoreTicks {
    pub idle: u64,
    pub total: u64,
}

impl CoreTicks {
    pub fn new(idle: u64, total: u64) -> Self {
        Self { idle, total }
    }
}

/// The aggregate `cpu` line plus one entry per `cpuN` line, indexed by N.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub aggregate: CoreTicks,
    pub cores: Vec<CoreTicks>,
}

/// Memory and swap counters in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryCounters {
    pub total: u64,
    pub free: u64,
    pub shared: u64,
    pub buffers: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

/// Everything read by one [`Sampler::sample`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawCounters {
    pub cpu: CpuTicks,
    pub memory: MemoryCounters,
    pub load_averages: [f64; 3],
    pub uptime_secs: u64,
    pub disks: Vec<DiskCounters>,
    pub interfaces: Vec<NetCounters>,
}

pub trait Sampler: Send + 'static {
    fn sample(&mut self) -> Result<RawCounters, SamplerError>;
}

/// Reads counters from a procfs mount (normally `/proc`).
#[derive(Debug, Clone)]
pub struct ProcSampler {
    root: PathBuf,
}

impl Default for ProcSampler {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcSampler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, name: &str) -> Result<(String, String), SamplerError> {
        let path = self.root.join(name);
        let display = path.display().to_string();
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok((display, contents)),
            Err(source) => Err(SamplerError::Read {
                path: display,
                source,
            }),
        }
    }

    fn read_optional(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(name)).ok()
    }
}

impl Sampler for ProcSampler {
    fn sample(&mut self) -> Result<RawCounters, SamplerError> {
        let _span = tracing::debug_span!("sampler.sample").entered();

        // stat first: the tick counters are the skew-sensitive part.
        let (stat_path, stat) = self.read("stat")?;
        let (mem_path, meminfo) = self.read("meminfo")?;
        let (load_path, loadavg) = self.read("loadavg")?;
        let (uptime_path, uptime) = self.read("uptime")?;

        let cpu = parse_cpu_ticks(&stat).map_err(|detail| SamplerError::Parse {
            path: stat_path,
            detail,
        })?;
        let memory = parse_meminfo(&meminfo).map_err(|detail| SamplerError::Parse {
            path: mem_path,
            detail,
        })?;
        let load_averages = parse_loadavg(&loadavg).map_err(|detail| SamplerError::Parse {
            path: load_path,
            detail,
        })?;
        let uptime_secs = parse_uptime(&uptime).map_err(|detail| SamplerError::Parse {
            path: uptime_path,
            detail,
        })?;

        let disks = self
            .read_optional("diskstats")
            .map(|c| parse_diskstats(&c))
            .unwrap_or_default();
        let interfaces = self
            .read_optional("net/dev")
            .map(|c| parse_net_dev(&c))
            .unwrap_or_default();

        Ok(RawCounters {
            cpu,
            memory,
            load_averages,
            uptime_secs,
            disks,
            interfaces,
        })
    }
}

/// Parses the `cpu` and `cpuN` lines of `/proc/stat`.
///
/// idle = idle + iowait; total = user + nice + system + idle + iowait + irq +
/// softirq + steal. Guest time is already folded into user/nice by the kernel.
pub fn parse_cpu_ticks(content: &str) -> Result<CpuTicks, String> {
    let mut aggregate = None;
    let mut cores: Vec<CoreTicks> = Vec::new();

    for line in content.lines() {
        let Some(rest) = line.strip_prefix("cpu") else {
            continue;
        };
        let mut fields = rest.split_whitespace();
        let index = if rest.starts_with(char::is_whitespace) {
            None
        } else {
            match fields.next().and_then(|label| label.parse::<usize>().ok()) {
                Some(index) => Some(index),
                None => continue,
            }
        };

        let values: Vec<u64> = fields
            .take(8)
            .map(|v| v.parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("bad tick value on line '{line}': {e}"))?;
        if values.len() < 4 {
            return Err(format!("expected at least 4 tick fields on line '{line}'"));
        }

        let idle = values[3] + values.get(4).copied().unwrap_or(0);
        let ticks = CoreTicks::new(idle, values.iter().sum());

        match index {
            None => aggregate = Some(ticks),
            Some(i) => {
                if i >= cores.len() {
                    cores.resize(i + 1, CoreTicks::default());
                }
                cores[i] = ticks;
            }
        }
    }

    if cores.is_empty() {
        return Err("no per-cpu lines found".to_string());
    }

    let aggregate = aggregate.unwrap_or_else(|| {
        cores.iter().fold(CoreTicks::default(), |acc, c| {
            CoreTicks::new(acc.idle + c.idle, acc.total + c.total)
        })
    });

    Ok(CpuTicks { aggregate, cores })
}

/// Parses `/proc/meminfo`, converting `kB` values to bytes.
pub fn parse_meminfo(content: &str) -> Result<MemoryCounters, String> {
    let mut total = None;
    let mut free = None;
    let mut counters = MemoryCounters::default();

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        let Some(value) = parts.next().and_then(|v| v.parse::<u64>().ok()) else {
            continue;
        };
        let bytes = match parts.next() {
            Some("kB") => value * 1024,
            _ => value,
        };
        match key.trim() {
            "MemTotal" => total = Some(bytes),
            "MemFree" => free = Some(bytes),
            "Shmem" => counters.shared = bytes,
            "Buffers" => counters.buffers = bytes,
            "SwapTotal" => counters.swap_total = bytes,
            "SwapFree" => counters.swap_free = bytes,
            _ => {}
        }
    }

    counters.total = total.ok_or("missing MemTotal")?;
    counters.free = free.ok_or("missing MemFree")?;
    Ok(counters)
}

/// Parses `/proc/loadavg` ("0.35 0.28 0.22 1/234 5678").
pub fn parse_loadavg(content: &str) -> Result<[f64; 3], String> {
    let mut loads = [0.0; 3];
    let mut fields = content.split_whitespace();
    for slot in &mut loads {
        let field = fields.next().ok_or("expected three load averages")?;
        *slot = field
            .parse()
            .map_err(|e| format!("bad load average '{field}': {e}"))?;
    }
    Ok(loads)
}

/// Parses `/proc/uptime`, truncating to whole seconds.
pub fn parse_uptime(content: &str) -> Result<u64, String> {
    let field = content.split_whitespace().next().ok_or("empty uptime")?;
    let secs: f64 = field
        .parse()
        .map_err(|e| format!("bad uptime '{field}': {e}"))?;
    Ok(secs.max(0.0) as u64)
}
