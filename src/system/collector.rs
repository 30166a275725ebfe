use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use nix::unistd::{Uid, User};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, ThreadKind};

use crate::error::SamplerError;

use super::delta::DeltaEngine;
use super::history::UsageHistory;
use super::io::{DiskCounters, IoSnapshot, NetCounters, disk_rates, net_rates};
use super::platform;
use super::process::{ProcessRecord, ProcessState, ProcessTable};
use super::sampler::Sampler;
use super::snapshot::SystemSnapshot;

/// Produces a best-effort process table. Processes that disappear while the
/// table is being built are left out, never reported as errors.
pub trait ProcessSource: Send + 'static {
    fn build(&mut self, sampled_at: u64) -> ProcessTable;
}

/// Live process enumeration through `sysinfo`, with per-pid detail from procfs.
pub struct ProcessCollector {
    sys: System,
    proc_root: PathBuf,
    users: HashMap<u32, String>,
    clock_ticks: u64,
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcessCollector {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        ProcessCollector {
            sys: System::new(),
            proc_root: proc_root.into(),
            users: HashMap::new(),
            clock_ticks: platform::clock_ticks_per_sec(),
        }
    }

    fn ticks_to_ms(&self, ticks: u64) -> u64 {
        ticks.saturating_mul(1000) / self.clock_ticks.max(1)
    }
}

fn resolve_user(cache: &mut HashMap<u32, String>, uid: u32) -> String {
    cache
        .entry(uid)
        .or_insert_with(|| match User::from_uid(Uid::from_raw(uid)) {
            Ok(Some(user)) => user.name,
            _ => uid.to_string(),
        })
        .clone()
}

impl ProcessSource for ProcessCollector {
    fn build(&mut self, sampled_at: u64) -> ProcessTable {
        let _span = tracing::debug_span!("collector.build_processes").entered();

        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        let mut records = Vec::with_capacity(self.sys.processes().len());
        let mut vanished = 0usize;

        for (pid, process) in self.sys.processes() {
            if process.thread_kind() == Some(ThreadKind::Userland) {
                continue;
            }
            let pid = pid.as_u32();
            let detail = platform::process_stat(&self.proc_root, pid)
                .zip(platform::process_uid(&self.proc_root, pid));
            let Some((stat, uid)) = detail else {
                vanished += 1;
                continue;
            };

            records.push(ProcessRecord {
                pid,
                ppid: stat.ppid,
                name: process.name().to_string_lossy().to_string(),
                user: resolve_user(&mut self.users, uid),
                state: ProcessState::from_kernel_code(stat.state),
                memory: process.memory() / 1024,
                virtual_memory: process.virtual_memory() / 1024,
                user_time: self.ticks_to_ms(stat.utime_ticks),
                system_time: self.ticks_to_ms(stat.stime_ticks),
                thread_count: stat.num_threads.max(1),
                priority: stat.priority,
                nice: stat.nice,
            });
        }

        if vanished > 0 {
            tracing::debug!(vanished, "processes exited during enumeration");
        }
        ProcessTable::new(sampled_at, records)
    }
}

/// System metrics and I/O rates from one aggregation step.
#[derive(Clone, Debug, PartialEq)]
pub struct Metrics {
    pub system: SystemSnapshot,
    pub io: IoSnapshot,
}

struct IoBaseline {
    disks: Vec<DiskCounters>,
    interfaces: Vec<NetCounters>,
    at: Duration,
}

/// Turns raw samples into [`SystemSnapshot`]s. Holds the only copy of the
/// previous sample, so it must be driven by a single owner.
pub struct Aggregator<S> {
    sampler: S,
    delta: Option<DeltaEngine>,
    io_baseline: Option<IoBaseline>,
    epoch: Instant,
}

impl<S: Sampler> Aggregator<S> {
    pub fn new(sampler: S) -> Self {
        Self::with_epoch(sampler, Instant::now())
    }

    /// `sampled_at` values are measured from `epoch`.
    pub fn with_epoch(sampler: S, epoch: Instant) -> Self {
        Aggregator {
            sampler,
            delta: None,
            io_baseline: None,
            epoch,
        }
    }

    /// Core count fixed by the first successful sample.
    pub fn core_count(&self) -> Option<usize> {
        self.delta.as_ref().map(DeltaEngine::core_count)
    }

    pub fn aggregate(&mut self) -> Result<Metrics, SamplerError> {
        let _span = tracing::debug_span!("collector.aggregate").entered();

        let raw = self.sampler.sample()?;
        let at = self.epoch.elapsed();
        let sampled_at = at.as_millis() as u64;

        let delta = self
            .delta
            .get_or_insert_with(|| DeltaEngine::new(raw.cpu.cores.len()));
        let usage = delta.advance(raw.cpu);

        let memory = raw.memory;
        let system = SystemSnapshot {
            total_ram: memory.total,
            free_ram: memory.free.min(memory.total),
            shared_ram: memory.shared,
            buffer_ram: memory.buffers,
            total_swap: memory.swap_total,
            free_swap: memory.swap_free.min(memory.swap_total),
            uptime: raw.uptime_secs,
            load_averages: raw.load_averages,
            cpu_total_usage: usage.total,
            cpu_core_usage: usage.per_core,
            sampled_at,
        };

        let io = match &self.io_baseline {
            Some(prev) => {
                let elapsed = at.saturating_sub(prev.at).as_secs_f64();
                IoSnapshot {
                    sampled_at,
                    disks: disk_rates(&prev.disks, &raw.disks, elapsed),
                    interfaces: net_rates(&prev.interfaces, &raw.interfaces, elapsed),
                }
            }
            None => IoSnapshot {
                sampled_at,
                ..Default::default()
            },
        };
        self.io_baseline = Some(IoBaseline {
            disks: raw.disks,
            interfaces: raw.interfaces,
            at,
        });

        Ok(Metrics { system, io })
    }
}

/// Everything one refresh cycle publishes.
#[derive(Clone, Debug)]
pub struct Collected {
    pub system: SystemSnapshot,
    pub processes: ProcessTable,
    pub io: IoSnapshot,
    pub history: UsageHistory,
}

/// Drives the aggregator and the process table builder together. Owned
/// exclusively by the refresh task.
pub struct Collector<S, P> {
    aggregator: Aggregator<S>,
    processes: P,
    history: Option<UsageHistory>,
    history_capacity: usize,
}

impl<S: Sampler, P: ProcessSource> Collector<S, P> {
    pub fn new(aggregator: Aggregator<S>, processes: P, history_capacity: usize) -> Self {
        Collector {
            aggregator,
            processes,
            history: None,
            history_capacity,
        }
    }

    pub fn collect(&mut self) -> Result<Collected, SamplerError> {
        let _span = tracing::debug_span!("collector.refresh").entered();

        let Metrics { system, io } = self.aggregator.aggregate()?;
        let processes = self.processes.build(system.sampled_at);

        let history = self
            .history
            .get_or_insert_with(|| UsageHistory::new(system.core_count(), self.history_capacity));
        history.record(&system);

        Ok(Collected {
            history: history.clone(),
            system,
            processes,
            io,
        })
    }
}

/// Production collector over a procfs root.
pub fn live_collector(
    proc_root: impl Into<PathBuf>,
    history_capacity: usize,
    epoch: Instant,
) -> Collector<super::sampler::ProcSampler, ProcessCollector> {
    let proc_root = proc_root.into();
    Collector::new(
        Aggregator::with_epoch(super::sampler::ProcSampler::new(proc_root.clone()), epoch),
        ProcessCollector::new(proc_root),
        history_capacity,
    )
}
