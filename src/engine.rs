//! The command surface callers drive: snapshot reads, the text report and
//! process control.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::{Invalidator, Published, RefreshHandle, SnapshotCache, start_refresher};
use crate::config::Config;
use crate::error::{ControlError, EngineError};
use crate::query::top_n;
use crate::report::{DEFAULT_NAME_WIDTH, StatsRequest, show_stats};
use crate::system::collector::{Collector, ProcessSource, live_collector};
use crate::system::control::{ControlAction, ControlOutcome, ProcessControl};
use crate::system::history::UsageHistory;
use crate::system::io::IoSnapshot;
use crate::system::process::{ProcessTable, TreeNode};
use crate::system::sampler::Sampler;
use crate::system::snapshot::SystemSnapshot;

pub struct Engine {
    cache: SnapshotCache,
    invalidator: Invalidator,
    control: ProcessControl,
    refresher: RefreshHandle,
    name_width: usize,
}

impl Engine {
    /// Starts against the live procfs described by `config`.
    pub async fn start(config: &Config) -> Result<Self, EngineError> {
        let collector = live_collector(
            config.procfs.root.clone(),
            config.general.history_length,
            Instant::now(),
        );
        tracing::debug!(root = %config.procfs.root.display(), "starting engine");
        let engine = Self::with_collector(collector, config.refresh_interval()).await?;
        Ok(engine.with_name_width(config.report.name_width))
    }

    /// Starts over any collector. The first collection happens before this
    /// returns, so generation 1 is always readable.
    pub async fn with_collector<S, P>(
        collector: Collector<S, P>,
        interval: Duration,
    ) -> Result<Self, EngineError>
    where
        S: Sampler,
        P: ProcessSource,
    {
        let refresher = start_refresher(collector, interval).await?;
        let core_count = refresher.cache.current().system.core_count();
        Ok(Engine {
            control: ProcessControl::new(core_count, refresher.invalidator.clone()),
            cache: refresher.cache,
            invalidator: refresher.invalidator,
            refresher: refresher.handle,
            name_width: DEFAULT_NAME_WIDTH,
        })
    }

    pub fn with_name_width(mut self, name_width: usize) -> Self {
        self.name_width = name_width;
        self
    }

    fn published(&self) -> Arc<Published> {
        self.cache.current()
    }

    pub fn get_sysinfo(&self) -> Arc<SystemSnapshot> {
        self.published().system.clone()
    }

    pub fn get_sysinfo_serialized(&self) -> serde_json::Result<String> {
        serde_json::to_string(self.published().system.as_ref())
    }

    pub fn get_cpu_usage(&self) -> Vec<f32> {
        self.published().system.cpu_core_usage.clone()
    }

    pub fn read_processes(&self) -> Arc<ProcessTable> {
        self.published().processes.clone()
    }

    /// Report over a single generation; `nprocs == 0` returns an empty string.
    pub fn show_stats(&self, request: &StatsRequest) -> String {
        let published = self.published();
        show_stats(
            &published.system,
            &published.processes,
            request,
            self.name_width,
        )
    }

    pub fn bind_to_cpu_set(&self, pid: u32, core_ids: &[usize]) -> Result<(), ControlError> {
        self.control.bind_affinity(pid, core_ids)
    }

    pub fn get_affinity(&self, pid: u32) -> Result<Vec<usize>, ControlError> {
        self.control.affinity(pid)
    }

    pub fn kill_process(&self, pid: u32, signal: i32) -> Result<(), ControlError> {
        self.control.send_signal(pid, signal)
    }

    pub fn set_priority(&self, pid: u32, nice: i32) -> Result<(), ControlError> {
        self.control.set_priority(pid, nice)
    }

    pub fn execute(&self, pid: u32, action: &ControlAction) -> Result<(), ControlError> {
        self.control.apply(pid, action)
    }

    /// Applies `action` to the first `request.nprocs` processes of the current
    /// generation that match the request's filter, in its sort order. Every
    /// selected pid gets an outcome; failures do not stop the batch.
    pub fn execute_on_matching(
        &self,
        request: &StatsRequest,
        action: &ControlAction,
    ) -> Vec<ControlOutcome> {
        let published = self.published();
        let pids: Vec<u32> = top_n(&published.processes, &request.query(), request.nprocs)
            .iter()
            .map(|p| p.pid)
            .collect();
        tracing::debug!(selected = pids.len(), ?action, "bulk control");
        self.control.apply_all(&pids, action)
    }

    /// Process forest rooted at `pid`, or at every root when `pid` is 0.
    pub fn build_tree(&self, pid: u32) -> Vec<TreeNode> {
        self.published().processes.tree().nodes(pid)
    }

    pub fn get_io_stats(&self) -> Arc<IoSnapshot> {
        self.published().io.clone()
    }

    pub fn get_usage_history(&self) -> Arc<UsageHistory> {
        self.published().history.clone()
    }

    pub fn core_count(&self) -> usize {
        self.control.core_count()
    }

    pub fn generation(&self) -> u64 {
        self.cache.generation()
    }

    pub async fn wait_for_generation(&self, at_least: u64) -> Result<u64, EngineError> {
        Ok(self.cache.wait_for_generation(at_least).await?.generation)
    }

    /// Requests a refresh ahead of the next tick.
    pub fn invalidate(&self) {
        self.invalidator.invalidate();
    }

    /// A reader handle that can await new generations (see `watch`).
    pub fn subscribe(&self) -> SnapshotCache {
        self.cache.clone()
    }

    pub async fn shutdown(self) {
        self.refresher.shutdown().await;
    }
}
