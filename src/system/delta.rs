//! CPU usage from two tick-counter samples.
//!
//! `/proc/stat` counters are cumulative since boot, so a single read says
//! nothing about current load. [`DeltaEngine`] keeps the previous sample and
//! turns each new one into per-core percentages.

use super::sampler::{CoreTicks, CpuTicks};

/// Usage of one core between two samples, or `None` when no ticks elapsed
/// (or the counter went backwards, e.g. after a CPU was hot-plugged).
pub fn core_usage(prev: CoreTicks, curr: CoreTicks) -> Option<f32> {
    let total_delta = curr.total.checked_sub(prev.total)?;
    if total_delta == 0 {
        return None;
    }
    let idle_delta = curr.idle.saturating_sub(prev.idle).min(total_delta);
    let usage = 100.0 * (1.0 - idle_delta as f64 / total_delta as f64);
    Some(usage.clamp(0.0, 100.0) as f32)
}

/// Per-core usage for `prev` → `curr`. Cores without elapsed ticks (or missing
/// from either sample) report their `fallback` value.
pub fn compute(prev: &[CoreTicks], curr: &[CoreTicks], fallback: &[f32]) -> Vec<f32> {
    fallback
        .iter()
        .enumerate()
        .map(|(i, &last)| match (prev.get(i), curr.get(i)) {
            (Some(&p), Some(&c)) => core_usage(p, c).unwrap_or(last),
            _ => last,
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct CpuUsage {
    pub total: f32,
    pub per_core: Vec<f32>,
}

#[derive(Debug)]
pub struct DeltaEngine {
    core_count: usize,
    previous: Option<CpuTicks>,
    last: CpuUsage,
}

impl DeltaEngine {
    /// `core_count` fixes the length of every usage vector this engine returns.
    pub fn new(core_count: usize) -> Self {
        Self {
            core_count,
            previous: None,
            last: CpuUsage {
                total: 0.0,
                per_core: vec![0.0; core_count],
            },
        }
    }

    pub fn core_count(&self) -> usize {
        self.core_count
    }

    /// Feeds one sample and returns usage since the previous one.
    /// The first call returns all zeros.
    pub fn advance(&mut self, curr: CpuTicks) -> CpuUsage {
        if let Some(prev) = &self.previous {
            let per_core = compute(&prev.cores, &curr.cores, &self.last.per_core);
            let total = core_usage(prev.aggregate, curr.aggregate).unwrap_or(self.last.total);
            self.last = CpuUsage { total, per_core };
        }
        self.previous = Some(curr);
        self.last.clone()
    }
}
