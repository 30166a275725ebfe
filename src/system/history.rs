use std::collections::VecDeque;

use serde::Serialize;

use super::snapshot::SystemSnapshot;

pub const DEFAULT_CAPACITY: usize = 60;

/// In-memory rolling window of recent CPU and memory readings, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageHistory {
    pub cores: Vec<VecDeque<f32>>,
    pub total_cpu: VecDeque<f32>,
    pub used_ram: VecDeque<u64>,
    capacity: usize,
}

impl UsageHistory {
    pub fn new(core_count: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            cores: vec![VecDeque::with_capacity(capacity); core_count],
            total_cpu: VecDeque::with_capacity(capacity),
            used_ram: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.total_cpu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_cpu.is_empty()
    }

    pub fn record(&mut self, snapshot: &SystemSnapshot) {
        for (series, &usage) in self.cores.iter_mut().zip(&snapshot.cpu_core_usage) {
            push_capped(series, usage, self.capacity);
        }
        push_capped(&mut self.total_cpu, snapshot.cpu_total_usage, self.capacity);
        push_capped(&mut self.used_ram, snapshot.used_ram(), self.capacity);
    }
}

fn push_capped<T>(series: &mut VecDeque<T>, value: T, capacity: usize) {
    if series.len() == capacity {
        series.pop_front();
    }
    series.push_back(value);
}
