use serde::Serialize;

/// Host-wide metrics from one refresh cycle. Memory in bytes.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SystemSnapshot {
    pub total_ram: u64,
    pub free_ram: u64,
    pub shared_ram: u64,
    pub buffer_ram: u64,
    pub total_swap: u64,
    pub free_swap: u64,
    /// Seconds since boot.
    pub uptime: u64,
    pub load_averages: [f64; 3],
    pub cpu_total_usage: f32,
    /// Percent busy per logical core, indexed by core id.
    pub cpu_core_usage: Vec<f32>,
    /// Milliseconds since the engine started (monotonic).
    pub sampled_at: u64,
}

impl SystemSnapshot {
    pub fn used_ram(&self) -> u64 {
        self.total_ram.saturating_sub(self.free_ram)
    }

    pub fn core_count(&self) -> usize {
        self.cpu_core_usage.len()
    }
}
