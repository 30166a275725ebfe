//! Plain-text `show_stats` report: host summary followed by a process table.

use std::fmt;

use crate::format::{format_bytes, format_uptime, kb_to_mb, pad_unicode, truncate_unicode};
use crate::query::{Query, top_n};
use crate::system::process::{ProcessRecord, ProcessTable};
use crate::system::snapshot::SystemSnapshot;

pub const DEFAULT_NAME_WIDTH: usize = 24;
const USER_WIDTH: usize = 10;
const CORES_PER_LINE: usize = 8;
/// Width of every column before NAME, separators included.
const FIXED_WIDTH: usize = 94;

/// Caller-supplied parameters of `show_stats`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsRequest {
    pub nprocs: usize,
    pub sort_by: String,
    pub descending: bool,
    pub filter_by: String,
    pub pattern: String,
    pub exact_match: bool,
}

impl Default for StatsRequest {
    fn default() -> Self {
        StatsRequest {
            nprocs: 20,
            sort_by: "memory".to_string(),
            descending: true,
            filter_by: String::new(),
            pattern: String::new(),
            exact_match: false,
        }
    }
}

impl StatsRequest {
    pub fn query(&self) -> Query {
        Query::from_parts(
            &self.sort_by,
            self.descending,
            &self.filter_by,
            &self.pattern,
            self.exact_match,
        )
    }
}

pub struct StatsReport<'a> {
    pub system: &'a SystemSnapshot,
    pub rows: Vec<ProcessRecord>,
    pub name_width: usize,
}

/// Renders the report for `request`. `nprocs == 0` yields an empty string.
pub fn show_stats(
    system: &SystemSnapshot,
    table: &ProcessTable,
    request: &StatsRequest,
    name_width: usize,
) -> String {
    if request.nprocs == 0 {
        return String::new();
    }
    StatsReport {
        system,
        rows: top_n(table, &request.query(), request.nprocs),
        name_width: name_width.max(1),
    }
    .to_string()
}

impl StatsReport<'_> {
    fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.system;
        writeln!(
            f,
            "Memory   total {}  used {}  free {}  shared {}  buffers {}",
            format_bytes(s.total_ram),
            format_bytes(s.used_ram()),
            format_bytes(s.free_ram),
            format_bytes(s.shared_ram),
            format_bytes(s.buffer_ram),
        )?;
        writeln!(
            f,
            "Swap     total {}  free {}",
            format_bytes(s.total_swap),
            format_bytes(s.free_swap),
        )?;
        let [one, five, fifteen] = s.load_averages;
        writeln!(
            f,
            "Uptime   {}  load {one:.2} {five:.2} {fifteen:.2}",
            format_uptime(s.uptime),
        )?;
        writeln!(f, "CPU      total {:.1}%", s.cpu_total_usage)?;

        let cores: Vec<String> = s
            .cpu_core_usage
            .iter()
            .enumerate()
            .map(|(id, usage)| format!("core{id} {usage:.1}%"))
            .collect();
        for line in cores.chunks(CORES_PER_LINE) {
            writeln!(f, "         {}", line.join("  "))?;
        }
        Ok(())
    }

    fn write_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>7} {:>7} {} {:<5} {:>9} {:>9} {:>7} {:>10} {:>10} {:>4} {:>4}  NAME",
            "PID",
            "PPID",
            pad_unicode("USER", USER_WIDTH),
            "STATE",
            "MEM(MB)",
            "VIRT(MB)",
            "THREADS",
            "USER(ms)",
            "SYS(ms)",
            "PRI",
            "NI",
        )?;
        writeln!(f, "{}", "-".repeat(FIXED_WIDTH + self.name_width))?;

        for p in &self.rows {
            writeln!(
                f,
                "{:>7} {:>7} {} {:<5} {:>9} {:>9} {:>7} {:>10} {:>10} {:>4} {:>4}  {}",
                p.pid,
                p.ppid,
                pad_unicode(&p.user, USER_WIDTH),
                p.state.code(),
                format!("{:.1}", kb_to_mb(p.memory)),
                format!("{:.1}", kb_to_mb(p.virtual_memory)),
                p.thread_count,
                p.user_time,
                p.system_time,
                p.priority,
                p.nice,
                truncate_unicode(&p.name, self.name_width),
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for StatsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_summary(f)?;
        writeln!(f)?;
        self.write_table(f)
    }
}
