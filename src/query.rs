//! Sorting and filtering over an immutable [`ProcessTable`].
//!
//! Browsing is best-effort: unknown sort or filter keys degrade to a no-op
//! instead of an error.

use std::cmp::Ordering;

use crate::system::process::{ProcessRecord, ProcessTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Unsorted,
    Pid,
    Name,
    Memory,
    Priority,
    User,
    State,
    Threads,
    VirtualMemory,
    UserTime,
    SystemTime,
}

impl SortKey {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pid" => SortKey::Pid,
            "name" => SortKey::Name,
            "memory" | "mem" | "rss" => SortKey::Memory,
            "priority" | "prio" => SortKey::Priority,
            "user" => SortKey::User,
            "state" => SortKey::State,
            "threads" | "thread_count" => SortKey::Threads,
            "vmsize" | "virtual_memory" => SortKey::VirtualMemory,
            "utime" | "user_time" => SortKey::UserTime,
            "stime" | "system_time" => SortKey::SystemTime,
            _ => SortKey::Unsorted,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Unsorted => "none",
            SortKey::Pid => "pid",
            SortKey::Name => "name",
            SortKey::Memory => "memory",
            SortKey::Priority => "priority",
            SortKey::User => "user",
            SortKey::State => "state",
            SortKey::Threads => "threads",
            SortKey::VirtualMemory => "vmsize",
            SortKey::UserTime => "utime",
            SortKey::SystemTime => "stime",
        }
    }

    fn compare(self, a: &ProcessRecord, b: &ProcessRecord) -> Ordering {
        match self {
            SortKey::Unsorted => Ordering::Equal,
            SortKey::Pid => a.pid.cmp(&b.pid),
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Memory => a.memory.cmp(&b.memory),
            SortKey::Priority => a.priority.cmp(&b.priority),
            SortKey::User => a.user.cmp(&b.user),
            SortKey::State => a.state.cmp(&b.state),
            SortKey::Threads => a.thread_count.cmp(&b.thread_count),
            SortKey::VirtualMemory => a.virtual_memory.cmp(&b.virtual_memory),
            SortKey::UserTime => a.user_time.cmp(&b.user_time),
            SortKey::SystemTime => a.system_time.cmp(&b.system_time),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    Name,
    User,
    State,
    Pid,
    Ppid,
}

impl FilterKey {
    /// `None` for empty or unrecognised keys, which disables filtering.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "name" => Some(FilterKey::Name),
            "user" => Some(FilterKey::User),
            "state" => Some(FilterKey::State),
            "pid" => Some(FilterKey::Pid),
            "ppid" => Some(FilterKey::Ppid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub key: FilterKey,
    pub pattern: String,
    pub exact: bool,
}

impl Filter {
    pub fn new(key: FilterKey, pattern: impl Into<String>, exact: bool) -> Self {
        Self {
            key,
            pattern: pattern.into(),
            exact,
        }
    }

    fn text_matches(&self, field: &str) -> bool {
        if self.exact {
            field == self.pattern
        } else {
            field.to_lowercase().contains(&self.pattern.to_lowercase())
        }
    }

    fn numeric(&self) -> Option<u32> {
        self.pattern.trim().parse().ok()
    }

    /// A non-numeric pattern for a numeric key matches nothing.
    pub fn matches(&self, p: &ProcessRecord) -> bool {
        match self.key {
            FilterKey::Name => self.text_matches(&p.name),
            FilterKey::User => self.text_matches(&p.user),
            FilterKey::State => {
                self.text_matches(p.state.label()) || self.text_matches(&p.state.code().to_string())
            }
            FilterKey::Pid => self.numeric().is_some_and(|wanted| p.pid == wanted),
            FilterKey::Ppid => self.numeric().is_some_and(|wanted| p.ppid == wanted),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    pub sort: SortKey,
    pub descending: bool,
    pub filter: Option<Filter>,
}

impl Query {
    /// Builds a query from loosely-typed caller input.
    pub fn from_parts(
        sort_by: &str,
        descending: bool,
        filter_by: &str,
        pattern: &str,
        exact_match: bool,
    ) -> Self {
        Query {
            sort: SortKey::parse(sort_by),
            descending,
            filter: FilterKey::parse(filter_by).map(|key| Filter::new(key, pattern, exact_match)),
        }
    }

    pub fn sorted_by(sort: SortKey, descending: bool) -> Self {
        Query {
            sort,
            descending,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Filters, then sorts. Ties (and `SortKey::Unsorted`) fall back to pid
/// ascending, so equal inputs always produce equal output.
pub fn query(table: &ProcessTable, q: &Query) -> Vec<ProcessRecord> {
    let mut rows: Vec<ProcessRecord> = match &q.filter {
        Some(filter) => table
            .processes
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect(),
        None => table.processes.clone(),
    };
    sort_records(&mut rows, q.sort, q.descending);
    rows
}

pub fn sort_records(rows: &mut [ProcessRecord], key: SortKey, descending: bool) {
    if key == SortKey::Unsorted {
        return;
    }
    rows.sort_by(|a, b| {
        let primary = key.compare(a, b);
        let primary = if descending { primary.reverse() } else { primary };
        primary.then_with(|| a.pid.cmp(&b.pid))
    });
}

/// First `n` rows of [`query`].
pub fn top_n(table: &ProcessTable, q: &Query, n: usize) -> Vec<ProcessRecord> {
    if n == 0 {
        return Vec::new();
    }
    let mut rows = query(table, q);
    rows.truncate(n);
    rows
}
