use std::collections::{HashMap, HashSet};

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Running,
    Sleeping,
    Stopped,
    Zombie,
    Uninterruptible,
    Unknown,
}

impl ProcessState {
    /// Maps the kernel's one-letter state from `/proc/<pid>/stat`.
    pub fn from_kernel_code(code: char) -> Self {
        match code {
            'R' => ProcessState::Running,
            // 'I' is an idle kernel thread, which only ever waits
            'S' | 'I' => ProcessState::Sleeping,
            'D' => ProcessState::Uninterruptible,
            'T' | 't' => ProcessState::Stopped,
            'Z' => ProcessState::Zombie,
            _ => ProcessState::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProcessState::Running => "running",
            ProcessState::Sleeping => "sleeping",
            ProcessState::Stopped => "stopped",
            ProcessState::Zombie => "zombie",
            ProcessState::Uninterruptible => "uninterruptible",
            ProcessState::Unknown => "unknown",
        }
    }

    pub fn code(self) -> char {
        match self {
            ProcessState::Running => 'R',
            ProcessState::Sleeping => 'S',
            ProcessState::Stopped => 'T',
            ProcessState::Zombie => 'Z',
            ProcessState::Uninterruptible => 'D',
            ProcessState::Unknown => '?',
        }
    }
}

/// One row of a [`ProcessTable`]. Memory in KB, CPU times in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    pub user: String,
    pub state: ProcessState,
    pub memory: u64,
    pub virtual_memory: u64,
    pub user_time: u64,
    pub system_time: u64,
    pub thread_count: u32,
    pub priority: i32,
    pub nice: i32,
}

/// A best-effort, immutable snapshot of the process list, ordered by pid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessTable {
    pub sampled_at: u64,
    pub processes: Vec<ProcessRecord>,
}

impl ProcessTable {
    /// Sorts by pid and drops duplicate pids (keeping the first seen).
    pub fn new(sampled_at: u64, mut processes: Vec<ProcessRecord>) -> Self {
        processes.sort_by_key(|p| p.pid);
        processes.dedup_by_key(|p| p.pid);
        Self {
            sampled_at,
            processes,
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.processes
            .binary_search_by_key(&pid, |p| p.pid)
            .ok()
            .map(|i| &self.processes[i])
    }

    pub fn tree(&self) -> ProcessTree<'_> {
        ProcessTree::from_table(self)
    }
}

/// Parent/child links derived from a table's pid/ppid pairs.
#[derive(Clone, Debug)]
pub struct ProcessTree<'a> {
    table: &'a ProcessTable,
    children: HashMap<u32, Vec<u32>>,
    /// Members of a ppid cycle. They are treated as roots and never linked
    /// to their parent.
    detached: HashSet<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub pid: u32,
    pub name: String,
    /// Resident KB of this process and all of its descendants.
    pub subtree_memory: u64,
    pub children: Vec<TreeNode>,
}

impl<'a> ProcessTree<'a> {
    pub fn from_table(table: &'a ProcessTable) -> Self {
        let detached = cycle_members(table);
        let mut children: HashMap<u32, Vec<u32>> = HashMap::with_capacity(table.len());
        // processes are pid-ordered, so child lists come out sorted
        for process in &table.processes {
            if detached.contains(&process.pid) {
                continue;
            }
            if let Some(parent) = linked_parent(table, process) {
                children.entry(parent).or_default().push(process.pid);
            }
        }
        Self {
            table,
            children,
            detached,
        }
    }

    pub fn children(&self, pid: u32) -> &[u32] {
        self.children.get(&pid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Processes whose parent is absent from the table (pid 1, kthreadd, orphans
    /// whose parent exited mid-enumeration), plus members of a ppid cycle.
    pub fn roots(&self) -> Vec<u32> {
        self.table
            .processes
            .iter()
            .filter(|p| {
                self.detached.contains(&p.pid) || linked_parent(self.table, p).is_none()
            })
            .map(|p| p.pid)
            .collect()
    }

    /// Compute subtree memory for all processes, returned as a map.
    pub fn all_subtree_memory(&self) -> HashMap<u32, u64> {
        let mut cache = HashMap::new();
        for process in &self.table.processes {
            self.subtree_memory_cached(process.pid, &mut cache);
        }
        cache
    }

    fn subtree_memory_cached(&self, pid: u32, cache: &mut HashMap<u32, u64>) -> u64 {
        if let Some(&cached) = cache.get(&pid) {
            return cached;
        }
        let Some(process) = self.table.get(pid) else {
            return 0;
        };
        let children_sum: u64 = self
            .children(pid)
            .iter()
            .map(|&child| self.subtree_memory_cached(child, cache))
            .sum();
        let total = process.memory + children_sum;
        cache.insert(pid, total);
        total
    }

    /// Nested nodes rooted at `pid`, or at every root when `pid` is 0.
    /// An unknown pid yields no nodes.
    pub fn nodes(&self, pid: u32) -> Vec<TreeNode> {
        let sizes = self.all_subtree_memory();
        let starts = if pid == 0 {
            self.roots()
        } else if self.table.get(pid).is_some() {
            vec![pid]
        } else {
            Vec::new()
        };
        starts
            .into_iter()
            .filter_map(|p| self.node(p, &sizes))
            .collect()
    }

    fn node(&self, pid: u32, sizes: &HashMap<u32, u64>) -> Option<TreeNode> {
        let process = self.table.get(pid)?;
        Some(TreeNode {
            pid,
            name: process.name.clone(),
            subtree_memory: sizes.get(&pid).copied().unwrap_or(process.memory),
            children: self
                .children(pid)
                .iter()
                .filter_map(|&child| self.node(child, sizes))
                .collect(),
        })
    }
}

fn linked_parent(table: &ProcessTable, process: &ProcessRecord) -> Option<u32> {
    (process.ppid != process.pid && table.get(process.ppid).is_some()).then_some(process.ppid)
}

/// Pids whose parent chain leads back to themselves. Rows are read while
/// processes exit and pids get reused, so a torn enumeration can link 2 -> 3
/// and 3 -> 2.
fn cycle_members(table: &ProcessTable) -> HashSet<u32> {
    let mut settled: HashSet<u32> = HashSet::with_capacity(table.len());
    let mut members = HashSet::new();
    for process in &table.processes {
        let mut path: Vec<u32> = Vec::new();
        let mut current = Some(process);
        while let Some(p) = current {
            if settled.contains(&p.pid) {
                break;
            }
            if let Some(start) = path.iter().position(|&seen| seen == p.pid) {
                members.extend(&path[start..]);
                break;
            }
            path.push(p.pid);
            current = linked_parent(table, p).and_then(|ppid| table.get(ppid));
        }
        settled.extend(path);
    }
    members
}

#[cfg(test)]
pub(crate) fn record(pid: u32, ppid: u32, name: &str, memory: u64) -> ProcessRecord {
    ProcessRecord {
        pid,
        ppid,
        name: name.to_string(),
        user: "root".to_string(),
        state: ProcessState::Sleeping,
        memory,
        virtual_memory: memory * 4,
        user_time: 0,
        system_time: 0,
        thread_count: 1,
        priority: 20,
        nice: 0,
    }
}
