use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sysdeck::engine::Engine;
use sysdeck::error::{ControlError, SamplerError};
use sysdeck::cache::MIN_REFRESH_MS;
use sysdeck::report::StatsRequest;
use sysdeck::system::collector::{Aggregator, Collector, ProcessSource};
use sysdeck::system::control::ControlAction;
use sysdeck::system::process::{ProcessRecord, ProcessState, ProcessTable};
use sysdeck::system::sampler::{CoreTicks, CpuTicks, MemoryCounters, RawCounters, Sampler};

const SLOW: Duration = Duration::from_secs(60);
const DEADLINE: Duration = Duration::from_secs(5);

/// Two cores, each 50% busy between consecutive samples.
struct Ticking {
    n: u64,
    delay: Duration,
    fail_after: Option<u64>,
}

impl Ticking {
    fn new() -> Self {
        Ticking {
            n: 0,
            delay: Duration::ZERO,
            fail_after: None,
        }
    }
}

impl Sampler for Ticking {
    fn sample(&mut self) -> Result<RawCounters, SamplerError> {
        thread::sleep(self.delay);
        self.n += 1;
        if self.fail_after.is_some_and(|limit| self.n > limit) {
            return Err(SamplerError::Parse {
                path: "stat".into(),
                detail: "no cpu lines".into(),
            });
        }
        let core = CoreTicks::new(self.n * 50, self.n * 100);
        Ok(RawCounters {
            cpu: CpuTicks {
                aggregate: CoreTicks::new(core.idle * 2, core.total * 2),
                cores: vec![core; 2],
            },
            memory: MemoryCounters {
                total: 8 << 30,
                free: 2 << 30,
                ..Default::default()
            },
            load_averages: [0.5, 0.4, 0.3],
            uptime_secs: 1000 + self.n,
            disks: Vec::new(),
            interfaces: Vec::new(),
        })
    }
}

fn process(pid: u32, ppid: u32, name: &str) -> ProcessRecord {
    ProcessRecord {
        pid,
        ppid,
        name: name.to_string(),
        user: "root".to_string(),
        state: ProcessState::Sleeping,
        memory: 1024 * pid as u64,
        virtual_memory: 4096,
        user_time: 10,
        system_time: 5,
        thread_count: 1,
        priority: 20,
        nice: 0,
    }
}

struct FakeProcesses;

impl ProcessSource for FakeProcesses {
    fn build(&mut self, sampled_at: u64) -> ProcessTable {
        ProcessTable::new(
            sampled_at,
            vec![process(1, 0, "init"), process(2, 1, "sshd"), process(3, 2, "bash")],
        )
    }
}

/// Publishes the same fixed rows every cycle.
struct Listed(Vec<ProcessRecord>);

impl ProcessSource for Listed {
    fn build(&mut self, sampled_at: u64) -> ProcessTable {
        ProcessTable::new(sampled_at, self.0.clone())
    }
}

async fn engine(sampler: Ticking, interval: Duration) -> Engine {
    engine_over(sampler, FakeProcesses, interval).await
}

async fn engine_over<P: ProcessSource>(sampler: Ticking, source: P, interval: Duration) -> Engine {
    let collector = Collector::new(Aggregator::new(sampler), source, 8);
    Engine::with_collector(collector, interval)
        .await
        .expect("engine start")
}

fn matching_name(pattern: &str) -> StatsRequest {
    StatsRequest {
        nprocs: usize::MAX,
        sort_by: "pid".to_string(),
        descending: false,
        filter_by: "name".to_string(),
        pattern: pattern.to_string(),
        exact_match: false,
    }
}

#[tokio::test]
async fn first_generation_is_published_before_start_returns() {
    let engine = engine(Ticking::new(), SLOW).await;
    assert_eq!(engine.generation(), 1);
    assert_eq!(engine.get_cpu_usage(), vec![0.0, 0.0]);
    assert_eq!(engine.core_count(), 2);
    assert_eq!(engine.read_processes().len(), 3);
    engine.shutdown().await;
}

#[tokio::test]
async fn interval_refresh_advances_generations() {
    let engine = engine(Ticking::new(), Duration::from_millis(100)).await;
    let generation = tokio::time::timeout(DEADLINE, engine.wait_for_generation(3))
        .await
        .expect("refresh stalled")
        .unwrap();
    assert!(generation >= 3);
    assert_eq!(engine.get_cpu_usage(), vec![50.0, 50.0]);
    assert_eq!(engine.get_sysinfo().cpu_total_usage, 50.0);
    assert!(engine.get_usage_history().len() >= 3);
    engine.shutdown().await;
}

#[tokio::test]
async fn read_processes_is_stable_within_a_generation() {
    let engine = engine(Ticking::new(), SLOW).await;
    let first = engine.read_processes();
    let second = engine.read_processes();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(*first, *second);

    engine.invalidate();
    tokio::time::timeout(DEADLINE, engine.wait_for_generation(2))
        .await
        .expect("invalidation ignored")
        .unwrap();
    let third = engine.read_processes();
    assert!(!Arc::ptr_eq(&first, &third));
    // the old handle still describes the old generation
    assert!(first.sampled_at <= third.sampled_at);
    engine.shutdown().await;
}

#[tokio::test]
async fn invalidations_coalesce() {
    let slow = Ticking {
        delay: Duration::from_millis(50),
        ..Ticking::new()
    };
    let engine = engine(slow, SLOW).await;
    for _ in 0..5 {
        engine.invalidate();
    }
    tokio::time::timeout(DEADLINE, engine.wait_for_generation(2))
        .await
        .expect("invalidation ignored")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    let generation = engine.generation();
    assert!((2..=3).contains(&generation), "got generation {generation}");
    engine.shutdown().await;
}

#[tokio::test]
async fn published_parts_share_one_timestamp() {
    let engine = engine(Ticking::new(), Duration::from_millis(100)).await;
    let mut updates = engine.subscribe();
    let mut last = 0;
    for _ in 0..3 {
        let published = tokio::time::timeout(DEADLINE, updates.changed())
            .await
            .expect("no update")
            .unwrap();
        assert_eq!(published.system.sampled_at, published.processes.sampled_at);
        assert_eq!(published.system.sampled_at, published.io.sampled_at);
        assert!(published.system.sampled_at >= last);
        last = published.system.sampled_at;
    }
    engine.shutdown().await;
}

#[tokio::test]
async fn failed_cycles_keep_the_last_good_snapshot() {
    let failing = Ticking {
        fail_after: Some(1),
        ..Ticking::new()
    };
    let engine = engine(failing, Duration::from_millis(100)).await;
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(engine.generation(), 1);
    assert_eq!(engine.get_sysinfo().uptime, 1001);
    assert_eq!(engine.read_processes().len(), 3);
    engine.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_the_channel() {
    let engine = engine(Ticking::new(), SLOW).await;
    let cache = engine.subscribe();
    engine.shutdown().await;
    assert!(cache.wait_for_generation(2).await.is_err());
    assert_eq!(cache.current().generation, 1);
}

#[tokio::test]
async fn control_invalidates_only_after_reaching_the_os() {
    let engine = engine(Ticking::new(), SLOW).await;

    assert!(matches!(
        engine.bind_to_cpu_set(std::process::id(), &[]),
        Err(ControlError::InvalidRequest(_))
    ));
    assert!(matches!(
        engine.bind_to_cpu_set(std::process::id(), &[2]),
        Err(ControlError::InvalidCore { core: 2, core_count: 2 })
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.generation(), 1);

    // far above any kernel pid_max, but still a valid pid_t
    let result = engine.kill_process(i32::MAX as u32, 15);
    assert!(matches!(result, Err(ControlError::NotFound(_))));
    tokio::time::timeout(DEADLINE, engine.wait_for_generation(2))
        .await
        .expect("control did not invalidate")
        .unwrap();
    engine.shutdown().await;
}

#[tokio::test]
async fn build_tree_reads_the_published_table() {
    let engine = engine(Ticking::new(), SLOW).await;
    let forest = engine.build_tree(0);
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].pid, 1);
    assert_eq!(forest[0].subtree_memory, 1024 + 2048 + 3072);
    assert_eq!(engine.build_tree(3)[0].children.len(), 0);
    assert!(engine.build_tree(99).is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn invalidation_respects_the_minimum_refresh_gap() {
    let engine = engine(Ticking::new(), SLOW).await;
    let first = engine.get_sysinfo();
    engine.invalidate();
    tokio::time::timeout(DEADLINE, engine.wait_for_generation(2))
        .await
        .expect("invalidation ignored")
        .unwrap();
    let second = engine.get_sysinfo();
    assert!(
        second.sampled_at - first.sampled_at >= MIN_REFRESH_MS,
        "samples {} ms apart",
        second.sampled_at - first.sampled_at
    );
    engine.shutdown().await;
}

#[tokio::test]
async fn back_to_back_invalidations_stay_spaced() {
    let engine = engine(Ticking::new(), SLOW).await;
    let mut updates = engine.subscribe();
    let mut previous = engine.get_sysinfo().sampled_at;
    for _ in 0..3 {
        engine.invalidate();
        let published = tokio::time::timeout(DEADLINE, updates.changed())
            .await
            .expect("invalidation ignored")
            .unwrap();
        assert!(published.system.sampled_at - previous >= MIN_REFRESH_MS);
        previous = published.system.sampled_at;
    }
    engine.shutdown().await;
}

#[tokio::test]
async fn bulk_control_reports_each_matching_pid() {
    let engine = engine(Ticking::new(), SLOW).await;
    let outcomes = engine.execute_on_matching(&matching_name("s"), &ControlAction::Priority(99));
    // "sshd" and "bash" match; "init" does not
    let pids: Vec<u32> = outcomes.iter().map(|o| o.pid).collect();
    assert_eq!(pids, vec![2, 3]);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o.result, Err(ControlError::InvalidRequest(_))))
    );

    let none = engine.execute_on_matching(&matching_name("nomatch"), &ControlAction::Signal(15));
    assert!(none.is_empty());

    let capped = StatsRequest {
        nprocs: 1,
        ..matching_name("")
    };
    let first_only = engine.execute_on_matching(&capped, &ControlAction::Signal(0));
    assert_eq!(first_only.len(), 1);
    assert_eq!(first_only[0].pid, 1);
    assert!(matches!(first_only[0].result, Err(ControlError::InvalidSignal(0))));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.generation(), 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn bulk_signal_reaches_live_matches_and_continues_past_failures() {
    let mut child = Command::new("sh")
        .args(["-c", "sleep 30"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn child");
    let child_pid = child.id();
    // far above any kernel pid_max, so the signal reports NotFound
    let ghost = i32::MAX as u32 - 1;
    let rows = vec![
        process(1, 0, "init"),
        process(child_pid, 1, "deck-sleeper"),
        process(ghost, 1, "deck-ghost"),
    ];

    let engine = engine_over(Ticking::new(), Listed(rows), SLOW).await;
    let outcomes = engine.execute_on_matching(&matching_name("deck-"), &ControlAction::Signal(15));

    let deadline = Instant::now() + DEADLINE;
    let exited = loop {
        match child.try_wait() {
            Ok(Some(_)) => break true,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
            _ => break false,
        }
    };
    if !exited {
        let _ = child.kill();
        let _ = child.wait();
    }

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].pid, child_pid);
    assert!(outcomes[0].result.is_ok());
    assert_eq!(outcomes[1].pid, ghost);
    assert!(matches!(outcomes[1].result, Err(ControlError::NotFound(_))));
    assert!(exited, "matching child was not signalled");

    tokio::time::timeout(DEADLINE, engine.wait_for_generation(2))
        .await
        .expect("bulk control did not invalidate")
        .unwrap();
    engine.shutdown().await;
}
