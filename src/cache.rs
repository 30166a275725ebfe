//! Generation-stamped snapshot publication.
//!
//! A single refresh task owns the [`Collector`] and is the only writer. Each
//! cycle builds a complete [`Published`] value and swaps it into a
//! `watch` channel; readers clone the current `Arc` and keep a coherent view
//! for as long as they hold it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::EngineError;
use crate::system::collector::{Collected, Collector, ProcessSource};
use crate::system::history::UsageHistory;
use crate::system::io::IoSnapshot;
use crate::system::process::ProcessTable;
use crate::system::sampler::Sampler;
use crate::system::snapshot::SystemSnapshot;

pub const MIN_REFRESH_MS: u64 = 100;

/// One generation of published state. All parts come from the same cycle.
#[derive(Debug)]
pub struct Published {
    pub generation: u64,
    pub system: Arc<SystemSnapshot>,
    pub processes: Arc<ProcessTable>,
    pub io: Arc<IoSnapshot>,
    pub history: Arc<UsageHistory>,
}

impl Published {
    fn new(generation: u64, collected: Collected) -> Self {
        Published {
            generation,
            system: Arc::new(collected.system),
            processes: Arc::new(collected.processes),
            io: Arc::new(collected.io),
            history: Arc::new(collected.history),
        }
    }
}

/// Read side of the cache. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SnapshotCache {
    rx: watch::Receiver<Arc<Published>>,
}

impl SnapshotCache {
    pub fn current(&self) -> Arc<Published> {
        self.rx.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.rx.borrow().generation
    }

    /// Resolves once a generation `>= at_least` has been published.
    pub async fn wait_for_generation(&self, at_least: u64) -> Result<Arc<Published>, EngineError> {
        let mut rx = self.rx.clone();
        let published = rx
            .wait_for(|p| p.generation >= at_least)
            .await
            .map_err(|_| EngineError::RefresherStopped)?;
        Ok(published.clone())
    }

    /// Waits for the next generation after the one last seen by this handle.
    pub async fn changed(&mut self) -> Result<Arc<Published>, EngineError> {
        self.rx
            .changed()
            .await
            .map_err(|_| EngineError::RefresherStopped)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

/// Requests an out-of-cycle refresh. Requests made while a refresh is in
/// flight collapse into a single follow-up refresh.
#[derive(Clone, Debug, Default)]
pub struct Invalidator {
    notify: Arc<Notify>,
    requested: Arc<AtomicU64>,
}

impl Invalidator {
    pub fn invalidate(&self) {
        self.requested.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Total invalidation requests so far.
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::Relaxed)
    }
}

pub struct RefreshHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stops the refresh task once its in-flight cycle (if any) completes.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "refresh task ended abnormally");
        }
    }
}

/// Everything produced by [`start_refresher`].
pub struct Refresher {
    pub cache: SnapshotCache,
    pub invalidator: Invalidator,
    pub handle: RefreshHandle,
}

/// Runs the first collection, publishes it as generation 1, then spawns the
/// refresh loop. Fails only if the first collection fails.
pub async fn start_refresher<S, P>(
    collector: Collector<S, P>,
    interval: Duration,
) -> Result<Refresher, EngineError>
where
    S: Sampler,
    P: ProcessSource,
{
    let (collector, first) = run_cycle(collector)
        .await
        .ok_or(EngineError::RefresherStopped)?;
    let first = first?;
    let first_done = Instant::now();

    let (tx, rx) = watch::channel(Arc::new(Published::new(1, first)));
    let invalidator = Invalidator::default();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let interval = interval.max(Duration::from_millis(MIN_REFRESH_MS));

    let task = tokio::spawn(refresh_loop(
        collector,
        tx,
        invalidator.notify.clone(),
        shutdown_rx,
        interval,
        first_done,
    ));

    Ok(Refresher {
        cache: SnapshotCache { rx },
        invalidator,
        handle: RefreshHandle {
            shutdown: shutdown_tx,
            task,
        },
    })
}

type Cycle<S, P> = (
    Collector<S, P>,
    Result<Collected, crate::error::SamplerError>,
);

/// Moves the collector onto the blocking pool for one cycle and back.
/// `None` if the blocking task panicked, which loses the collector.
async fn run_cycle<S, P>(mut collector: Collector<S, P>) -> Option<Cycle<S, P>>
where
    S: Sampler,
    P: ProcessSource,
{
    match tokio::task::spawn_blocking(move || {
        let result = collector.collect();
        (collector, result)
    })
    .await
    {
        Ok(cycle) => Some(cycle),
        Err(e) => {
            tracing::error!(error = %e, "collection worker panicked");
            None
        }
    }
}

async fn refresh_loop<S, P>(
    mut collector: Collector<S, P>,
    tx: watch::Sender<Arc<Published>>,
    notify: Arc<Notify>,
    mut shutdown: oneshot::Receiver<()>,
    interval: Duration,
    mut last_done: Instant,
) where
    S: Sampler,
    P: ProcessSource,
{
    let min_gap = Duration::from_millis(MIN_REFRESH_MS);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick fires immediately and generation 1 is already published
    ticker.tick().await;
    let mut generation = 1u64;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = notify.notified() => {
                tracing::debug!("refresh requested by invalidation");
                ticker.reset();
            }
            _ = ticker.tick() => {}
        }

        // consecutive samples stay at least MIN_REFRESH_MS apart
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep_until(last_done + min_gap) => {}
        }

        let Some((returned, result)) = run_cycle(collector).await else {
            break;
        };
        collector = returned;
        last_done = Instant::now();

        match result {
            Ok(collected) => {
                generation += 1;
                if tx.send(Arc::new(Published::new(generation, collected))).is_err() {
                    tracing::debug!("all cache readers dropped; stopping refresh");
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, generation, "refresh failed; keeping previous snapshot");
            }
        }
    }
}
