//! Cognitive cycle scheduler
//!
//! Runs each named cycle on its own interval. A task never overlaps with its
//! own previous run: a tick that lands while the last run is still going is
//! skipped with a warning. Different tasks may overlap freely.

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TimingConfig;

/// The periodic cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleTask {
    GoalReflection,
    SentimentUpdate,
    SentimentSummary,
    DreamConsolidation,
}

impl CycleTask {
    pub const ALL: [CycleTask; 4] = [
        CycleTask::GoalReflection,
        CycleTask::SentimentUpdate,
        CycleTask::SentimentSummary,
        CycleTask::DreamConsolidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleTask::GoalReflection => "goal_reflection",
            CycleTask::SentimentUpdate => "sentiment_update",
            CycleTask::SentimentSummary => "sentiment_summary",
            CycleTask::DreamConsolidation => "dream_consolidation",
        }
    }

    /// Configured interval; zero means disabled
    pub fn interval(&self, timing: &TimingConfig) -> Duration {
        match self {
            CycleTask::GoalReflection => timing.goal_interval,
            CycleTask::SentimentUpdate => timing.sentiment_interval,
            CycleTask::SentimentSummary => timing.sentiment_summary_interval,
            CycleTask::DreamConsolidation => timing.dream_interval,
        }
    }
}

impl std::fmt::Display for CycleTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executes one run of a cycle. Implementations absorb their own failures.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run(&self, task: CycleTask);
}

/// Per-task counters
#[derive(Debug, Default)]
pub struct TaskStats {
    pub runs_started: AtomicU64,
    pub runs_completed: AtomicU64,
    pub ticks_skipped: AtomicU64,
}

/// Point-in-time copy of `TaskStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskStatsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub ticks_skipped: u64,
}

struct TaskSlot {
    task: CycleTask,
    interval: Duration,
    running: AtomicBool,
    stats: TaskStats,
}

/// Clears the slot's running flag when the run ends, however it ends
struct RunGuard {
    slot: Arc<TaskSlot>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.slot.stats.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.slot.running.store(false, Ordering::SeqCst);
    }
}

/// Result of asking a task to run now
#[derive(Debug)]
pub enum FireOutcome {
    Started(JoinHandle<()>),
    /// Previous run still pending
    Skipped,
    /// Task has a zero interval
    Disabled,
}

pub struct CognitiveCycleScheduler {
    runner: Arc<dyn CycleRunner>,
    slots: Vec<Arc<TaskSlot>>,
    shutdown_tx: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl CognitiveCycleScheduler {
    /// Scheduler for every task with a non-zero configured interval
    pub fn new(runner: Arc<dyn CycleRunner>, timing: &TimingConfig) -> Self {
        Self::with_intervals(
            runner,
            CycleTask::ALL.iter().map(|t| (*t, t.interval(timing))),
        )
    }

    pub fn with_intervals<I>(runner: Arc<dyn CycleRunner>, intervals: I) -> Self
    where
        I: IntoIterator<Item = (CycleTask, Duration)>,
    {
        let slots = intervals
            .into_iter()
            .filter(|(task, interval)| {
                if interval.is_zero() {
                    info!("💻 Cycle {} disabled", task);
                }
                !interval.is_zero()
            })
            .map(|(task, interval)| {
                Arc::new(TaskSlot {
                    task,
                    interval,
                    running: AtomicBool::new(false),
                    stats: TaskStats::default(),
                })
            })
            .collect();

        let (shutdown_tx, _) = watch::channel(false);

        Self {
            runner,
            slots,
            shutdown_tx,
            loops: Mutex::new(Vec::new()),
        }
    }

    fn slot(&self, task: CycleTask) -> Option<&Arc<TaskSlot>> {
        self.slots.iter().find(|s| s.task == task)
    }

    /// Enabled tasks in scheduling order
    pub fn tasks(&self) -> Vec<CycleTask> {
        self.slots.iter().map(|s| s.task).collect()
    }

    /// Run `task` now unless its previous run is still pending
    pub fn fire(&self, task: CycleTask) -> FireOutcome {
        match self.slot(task) {
            Some(slot) => fire_slot(slot, &self.runner),
            None => FireOutcome::Disabled,
        }
    }

    pub fn is_running(&self, task: CycleTask) -> bool {
        self.slot(task)
            .map(|s| s.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn stats(&self, task: CycleTask) -> Option<TaskStatsSnapshot> {
        self.slot(task).map(|s| TaskStatsSnapshot {
            runs_started: s.stats.runs_started.load(Ordering::Relaxed),
            runs_completed: s.stats.runs_completed.load(Ordering::Relaxed),
            ticks_skipped: s.stats.ticks_skipped.load(Ordering::Relaxed),
        })
    }

    /// Spawn one timer loop per enabled task. The first tick of each task is
    /// one full interval from now.
    pub fn start(&self) {
        let mut loops = self.loops.lock();
        if !loops.is_empty() {
            warn!("💻 Cycle scheduler already started");
            return;
        }

        for slot in &self.slots {
            let slot = Arc::clone(slot);
            let runner = Arc::clone(&self.runner);
            let mut shutdown = self.shutdown_tx.subscribe();

            info!(
                "💻 Scheduling {} every {:?}",
                slot.task, slot.interval
            );

            loops.push(tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + slot.interval, slot.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            fire_slot(&slot, &runner);
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                debug!("Cycle loop {} stopping", slot.task);
                                break;
                            }
                        }
                    }
                }
            }));
        }
    }

    /// Stop all timer loops. Runs already in progress finish on their own.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let loops: Vec<_> = self.loops.lock().drain(..).collect();
        join_all(loops).await;
        info!("💻 Cycle scheduler stopped");
    }
}

fn fire_slot(slot: &Arc<TaskSlot>, runner: &Arc<dyn CycleRunner>) -> FireOutcome {
    if slot
        .running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        slot.stats.ticks_skipped.fetch_add(1, Ordering::Relaxed);
        warn!("💻 {} still running, skipping this tick", slot.task);
        return FireOutcome::Skipped;
    }

    slot.stats.runs_started.fetch_add(1, Ordering::Relaxed);
    let guard = RunGuard {
        slot: Arc::clone(slot),
    };
    let runner = Arc::clone(runner);
    let task = slot.task;

    FireOutcome::Started(tokio::spawn(async move {
        let _guard = guard;
        debug!("Cycle {} started", task);
        runner.run(task).await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    const HOUR: Duration = Duration::from_secs(3600);

    /// Blocks every run until released
    struct GatedRunner {
        release: Notify,
        runs: AtomicU64,
    }

    #[async_trait]
    impl CycleRunner for GatedRunner {
        async fn run(&self, _task: CycleTask) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
        }
    }

    /// Each run takes two and a half hours
    struct SlowRunner;

    #[async_trait]
    impl CycleRunner for SlowRunner {
        async fn run(&self, _task: CycleTask) {
            tokio::time::sleep(HOUR * 5 / 2).await;
        }
    }

    #[tokio::test]
    async fn test_fire_skips_while_running() {
        let runner = Arc::new(GatedRunner {
            release: Notify::new(),
            runs: AtomicU64::new(0),
        });
        let scheduler = CognitiveCycleScheduler::with_intervals(
            runner.clone(),
            [(CycleTask::GoalReflection, HOUR)],
        );

        let first = match scheduler.fire(CycleTask::GoalReflection) {
            FireOutcome::Started(handle) => handle,
            other => panic!("expected start, got {:?}", other),
        };
        assert!(scheduler.is_running(CycleTask::GoalReflection));
        assert!(matches!(
            scheduler.fire(CycleTask::GoalReflection),
            FireOutcome::Skipped
        ));

        // Wait for the run to park, then let it finish
        while runner.runs.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        runner.release.notify_one();
        first.await.unwrap();

        assert!(!scheduler.is_running(CycleTask::GoalReflection));
        let stats = scheduler.stats(CycleTask::GoalReflection).unwrap();
        assert_eq!(stats.runs_started, 1);
        assert_eq!(stats.runs_completed, 1);
        assert_eq!(stats.ticks_skipped, 1);

        assert!(matches!(
            scheduler.fire(CycleTask::GoalReflection),
            FireOutcome::Started(_)
        ));
    }

    #[tokio::test]
    async fn test_zero_interval_disables_task() {
        let scheduler = CognitiveCycleScheduler::with_intervals(
            Arc::new(SlowRunner),
            [
                (CycleTask::GoalReflection, HOUR),
                (CycleTask::DreamConsolidation, Duration::ZERO),
            ],
        );

        assert_eq!(scheduler.tasks(), vec![CycleTask::GoalReflection]);
        assert!(matches!(
            scheduler.fire(CycleTask::DreamConsolidation),
            FireOutcome::Disabled
        ));
        assert!(scheduler.stats(CycleTask::DreamConsolidation).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_during_long_run_are_skipped() {
        let scheduler = CognitiveCycleScheduler::with_intervals(
            Arc::new(SlowRunner),
            [(CycleTask::GoalReflection, HOUR)],
        );
        scheduler.start();

        // Ticks at 1h..5h; runs start at 1h and 4h
        tokio::time::sleep(HOUR * 5 + Duration::from_secs(60)).await;

        let stats = scheduler.stats(CycleTask::GoalReflection).unwrap();
        assert_eq!(stats.runs_started, 2);
        assert_eq!(stats.runs_completed, 1);
        assert_eq!(stats.ticks_skipped, 3);

        scheduler.shutdown().await;
    }

    #[test]
    fn test_default_intervals() {
        let timing = TimingConfig::default();
        assert_eq!(CycleTask::GoalReflection.interval(&timing), HOUR);
        assert_eq!(CycleTask::SentimentSummary.interval(&timing), HOUR * 2);
        assert_eq!(CycleTask::DreamConsolidation.interval(&timing), HOUR * 24);
    }
}
