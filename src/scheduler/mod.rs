// src/scheduler/mod.rs
//
// Background task execution
//
// Two pools:
// - tasks:  fire-and-forget work, blocking threads spawned on demand
// - timers: delayed / fixed-rate work, one worker per hardware thread
//
// After cancel_all() nothing new is accepted. Work already running
// finishes; work queued but not started is dropped.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::error::{DbError, DbResult};

/// Idle fire-and-forget threads are kept this long before exiting.
const TASK_THREAD_KEEP_ALIVE: Duration = Duration::from_secs(60);

struct Pools {
    tasks: Runtime,
    timers: Runtime,
}

pub struct Scheduler {
    pools: Mutex<Option<Pools>>,
}

/// Handle to a delayed or repeating task.
#[derive(Debug)]
pub struct TaskHandle {
    inner: JoinHandle<()>,
}

impl TaskHandle {
    /// Stop future runs. A run already in progress completes.
    pub fn cancel(&self) {
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl Scheduler {
    /// Timer pool sized to the available hardware parallelism.
    pub fn new() -> DbResult<Self> {
        let parallelism = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::with_timer_threads(parallelism)
    }

    pub fn with_timer_threads(timer_threads: usize) -> DbResult<Self> {
        let tasks = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pooldb-task")
            .thread_keep_alive(TASK_THREAD_KEEP_ALIVE)
            .build()?;
        let timers = Builder::new_multi_thread()
            .worker_threads(timer_threads.max(1))
            .thread_name("pooldb-timer")
            .enable_time()
            .build()?;

        Ok(Self {
            pools: Mutex::new(Some(Pools { tasks, timers })),
        })
    }

    fn with_pools<R>(&self, f: impl FnOnce(&Pools) -> R) -> DbResult<R> {
        let guard = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(f).ok_or(DbError::SchedulerShutdown)
    }

    /// Submit fire-and-forget work. The caller never observes its outcome.
    /// A rejected task is dropped after the pool lock is released.
    pub fn run_task<F>(&self, task: F) -> DbResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let rejected = {
            let guard = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
            match guard.as_ref() {
                Some(pools) => {
                    // Detached: dropping the JoinHandle does not cancel the task
                    drop(pools.tasks.spawn_blocking(task));
                    None
                }
                None => Some(task),
            }
        };
        match rejected {
            None => Ok(()),
            Some(task) => {
                drop(task);
                Err(DbError::SchedulerShutdown)
            }
        }
    }

    pub fn schedule_delayed<F>(&self, task: F, delay: Duration) -> DbResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.with_pools(|pools| TaskHandle {
            inner: pools.timers.spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            }),
        })
    }

    /// Run `task` every `period` after `initial_delay`, at a fixed rate.
    pub fn schedule_repeating<F>(
        &self,
        mut task: F,
        initial_delay: Duration,
        period: Duration,
    ) -> DbResult<TaskHandle>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(DbError::InvalidSchedule(
                "repeating period must be greater than zero".to_string(),
            ));
        }

        self.with_pools(|pools| TaskHandle {
            inner: pools.timers.spawn(async move {
                let start = tokio::time::Instant::now() + initial_delay;
                let mut ticker = tokio::time::interval_at(start, period);
                loop {
                    ticker.tick().await;
                    task();
                }
            }),
        })
    }

    pub fn is_shut_down(&self) -> bool {
        self.pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop both pools. Not restartable.
    pub fn cancel_all(&self) {
        let pools = self
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pools) = pools {
            pools.tasks.shutdown_background();
            pools.timers.shutdown_background();
            info!("Scheduler shut down");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // shutdown_background never blocks, so dropping from a pool thread is safe
        let pools = self
            .pools
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pools) = pools {
            debug!("Scheduler dropped; stopping pools");
            pools.tasks.shutdown_background();
            pools.timers.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};

    #[test]
    fn test_run_task_executes_off_thread() {
        let scheduler = Scheduler::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();

        scheduler
            .run_task(move || {
                tx.send(std::thread::current().id()).unwrap();
            })
            .unwrap();

        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_many_tasks_run_concurrently() {
        let scheduler = Scheduler::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let barrier = Arc::new(std::sync::Barrier::new(4));

        // Would deadlock on a pool smaller than four threads
        for _ in 0..4 {
            let tx = tx.clone();
            let barrier = Arc::clone(&barrier);
            scheduler
                .run_task(move || {
                    barrier.wait();
                    tx.send(()).unwrap();
                })
                .unwrap();
        }

        for _ in 0..4 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
    }

    #[test]
    fn test_delayed_task_runs_after_delay() {
        let scheduler = Scheduler::with_timer_threads(1).unwrap();
        let (tx, rx) = mpsc::channel();
        let started = std::time::Instant::now();

        let handle = scheduler
            .schedule_delayed(move || tx.send(()).unwrap(), Duration::from_millis(50))
            .unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
        std::thread::sleep(Duration::from_millis(20));
        assert!(handle.is_finished());
    }

    #[test]
    fn test_cancelled_delayed_task_never_runs() {
        let scheduler = Scheduler::with_timer_threads(1).unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let handle = scheduler
            .schedule_delayed(
                move || flag.store(true, Ordering::SeqCst),
                Duration::from_millis(100),
            )
            .unwrap();
        handle.cancel();

        std::thread::sleep(Duration::from_millis(250));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_repeating_task_until_cancelled() {
        let scheduler = Scheduler::with_timer_threads(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::clone(&counter);

        let handle = scheduler
            .schedule_repeating(
                move || {
                    ticks.fetch_add(1, Ordering::SeqCst);
                },
                Duration::ZERO,
                Duration::from_millis(10),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(200));
        handle.cancel();
        let after_cancel = counter.load(Ordering::SeqCst);
        assert!(after_cancel >= 3, "only {} ticks", after_cancel);

        std::thread::sleep(Duration::from_millis(100));
        assert!(counter.load(Ordering::SeqCst) <= after_cancel + 1);
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let scheduler = Scheduler::with_timer_threads(1).unwrap();
        let result = scheduler.schedule_repeating(|| {}, Duration::ZERO, Duration::ZERO);
        assert!(matches!(result, Err(DbError::InvalidSchedule(_))));
    }

    #[test]
    fn test_cancel_all_rejects_new_work_and_drops_pending() {
        let scheduler = Scheduler::with_timer_threads(1).unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        scheduler
            .schedule_delayed(
                move || flag.store(true, Ordering::SeqCst),
                Duration::from_millis(100),
            )
            .unwrap();

        scheduler.cancel_all();
        assert!(scheduler.is_shut_down());
        assert!(matches!(
            scheduler.run_task(|| {}),
            Err(DbError::SchedulerShutdown)
        ));
        assert!(matches!(
            scheduler.schedule_delayed(|| {}, Duration::ZERO),
            Err(DbError::SchedulerShutdown)
        ));

        std::thread::sleep(Duration::from_millis(250));
        assert!(!fired.load(Ordering::SeqCst));

        // Idempotent
        scheduler.cancel_all();
    }

    #[test]
    fn test_running_task_finishes_after_cancel_all() {
        let scheduler = Scheduler::new().unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        scheduler
            .run_task(move || {
                started_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(100));
                done_tx.send(()).unwrap();
            })
            .unwrap();

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        scheduler.cancel_all();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
