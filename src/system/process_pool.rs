// src/system/process_pool.rs

//! # Process Pool
//!
//! Bounded admission control over child processes. At most `capacity`
//! commands run at once; extra submissions wait in FIFO order. An entry lives
//! while its command is queued or running; finishing removes it and adds it to
//! the completed or failed tally in the same step.

use crate::system::executor::{
    self, ChildProcessTracker, ExecutionError, ExecutionOptions, ExecutionResult,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ProcessPoolEntry {
    pub id: Uuid,
    pub command: String,
    pub args: Vec<String>,
    pub submitted_at: Instant,
    pub started_at: Option<Instant>,
    pub status: EntryStatus,
}

/// Aggregate counters. `active` and `queued` are computed from the live
/// entries, `completed` and `failed` from the finished tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessMetrics {
    pub active: usize,
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    entries: HashMap<Uuid, ProcessPoolEntry>,
    completed: usize,
    failed: usize,
}

pub struct ProcessPool {
    capacity: usize,
    slots: Arc<Semaphore>,
    state: Mutex<PoolState>,
    accepting: AtomicBool,
    tracker: RwLock<Option<Arc<dyn ChildProcessTracker>>>,
}

impl fmt::Debug for ProcessPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessPool")
            .field("capacity", &self.capacity)
            .field("metrics", &self.metrics())
            .field("accepting", &self.accepting)
            .finish_non_exhaustive()
    }
}

impl ProcessPool {
    /// Creates a pool. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            state: Mutex::new(PoolState::default()),
            accepting: AtomicBool::new(true),
            tracker: RwLock::new(None),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn set_child_process_tracker(&self, tracker: Arc<dyn ChildProcessTracker>) {
        let mut slot = self
            .tracker
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(tracker);
    }

    fn current_tracker(&self) -> Option<Arc<dyn ChildProcessTracker>> {
        self.tracker
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mark_running(&self, id: Uuid) {
        if let Some(entry) = self.lock_state().entries.get_mut(&id) {
            entry.started_at = Some(Instant::now());
            entry.status = EntryStatus::Running;
        }
    }

    fn finish(&self, id: Uuid, status: EntryStatus) {
        let mut state = self.lock_state();
        if state.entries.remove(&id).is_none() {
            return;
        }
        match status {
            EntryStatus::Failed => state.failed += 1,
            _ => state.completed += 1,
        }
    }

    /// Queues a command and runs it once a slot is free.
    ///
    /// Admission is FIFO among queued submissions. Completion order is not
    /// guaranteed. A command whose exit code is non-zero is still `Ok`; the
    /// entry is marked `Failed`.
    pub async fn submit(
        &self,
        command: &str,
        args: &[String],
        options: &ExecutionOptions,
    ) -> Result<ExecutionResult, ExecutionError> {
        let display = executor::display_command(command, args);
        if !self.is_accepting() {
            return Err(ExecutionError::PoolShutDown(display));
        }

        let id = Uuid::new_v4();
        self.lock_state().entries.insert(
            id,
            ProcessPoolEntry {
                id,
                command: command.to_string(),
                args: args.to_vec(),
                submitted_at: Instant::now(),
                started_at: None,
                status: EntryStatus::Queued,
            },
        );
        log::debug!("Queued [{}]: {}", id, display);

        // Remove the entry if this future is dropped while still queued.
        let queued_guard = scopeguard::guard(id, |id| {
            let mut state = self.lock_state();
            if state.entries.get(&id).map(|e| e.status) == Some(EntryStatus::Queued) {
                state.entries.remove(&id);
            }
        });

        // The semaphore is closed once shutdown has drained the pool, so a
        // submission that raced past the admission check is rejected here.
        let Ok(permit) = self.slots.clone().acquire_owned().await else {
            return Err(ExecutionError::PoolShutDown(display));
        };
        let id = scopeguard::ScopeGuard::into_inner(queued_guard);

        self.mark_running(id);
        let tracker = self.current_tracker();
        let outcome = executor::execute(command, args, options, tracker.as_deref()).await;

        let status = match &outcome {
            Ok(result) if result.success() => EntryStatus::Completed,
            _ => EntryStatus::Failed,
        };
        // The entry finishes before the permit is released, so the number of
        // running entries never exceeds the number of permits.
        self.finish(id, status);
        drop(permit);

        outcome
    }

    pub fn metrics(&self) -> ProcessMetrics {
        let state = self.lock_state();
        let initial = ProcessMetrics {
            completed: state.completed,
            failed: state.failed,
            ..Default::default()
        };
        state.entries.values().fold(initial, |mut metrics, entry| {
            match entry.status {
                EntryStatus::Queued => metrics.queued += 1,
                EntryStatus::Running => metrics.active += 1,
                EntryStatus::Completed => metrics.completed += 1,
                EntryStatus::Failed => metrics.failed += 1,
            }
            metrics
        })
    }

    /// A copy of the queued and running entries, oldest submission first.
    pub fn entries(&self) -> Vec<ProcessPoolEntry> {
        let mut entries: Vec<_> = self.lock_state().entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.submitted_at);
        entries
    }

    /// Stops accepting work, waits for queued and running commands to finish,
    /// then clears the pool state and closes the slots. Safe to call more
    /// than once.
    pub async fn shutdown(&self) {
        let was_accepting = self.accepting.swap(false, Ordering::SeqCst);
        if was_accepting {
            log::debug!("Shutting down process pool: {:?}", self.metrics());
        }

        // Waiting for every permit drains both running and already-queued work,
        // since the semaphore admits waiters in FIFO order.
        let permits = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        match self.slots.acquire_many(permits).await {
            Ok(all_slots) => {
                *self.lock_state() = PoolState::default();
                self.slots.close();
                drop(all_slots);
            }
            Err(_) => *self.lock_state() = PoolState::default(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Tracks how many children are alive at once.
    #[derive(Default)]
    struct ConcurrencyTracker {
        current: AtomicUsize,
        peak: AtomicUsize,
        spawned: AtomicUsize,
    }

    impl ChildProcessTracker for ConcurrencyTracker {
        fn on_spawn(&self, _pid: Option<u32>, _command: &str, _args: &[String]) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.spawned.fetch_add(1, Ordering::SeqCst);
        }

        fn on_exit(&self, _pid: Option<u32>, _command: &str, _exit_code: i32) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    fn captured() -> ExecutionOptions {
        ExecutionOptions {
            capture_output: true,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_running_entries_never_exceed_capacity() {
        let pool = Arc::new(ProcessPool::new(2));
        let tracker = Arc::new(ConcurrencyTracker::default());
        pool.set_child_process_tracker(tracker.clone());

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.submit("sh", &sh("sleep 0.2"), &captured()).await
            }));
        }

        // Sample the metrics while work is in flight.
        for _ in 0..10 {
            let metrics = pool.metrics();
            assert!(metrics.active <= 2, "{:?}", metrics);
            tokio::task::yield_now().await;
            std::thread::sleep(std::time::Duration::from_millis(20));
        }

        for handle in handles {
            assert!(handle.await.unwrap().unwrap().success());
        }

        assert!(tracker.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(tracker.spawned.load(Ordering::SeqCst), 6);
        assert_eq!(
            pool.metrics(),
            ProcessMetrics {
                active: 0,
                queued: 0,
                completed: 6,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_failed_commands_are_counted() {
        let pool = ProcessPool::new(1);
        let ok = pool.submit("sh", &sh("exit 0"), &captured()).await.unwrap();
        let bad = pool.submit("sh", &sh("exit 2"), &captured()).await.unwrap();

        assert!(ok.success());
        assert_eq!(bad.exit_code, 2);
        let metrics = pool.metrics();
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.failed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_rejects_new_work() {
        let pool = ProcessPool::new(2);
        pool.submit("sh", &sh("exit 0"), &captured()).await.unwrap();

        pool.shutdown().await;
        pool.shutdown().await;

        assert!(!pool.is_accepting());
        assert_eq!(pool.metrics(), ProcessMetrics::default());
        assert!(matches!(
            pool.submit("sh", &sh("exit 0"), &captured()).await,
            Err(ExecutionError::PoolShutDown(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_in_flight_work() {
        let pool = Arc::new(ProcessPool::new(1));
        let worker = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit("sh", &sh("sleep 0.3"), &captured()).await })
        };
        // Let the submission get admitted before shutting down.
        while pool.metrics().active == 0 {
            tokio::task::yield_now().await;
        }

        let started = Instant::now();
        pool.shutdown().await;
        assert!(started.elapsed() >= std::time::Duration::from_millis(100));
        assert!(worker.await.unwrap().unwrap().success());
    }

    #[tokio::test]
    async fn test_finished_entries_are_removed_and_tallied() {
        let pool = ProcessPool::new(2);
        pool.submit("sh", &sh("exit 0"), &captured()).await.unwrap();
        pool.submit("sh", &sh("exit 1"), &captured()).await.unwrap();

        assert!(pool.entries().is_empty());
        assert_eq!(
            pool.metrics(),
            ProcessMetrics {
                active: 0,
                queued: 0,
                completed: 1,
                failed: 1
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submission_racing_shutdown_is_rejected() {
        let pool = Arc::new(ProcessPool::new(1));
        let running = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit("sh", &sh("sleep 0.3"), &captured()).await })
        };
        while pool.metrics().active == 0 {
            tokio::task::yield_now().await;
        }

        let shutdown = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.shutdown().await })
        };
        while pool.is_accepting() {
            tokio::task::yield_now().await;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));

        // A submission that passed the admission check just before shutdown
        // flipped it.
        pool.accepting.store(true, Ordering::SeqCst);
        let late = pool.submit("sh", &sh("exit 0"), &captured()).await;

        assert!(matches!(late, Err(ExecutionError::PoolShutDown(_))));
        shutdown.await.unwrap();
        assert!(running.await.unwrap().unwrap().success());
        assert!(pool.entries().is_empty());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(ProcessPool::new(0).capacity(), 1);
    }
}
