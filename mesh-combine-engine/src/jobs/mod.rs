//! Mesh combine job manager
//!
//! Jobs wait in a pending queue until a tick dispatches them to the worker
//! queue. Workers (and, when allowed, the dispatching thread) run them and
//! push outcomes to a result list the combiner drains. Every combine run
//! gets a generation number; aborting a generation drops its queued jobs
//! and throws away results that arrive later.
//!
//! The manager is an explicit object shared through `Arc`, so several
//! combiners can feed one worker pool.

mod cache;
mod job;
mod thread;

pub use cache::MeshCache;
pub use job::{JobFailure, JobHeader, JobOutcome, MeshCombineJob};
pub use thread::{ThreadState, WorkerSlot};

use crate::error::{CombineError, Result};
use crate::merge::{MeshBuffer, MeshBufferPool};
use crate::performance::{CombineMetrics, CombineMetricsStats, PerformanceTimer};
use crate::settings::{CombineJobMode, JobSettings, SettingsAdjustment};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use thread::WorkerPool;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pending: VecDeque<MeshCombineJob>,
    queued: VecDeque<MeshCombineJob>,
    running: usize,
    completed: Vec<JobOutcome>,
    /// Live generations and their unfinished job counts
    outstanding: HashMap<u64, usize>,
}

/// State shared with the worker threads
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<QueueState>,
    work_available: Condvar,
    job_finished: Condvar,
    cache: MeshCache,
    pool: MeshBufferPool,
    metrics: CombineMetrics,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one job taken from the queue; `running` was already counted
    pub(crate) fn execute(&self, job: MeshCombineJob, worker: Option<usize>, slot: Option<&WorkerSlot>) {
        let live = self.lock().outstanding.contains_key(&job.generation);
        if !live {
            self.metrics.record_discarded();
            self.lock().running -= 1;
            if let Some(slot) = slot {
                slot.set_state(ThreadState::IsFree);
            }
            self.job_finished.notify_all();
            return;
        }

        if let Some(slot) = slot {
            slot.set_state(ThreadState::IsRunning);
        }
        let header = job.header();
        let timer = PerformanceTimer::start(job.name.clone());
        let result = panic::catch_unwind(AssertUnwindSafe(|| job.run(&self.pool)))
            .unwrap_or_else(|payload| Err(CombineError::job_panicked(job.id, panic_message(&*payload))));
        let duration = timer.finish(&self.metrics);
        drop(job);

        match &result {
            Ok(output) => {
                self.metrics.record_job(output.vertices_in, output.vertices_out());
                debug!(job = header.id, name = %header.name, meshes = output.meshes.len(), ?duration, "job finished");
            }
            Err(e) => {
                self.metrics.record_failure();
                error!(job = header.id, name = %header.name, "job failed: {}", e);
            }
        }
        if let Some(slot) = slot {
            slot.record_job();
            slot.set_state(if result.is_ok() {
                ThreadState::IsFree
            } else {
                ThreadState::HasError
            });
        }

        let outcome = JobOutcome {
            header,
            worker,
            duration,
            result,
        };
        let stale = {
            let mut state = self.lock();
            state.running -= 1;
            match state.outstanding.get_mut(&outcome.header.generation) {
                Some(left) => {
                    *left = left.saturating_sub(1);
                    state.completed.push(outcome);
                    None
                }
                None => Some(outcome),
            }
        };
        if stale.is_some() {
            // Dropping the outcome returns its buffers to the pool.
            self.metrics.record_discarded();
        }
        drop(stale);
        self.job_finished.notify_all();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Snapshot of the manager for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManagerStatus {
    pub cores: usize,
    pub pending_jobs: usize,
    pub queued_jobs: usize,
    pub running_jobs: usize,
    pub finished_unclaimed: usize,
    pub worker_states: Vec<ThreadState>,
    pub worker_jobs_done: Vec<usize>,
    pub cached_meshes: usize,
    pub pooled_buffers: usize,
    pub total_buffers: usize,
    pub failed_jobs: usize,
}

impl JobManagerStatus {
    /// Jobs not finished yet
    pub fn unfinished(&self) -> usize {
        self.pending_jobs + self.queued_jobs + self.running_jobs
    }
}

/// Job engine shared by combiners
#[derive(Debug)]
pub struct MeshCombineJobManager {
    shared: Arc<Shared>,
    workers: Mutex<WorkerPool>,
    settings: Mutex<JobSettings>,
    cores: usize,
    next_job_id: AtomicU64,
    next_generation: AtomicU64,
    shut_down: AtomicBool,
}

impl MeshCombineJobManager {
    /// Create a manager sized for this machine
    pub fn new(settings: JobSettings) -> Self {
        Self::with_cores(settings, num_cpus::get())
    }

    /// Create a manager that assumes `cores` cores
    pub fn with_cores(mut settings: JobSettings, cores: usize) -> Self {
        let cores = cores.max(1);
        settings.sanitize(cores);
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            work_available: Condvar::new(),
            job_finished: Condvar::new(),
            cache: MeshCache::new(),
            pool: MeshBufferPool::new(MeshBuffer::default),
            metrics: CombineMetrics::new(),
        });
        let workers = WorkerPool::spawn(settings.worker_count(cores), &shared);
        info!(cores, workers = workers.len(), "mesh combine job manager started");
        Self {
            shared,
            workers: Mutex::new(workers),
            settings: Mutex::new(settings),
            cores,
            next_job_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    pub fn job_settings(&self) -> JobSettings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply new job settings, restarting workers if their count changes
    pub fn set_job_settings(&self, mut settings: JobSettings) -> Vec<SettingsAdjustment> {
        let notices = settings.sanitize(self.cores);
        let wanted = settings.worker_count(self.cores);
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings;

        if self.shut_down.load(Ordering::Acquire) {
            return notices;
        }
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.len() != wanted {
            workers.stop_and_join(&self.shared);
            *workers = WorkerPool::spawn(wanted, &self.shared);
            info!(workers = workers.len(), "combine workers restarted");
        }
        notices
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn mesh_cache(&self) -> &MeshCache {
        &self.shared.cache
    }

    pub fn buffer_pool(&self) -> &MeshBufferPool {
        &self.shared.pool
    }

    pub fn metrics(&self) -> CombineMetricsStats {
        self.shared.metrics.get_stats()
    }

    /// Zero every counter, including the failed job count
    pub fn reset_metrics(&self) {
        self.shared.metrics.reset();
    }

    pub(crate) fn combine_metrics(&self) -> &CombineMetrics {
        &self.shared.metrics
    }

    pub fn next_job_id(&self) -> u64 {
        self.next_job_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Open a new generation for a combine run
    pub fn begin_generation(&self) -> Result<u64> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CombineError::Shutdown);
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.shared.lock().outstanding.insert(generation, 0);
        Ok(generation)
    }

    /// Add jobs to the pending queue
    ///
    /// Jobs of a generation that is no longer live are dropped.
    pub fn enqueue(&self, jobs: Vec<MeshCombineJob>) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CombineError::Shutdown);
        }
        let mut state = self.shared.lock();
        for job in jobs {
            match state.outstanding.get_mut(&job.generation) {
                Some(left) => {
                    *left += 1;
                    state.pending.push_back(job);
                }
                None => self.shared.metrics.record_discarded(),
            }
        }
        Ok(())
    }

    fn runs_on_caller(&self, settings: &JobSettings) -> bool {
        settings.use_main_thread || self.worker_count() == 0
    }

    /// Move pending jobs to the workers
    ///
    /// In per-frame mode at most `combine_meshes_per_frame` jobs move per
    /// call. When the calling thread helps out it also runs queued jobs
    /// before returning. Returns the number of jobs dispatched.
    pub fn tick(&self) -> usize {
        let settings = self.job_settings();
        let limit = match settings.combine_job_mode {
            CombineJobMode::CombinePerFrame => settings.combine_meshes_per_frame,
            CombineJobMode::CombineAtOnce => usize::MAX,
        };
        let dispatched = self.dispatch(limit);
        if self.runs_on_caller(&settings) {
            self.drain_on_caller(None);
        }
        dispatched
    }

    fn dispatch(&self, limit: usize) -> usize {
        let dispatched = {
            let mut state = self.shared.lock();
            let count = limit.min(state.pending.len());
            let moved: Vec<_> = state.pending.drain(..count).collect();
            state.queued.extend(moved);
            count
        };
        if dispatched > 0 {
            self.shared.work_available.notify_all();
        }
        dispatched
    }

    /// Run queued jobs on this thread until the queue is empty or
    /// `generation` has nothing left
    fn drain_on_caller(&self, generation: Option<u64>) {
        loop {
            let job = {
                let mut state = self.shared.lock();
                if generation.is_some_and(|g| state.outstanding.get(&g).is_none_or(|&n| n == 0)) {
                    return;
                }
                match state.queued.pop_front() {
                    Some(job) => {
                        state.running += 1;
                        job
                    }
                    None => return,
                }
            };
            self.shared.execute(job, None, None);
        }
    }

    /// Dispatch everything and block until `generation` has finished
    pub fn run_generation(&self, generation: u64) {
        let settings = self.job_settings();
        self.dispatch(usize::MAX);
        let on_caller = self.runs_on_caller(&settings);
        loop {
            if on_caller {
                self.drain_on_caller(Some(generation));
            }
            let state = self.shared.lock();
            if state.outstanding.get(&generation).is_none_or(|&n| n == 0) {
                return;
            }
            if on_caller && !state.queued.is_empty() {
                continue;
            }
            // Pending jobs of this generation can only appear through
            // another enqueue; move them along too.
            if !state.pending.is_empty() {
                drop(state);
                self.dispatch(usize::MAX);
                continue;
            }
            let _state = self
                .shared
                .job_finished
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Jobs of `generation` not finished yet
    pub fn outstanding(&self, generation: u64) -> usize {
        self.shared
            .lock()
            .outstanding
            .get(&generation)
            .copied()
            .unwrap_or(0)
    }

    /// Take the finished outcomes of `generation`
    pub fn take_completed(&self, generation: u64) -> Vec<JobOutcome> {
        let mut state = self.shared.lock();
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.completed)
            .into_iter()
            .partition(|o| o.header.generation == generation);
        state.completed = kept;
        taken
    }

    /// Abort a generation
    ///
    /// Pending and queued jobs are dropped, results still in flight are
    /// thrown away when they arrive, unclaimed results are released.
    /// Returns the number of jobs dropped.
    pub fn abort(&self, generation: u64) -> usize {
        let dropped = self.retire(generation);
        if dropped > 0 {
            info!(generation, dropped, "combine jobs aborted");
        }
        dropped
    }

    /// Close a generation that finished normally
    pub fn release(&self, generation: u64) {
        self.retire(generation);
    }

    fn retire(&self, generation: u64) -> usize {
        let (dropped_jobs, dropped_results) = {
            let mut state = self.shared.lock();
            if state.outstanding.remove(&generation).is_none() {
                return 0;
            }
            let before = state.pending.len() + state.queued.len();
            state.pending.retain(|j| j.generation != generation);
            state.queued.retain(|j| j.generation != generation);
            let dropped = before - state.pending.len() - state.queued.len();

            let (results, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.completed)
                .into_iter()
                .partition(|o| o.header.generation == generation);
            state.completed = kept;
            (dropped, results)
        };
        let count = dropped_jobs + dropped_results.len();
        self.shared
            .metrics
            .jobs_discarded
            .fetch_add(count, Ordering::Relaxed);
        // Buffers go back to the pool outside the queue lock.
        drop(dropped_results);
        self.shared.job_finished.notify_all();
        count
    }

    /// Snapshot for display
    pub fn status(&self) -> JobManagerStatus {
        let (pending, queued, running, finished) = {
            let state = self.shared.lock();
            (
                state.pending.len(),
                state.queued.len(),
                state.running,
                state.completed.len(),
            )
        };
        let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        JobManagerStatus {
            cores: self.cores,
            pending_jobs: pending,
            queued_jobs: queued,
            running_jobs: running,
            finished_unclaimed: finished,
            worker_states: workers.slots().iter().map(|s| s.state()).collect(),
            worker_jobs_done: workers.slots().iter().map(|s| s.jobs_done()).collect(),
            cached_meshes: self.shared.cache.len(),
            pooled_buffers: self.shared.pool.size(),
            total_buffers: self.shared.pool.created(),
            failed_jobs: self.shared.metrics.get_stats().jobs_failed,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop the workers and release every cached resource
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let generations: Vec<u64> = self.shared.lock().outstanding.keys().copied().collect();
        for generation in generations {
            self.retire(generation);
        }
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop_and_join(&self.shared);
        // Late results of retired generations may still sit in the list.
        let leftovers = std::mem::take(&mut self.shared.lock().completed);
        if !leftovers.is_empty() {
            warn!(count = leftovers.len(), "dropping unclaimed combine results");
        }
        drop(leftovers);
        self.shared.cache.clear();
        self.shared.pool.clear();
        info!("mesh combine job manager shut down");
    }
}

impl Drop for MeshCombineJobManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
