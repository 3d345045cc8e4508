//! Worker threads
//!
//! Each worker publishes its state through an atomic so the host can poll
//! it without taking the queue lock.

use super::Shared;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, error};

/// What a worker is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ThreadState {
    /// Waiting for work
    IsFree = 0,
    /// Took a job, not started yet
    IsReady = 1,
    IsRunning = 2,
    /// The last job failed; the worker keeps serving
    HasError = 3,
}

impl ThreadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ThreadState::IsReady,
            2 => ThreadState::IsRunning,
            3 => ThreadState::HasError,
            _ => ThreadState::IsFree,
        }
    }
}

/// Shared view of one worker
#[derive(Debug)]
pub struct WorkerSlot {
    state: AtomicU8,
    jobs_done: AtomicUsize,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ThreadState::IsFree as u8),
            jobs_done: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ThreadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn jobs_done(&self) -> usize {
        self.jobs_done.load(Ordering::Relaxed)
    }

    pub(crate) fn record_job(&self) {
        self.jobs_done.fetch_add(1, Ordering::Relaxed);
    }
}

/// A set of running workers
#[derive(Debug, Default)]
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    slots: Vec<Arc<WorkerSlot>>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `count` workers; a worker that fails to spawn is left out
    pub fn spawn(count: usize, shared: &Arc<Shared>) -> Self {
        let mut pool = WorkerPool::default();
        for index in 0..count {
            let slot = Arc::new(WorkerSlot::new());
            let worker_shared = Arc::clone(shared);
            let worker_slot = Arc::clone(&slot);
            let stop = Arc::clone(&pool.stop);
            let spawned = std::thread::Builder::new()
                .name(format!("mesh-combine-{}", index))
                .spawn(move || worker_loop(index, &worker_shared, &worker_slot, &stop));
            match spawned {
                Ok(handle) => {
                    pool.handles.push(handle);
                    pool.slots.push(slot);
                }
                Err(e) => {
                    error!(index, "failed to spawn combine worker: {}", e);
                    break;
                }
            }
        }
        debug!(workers = pool.slots.len(), "combine workers started");
        pool
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Arc<WorkerSlot>] {
        &self.slots
    }

    /// Ask every worker to stop and wait for them
    ///
    /// Workers finish the job they are running first.
    pub fn stop_and_join(&mut self, shared: &Shared) {
        {
            // Set under the queue lock so no worker misses the wakeup.
            let _state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            self.stop.store(true, Ordering::Release);
        }
        shared.work_available.notify_all();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("combine worker exited with a panic");
            }
        }
        self.slots.clear();
    }
}

fn worker_loop(index: usize, shared: &Shared, slot: &WorkerSlot, stop: &AtomicBool) {
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if stop.load(Ordering::Acquire) {
                    return;
                }
                if let Some(job) = state.queued.pop_front() {
                    state.running += 1;
                    break job;
                }
                state = shared
                    .work_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        slot.set_state(ThreadState::IsReady);
        shared.execute(job, Some(index), Some(slot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_state_round_trip() {
        let slot = WorkerSlot::new();
        assert_eq!(slot.state(), ThreadState::IsFree);
        for state in [
            ThreadState::IsReady,
            ThreadState::IsRunning,
            ThreadState::HasError,
            ThreadState::IsFree,
        ] {
            slot.set_state(state);
            assert_eq!(slot.state(), state);
        }
    }
}
