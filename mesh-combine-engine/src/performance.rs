//! Performance Monitoring and Buffer Pooling
//!
//! Counters for combine throughput, a timer for measuring individual
//! operations and a thread safe pool for reusing output buffers between
//! combines. Every job manager owns its own metrics and pools.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Counters for mesh combine operations
#[derive(Debug)]
pub struct CombineMetrics {
    /// Jobs that produced a result
    pub jobs_completed: AtomicUsize,
    /// Jobs that returned an error or panicked
    pub jobs_failed: AtomicUsize,
    /// Jobs or results thrown away by an abort
    pub jobs_discarded: AtomicUsize,
    /// Source vertices read by merges
    pub vertices_in: AtomicU64,
    /// Vertices written to output meshes
    pub vertices_out: AtomicU64,
    /// Total merge time in nanoseconds
    pub total_combine_time_ns: AtomicU64,
    /// Number of mesh cache hits
    pub cache_hits: AtomicUsize,
    /// Number of mesh cache misses
    pub cache_misses: AtomicUsize,
}

impl CombineMetrics {
    /// Create new combine metrics
    pub fn new() -> Self {
        Self {
            jobs_completed: AtomicUsize::new(0),
            jobs_failed: AtomicUsize::new(0),
            jobs_discarded: AtomicUsize::new(0),
            vertices_in: AtomicU64::new(0),
            vertices_out: AtomicU64::new(0),
            total_combine_time_ns: AtomicU64::new(0),
            cache_hits: AtomicUsize::new(0),
            cache_misses: AtomicUsize::new(0),
        }
    }

    /// Record a finished job
    pub fn record_job(&self, vertices_in: usize, vertices_out: usize) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        self.vertices_in
            .fetch_add(vertices_in as u64, Ordering::Relaxed);
        self.vertices_out
            .fetch_add(vertices_out as u64, Ordering::Relaxed);
    }

    /// Record a failed job
    pub fn record_failure(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job or result dropped by an abort
    pub fn record_discarded(&self) {
        self.jobs_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record merge time
    pub fn record_combine_time(&self, duration: Duration) {
        self.total_combine_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record cache miss
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics
    pub fn get_stats(&self) -> CombineMetricsStats {
        let completed = self.jobs_completed.load(Ordering::Relaxed);
        let vertices_in = self.vertices_in.load(Ordering::Relaxed);
        let vertices_out = self.vertices_out.load(Ordering::Relaxed);
        let time_ns = self.total_combine_time_ns.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);

        CombineMetricsStats {
            jobs_completed: completed,
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_discarded: self.jobs_discarded.load(Ordering::Relaxed),
            vertices_in,
            vertices_out,
            total_combine_time: Duration::from_nanos(time_ns),
            vertices_per_second: if time_ns > 0 {
                vertices_in as f64 / (time_ns as f64 / 1_000_000_000.0)
            } else {
                0.0
            },
            vertex_reduction: if vertices_in > 0 {
                1.0 - vertices_out as f64 / vertices_in as f64
            } else {
                0.0
            },
            cache_hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.jobs_completed.store(0, Ordering::Relaxed);
        self.jobs_failed.store(0, Ordering::Relaxed);
        self.jobs_discarded.store(0, Ordering::Relaxed);
        self.vertices_in.store(0, Ordering::Relaxed);
        self.vertices_out.store(0, Ordering::Relaxed);
        self.total_combine_time_ns.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}

impl Default for CombineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineMetricsStats {
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub jobs_discarded: usize,
    pub vertices_in: u64,
    pub vertices_out: u64,
    pub total_combine_time: Duration,
    pub vertices_per_second: f64,
    /// Fraction of input vertices removed by culling and welding
    pub vertex_reduction: f64,
    pub cache_hit_rate: f64,
}

/// Performance timer for measuring operations
pub struct PerformanceTimer {
    start: Instant,
    operation: String,
}

impl PerformanceTimer {
    /// Start timing an operation
    pub fn start(operation: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.into(),
        }
    }

    /// Time elapsed so far
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Finish timing and record the result
    pub fn finish(self, metrics: &CombineMetrics) -> Duration {
        let duration = self.start.elapsed();
        metrics.record_combine_time(duration);
        debug!(operation = %self.operation, ?duration, "operation finished");
        duration
    }
}

type Slots<T> = Arc<Mutex<Vec<T>>>;

/// Memory pool for reducing allocations
///
/// Items taken from the pool come back on drop, from any thread.
pub struct MemoryPool<T> {
    pool: Slots<T>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
    created: AtomicUsize,
}

impl<T> MemoryPool<T> {
    /// Create a new memory pool
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            pool: Arc::new(Mutex::new(Vec::new())),
            factory: Box::new(factory),
            created: AtomicUsize::new(0),
        }
    }

    /// Get an item from the pool or create a new one
    pub fn get(&self) -> PooledItem<T> {
        let reused = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let item = reused.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            (self.factory)()
        });
        PooledItem {
            item: Some(item),
            pool: Arc::clone(&self.pool),
        }
    }

    /// Get the number of idle items in the pool
    pub fn size(&self) -> usize {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Get the number of items the factory produced
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Drop every idle item
    pub fn clear(&self) {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<T> std::fmt::Debug for MemoryPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("idle", &self.size())
            .field("created", &self.created())
            .finish()
    }
}

/// An item borrowed from a memory pool
pub struct PooledItem<T> {
    // Always `Some` until dropped.
    item: Option<T>,
    pool: Slots<T>,
}

impl<T> std::ops::Deref for PooledItem<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.item.as_ref().expect("pooled item is present until drop")
    }
}

impl<T> std::ops::DerefMut for PooledItem<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.item.as_mut().expect("pooled item is present until drop")
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PooledItem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledItem").field(&self.item).finish()
    }
}

impl<T> Drop for PooledItem<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
            pool.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_combine_metrics() {
        let metrics = CombineMetrics::new();

        metrics.record_job(100, 40);
        metrics.record_combine_time(Duration::from_millis(10));
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_failure();

        let stats = metrics.get_stats();
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(stats.vertices_in, 100);
        assert!((stats.vertex_reduction - 0.6).abs() < 1e-9);
        assert!((stats.cache_hit_rate - 0.5).abs() < 1e-9);
        assert!(stats.vertices_per_second > 0.0);

        metrics.reset();
        assert_eq!(metrics.get_stats().jobs_completed, 0);
    }

    #[test]
    fn test_performance_timer() {
        let metrics = CombineMetrics::new();
        let timer = PerformanceTimer::start("test_operation");
        thread::sleep(Duration::from_millis(10));
        let duration = timer.finish(&metrics);
        assert!(duration >= Duration::from_millis(10));
        assert!(metrics.get_stats().total_combine_time >= Duration::from_millis(10));
    }

    #[test]
    fn test_memory_pool() {
        let pool = MemoryPool::new(|| Vec::<u8>::with_capacity(1024));

        {
            let mut item1 = pool.get();
            item1.push(42);
            assert_eq!(item1.len(), 1);
        } // item1 is returned to pool here

        assert_eq!(pool.size(), 1);
        {
            let mut item2 = pool.get();
            item2.clear();
            assert_eq!(item2.len(), 0);
            assert!(item2.capacity() >= 1024);
        }
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn test_memory_pool_returns_from_other_threads() {
        let pool = MemoryPool::new(Vec::<u32>::new);
        let item = pool.get();
        thread::spawn(move || drop(item)).join().unwrap();
        assert_eq!(pool.size(), 1);

        pool.clear();
        assert_eq!(pool.size(), 0);
    }
}
