// src/pool.rs

//! Bounded worker pool for per-archive work
//!
//! Metadata extraction and hashing are independent per archive, so they
//! are fanned out over a fixed number of threads. Callers block until the
//! whole batch is done; results come back in input order.
//!
//! There is no timeout. Long batches can be stopped through the pool's
//! `CancellationToken`: jobs that have not started yet are skipped and the
//! batch fails with `Error::Cancelled`.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// A unit of work handed to a pool
pub type Job<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Executes a batch of jobs and returns when all of them have finished
pub trait WorkerPool: Send + Sync {
    /// Run every job; fails with `Error::Cancelled` if the batch was cut short
    fn execute<'a>(&self, jobs: Vec<Job<'a>>) -> Result<()>;

    /// Number of jobs that may run at once
    fn parallelism(&self) -> usize;
}

/// Apply `f` to every item on `pool`, keeping input order
pub fn map<T, R, F>(pool: &dyn WorkerPool, items: Vec<T>, f: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let slots: Vec<Mutex<Option<R>>> = items.iter().map(|_| Mutex::new(None)).collect();

    {
        let f = &f;
        let slots = &slots;
        let jobs: Vec<Job<'_>> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                Box::new(move || {
                    let result = f(item);
                    *slots[i].lock() = Some(result);
                }) as Job<'_>
            })
            .collect();
        pool.execute(jobs)?;
    }

    slots
        .into_iter()
        .map(|slot| slot.into_inner().ok_or(Error::Cancelled))
        .collect()
}

/// Shared flag for stopping in-flight batches
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        warn!("Worker pool cancellation requested");
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the pool accepts work again
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Rayon-backed pool with a fixed thread count
pub struct RayonPool {
    pool: ThreadPool,
    workers: usize,
    cancel: CancellationToken,
}

impl RayonPool {
    /// Create a pool with `workers` threads (at least one)
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("prism-worker-{}", i))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to build worker pool: {}", e)))?;

        debug!("Started worker pool with {} threads", workers);
        Ok(Self {
            pool,
            workers,
            cancel: CancellationToken::new(),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl WorkerPool for RayonPool {
    fn execute<'a>(&self, jobs: Vec<Job<'a>>) -> Result<()> {
        let cancel = &self.cancel;
        self.pool.scope(|scope| {
            for job in jobs {
                scope.spawn(move |_| {
                    if !cancel.is_cancelled() {
                        job();
                    }
                });
            }
        });

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn parallelism(&self) -> usize {
        self.workers
    }
}

/// Runs jobs one after another on the calling thread
#[derive(Debug, Default, Clone)]
pub struct InlinePool {
    cancel: CancellationToken,
}

impl InlinePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl WorkerPool for InlinePool {
    fn execute<'a>(&self, jobs: Vec<Job<'a>>) -> Result<()> {
        for job in jobs {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            job();
        }
        Ok(())
    }

    fn parallelism(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_map_preserves_order() {
        let pool = RayonPool::new(4).unwrap();
        let items: Vec<u64> = (0..200).collect();
        let squares = map(&pool, items, |n| n * n).unwrap();
        assert_eq!(squares.len(), 200);
        assert!(squares.iter().enumerate().all(|(i, sq)| *sq == (i * i) as u64));
    }

    #[test]
    fn test_inline_pool_map() {
        let pool = InlinePool::new();
        let words = map(&pool, vec!["a", "bb", "ccc"], |w| w.len()).unwrap();
        assert_eq!(words, vec![1, 2, 3]);
    }

    #[test]
    fn test_map_borrows_environment() {
        let pool = RayonPool::new(2).unwrap();
        let offset = 10;
        let counter = AtomicUsize::new(0);
        let out = map(&pool, vec![1, 2, 3], |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            n + offset
        })
        .unwrap();
        assert_eq!(out, vec![11, 12, 13]);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancelled_inline_pool() {
        let pool = InlinePool::new();
        let token = pool.cancellation_token();
        let seen = AtomicUsize::new(0);

        let result = map(&pool, vec![1, 2, 3, 4], |n| {
            if n == 2 {
                token.cancel();
            }
            seen.fetch_add(1, Ordering::SeqCst);
            n
        });

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancelled_rayon_pool_rejects_batch() {
        let pool = RayonPool::new(2).unwrap();
        pool.cancellation_token().cancel();
        let result = map(&pool, vec![1, 2, 3], |n| n);
        assert!(matches!(result, Err(Error::Cancelled)));

        pool.cancellation_token().reset();
        assert_eq!(map(&pool, vec![1, 2, 3], |n| n).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let pool = RayonPool::new(0).unwrap();
        assert_eq!(pool.parallelism(), 1);
    }
}
