// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Worker threads which process jobs from one [`BlockingQueue`] and push the
//! results into another.
//!
//! [`WorkerPool`] is the engine's standard way of getting work off the main
//! thread: the owner submits [`Job::Work`] items, the workers pop them in FIFO
//! order, run the pool's function on them, and push whatever it returns into
//! the result queue. The queues have no shutdown mechanism of their own, so the
//! pool stops its workers by pushing one [`Job::Stop`] per worker behind all
//! the submitted work, and then joins them.

use std::{num::NonZeroUsize, sync::Arc, thread};

use arrayvec::ArrayVec;
use tracing::{debug, trace};

use crate::{BlockingQueue, ScopedThread, ScopedThreadError};

/// The maximum amount of threads a [`WorkerPool`] can have.
/// [`available_threads`] and [`WorkerPool::new`] cap the thread count at this.
pub const MAX_THREADS: usize = 128;

/// A message for the worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job<T> {
    /// Something to process.
    Work(T),
    /// Sentinel: the worker popping this should stop processing jobs and exit.
    Stop,
}

/// Returns how many threads the system could run in parallel, capped at
/// [`MAX_THREADS`]. Falls back to 1 if the platform can't tell.
pub fn available_threads() -> usize {
    thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(MAX_THREADS)
}

/// A set of threads running the same function on submitted jobs.
///
/// The workers are [`ScopedThread`]s, so dropping the pool (or calling
/// [`WorkerPool::shutdown`]) blocks until every job submitted before it has
/// been processed and all the workers have exited.
///
/// If the function panics, the worker running it exits, and the panic is
/// resumed on the thread dropping the pool. Results of the job that panicked
/// never arrive, so [`WorkerPool::recv`] could block forever waiting for it.
pub struct WorkerPool<I, O> {
    jobs: Arc<BlockingQueue<Job<I>>>,
    results: Arc<BlockingQueue<O>>,
    workers: ArrayVec<ScopedThread, MAX_THREADS>,
}

impl<I: Send + 'static, O: Send + 'static> WorkerPool<I, O> {
    /// Spawns `thread_count` workers (at least 1, at most [`MAX_THREADS`]),
    /// each of which runs `func` on the jobs it pops.
    ///
    /// If spawning any of the threads fails, the workers spawned so far are
    /// stopped and joined before the error is returned.
    pub fn new<F>(thread_count: usize, func: F) -> Result<WorkerPool<I, O>, ScopedThreadError>
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        let thread_count = thread_count.clamp(1, MAX_THREADS);
        let func = Arc::new(func);

        let mut pool = WorkerPool {
            jobs: Arc::new(BlockingQueue::new()),
            results: Arc::new(BlockingQueue::new()),
            workers: ArrayVec::new(),
        };

        for index in 0..thread_count {
            let jobs = pool.jobs.clone();
            let results = pool.results.clone();
            let func = func.clone();
            let worker = ScopedThread::spawn(format!("worker-{index}"), move || {
                run_worker(&jobs, &results, &*func);
            })?;
            pool.workers.push(worker);
        }

        debug!("Spawned a worker pool with {thread_count} threads.");
        Ok(pool)
    }

    /// Spawns as many workers as [`available_threads`] returns.
    pub fn with_available_parallelism<F>(func: F) -> Result<WorkerPool<I, O>, ScopedThreadError>
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        WorkerPool::new(available_threads(), func)
    }
}

impl<I, O> WorkerPool<I, O> {
    /// Returns the amount of worker threads in this pool.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues up the item to be processed by one of the workers.
    pub fn submit(&self, item: I) {
        self.jobs.push(Job::Work(item));
    }

    /// Blocks until a worker has produced a result, and returns it.
    ///
    /// Results are returned in the order the workers finish them, which is only
    /// guaranteed to be the submission order with a single worker.
    pub fn recv(&self) -> O {
        self.results.pop()
    }

    /// Returns a finished result if there is one, without blocking.
    pub fn try_recv(&self) -> Option<O> {
        self.results.try_pop()
    }

    /// The queue the workers pop jobs from. Pushing a [`Job::Stop`] into it
    /// stops one worker early.
    pub fn job_queue(&self) -> &Arc<BlockingQueue<Job<I>>> {
        &self.jobs
    }

    /// The queue the workers push their results into.
    pub fn result_queue(&self) -> &Arc<BlockingQueue<O>> {
        &self.results
    }

    /// Waits for all submitted jobs to be processed, stops the workers, and
    /// returns the queue containing the results not received yet.
    pub fn shutdown(mut self) -> Arc<BlockingQueue<O>> {
        self.stop_workers();
        self.results.clone()
    }

    fn stop_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        trace!("Stopping {} workers.", self.workers.len());
        for _ in 0..self.workers.len() {
            self.jobs.push(Job::Stop);
        }
        // Each ScopedThread joins its thread when dropped.
        self.workers.clear();
        debug!("All workers stopped.");
    }
}

impl<I, O> Drop for WorkerPool<I, O> {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

fn run_worker<I, O>(
    jobs: &BlockingQueue<Job<I>>,
    results: &BlockingQueue<O>,
    func: &dyn Fn(I) -> O,
) {
    let mut processed: u64 = 0;
    while let Job::Work(item) = jobs.pop() {
        results.push(func(item));
        processed += 1;
    }
    trace!(
        "{} exiting after {processed} jobs.",
        thread::current().name().unwrap_or("worker"),
    );
}
