// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Multithreading utilities for handing work off between threads.
//!
//! The two building blocks are [`BlockingQueue`], an unbounded FIFO which any
//! number of threads can push into and pop from, and [`ScopedThread`], an owned
//! thread handle which joins the thread when dropped. [`WorkerPool`] combines
//! the two into the usual "workers pop jobs, push results" arrangement, using
//! [`Job::Stop`] sentinels to shut the workers down.
//!
//! Nothing in here knows about rendering, windows or files. The rest of the
//! engine passes values in and gets values out.

#![warn(missing_docs)]

mod blocking_queue;
mod scoped_thread;
mod worker_pool;

pub use blocking_queue::BlockingQueue;
pub use scoped_thread::{ScopedThread, ScopedThreadError};
pub use worker_pool::{available_threads, Job, WorkerPool, MAX_THREADS};
