// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{
    collections::VecDeque,
    fmt::{self, Debug},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
};

use crossbeam_utils::CachePadded;

/// Unbounded FIFO queue of `T` for passing values between threads.
///
/// Any number of threads can [`push`](BlockingQueue::push) and
/// [`pop`](BlockingQueue::pop) at the same time. Elements come out in the order
/// they were pushed in, but when multiple threads are blocked in `pop`, there's
/// no telling which one of them gets the next element.
///
/// There is no way to close the queue or to time out a `pop`. If consumers need
/// to be told to stop, push a sentinel value they recognize, like
/// [`Job::Stop`](crate::Job::Stop).
pub struct BlockingQueue<T> {
    /// The queued elements, oldest first. Only ever accessed while locked.
    ///
    /// Padded to a cache line so that queues allocated next to each other
    /// (e.g. the job and result queues of a worker pool) don't contend on the
    /// same line.
    queue: CachePadded<Mutex<VecDeque<T>>>,
    /// Notified once per push, while holding the `queue` lock.
    not_empty: Condvar,
}

impl<T> BlockingQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> BlockingQueue<T> {
        BlockingQueue {
            queue: CachePadded::new(Mutex::new(VecDeque::new())),
            not_empty: Condvar::new(),
        }
    }

    /// Pushes the element to the back of the queue, waking up one thread
    /// blocked in [`BlockingQueue::pop`], if there are any.
    pub fn push(&self, element: T) {
        let mut queue = self.lock();
        queue.push_back(element);
        // Notifying while still holding the lock: a popper can't be between
        // its emptiness check and its wait at this point, so the wake-up can't
        // get lost.
        self.not_empty.notify_one();
    }

    /// Removes and returns the element at the front of the queue, blocking
    /// until there is one.
    ///
    /// If nothing ever gets pushed, this blocks forever.
    pub fn pop(&self) -> T {
        let mut queue = self.lock();
        loop {
            // Checked after every wake-up, since the wake-up may be spurious,
            // or another popper might have gotten to the element first.
            if let Some(element) = queue.pop_front() {
                return element;
            }
            queue = self
                .not_empty
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Removes and returns the element at the front of the queue, or returns
    /// None right away if the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Returns true if the queue was empty at the time of the call.
    ///
    /// Other threads can push or pop right after this returns, so this is only
    /// useful as a hint, e.g. for logging. Don't use it to decide whether
    /// [`BlockingQueue::pop`] will block.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the amount of queued elements at the time of the call. Stale as
    /// soon as it's returned, in the same way as [`BlockingQueue::is_empty`].
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock can't leave the deque in a broken
        // state (none of the critical sections run user code), so poisoning
        // can be ignored.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        BlockingQueue::new()
    }
}

impl<T> Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use super::BlockingQueue;

    #[test]
    fn pushes_and_pops_in_fifo_order() {
        let queue = BlockingQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(1, queue.pop());
        queue.push(4);
        assert_eq!(2, queue.pop());
        assert_eq!(Some(3), queue.try_pop());
        assert_eq!(4, queue.pop());
        assert_eq!(None, queue.try_pop());
    }

    #[test]
    fn try_pop_on_empty_queue_returns_immediately() {
        let queue = BlockingQueue::<u32>::new();
        let start = Instant::now();
        for _ in 0..1000 {
            assert_eq!(None, queue.try_pop());
        }
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "try_pop took way too long on an empty queue, is it blocking?",
        );
    }

    #[test]
    fn is_empty_follows_pushes_and_pops() {
        let queue = BlockingQueue::new();
        assert!(queue.is_empty());
        queue.push("a");
        assert!(!queue.is_empty());
        queue.push("b");
        assert_eq!(2, queue.len());
        queue.pop();
        assert!(!queue.is_empty());
        queue.pop();
        assert!(queue.is_empty());
        assert_eq!(0, queue.len());
    }

    #[test]
    fn popped_values_match_pushed_values() {
        #[derive(Debug, Clone, PartialEq)]
        struct Payload {
            name: String,
            samples: Vec<f32>,
            next: Option<Box<Payload>>,
        }

        let payload = Payload {
            name: String::from("parent"),
            samples: vec![0.5, -1.0, 2.25],
            next: Some(Box::new(Payload {
                name: String::from("child"),
                samples: Vec::new(),
                next: None,
            })),
        };

        let queue = BlockingQueue::new();
        queue.push(payload.clone());
        assert_eq!(payload, queue.pop());

        let queue = BlockingQueue::new();
        queue.push(0xDEAD_BEEF_u64);
        assert_eq!(Some(0xDEAD_BEEF_u64), queue.try_pop());
    }

    #[test]
    fn dropping_the_queue_drops_queued_elements() {
        let tracker = Arc::new(());
        let queue = BlockingQueue::new();
        queue.push(tracker.clone());
        queue.push(tracker.clone());
        assert_eq!(3, Arc::strong_count(&tracker));
        drop(queue.pop());
        assert_eq!(2, Arc::strong_count(&tracker));
        drop(queue);
        assert_eq!(1, Arc::strong_count(&tracker));
    }

    #[test]
    #[cfg(not(target_os = "emscripten"))]
    fn pop_blocks_until_an_element_is_pushed() {
        let queue = Arc::new(BlockingQueue::new());
        let popper = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(
            !popper.is_finished(),
            "pop returned before anything was pushed",
        );

        let pushed_at = Instant::now();
        queue.push(String::from("hello"));
        let popped = popper.join().unwrap();
        assert_eq!("hello", popped);
        assert!(pushed_at.elapsed() < Duration::from_secs(5));
        assert!(queue.is_empty());
    }

    #[test]
    #[cfg(not(target_os = "emscripten"))]
    fn every_blocked_popper_gets_woken_up() {
        const POPPERS: usize = 8;
        let queue = BlockingQueue::new();
        thread::scope(|s| {
            let poppers = (0..POPPERS)
                .map(|_| s.spawn(|| queue.pop()))
                .collect::<Vec<_>>();
            thread::sleep(Duration::from_millis(20));
            for i in 0..POPPERS {
                queue.push(i);
            }
            let mut popped = poppers
                .into_iter()
                .map(|popper| popper.join().unwrap())
                .collect::<Vec<_>>();
            popped.sort_unstable();
            assert_eq!((0..POPPERS).collect::<Vec<_>>(), popped);
        });
    }

    #[test]
    #[cfg(not(target_os = "emscripten"))]
    fn concurrent_producers_and_consumers_lose_nothing() {
        const PRODUCERS: u32 = 4;
        const CONSUMERS: usize = 4;
        const ITEMS: u32 = 1000;

        // None is the sentinel telling a consumer to stop.
        let queue = BlockingQueue::<Option<u32>>::new();
        let received = thread::scope(|s| {
            let consumers = (0..CONSUMERS)
                .map(|_| {
                    s.spawn(|| {
                        let mut received = Vec::new();
                        while let Some(n) = queue.pop() {
                            received.push(n);
                        }
                        received
                    })
                })
                .collect::<Vec<_>>();

            let producers = (0..PRODUCERS)
                .map(|producer| {
                    let queue = &queue;
                    s.spawn(move || {
                        for i in 0..ITEMS {
                            queue.push(Some(producer * ITEMS + i));
                        }
                    })
                })
                .collect::<Vec<_>>();
            for producer in producers {
                producer.join().unwrap();
            }
            for _ in 0..CONSUMERS {
                queue.push(None);
            }

            consumers
                .into_iter()
                .map(|consumer| consumer.join().unwrap())
                .collect::<Vec<_>>()
        });

        // Each consumer should see each producer's values in the order they
        // were pushed.
        for values in &received {
            let mut latest_per_producer = [None; PRODUCERS as usize];
            for &n in values {
                let latest = &mut latest_per_producer[(n / ITEMS) as usize];
                assert!(latest.map_or(true, |latest| latest < n), "out of order: {n}");
                *latest = Some(n);
            }
        }

        let total: usize = received.iter().map(Vec::len).sum();
        let unique = received.iter().flatten().collect::<HashSet<_>>();
        assert_eq!((PRODUCERS * ITEMS) as usize, total);
        assert_eq!(total, unique.len(), "some values were popped twice");
        assert!(queue.is_empty());
    }
}
