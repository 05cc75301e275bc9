// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{sync::Arc, time::Instant};

use anyhow::{anyhow, Context};
use serde::Serialize;
use threading::{BlockingQueue, ScopedThread, ScopedThreadError};
use tracing::{debug, error, info, warn};

use crate::settings::StressParameters;

/// What happened during a stress run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StressReport {
    pub parameters: StressParameters,
    /// How many values should've been received in total.
    pub expected: u64,
    /// How many values were received in total, duplicates included.
    pub received: u64,
    /// Values received more than once.
    pub duplicates: u64,
    /// Values which were pushed but never received.
    pub missing: u64,
    /// Values which a consumer received before an older value from the same
    /// producer.
    pub out_of_order: u64,
    /// How many values each consumer received.
    pub per_consumer: Vec<u64>,
    pub elapsed_seconds: f64,
}

impl StressReport {
    pub fn passed(&self) -> bool {
        self.received == self.expected
            && self.duplicates == 0
            && self.missing == 0
            && self.out_of_order == 0
    }
}

/// Runs the producers and consumers to completion and checks what the
/// consumers got.
///
/// Producer `p` pushes the values `p * items .. (p + 1) * items` in increasing
/// order. Consumers pop until they get a `None`, one of which is pushed per
/// consumer after every producer has finished.
pub fn run(parameters: &StressParameters) -> anyhow::Result<StressReport> {
    run_with_spawner(parameters, |name, f| ScopedThread::spawn(name, f))
}

type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// [`run`], with `spawn` starting the producer and consumer threads.
fn run_with_spawner<S>(parameters: &StressParameters, mut spawn: S) -> anyhow::Result<StressReport>
where
    S: FnMut(String, ThreadBody) -> Result<ScopedThread, ScopedThreadError>,
{
    parameters.validate()?;
    let StressParameters {
        producers,
        consumers,
        items_per_producer,
    } = *parameters;
    let items = u64::from(items_per_producer);
    let expected = (producers as u64)
        .checked_mul(items)
        .context("Too many values to push in total")?;

    info!(
        "Starting {producers} producers pushing {items} values each, and {consumers} consumers.",
    );
    let start = Instant::now();

    let queue = Arc::new(BlockingQueue::<Option<u64>>::new());
    let received = Arc::new(BlockingQueue::<(usize, Vec<u64>)>::new());

    // Consumers first, so that they're already blocked in pop() when the
    // first values arrive.
    let mut consumer_threads = Vec::with_capacity(consumers);
    for consumer in 0..consumers {
        let thread_queue = queue.clone();
        let received = received.clone();
        let thread = spawn(
            format!("consumer-{consumer}"),
            Box::new(move || {
                let mut values = Vec::new();
                while let Some(value) = thread_queue.pop() {
                    values.push(value);
                }
                debug!("Consumer {consumer} received {} values.", values.len());
                received.push((consumer, values));
            }),
        );
        match thread {
            Ok(thread) => consumer_threads.push(thread),
            Err(err) => {
                // The consumers spawned so far would block forever in pop()
                // without their sentinels, and dropping them would join them.
                stop_consumers(&queue, consumer_threads.len());
                return Err(err).context("Failed to spawn a consumer thread");
            }
        }
    }

    let mut producer_panicked = false;
    let mut producer_threads = Vec::with_capacity(producers);
    for producer in 0..producers as u64 {
        let thread_queue = queue.clone();
        let thread = spawn(
            format!("producer-{producer}"),
            Box::new(move || {
                for i in 0..items {
                    thread_queue.push(Some(producer * items + i));
                }
                debug!("Producer {producer} finished pushing.");
            }),
        );
        match thread {
            Ok(thread) => producer_threads.push(thread),
            Err(err) => {
                // Joins the producers, so the sentinels end up behind their
                // values.
                drop(producer_threads);
                stop_consumers(&queue, consumer_threads.len());
                return Err(err).context("Failed to spawn a producer thread");
            }
        }
    }

    for thread in producer_threads {
        if thread.join().is_err() {
            producer_panicked = true;
        }
    }
    stop_consumers(&queue, consumers);

    let mut consumer_panicked = false;
    for thread in consumer_threads {
        if thread.join().is_err() {
            consumer_panicked = true;
        }
    }

    if producer_panicked || consumer_panicked {
        return Err(anyhow!("A producer or consumer thread panicked"));
    }

    let mut per_consumer_values = vec![Vec::new(); consumers];
    while let Some((consumer, values)) = received.try_pop() {
        per_consumer_values[consumer] = values;
    }

    let report = check(parameters, expected, &per_consumer_values, start);
    info!(
        "Received {}/{} values in {:.3} seconds.",
        report.received, report.expected, report.elapsed_seconds,
    );
    if !report.passed() {
        error!(
            "The queue misbehaved: {} duplicates, {} missing, {} out of order.",
            report.duplicates, report.missing, report.out_of_order,
        );
    }
    Ok(report)
}

fn stop_consumers(queue: &BlockingQueue<Option<u64>>, consumers: usize) {
    for _ in 0..consumers {
        queue.push(None);
    }
}

fn check(
    parameters: &StressParameters,
    expected: u64,
    per_consumer_values: &[Vec<u64>],
    start: Instant,
) -> StressReport {
    let items = u64::from(parameters.items_per_producer);
    let mut seen = vec![false; expected as usize];
    let mut duplicates = 0;
    let mut out_of_order = 0;

    for (consumer, values) in per_consumer_values.iter().enumerate() {
        let mut latest_per_producer: Vec<Option<u64>> = vec![None; parameters.producers];
        for &value in values {
            let Some(was_seen) = seen.get_mut(value as usize) else {
                warn!("Consumer {consumer} received {value}, which was never pushed.");
                continue;
            };
            if *was_seen {
                duplicates += 1;
            }
            *was_seen = true;

            let latest = &mut latest_per_producer[(value / items) as usize];
            if latest.is_some_and(|latest| latest >= value) {
                warn!("Consumer {consumer} received {value} after {latest:?}.");
                out_of_order += 1;
            }
            *latest = Some(value);
        }
    }

    let received_unique = seen.iter().filter(|seen| **seen).count() as u64;
    StressReport {
        parameters: *parameters,
        expected,
        received: per_consumer_values.iter().map(|v| v.len() as u64).sum(),
        duplicates,
        missing: expected - received_unique,
        out_of_order,
        per_consumer: per_consumer_values
            .iter()
            .map(|v| v.len() as u64)
            .collect(),
        elapsed_seconds: start.elapsed().as_secs_f64(),
    }
}
