// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

mod cli;
mod settings;
mod stress;

use std::fs;

use anyhow::{bail, Context};
use tracing::{debug, info};

use crate::settings::StressParameters;

fn main() -> anyhow::Result<()> {
    let options = cli::options().run();

    tracing_subscriber::fmt()
        .with_max_level(options.verbosity_level)
        .with_writer(std::io::stderr)
        .init();

    let mut parameters = match &options.settings_path {
        Some(path) => settings::read(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?,
        None => StressParameters::default(),
    };
    if let Some(producers) = options.producers {
        parameters.producers = producers;
    }
    if let Some(consumers) = options.consumers {
        parameters.consumers = consumers;
    }
    if let Some(items_per_producer) = options.items_per_producer {
        parameters.items_per_producer = items_per_producer;
    }
    debug!("Running with {parameters:?}.");

    let report = stress::run(&parameters).context("The stress run could not be completed")?;

    if let Some(report_path) = &options.report_path {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize the report")?;
        fs::write(report_path, json).context("Failed to write the report file")?;
        info!("Wrote the report to {}.", report_path.display());
    }

    if !report.passed() {
        bail!(
            "Expected {} values exactly once each, received {} ({} duplicates, {} missing, {} out of order)",
            report.expected,
            report.received,
            report.duplicates,
            report.missing,
            report.out_of_order,
        );
    }

    info!("Every value was received exactly once.");
    Ok(())
}
