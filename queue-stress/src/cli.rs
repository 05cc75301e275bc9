// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;

use bpaf::{batteries::verbose_by_slice, construct, long, OptionParser, Parser};
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone)]
pub struct Options {
    pub verbosity_level: LevelFilter,
    pub producers: Option<usize>,
    pub consumers: Option<usize>,
    pub items_per_producer: Option<u32>,
    pub settings_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

pub fn options() -> OptionParser<Options> {
    let verbosity_level = verbose_by_slice(
        3,
        [
            LevelFilter::OFF,
            LevelFilter::ERROR,
            LevelFilter::WARN,
            LevelFilter::INFO,
            LevelFilter::DEBUG,
            LevelFilter::TRACE,
        ],
    );

    let producers = long("producers")
        .help("Amount of threads pushing values into the queue")
        .argument::<usize>("N")
        .optional();

    let consumers = long("consumers")
        .help("Amount of threads popping values from the queue")
        .argument::<usize>("N")
        .optional();

    let items_per_producer = long("items")
        .help("Amount of distinct values each producer pushes")
        .argument::<u32>("N")
        .optional();

    let settings_path = long("settings")
        .help("Reads the run parameters from this JSON file, the other flags override it")
        .argument::<PathBuf>("FILE")
        .complete_shell(bpaf::ShellComp::File {
            mask: Some("*.json"),
        })
        .optional();

    let report_path = long("report")
        .help("Writes the results of the run into this JSON file")
        .argument::<PathBuf>("FILE")
        .complete_shell(bpaf::ShellComp::File {
            mask: Some("*.json"),
        })
        .optional();

    construct!(Options {
        verbosity_level,
        producers,
        consumers,
        items_per_producer,
        settings_path,
        report_path,
    })
    .to_options()
    .descr("Hammers a blocking queue with producer and consumer threads and checks that every value arrives exactly once")
}
