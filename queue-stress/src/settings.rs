// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{fs, path::Path};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// The parameters of a single stress run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressParameters {
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: u32,
}

impl Default for StressParameters {
    fn default() -> Self {
        StressParameters {
            producers: 4,
            consumers: 4,
            items_per_producer: 1000,
        }
    }
}

impl StressParameters {
    /// Checks that the run can actually finish: without producers there's
    /// nobody to push the values, and without consumers nobody pops them.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.producers == 0 {
            bail!("At least one producer is needed");
        }
        if self.consumers == 0 {
            bail!("At least one consumer is needed");
        }
        Ok(())
    }
}

/// The stress settings file.
///
/// Has enum variants for breaking changes in the format of the settings file,
/// but [`read`] always returns the newest variant's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "settings_file_version", rename_all = "snake_case")]
pub enum StressSettings {
    V1(StressParameters),
}

/// Reads and parses the settings file. The file has to exist: the defaults are
/// only used when no settings file is given at all.
pub fn read(settings: &Path) -> anyhow::Result<StressParameters> {
    let contents =
        fs::read_to_string(settings).context("Failed to open the stress settings file")?;
    parse(&contents)
}

pub fn parse(settings: &str) -> anyhow::Result<StressParameters> {
    let settings: StressSettings =
        serde_json::from_str(settings).context("Failed to parse the stress settings file")?;

    // NOTE: When there's new versions of StressSettings, convert to the newest
    // here.
    let StressSettings::V1(parameters) = settings;
    Ok(parameters)
}
