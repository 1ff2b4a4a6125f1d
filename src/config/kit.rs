// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{collections::HashMap, path::Path, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;
use crate::kit::Sound;

/// Directory samples are loaded from unless configured.
const DEFAULT_SAMPLES_DIR: &str = "samples";

/// Fade applied when a voice is choked or released.
const DEFAULT_RELEASE_TIME: Duration = Duration::from_millis(30);

/// Foot controller CC number.
const DEFAULT_PEDAL_CONTROLLER: u8 = 4;

/// Pedal values above this open the hi-hat.
const DEFAULT_PEDAL_THRESHOLD: u8 = 64;

/// Which strategy the kit starts with.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// Play samples, falling back to synthesis if they can't be loaded.
    #[default]
    Sample,
    /// Only synthesize.
    Synth,
}

/// Behavior when a Note Off event is received for a ringing voice.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoteOffBehavior {
    /// Let the sound play to completion, ignoring Note Off.
    #[default]
    PlayToCompletion,
    /// Fade the voice out over the release time.
    Release,
}

/// Hi-hat foot controller settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct HiHatPedal {
    /// The control change number of the pedal.
    controller: Option<u8>,

    /// Pedal values above this open the hi-hat.
    threshold: Option<u8>,
}

impl HiHatPedal {
    pub fn controller(&self) -> u8 {
        self.controller.unwrap_or(DEFAULT_PEDAL_CONTROLLER)
    }

    pub fn threshold(&self) -> u8 {
        self.threshold.unwrap_or(DEFAULT_PEDAL_THRESHOLD)
    }
}

/// A YAML representation of the drum kit.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Kit {
    /// The preferred playback engine.
    #[serde(default)]
    engine: Engine,

    /// The directory samples are resolved against.
    samples: Option<String>,

    /// Resource overrides by sound name.
    #[serde(default)]
    resources: HashMap<String, String>,

    /// Behavior on Note Off.
    #[serde(default)]
    note_off: NoteOffBehavior,

    /// Fade time for chokes and releases.
    release_time: Option<String>,

    /// Hi-hat pedal settings.
    hi_hat_pedal: Option<HiHatPedal>,
}

impl Kit {
    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Returns the sample directory (default: samples).
    pub fn samples_dir(&self) -> &Path {
        Path::new(self.samples.as_deref().unwrap_or(DEFAULT_SAMPLES_DIR))
    }

    /// Returns the resource name of every sound, indexed by [Sound::index].
    pub fn resources(&self) -> Result<[String; Sound::COUNT], ConfigError> {
        let mut resources = Sound::ALL.map(|sound| sound.default_resource().to_string());
        for (name, resource) in &self.resources {
            let sound =
                Sound::from_name(name).ok_or_else(|| ConfigError::UnknownSound(name.clone()))?;
            resources[sound.index()] = resource.clone();
        }
        Ok(resources)
    }

    pub fn note_off(&self) -> NoteOffBehavior {
        self.note_off
    }

    /// Returns the release fade time (default: 30ms).
    pub fn release_time(&self) -> Result<Duration, ConfigError> {
        match &self.release_time {
            Some(release_time) => parse_duration("kit.release_time", release_time),
            None => Ok(DEFAULT_RELEASE_TIME),
        }
    }

    pub fn hi_hat_pedal(&self) -> HiHatPedal {
        self.hi_hat_pedal.clone().unwrap_or_default()
    }
}

/// Parses a human readable duration such as 50ms.
pub(super) fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Duration::from)
        .map_err(|e| ConfigError::Duration {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
