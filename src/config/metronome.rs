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
use std::time::Duration;

use serde::Deserialize;

use super::{kit::parse_duration, ConfigError};

pub const DEFAULT_BPM: u32 = 100;
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;
pub const DEFAULT_TEMPO_RAMP: Duration = Duration::from_millis(50);

/// A YAML representation of the practice metronome.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Metronome {
    /// Tempo in beats per minute (default: 100).
    bpm: Option<u32>,

    /// Beats per bar (default: 4).
    beats_per_bar: Option<u32>,

    /// Accent flag of each beat. Missing entries are filled with defaults.
    accents: Option<Vec<bool>>,

    /// Volume of each beat from 0.0 to 1.0. Missing entries are filled with 1.0.
    volumes: Option<Vec<f32>>,

    /// How long tempo changes take to settle (default: 50ms).
    tempo_ramp: Option<String>,
}

impl Metronome {
    pub fn bpm(&self) -> u32 {
        self.bpm.unwrap_or(DEFAULT_BPM)
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar.unwrap_or(DEFAULT_BEATS_PER_BAR)
    }

    pub fn accents(&self) -> Option<&[bool]> {
        self.accents.as_deref()
    }

    pub fn volumes(&self) -> Option<&[f32]> {
        self.volumes.as_deref()
    }

    /// Returns the tempo ramp time (default: 50ms).
    pub fn tempo_ramp(&self) -> Result<Duration, ConfigError> {
        match &self.tempo_ramp {
            Some(tempo_ramp) => parse_duration("metronome.tempo_ramp", tempo_ramp),
            None => Ok(DEFAULT_TEMPO_RAMP),
        }
    }
}

#[cfg(test)]
impl Metronome {
    /// Creates a metronome configuration (test only).
    pub fn new(bpm: u32, beats_per_bar: u32) -> Metronome {
        Metronome {
            bpm: Some(bpm),
            beats_per_bar: Some(beats_per_bar),
            accents: None,
            volumes: None,
            tempo_ramp: Some("0ms".to_string()),
        }
    }
}
