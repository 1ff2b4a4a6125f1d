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
use std::path::Path;

use serde::Deserialize;

mod audio;
mod error;
mod keyboard;
mod kit;
mod metronome;
mod midi;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::keyboard::Keyboard;
pub use self::kit::{Engine, HiHatPedal, Kit, NoteOffBehavior};
pub use self::metronome::Metronome;
pub use self::midi::Midi;

/// The top level configuration of the instrument. Every section is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Config {
    /// The drum kit.
    #[serde(default)]
    kit: Kit,

    /// The audio output.
    #[serde(default)]
    audio: Audio,

    /// The MIDI input.
    #[serde(default)]
    midi: Midi,

    /// The practice metronome.
    #[serde(default)]
    metronome: Metronome,

    /// Computer keyboard pads.
    #[serde(default)]
    keyboard: Keyboard,
}

impl Config {
    /// Loads the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses the configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Config, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can't be expressed in the types.
    fn validate(&self) -> Result<(), ConfigError> {
        self.kit.resources()?;
        self.kit.release_time()?;
        self.metronome.tempo_ramp()?;
        self.keyboard.mapping()?;
        Ok(())
    }

    pub fn kit(&self) -> &Kit {
        &self.kit
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn midi(&self) -> &Midi {
        &self.midi
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }
}
