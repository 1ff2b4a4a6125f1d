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
use serde::Deserialize;

/// A YAML representation of the MIDI input.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Midi {
    /// The name (or part of the name) of the input device.
    device: Option<String>,
}

impl Midi {
    pub fn new(device: &str) -> Midi {
        Midi {
            device: Some(device.to_string()),
        }
    }

    /// Returns the input device, if one is configured.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }
}
