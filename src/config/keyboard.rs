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
use std::collections::HashMap;

use serde::Deserialize;

use super::ConfigError;
use crate::kit;

/// Keys used when no mapping is configured.
const DEFAULT_KEYS: [(char, u8); 11] = [
    ('a', 36),
    ('s', 38),
    ('d', 42),
    ('f', 46),
    ('g', 44),
    ('h', 37),
    ('j', 48),
    ('k', 45),
    ('l', 41),
    ('u', 49),
    ('i', 51),
];

/// A YAML representation of the computer keyboard pads.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Keyboard {
    /// Maps a key to the note it plays.
    keys: Option<HashMap<String, u8>>,
}

impl Keyboard {
    /// Returns the key to note mapping. Keys are matched case-insensitively.
    pub fn mapping(&self) -> Result<HashMap<char, u8>, ConfigError> {
        let Some(keys) = &self.keys else {
            return Ok(DEFAULT_KEYS.into_iter().collect());
        };

        keys.iter()
            .map(|(key, note)| {
                let mut chars = key.chars();
                let (Some(c), None) = (chars.next(), chars.next()) else {
                    return Err(ConfigError::InvalidKey(key.clone()));
                };
                if kit::route(*note).is_none() {
                    return Err(ConfigError::UnmappedNote {
                        key: key.clone(),
                        note: *note,
                    });
                }
                Ok((c.to_ascii_lowercase(), *note))
            })
            .collect()
    }
}
