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
//! A MIDI drum kit: pads and keys are routed to kit voices and played through a
//! sample bank (or a synthesized fallback), with a practice metronome on the side.
pub mod audio;
pub mod config;
pub mod controller;
pub mod kit;
pub mod metronome;
pub mod midi;
pub mod playback;
pub mod router;
#[cfg(test)]
mod testutil;
