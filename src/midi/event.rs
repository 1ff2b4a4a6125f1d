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

//! Decoding of raw channel voice messages into kit input events.

use midly::live::LiveEvent;
use midly::MidiMessage;
use tracing::debug;

/// Length of the channel voice messages the kit understands.
const MESSAGE_LEN: usize = 3;

/// The kind of an input event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    ControlChange,
}

/// A decoded input event. `number` is the note or controller number, `value` the
/// velocity or controller value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: EventKind,
    pub channel: u8,
    pub number: u8,
    pub value: u8,
}

impl InputEvent {
    /// Creates a Note On event. A velocity of zero produces a Note Off, the same way
    /// decoding does.
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> InputEvent {
        let kind = if velocity == 0 {
            EventKind::NoteOff
        } else {
            EventKind::NoteOn
        };
        InputEvent {
            kind,
            channel: channel & 0x0F,
            number: note & 0x7F,
            value: velocity & 0x7F,
        }
    }

    /// Creates a Note Off event.
    pub fn note_off(channel: u8, note: u8) -> InputEvent {
        InputEvent {
            kind: EventKind::NoteOff,
            channel: channel & 0x0F,
            number: note & 0x7F,
            value: 0,
        }
    }

    /// Creates a Control Change event.
    pub fn control_change(channel: u8, controller: u8, value: u8) -> InputEvent {
        InputEvent {
            kind: EventKind::ControlChange,
            channel: channel & 0x0F,
            number: controller & 0x7F,
            value: value & 0x7F,
        }
    }

    /// Decodes a raw three byte message. Anything that isn't a Note On, Note Off or
    /// Control Change message is skipped, as controllers routinely send clock and
    /// system messages the kit has no use for.
    pub fn decode(raw: &[u8]) -> Option<InputEvent> {
        if raw.len() != MESSAGE_LEN {
            debug!(len = raw.len(), "Skipping MIDI message with unexpected length");
            return None;
        }
        if raw[0] & 0x80 == 0 || raw[1] & 0x80 != 0 || raw[2] & 0x80 != 0 {
            debug!(raw = ?raw, "Skipping malformed MIDI message");
            return None;
        }

        let event = match LiveEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = ?e, "Failed to parse MIDI event");
                return None;
            }
        };

        let LiveEvent::Midi { channel, message } = event else {
            debug!(raw = ?raw, "Skipping non channel voice MIDI message");
            return None;
        };
        let channel = channel.as_int();

        match message {
            // Note On with velocity 0 is a Note Off on most controllers.
            MidiMessage::NoteOn { key, vel } => Some(InputEvent::note_on(
                channel,
                key.as_int(),
                vel.as_int(),
            )),
            MidiMessage::NoteOff { key, .. } => Some(InputEvent::note_off(channel, key.as_int())),
            MidiMessage::Controller { controller, value } => Some(InputEvent::control_change(
                channel,
                controller.as_int(),
                value.as_int(),
            )),
            _ => {
                debug!(raw = ?raw, "Skipping unsupported MIDI message");
                None
            }
        }
    }
}
