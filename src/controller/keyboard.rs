// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::{collections::HashMap, io};

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::kit::Voice;
use crate::midi::InputEvent;

/// Keyboard pads play on the General MIDI percussion channel.
const KEYBOARD_CHANNEL: u8 = 9;

/// Velocity of a lower case key.
const VELOCITY: u8 = 100;

/// Velocity of an upper case (shifted) key.
const ACCENT_VELOCITY: u8 = 120;

const VARIANT: &str = ":variant";
const METRONOME: &str = ":metronome";
const BPM: &str = ":bpm";
const BEATS: &str = ":beats";

/// A driver that plays the kit from lines typed on stdin. Every mapped character in
/// a line is a pad hit; lines starting with a colon are commands.
pub struct Driver {
    keys: HashMap<char, u8>,
}

impl Driver {
    pub fn new(keys: HashMap<char, u8>) -> Driver {
        Driver { keys }
    }

    /// Reads and handles one line. Returns false at end of input.
    fn monitor_io<R, W>(
        keys: &HashMap<char, u8>,
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Pads, or command ({} <voice> <id>, {}, {} <n>, {} <n>): ",
            VARIANT, METRONOME, BPM, BEATS,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        let events = match input.trim() {
            line if line.starts_with(':') => Self::parse_command(line).into_iter().collect(),
            line => Self::parse_pads(keys, line),
        };
        for event in events {
            events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
        Ok(true)
    }

    fn parse_pads(keys: &HashMap<char, u8>, line: &str) -> Vec<Event> {
        line.chars()
            .filter_map(|c| {
                let note = keys.get(&c.to_ascii_lowercase())?;
                let velocity = if c.is_ascii_uppercase() {
                    ACCENT_VELOCITY
                } else {
                    VELOCITY
                };
                Some(Event::Input(InputEvent::note_on(
                    KEYBOARD_CHANNEL,
                    *note,
                    velocity,
                )))
            })
            .collect()
    }

    fn parse_command(line: &str) -> Option<Event> {
        let mut words = line.split_whitespace();
        let command = words.next()?.to_lowercase();
        let args: Vec<&str> = words.collect();

        let event = match (command.as_str(), args.as_slice()) {
            (VARIANT, [voice, variant]) => match Voice::from_name(&voice.to_lowercase()) {
                Some(voice) => Some(Event::Variant {
                    voice,
                    variant: variant.to_string(),
                }),
                None => {
                    warn!(voice, "Unknown voice");
                    None
                }
            },
            (METRONOME, []) => Some(Event::ToggleMetronome),
            (BPM, [bpm]) => bpm.parse().ok().map(Event::Tempo),
            (BEATS, [beats]) => beats.parse().ok().map(Event::BeatsPerBar),
            _ => None,
        };
        if event.is_none() {
            warn!(input = line, "Unrecognized command");
        }
        event
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let keys = self.keys.clone();
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!(keys = keys.len(), "Keyboard driver started.");

            while Self::monitor_io(&keys, &events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard input closed.");
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use super::Driver;
    use crate::controller::Event;
    use crate::kit::Voice;
    use crate::midi::InputEvent;

    fn get_events(input: &str) -> Result<(bool, Vec<Event>), io::Error> {
        let keys = HashMap::from([('a', 36), ('s', 38)]);
        let (sender, mut receiver) = mpsc::channel::<Event>(16);

        let reader = BufReader::new(input.as_bytes());
        let writer = BufWriter::new(Vec::new());
        let more = Driver::monitor_io(&keys, &sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        let mut events = Vec::new();
        while let Some(event) = receiver.blocking_recv() {
            events.push(event);
        }
        Ok((more, events))
    }

    #[test]
    fn test_pads() -> Result<(), io::Error> {
        let (more, events) = get_events("aSx\n")?;
        assert!(more);
        assert_eq!(
            vec![
                Event::Input(InputEvent::note_on(9, 36, 100)),
                Event::Input(InputEvent::note_on(9, 38, 120)),
            ],
            events
        );
        Ok(())
    }

    #[test]
    fn test_commands() -> Result<(), io::Error> {
        assert_eq!(
            vec![Event::Variant {
                voice: Voice::Crash,
                variant: "2".to_string()
            }],
            get_events(":variant crash 2\n")?.1
        );
        assert_eq!(vec![Event::ToggleMetronome], get_events(":metronome")?.1);
        assert_eq!(vec![Event::Tempo(96)], get_events(":bpm 96")?.1);
        assert_eq!(vec![Event::BeatsPerBar(7)], get_events(":BEATS 7")?.1);
        assert!(get_events(":bpm fast")?.1.is_empty());
        assert!(get_events(":variant cowbell 1")?.1.is_empty());
        assert!(get_events(":dance")?.1.is_empty());
        Ok(())
    }

    #[test]
    fn test_end_of_input() -> Result<(), io::Error> {
        let (more, events) = get_events("")?;
        assert!(!more);
        assert!(events.is_empty());
        Ok(())
    }
}
