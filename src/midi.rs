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
use std::{error::Error, fmt, sync::Arc};

use tokio::sync::mpsc::Sender;

mod event;
mod midir;
pub mod mock;

pub use event::{EventKind, InputEvent};

/// A MIDI input device that produces raw events for the kit.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Watches MIDI input for events and sends them to the given sender. When the device
    /// goes away the sender is dropped, which closes the receiving side.
    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Box<dyn Error>>;

    /// Stops watching events.
    fn stop_watch_events(&self);

    /// Whether the device is still attached. Backends that can't tell when a port
    /// disappears are polled with this while watching.
    fn is_connected(&self) -> bool;
}

/// Whether MIDI input can be used at all on this machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportStatus {
    /// MIDI is supported and the given number of input devices were found.
    Available(usize),
    /// MIDI input can't be used. The kit still works from the keyboard and UI.
    Unavailable(String),
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportStatus::Available(count) => write!(f, "available ({} inputs)", count),
            TransportStatus::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

/// Reports the MIDI transport status. Never fails: problems are reported as a status.
pub fn transport_status() -> TransportStatus {
    match midir::list() {
        Ok(devices) if devices.is_empty() => {
            TransportStatus::Unavailable("no MIDI input devices found".to_string())
        }
        Ok(devices) => TransportStatus::Available(devices.len()),
        Err(e) => TransportStatus::Unavailable(e.to_string()),
    }
}

/// Lists input devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    midir::list()
}

/// Gets a device with the given name.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(midir::get(name)?))
}
