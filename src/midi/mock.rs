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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::{info, span, Level};

/// A mock device. Events are injected by hand.
#[derive(Clone)]
pub struct Device {
    name: String,
    sender: Arc<Mutex<Option<Sender<Vec<u8>>>>>,
    plugged_in: Arc<AtomicBool>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            sender: Arc::new(Mutex::new(None)),
            plugged_in: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Sends the mock event through to the watcher. Returns false if nothing is watching.
    pub async fn mock_event(&self, event: &[u8]) -> bool {
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) => sender.send(event.to_vec()).await.is_ok(),
            None => false,
        }
    }

    /// Returns true if something is watching this device.
    pub fn is_watched(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Simulates the device disappearing: the watcher's channel is closed.
    pub fn disconnect(&self) {
        self.sender.lock().take();
    }

    /// Simulates the device being unplugged without its channel closing, the way
    /// hardware backends behave.
    pub fn unplug(&self) {
        self.plugged_in.store(false, Ordering::Relaxed);
    }

    pub fn plug_in(&self) {
        self.plugged_in.store(true, Ordering::Relaxed);
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "wait for event (mock)");
        let _enter = span.enter();

        let mut current = self.sender.lock();
        if current.is_some() {
            return Err("Already watching events.".into());
        }
        info!(device = self.name, "Watching mock MIDI events.");
        *current = Some(sender);
        Ok(())
    }

    /// Stops watching events.
    fn stop_watch_events(&self) {
        self.sender.lock().take();
    }

    fn is_connected(&self) -> bool {
        self.plugged_in.load(Ordering::Relaxed)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
