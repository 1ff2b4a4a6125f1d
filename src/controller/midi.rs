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
use std::{error::Error, io, sync::Arc, time::Duration};

use tokio::{
    sync::mpsc::{self, Sender},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info, span, warn, Instrument, Level};

use super::Event;
use crate::midi::{self, Device, InputEvent};

/// How long to wait before looking for the device again, and how often a watched
/// device is checked for removal.
const DEFAULT_RETRY: Duration = Duration::from_secs(2);

/// Capacity of the raw event channel.
const RAW_CAPACITY: usize = 64;

/// Produces the device to watch. Called again whenever the device goes away.
pub type DeviceSource = Arc<dyn Fn() -> Result<Arc<dyn Device>, Box<dyn Error>> + Send + Sync>;

/// A driver that plays the kit from a MIDI input device.
pub struct Driver {
    source: DeviceSource,
    retry: Duration,
}

impl Driver {
    /// Creates a driver for the named device.
    pub fn new(name: &str) -> Driver {
        let name = name.to_string();
        Driver::with_source(
            Arc::new(move || midi::get_device(&name)),
            DEFAULT_RETRY,
        )
    }

    pub fn with_source(source: DeviceSource, retry: Duration) -> Driver {
        Driver { source, retry }
    }

    /// Watches one device until its event stream closes or it is removed. Returns
    /// false if the controller has gone away.
    async fn watch(device: Arc<dyn Device>, events_tx: &Sender<Event>, check: Duration) -> bool {
        let (raw_tx, mut raw_rx) = mpsc::channel::<Vec<u8>>(RAW_CAPACITY);
        let watch_result = device.watch_events(raw_tx).map_err(|e| e.to_string());
        if let Err(e) = watch_result {
            warn!(device = device.name(), err = e, "Unable to watch MIDI device");
            return true;
        }
        info!(device = device.name(), "MIDI driver watching device.");

        let mut connection_check = time::interval_at(Instant::now() + check, check);
        loop {
            tokio::select! {
                raw = raw_rx.recv() => {
                    let Some(raw) = raw else {
                        break;
                    };
                    let Some(event) = InputEvent::decode(&raw) else {
                        continue;
                    };
                    debug!(?event, "MIDI input");
                    if events_tx.send(Event::Input(event)).await.is_err() {
                        device.stop_watch_events();
                        return false;
                    }
                }
                _ = connection_check.tick() => {
                    if !device.is_connected() {
                        info!(device = device.name(), "MIDI device removed.");
                        break;
                    }
                }
            }
        }

        info!(device = device.name(), "MIDI device closed.");
        device.stop_watch_events();
        true
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let source = self.source.clone();
        let retry = self.retry;
        let span = span!(Level::INFO, "MIDI driver");

        tokio::spawn(
            async move {
                info!("MIDI driver started.");
                loop {
                    let device = match source() {
                        Ok(device) => Some(device),
                        Err(e) => {
                            warn!(err = e.to_string(), "MIDI device unavailable");
                            None
                        }
                    };
                    if let Some(device) = device {
                        if !Driver::watch(device, &events_tx, retry).await {
                            info!("Controller gone, MIDI driver stopping.");
                            return Ok(());
                        }
                    }
                    if events_tx.is_closed() {
                        return Ok(());
                    }
                    tokio::time::sleep(retry).await;
                }
            }
            .instrument(span),
        )
    }
}
