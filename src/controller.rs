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
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, span, warn, Instrument, Level};

use crate::kit::Voice;
use crate::metronome::Metronome;
use crate::midi::InputEvent;
use crate::router::Router;

pub mod keyboard;
pub mod midi;

/// Capacity of the channel between drivers and the controller.
const EVENT_CAPACITY: usize = 64;

/// Controller events that drive the kit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A note or control change.
    Input(InputEvent),

    /// Selects a variant of a voice.
    Variant { voice: Voice, variant: String },

    /// Starts or stops the metronome.
    ToggleMetronome,

    /// Sets the metronome tempo.
    Tempo(u32),

    /// Sets the metronome beats per bar.
    BeatsPerBar(u32),
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Feeds events from drivers into the router and metronome.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller watching the given drivers.
    pub fn new(
        router: Arc<Router>,
        metronome: Option<Arc<Metronome>>,
        drivers: Vec<Arc<dyn Driver>>,
    ) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(
                async move { Controller::process_events(router, metronome, drivers).await }
                    .instrument(span),
            ),
        }
    }

    /// Join will block until every driver has finished.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    async fn process_events(
        router: Arc<Router>,
        metronome: Option<Arc<Metronome>>,
        drivers: Vec<Arc<dyn Driver>>,
    ) {
        let (events_tx, mut events_rx) = mpsc::channel(EVENT_CAPACITY);
        let join_handles: Vec<JoinHandle<Result<(), io::Error>>> = drivers
            .iter()
            .map(|driver| driver.monitor_events(events_tx.clone()))
            .collect();
        drop(events_tx);

        info!(drivers = join_handles.len(), "Controller started.");

        while let Some(event) = events_rx.recv().await {
            Controller::apply(&router, metronome.as_deref(), event);
        }

        info!("Controller closing.");
        for join_handle in join_handles {
            match join_handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(err = %e, "Driver failed"),
                Err(e) => error!(err = %e, "Error waiting for driver to stop"),
            }
        }
    }

    /// Applies a single event.
    pub fn apply(router: &Router, metronome: Option<&Metronome>, event: Event) {
        match event {
            Event::Input(event) => router.handle(event),
            Event::Variant { voice, variant } => {
                if let Err(e) = router.set_variant(voice, &variant) {
                    warn!(err = %e, "Unable to select variant");
                }
            }
            Event::ToggleMetronome => match metronome {
                Some(metronome) => match metronome.toggle() {
                    Ok(running) => info!(running, "Metronome toggled"),
                    Err(e) => error!(err = %e, "Unable to toggle metronome"),
                },
                None => warn!("No metronome configured"),
            },
            Event::Tempo(bpm) => match metronome {
                Some(metronome) => metronome.set_tempo(bpm),
                None => warn!("No metronome configured"),
            },
            Event::BeatsPerBar(beats_per_bar) => match metronome {
                Some(metronome) => metronome.set_beats_per_bar(beats_per_bar),
                None => warn!("No metronome configured"),
            },
        }
    }
}
