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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use padkit::audio;
use padkit::config::{Audio, Config, Engine, Midi};
use padkit::controller::{self, Controller, Driver};
use padkit::kit;
use padkit::metronome::{BeatEvent, Metronome};
use padkit::midi;
use padkit::playback::{FileLoader, PlaybackEngine, SampleStrategy, Strategy, SynthStrategy};
use padkit::router::Router;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI drum kit."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the MIDI input devices and whether MIDI can be used at all.
    Devices {},
    /// Lists the available audio output devices.
    AudioDevices {},
    /// Prints the kit: pads, notes and variants.
    Kit {},
    /// Starts the drum kit.
    Start {
        /// The path to the kit configuration.
        config_path: Option<PathBuf>,
        /// Overrides the configured audio device.
        #[arg[short, long]]
        audio_device: Option<String>,
        /// Overrides the configured MIDI input device.
        #[arg[short, long]]
        midi_device: Option<String>,
    },
    /// Runs the metronome on its own.
    Metronome {
        /// The path to a kit configuration to take metronome and audio settings from.
        config_path: Option<PathBuf>,
        /// Tempo in beats per minute.
        #[arg[short, long]]
        bpm: Option<u32>,
        /// Beats per bar.
        #[arg[long]]
        beats: Option<u32>,
        /// The audio device to click through.
        #[arg[short, long]]
        audio_device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            println!("MIDI: {}", midi::transport_status());
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::AudioDevices {} => {
            let devices = audio::cpal::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Kit {} => {
            println!("Pads:");
            for pad in kit::pads() {
                let variants: Vec<&str> = pad.voice.variants().collect();
                println!(
                    "- {} (note {}, variants: {})",
                    pad.label,
                    pad.note,
                    variants.join(", ")
                );
            }
        }
        Commands::Start {
            config_path,
            audio_device,
            midi_device,
        } => {
            let config = match config_path {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            let audio = match audio_device {
                Some(device) => Audio::new(&device),
                None => config.audio().clone(),
            };
            let midi = match midi_device {
                Some(device) => Midi::new(&device),
                None => config.midi().clone(),
            };
            start(&config, &audio, &midi).await?;
        }
        Commands::Metronome {
            config_path,
            bpm,
            beats,
            audio_device,
        } => {
            let config = match config_path {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            let audio = match audio_device {
                Some(device) => Audio::new(&device),
                None => config.audio().clone(),
            };
            let (_output, mixer) = audio::cpal::open_output(&audio)?;
            let synth = Arc::new(SynthStrategy::new(mixer, Duration::ZERO));
            let engine = Arc::new(PlaybackEngine::synth_only(synth));
            engine.prepare().await?;

            let metronome = Metronome::new(config.metronome(), engine)?;
            if let Some(bpm) = bpm {
                metronome.set_tempo(bpm);
            }
            if let Some(beats) = beats {
                metronome.set_beats_per_bar(beats);
            }
            metronome.set_listener(Some(Arc::new(|beat: BeatEvent| {
                info!(
                    bar = beat.bar,
                    beat = beat.beat_in_bar + 1,
                    accent = beat.accent,
                    "Click"
                )
            })));
            metronome.start()?;

            tokio::signal::ctrl_c().await?;
            metronome.stop();
        }
    }

    Ok(())
}

/// Builds the kit from the configuration and plays it until every driver stops.
async fn start(config: &Config, audio: &Audio, midi: &Midi) -> Result<(), Box<dyn Error>> {
    let kit = config.kit();
    let (output, mixer) = audio::cpal::open_output(audio)?;
    info!(device = %output, "Audio output opened");

    let release_time = kit.release_time()?;
    let synth: Arc<dyn Strategy> = Arc::new(SynthStrategy::new(mixer.clone(), release_time));
    let engine = Arc::new(match kit.engine() {
        Engine::Sample => {
            let loader = Arc::new(FileLoader::new(
                kit.samples_dir().to_path_buf(),
                mixer.sample_rate(),
            ));
            let sample: Arc<dyn Strategy> = Arc::new(SampleStrategy::new(
                loader,
                kit.resources()?,
                mixer,
                release_time,
            ));
            PlaybackEngine::new(sample, synth)
        }
        Engine::Synth => PlaybackEngine::synth_only(synth),
    });

    let prepare_engine = engine.clone();
    tokio::spawn(async move {
        match prepare_engine.prepare().await {
            Ok(kind) => info!(engine = %kind, "Kit ready"),
            Err(e) => error!(err = %e, "Kit unavailable"),
        }
    });

    let router = Arc::new(Router::new(engine.clone(), kit));
    let metronome = Arc::new(Metronome::new(config.metronome(), engine)?);

    let mut visual = router.subscribe_visual();
    tokio::spawn(async move {
        loop {
            match visual.recv().await {
                Ok(voice) => info!(voice = voice.label(), "Hit"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed hit indications"),
                Err(RecvError::Closed) => return,
            }
        }
    });

    let mut drivers: Vec<Arc<dyn Driver>> = vec![Arc::new(controller::keyboard::Driver::new(
        config.keyboard().mapping()?,
    ))];
    match midi.device() {
        Some(device) => {
            info!(status = %midi::transport_status(), "MIDI transport");
            drivers.push(Arc::new(controller::midi::Driver::new(device)));
        }
        None => info!("No MIDI device configured, playing from the keyboard only"),
    }

    let mut controller = Controller::new(router, Some(metronome), drivers);
    controller.join().await?;
    Ok(())
}
