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

//! cpal-backed audio output.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use thiserror::Error;
use tracing::{error, info, span, warn, Level};

use super::{mixer::Mixer, MixerHandle};
use crate::config;

/// The device name that selects the host's default output.
pub const DEFAULT_DEVICE: &str = "default";

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device found with name {0}")]
    DeviceNotFound(String),

    #[error("the host has no default output device")]
    NoDefaultDevice,

    #[error("unable to silence audio backend output: {0}")]
    Silence(#[from] std::io::Error),

    #[error("unable to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("unable to spawn the audio output thread: {0}")]
    Thread(String),

    #[error("unable to start the output stream: {0}")]
    Stream(String),
}

/// A description of an output device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// The name of the device.
    pub name: String,
    /// The maximum number of output channels the device supports.
    pub max_channels: u16,
    /// The name of the host the device belongs to.
    pub host: &'static str,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Lists output devices across all available hosts.
pub fn list_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                error!(err = e.to_string(), host = host_id.name(), "Unable to open host");
                continue;
            }
        };
        let host_devices = match host.output_devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|output_config| output_config.channels())
                .max()
                .unwrap_or(0);
            if max_channels == 0 {
                continue;
            }
            let Ok(name) = device.name() else {
                continue;
            };
            devices.push(DeviceInfo {
                name,
                max_channels,
                host: host_id.name(),
            });
        }
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Finds the cpal device matching the configured name.
fn find_device(name: &str) -> Result<cpal::Device, AudioError> {
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    if name == DEFAULT_DEVICE {
        return cpal::default_host()
            .default_output_device()
            .ok_or(AudioError::NoDefaultDevice);
    }

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        for device in host.output_devices()? {
            if device
                .name()
                .is_ok_and(|device_name| device_name.trim() == name)
            {
                return Ok(device);
            }
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// A running output stream. Dropping it stops the stream.
pub struct Output {
    /// The device name.
    name: String,
    /// Set to stop the output thread.
    shutdown: Arc<AtomicBool>,
    /// Handle to the output thread (keeps it alive).
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(output_thread) = self.output_thread.take() {
            if output_thread.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
    }
}

/// Opens the configured output device and starts streaming the mixer to it. The
/// returned handle is what playback strategies send sources to.
pub fn open_output(config: &config::Audio) -> Result<(Output, MixerHandle), AudioError> {
    let device = find_device(config.device())?;
    let num_channels = config.channels();
    let sample_rate = config.sample_rate();

    let (handle, receiver) = MixerHandle::new(sample_rate);
    let shutdown = Arc::new(AtomicBool::new(false));
    let name = config.device().to_string();

    // The stream is created inside the thread; cpal streams are not Send on every host.
    let (started_tx, started_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
    let thread_shutdown = shutdown.clone();
    let thread_name = name.clone();
    let output_thread = thread::Builder::new()
        .name("padkit-audio".into())
        .spawn(move || {
            let span = span!(Level::INFO, "audio output", device = thread_name);
            let _enter = span.enter();

            let stream_config = cpal::StreamConfig {
                channels: num_channels,
                sample_rate: sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };
            let sample_format = match device.default_output_config() {
                Ok(config) => config.sample_format(),
                Err(e) => {
                    warn!(err = %e, "No default output config, assuming f32 output");
                    cpal::SampleFormat::F32
                }
            };

            let mixer = Mixer::new(receiver, num_channels);
            let stream = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, mixer),
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, mixer),
                cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, mixer),
                other => {
                    let _ = started_tx.send(Err(format!("unsupported sample format {:?}", other)));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = started_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = started_tx.send(Err(e.to_string()));
                return;
            }
            info!(
                channels = num_channels,
                sample_rate,
                format = ?sample_format,
                "CPAL output stream started"
            );
            let _ = started_tx.send(Ok(()));

            // Keep the stream alive until shutdown.
            while !thread_shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
            }
            info!("CPAL output stream stopped");
        })
        .map_err(|e| AudioError::Thread(e.to_string()))?;

    let output = Output {
        name,
        shutdown,
        output_thread: Some(output_thread),
    };
    match started_rx.recv() {
        Ok(Ok(())) => Ok((output, handle)),
        Ok(Err(e)) => Err(AudioError::Stream(e)),
        Err(_) => Err(AudioError::Stream(
            "audio output thread exited".to_string(),
        )),
    }
}

/// Builds an output stream of the device's sample type fed by the mixer.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            fill(&mut mixer, &mut scratch, data);
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

/// Mixes into the scratch buffer and converts it to the output sample type.
fn fill<T>(mixer: &mut Mixer, scratch: &mut Vec<f32>, data: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    scratch.resize(data.len(), 0.0);
    mixer.process_into_output(scratch);
    for (out, sample) in data.iter_mut().zip(scratch.iter()) {
        *out = T::from_sample(*sample);
    }
}
