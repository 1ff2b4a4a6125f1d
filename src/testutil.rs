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

use std::{
    error::Error,
    fs::File,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, SystemTime},
};

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::kit::{Sound, Voice};
use crate::playback::{LoadError, PrepareFuture, Strategy, StrategyKind};

/// Wait for the given async predicate to return true or fail.
#[inline]
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Calculate RMS (Root Mean Square) of a signal
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Writes a 32 bit float WAV file. Each inner vector is one channel.
pub fn write_wav(
    path: PathBuf,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let num_channels = channels.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    for frame in 0..frames {
        for channel in &channels {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;

    Ok(())
}

/// A strategy that records what it was asked to do.
pub struct RecordingStrategy {
    kind: StrategyKind,
    prepare_result: Result<(), LoadError>,
    delay: Duration,
    prepares: AtomicUsize,
    played: Mutex<Vec<(Sound, f32)>>,
    released: Mutex<Vec<Voice>>,
}

impl RecordingStrategy {
    pub fn new(kind: StrategyKind, prepare_result: Result<(), LoadError>) -> RecordingStrategy {
        RecordingStrategy {
            kind,
            prepare_result,
            delay: Duration::ZERO,
            prepares: AtomicUsize::new(0),
            played: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    /// Makes prepare take the given time before completing.
    pub fn with_delay(mut self, delay: Duration) -> RecordingStrategy {
        self.delay = delay;
        self
    }

    pub fn prepare_count(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn played(&self) -> Vec<(Sound, f32)> {
        self.played.lock().clone()
    }

    pub fn released(&self) -> Vec<Voice> {
        self.released.lock().clone()
    }
}

impl Strategy for RecordingStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn prepare(&self) -> PrepareFuture<'_> {
        Box::pin(async move {
            self.prepares.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.prepare_result.clone()
        })
    }

    fn play(&self, sound: Sound, gain: f32) {
        self.played.lock().push((sound, gain));
    }

    fn release(&self, voice: Voice) {
        self.released.lock().push(voice);
    }
}
