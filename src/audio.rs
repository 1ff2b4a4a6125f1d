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

//! Audio output: one-shot sources, the mixer that sums them and the cpal stream that
//! plays the mix.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::error;

use crate::kit::{Sound, Voice};

pub mod cpal;
pub mod mixer;

/// Global source ID counter.
static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh source ID.
pub fn next_source_id() -> u64 {
    NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A mono one-shot signal rendered at the mixer's sample rate.
pub trait Source: Send {
    /// Returns the next sample, or None once the sound has finished.
    fn next_sample(&mut self) -> Option<f32>;
}

/// A sound handed to the mixer.
pub struct ActiveSource {
    /// Unique ID for this source.
    pub id: u64,
    /// The sound being played.
    pub sound: Sound,
    /// Linear gain applied to the signal.
    pub gain: f32,
    /// The signal itself.
    pub source: Box<dyn Source>,
}

impl fmt::Debug for ActiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSource")
            .field("id", &self.id)
            .field("sound", &self.sound)
            .field("gain", &self.gain)
            .finish()
    }
}

/// Commands delivered to the mixer.
#[derive(Debug)]
pub enum MixerCommand {
    /// Start playing a source.
    Start(ActiveSource),
    /// Fade out every source of the voice over the given number of frames.
    Release { voice: Voice, fade_frames: usize },
}

/// The sending side of the mixer. Cheap to clone and never blocks.
#[derive(Clone, Debug)]
pub struct MixerHandle {
    commands: Sender<MixerCommand>,
    sample_rate: u32,
}

impl MixerHandle {
    /// Creates a handle and the receiver the mixer reads from.
    pub fn new(sample_rate: u32) -> (MixerHandle, Receiver<MixerCommand>) {
        let (commands, receiver) = crossbeam_channel::unbounded();
        (
            MixerHandle {
                commands,
                sample_rate,
            },
            receiver,
        )
    }

    /// The output sample rate sources should be rendered at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Converts a duration to a frame count at the output sample rate.
    pub fn frames(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as usize
    }

    /// Starts a source.
    pub fn start(&self, source: ActiveSource) {
        self.send(MixerCommand::Start(source));
    }

    /// Fades out every source belonging to the voice.
    pub fn release(&self, voice: Voice, fade: Duration) {
        self.send(MixerCommand::Release {
            voice,
            fade_frames: self.frames(fade),
        });
    }

    fn send(&self, command: MixerCommand) {
        if let Err(e) = self.commands.send(command) {
            error!(error = %e, "Failed to send command to mixer");
        }
    }
}
