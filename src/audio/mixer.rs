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

//! Core mixing logic, independent of the audio backend.

use crossbeam_channel::Receiver;
use tracing::debug;

use super::{ActiveSource, MixerCommand};

/// A linear fade towards silence.
struct Fade {
    remaining: usize,
    total: usize,
}

/// A source currently sounding.
struct Playing {
    active: ActiveSource,
    fade: Option<Fade>,
}

impl Playing {
    /// Renders one sample, or None when the source is finished.
    fn next_sample(&mut self) -> Option<f32> {
        let level = match &mut self.fade {
            Some(fade) if fade.remaining == 0 => return None,
            Some(fade) => {
                let level = fade.remaining as f32 / fade.total as f32;
                fade.remaining -= 1;
                level
            }
            None => 1.0,
        };
        self.active
            .source
            .next_sample()
            .map(|sample| sample * self.active.gain * level)
    }
}

/// Sums active sources into an interleaved output buffer.
pub struct Mixer {
    /// Commands from triggers.
    commands: Receiver<MixerCommand>,
    /// Sources currently playing.
    playing: Vec<Playing>,
    /// Number of interleaved output channels.
    num_channels: u16,
}

impl Mixer {
    /// Creates a new mixer reading commands from the given receiver.
    pub fn new(commands: Receiver<MixerCommand>, num_channels: u16) -> Self {
        Self {
            commands,
            playing: Vec::new(),
            num_channels: num_channels.max(1),
        }
    }

    /// Returns the number of sources currently playing.
    pub fn active_count(&self) -> usize {
        self.playing.len()
    }

    /// Applies all pending commands.
    pub fn process_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                MixerCommand::Start(active) => {
                    debug!(id = active.id, sound = %active.sound, "Starting source");
                    self.playing.push(Playing { active, fade: None });
                }
                MixerCommand::Release { voice, fade_frames } => {
                    if fade_frames == 0 {
                        self.playing
                            .retain(|playing| playing.active.sound.voice() != Some(voice));
                        continue;
                    }
                    for playing in self
                        .playing
                        .iter_mut()
                        .filter(|playing| playing.active.sound.voice() == Some(voice))
                    {
                        // An already shorter fade wins.
                        let shorter = playing
                            .fade
                            .as_ref()
                            .is_some_and(|fade| fade.remaining <= fade_frames);
                        if !shorter {
                            playing.fade = Some(Fade {
                                remaining: fade_frames,
                                total: fade_frames,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Mixes into the interleaved output buffer, replacing its contents.
    pub fn process_into_output(&mut self, output: &mut [f32]) {
        self.process_commands();
        output.fill(0.0);

        let channels = self.num_channels as usize;
        for frame in output.chunks_mut(channels) {
            let mut sum = 0.0f32;
            self.playing.retain_mut(|playing| match playing.next_sample() {
                Some(sample) => {
                    sum += sample;
                    true
                }
                None => false,
            });
            let sum = sum.clamp(-1.0, 1.0);
            frame.fill(sum);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::{next_source_id, MixerHandle, Source};
    use crate::kit::{Sound, Voice};

    /// A constant signal that lasts for a fixed number of samples.
    struct Constant {
        value: f32,
        remaining: usize,
    }

    impl Source for Constant {
        fn next_sample(&mut self) -> Option<f32> {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            Some(self.value)
        }
    }

    fn constant(sound: Sound, value: f32, gain: f32, len: usize) -> ActiveSource {
        ActiveSource {
            id: next_source_id(),
            sound,
            gain,
            source: Box::new(Constant {
                value,
                remaining: len,
            }),
        }
    }

    #[test]
    fn test_mix_and_finish() {
        let (handle, receiver) = MixerHandle::new(1000);
        let mut mixer = Mixer::new(receiver, 2);

        handle.start(constant(Sound::Kick, 0.5, 0.5, 2));
        handle.start(constant(Sound::Ride, 0.5, 1.0, 4));

        let mut output = vec![0.0f32; 8];
        mixer.process_into_output(&mut output);

        // Both channels carry the same mono mix.
        assert_eq!(vec![0.75, 0.75, 0.75, 0.75, 0.5, 0.5, 0.5, 0.5], output);
        mixer.process_into_output(&mut output);
        assert_eq!(0, mixer.active_count());
        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_release_fades_only_the_voice() {
        let (handle, receiver) = MixerHandle::new(1000);
        let mut mixer = Mixer::new(receiver, 1);

        handle.start(constant(Sound::HiHatOpen, 0.5, 1.0, 1000));
        handle.start(constant(Sound::Kick, 0.25, 1.0, 1000));
        handle.release(Voice::HiHatOpen, Duration::from_millis(4));

        let mut output = vec![0.0f32; 6];
        mixer.process_into_output(&mut output);

        // 4 frame linear fade on the hat, kick untouched.
        assert_eq!(vec![0.75, 0.625, 0.5, 0.375, 0.25, 0.25], output);
        assert_eq!(1, mixer.active_count());
    }

    #[test]
    fn test_release_without_fade_cuts() {
        let (handle, receiver) = MixerHandle::new(1000);
        let mut mixer = Mixer::new(receiver, 1);

        handle.start(constant(Sound::Crash2, 0.5, 1.0, 1000));
        handle.release(Voice::Crash, Duration::ZERO);
        mixer.process_commands();
        assert_eq!(0, mixer.active_count());
    }

    #[test]
    fn test_mix_is_clamped() {
        let (handle, receiver) = MixerHandle::new(1000);
        let mut mixer = Mixer::new(receiver, 2);

        handle.start(constant(Sound::Kick, 0.75, 1.0, 2));
        handle.start(constant(Sound::Snare14, 0.75, 1.0, 1));
        handle.start(constant(Sound::Crash1, -0.75, 1.0, 4));
        handle.start(constant(Sound::Ride, -0.75, 1.0, 4));

        let mut output = vec![0.0f32; 8];
        mixer.process_into_output(&mut output);

        // 0.0, then -0.75, then -1.5 clipped to -1.0 twice.
        assert_eq!(vec![0.0, 0.0, -0.75, -0.75, -1.0, -1.0, -1.0, -1.0], output);

        handle.start(constant(Sound::Kick, 0.75, 1.0, 1));
        handle.start(constant(Sound::Snare14, 0.75, 1.0, 1));
        let mut output = vec![0.0f32; 2];
        mixer.process_into_output(&mut output);
        assert_eq!(vec![1.0, 1.0], output);
    }
}
