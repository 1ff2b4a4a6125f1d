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

//! Parametric drum synthesis. Every sound has a fixed profile; playing one renders a
//! one-shot voice in real time at the mixer's sample rate.

use std::{
    f32::consts::PI,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{LoadError, PrepareFuture, Strategy, StrategyKind};
use crate::audio::{next_source_id, ActiveSource, MixerHandle, Source};
use crate::kit::{Sound, Voice};

/// Frequency ratios of the partials of a metallic resonator.
const METAL_RATIOS: [f32; 6] = [1.0, 1.483, 1.932, 2.546, 2.630, 3.897];

/// Envelope level at which a sound counts as finished (-60 dB).
const SILENCE: f32 = 0.001;

/// How a sound is synthesized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tone {
    /// A sine whose pitch falls from `freq * 2^octaves` to `freq`.
    Membrane {
        freq: f32,
        octaves: f32,
        pitch_decay: f32,
    },
    /// A noise burst over a pitched body.
    Noise { body_freq: f32, body_level: f32 },
    /// Inharmonic square partials through a high-pass filter.
    Metal {
        freq: f32,
        harmonicity: f32,
        resonance: f32,
    },
    /// A short high click of two sines and a dash of noise.
    Rim { freq: f32 },
}

/// A synthesized sound: a tone, its decay time and how velocity maps to level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub tone: Tone,
    /// Seconds until the envelope reaches silence.
    pub decay: f32,
    /// Level at zero velocity. Velocity scales the remaining range.
    pub floor: f32,
}

impl Profile {
    /// Maps a trigger gain to an output level.
    pub fn level(&self, gain: f32) -> f32 {
        self.floor + gain * (1.0 - self.floor)
    }
}

/// Returns the fixed profile of a sound.
pub fn profile(sound: Sound) -> Profile {
    let membrane = |freq, octaves, pitch_decay, decay| Profile {
        tone: Tone::Membrane {
            freq,
            octaves,
            pitch_decay,
        },
        decay,
        floor: 0.0,
    };
    let metal = |freq, resonance, decay, floor| Profile {
        tone: Tone::Metal {
            freq,
            harmonicity: 5.1,
            resonance,
        },
        decay,
        floor,
    };

    match sound {
        Sound::Kick => membrane(50.0, 2.0, 0.01, 0.3),
        Sound::Snare14 => Profile {
            tone: Tone::Noise {
                body_freq: 200.0,
                body_level: 0.3,
            },
            decay: 0.2,
            floor: 0.0,
        },
        Sound::Snare18 => Profile {
            tone: Tone::Noise {
                body_freq: 160.0,
                body_level: 0.4,
            },
            decay: 0.28,
            floor: 0.0,
        },
        Sound::SideStick => Profile {
            tone: Tone::Rim { freq: 1500.0 },
            decay: 0.06,
            floor: 0.0,
        },
        Sound::HiHatClosed => metal(400.0, 4000.0, 0.07, 0.4),
        Sound::HiHatOpen => metal(400.0, 4000.0, 0.3, 0.5),
        Sound::HiHatPedal => metal(400.0, 4000.0, 0.05, 0.3),
        Sound::Crash1 => metal(300.0, 2000.0, 1.6, 0.0),
        Sound::Crash2 => metal(260.0, 1800.0, 2.2, 0.0),
        Sound::Ride => metal(350.0, 3000.0, 0.6, 0.0),
        Sound::TomHigh => membrane(220.0, 1.0, 0.02, 0.3),
        Sound::TomMid => membrane(180.0, 1.0, 0.02, 0.35),
        Sound::TomFloor => membrane(140.0, 1.0, 0.02, 0.45),
        Sound::ClickAccent => membrane(1200.0, 1.0, 0.005, 0.08),
        Sound::ClickBeat => membrane(800.0, 1.0, 0.008, 0.12),
    }
}

/// A single rendering of a profile.
pub struct SynthVoice {
    profile: Profile,
    sample_rate: f32,
    /// Samples rendered so far.
    position: usize,
    /// Total length in samples.
    length: usize,
    /// Phase of each oscillator in radians.
    phases: [f32; METAL_RATIOS.len()],
    /// High-pass filter memory.
    hp_state: f32,
    hp_last: f32,
    rng: StdRng,
}

impl SynthVoice {
    pub fn new(profile: Profile, sample_rate: u32, seed: u64) -> SynthVoice {
        let sample_rate = sample_rate as f32;
        SynthVoice {
            profile,
            sample_rate,
            position: 0,
            length: (profile.decay * sample_rate).ceil() as usize,
            phases: [0.0; METAL_RATIOS.len()],
            hp_state: 0.0,
            hp_last: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Exponential envelope reaching silence at `decay` seconds.
    fn envelope(t: f32, decay: f32) -> f32 {
        (SILENCE.ln() * t / decay).exp()
    }

    fn advance(&mut self, oscillator: usize, freq: f32) -> f32 {
        let phase = self.phases[oscillator];
        self.phases[oscillator] = (phase + 2.0 * PI * freq / self.sample_rate) % (2.0 * PI);
        phase
    }

    fn noise(&mut self) -> f32 {
        self.rng.gen_range(-1.0..1.0)
    }

    fn render(&mut self, t: f32) -> f32 {
        let amp = Self::envelope(t, self.profile.decay);
        match self.profile.tone {
            Tone::Membrane {
                freq,
                octaves,
                pitch_decay,
            } => {
                let sweep = (2.0f32.powf(octaves) - 1.0) * (-t / pitch_decay).exp();
                let phase = self.advance(0, freq * (1.0 + sweep));
                phase.sin() * amp
            }
            Tone::Noise {
                body_freq,
                body_level,
            } => {
                let body_amp = Self::envelope(t, self.profile.decay * 0.5);
                let body = self.advance(0, body_freq).sin() * body_amp;
                let noise = self.noise() * amp;
                body * body_level + noise * (1.0 - body_level)
            }
            Tone::Metal {
                freq,
                harmonicity,
                resonance,
            } => {
                let mut sum = 0.0;
                for (i, ratio) in METAL_RATIOS.iter().enumerate() {
                    let phase = self.advance(i, freq * harmonicity * ratio / 5.1);
                    sum += if phase < PI { 1.0 } else { -1.0 };
                }
                let raw = sum / METAL_RATIOS.len() as f32;

                // One-pole high-pass at the resonance frequency.
                let rc = 1.0 / (2.0 * PI * resonance);
                let alpha = rc / (rc + 1.0 / self.sample_rate);
                self.hp_state = alpha * (self.hp_state + raw - self.hp_last);
                self.hp_last = raw;
                self.hp_state * amp
            }
            Tone::Rim { freq } => {
                let first = self.advance(0, freq).sin();
                let second = self.advance(1, freq * 1.33).sin() * 0.5;
                let click = self.noise() * Self::envelope(t, 0.005) * 0.3;
                ((first + second) / 1.5 * 0.7 + click) * amp
            }
        }
    }
}

impl Source for SynthVoice {
    fn next_sample(&mut self) -> Option<f32> {
        if self.position >= self.length {
            return None;
        }
        let t = self.position as f32 / self.sample_rate;
        self.position += 1;
        Some(self.render(t).clamp(-1.0, 1.0))
    }
}

/// Synthesizes every sound from its profile.
pub struct SynthStrategy {
    mixer: MixerHandle,
    release_time: Duration,
    bank: OnceCell<[Profile; Sound::COUNT]>,
    /// Seed for the next voice's noise generator.
    next_seed: AtomicU64,
}

impl SynthStrategy {
    pub fn new(mixer: MixerHandle, release_time: Duration) -> SynthStrategy {
        SynthStrategy {
            mixer,
            release_time,
            bank: OnceCell::new(),
            next_seed: AtomicU64::new(0x5eed),
        }
    }
}

impl Strategy for SynthStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Synth
    }

    fn prepare(&self) -> PrepareFuture<'_> {
        Box::pin(async move {
            self.bank
                .get_or_init(|| async {
                    info!(profiles = Sound::COUNT, "Synth bank built");
                    Sound::ALL.map(profile)
                })
                .await;
            Ok::<(), LoadError>(())
        })
    }

    fn play(&self, sound: Sound, gain: f32) {
        let Some(bank) = self.bank.get() else {
            debug!(sound = %sound, "Synth not prepared, ignoring");
            return;
        };
        let profile = bank[sound.index()];
        let seed = self.next_seed.fetch_add(1, Ordering::Relaxed);
        self.mixer.start(ActiveSource {
            id: next_source_id(),
            sound,
            gain: profile.level(gain),
            source: Box::new(SynthVoice::new(profile, self.mixer.sample_rate(), seed)),
        });
    }

    fn release(&self, voice: Voice) {
        self.mixer.release(voice, self.release_time);
    }
}
