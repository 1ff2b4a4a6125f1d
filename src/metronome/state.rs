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
use std::time::Duration;

use tokio::time::Instant;

pub const MIN_BPM: u32 = 30;
pub const MAX_BPM: u32 = 300;
pub const MIN_BEATS_PER_BAR: usize = 1;
pub const MAX_BEATS_PER_BAR: usize = 12;

/// What a single tick plays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub beat_in_bar: usize,
    pub bar: u64,
    pub accent: bool,
    pub volume: f32,
}

/// A linear tempo change in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ramp {
    from: f64,
    to: f64,
    start: Instant,
    duration: Duration,
}

impl Ramp {
    fn bpm_at(&self, at: Instant) -> f64 {
        if self.duration.is_zero() {
            return self.to;
        }
        let progress = at.saturating_duration_since(self.start).as_secs_f64()
            / self.duration.as_secs_f64();
        self.from + (self.to - self.from) * progress.min(1.0)
    }
}

/// The metronome's musical state. The per-beat sequences always hold exactly
/// `beats_per_bar` entries.
#[derive(Debug, Clone)]
pub struct MetronomeState {
    bpm: u32,
    beats_per_bar: usize,
    running: bool,
    /// The position the next tick plays.
    beat_in_bar: usize,
    /// Bars started since the last start. The first bar is bar 1.
    bar: u64,
    /// Ticks since the last start.
    total_beats: u64,
    accents: Vec<bool>,
    volumes: Vec<f32>,
    /// Length of the bar in progress. Meter changes apply from the next downbeat.
    bar_length: usize,
    ramp: Option<Ramp>,
    /// Bumped on every start and stop so stale tick tasks can tell.
    pub(super) generation: u64,
}

impl MetronomeState {
    pub fn new(bpm: u32, beats_per_bar: u32) -> MetronomeState {
        let mut state = MetronomeState {
            bpm: clamp_bpm(bpm),
            beats_per_bar: 0,
            running: false,
            beat_in_bar: 0,
            bar: 0,
            total_beats: 0,
            accents: Vec::new(),
            volumes: Vec::new(),
            bar_length: 0,
            ramp: None,
            generation: 0,
        };
        state.set_beats_per_bar(beats_per_bar);
        state.bar_length = state.beats_per_bar;
        state
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn beats_per_bar(&self) -> usize {
        self.beats_per_bar
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The position the next tick plays.
    pub fn beat_in_bar(&self) -> usize {
        self.beat_in_bar
    }

    pub fn bar(&self) -> u64 {
        self.bar
    }

    pub fn total_beats(&self) -> u64 {
        self.total_beats
    }

    pub fn accents(&self) -> &[bool] {
        &self.accents
    }

    pub fn volumes(&self) -> &[f32] {
        &self.volumes
    }

    /// Resets the counters and marks the state running.
    pub(super) fn start(&mut self) -> u64 {
        self.running = true;
        self.beat_in_bar = 0;
        self.bar = 0;
        self.total_beats = 0;
        self.bar_length = self.beats_per_bar;
        self.generation += 1;
        self.generation
    }

    /// Marks the state stopped. Counters are kept.
    pub(super) fn stop(&mut self) {
        self.running = false;
        self.generation += 1;
    }

    /// Sets the tempo, ramping from the tempo in effect at `now`.
    pub fn set_tempo(&mut self, bpm: u32, now: Instant, ramp: Duration) {
        let from = self.effective_bpm(now);
        self.bpm = clamp_bpm(bpm);
        self.ramp = Some(Ramp {
            from,
            to: self.bpm as f64,
            start: now,
            duration: ramp,
        });
    }

    /// The tempo in effect at the given time, taking any ramp into account.
    pub fn effective_bpm(&self, at: Instant) -> f64 {
        match &self.ramp {
            Some(ramp) => ramp.bpm_at(at),
            None => self.bpm as f64,
        }
    }

    /// The beat interval in effect at the given time.
    pub fn interval_at(&self, at: Instant) -> Duration {
        Duration::from_secs_f64(60.0 / self.effective_bpm(at))
    }

    /// Changes the meter. The sequences are resized right away, keeping existing
    /// entries; new beats are unaccented at full volume, except that the downbeat is
    /// accented.
    pub fn set_beats_per_bar(&mut self, beats_per_bar: u32) {
        let beats_per_bar =
            (beats_per_bar as usize).clamp(MIN_BEATS_PER_BAR, MAX_BEATS_PER_BAR);
        let old_len = self.accents.len();
        self.accents.resize(beats_per_bar, false);
        if old_len == 0 {
            self.accents[0] = true;
        }
        self.volumes.resize(beats_per_bar, 1.0);
        self.beats_per_bar = beats_per_bar;
        if !self.running {
            self.bar_length = beats_per_bar;
            self.beat_in_bar = self.beat_in_bar.min(beats_per_bar - 1);
        }
    }

    /// Sets the volume of a beat, clamped to 0.0 - 1.0. Out of range beats are ignored.
    pub fn set_volume_for_beat(&mut self, beat: usize, volume: f32) -> bool {
        match self.volumes.get_mut(beat) {
            Some(slot) => {
                *slot = if volume.is_nan() {
                    0.0
                } else {
                    volume.clamp(0.0, 1.0)
                };
                true
            }
            None => false,
        }
    }

    /// Sets the accent of a beat. Out of range beats are ignored.
    pub fn set_accent_for_beat(&mut self, beat: usize, accent: bool) -> bool {
        match self.accents.get_mut(beat) {
            Some(slot) => {
                *slot = accent;
                true
            }
            None => false,
        }
    }

    /// Plays the next position and moves on.
    pub(super) fn advance(&mut self) -> Tick {
        let position = self.beat_in_bar;
        if position == 0 {
            self.bar += 1;
            self.bar_length = self.beats_per_bar;
        }
        let tick = Tick {
            beat_in_bar: position,
            bar: self.bar,
            accent: self.accents.get(position).copied().unwrap_or(false),
            volume: self.volumes.get(position).copied().unwrap_or(1.0),
        };
        self.total_beats += 1;
        self.beat_in_bar = (position + 1) % self.bar_length.max(1);
        tick
    }
}

fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}
