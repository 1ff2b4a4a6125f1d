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

//! The practice metronome.
//!
//! Beats are scheduled against absolute deadlines computed from an anchor, so the
//! time spent playing clicks or notifying listeners never accumulates into drift.
//! Whenever the beat interval changes the timeline is re-anchored at the last beat.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::{runtime::Handle, task::JoinHandle, time::Instant};
use tracing::{debug, info, span, Instrument, Level};

use crate::config::{self, ConfigError};
use crate::kit::Sound;
use crate::playback::PlaybackEngine;

pub mod clock;
mod state;

pub use clock::{Clock, TokioClock};
pub use state::{MetronomeState, MAX_BEATS_PER_BAR, MAX_BPM, MIN_BEATS_PER_BAR, MIN_BPM};

/// Base gain of an accented click.
pub const ACCENT_GAIN: f32 = 0.9;

/// Base gain of an unaccented click.
pub const BEAT_GAIN: f32 = 0.6;

/// Sent to the listener after every beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    /// Position within the bar, starting at 0.
    pub beat_in_bar: usize,
    /// The bar number, starting at 1.
    pub bar: u64,
    pub accent: bool,
    /// The deadline the beat was scheduled for.
    pub scheduled_at: Instant,
}

/// Receives beat events. Called on the scheduler task, so it should return quickly.
pub type BeatListener = Arc<dyn Fn(BeatEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum MetronomeError {
    #[error("no async runtime available to run the metronome")]
    NoRuntime,
}

/// Beat deadlines relative to an anchor.
struct Timeline {
    anchor: Instant,
    anchor_beat: u64,
    interval: Duration,
}

impl Timeline {
    fn deadline(&self, beat: u64) -> Instant {
        let beats = (beat - self.anchor_beat).min(u32::MAX as u64) as u32;
        self.anchor + self.interval.saturating_mul(beats)
    }

    /// Re-anchors at the given beat if the interval changed.
    fn retime(&mut self, beat: u64, at: Instant, interval: Duration) {
        if interval != self.interval {
            debug!(
                from_ms = self.interval.as_millis(),
                to_ms = interval.as_millis(),
                "Re-anchoring metronome"
            );
            self.anchor = at;
            self.anchor_beat = beat;
            self.interval = interval;
        }
    }
}

struct Inner {
    state: Mutex<MetronomeState>,
    listener: Mutex<Option<BeatListener>>,
    clock: Arc<dyn Clock>,
    engine: Arc<PlaybackEngine>,
    tempo_ramp: Duration,
}

impl Inner {
    /// Ticks until the generation changes.
    async fn run(self: Arc<Self>, generation: u64, anchor: Instant) {
        let mut timeline = Timeline {
            anchor,
            anchor_beat: 0,
            interval: self.state.lock().interval_at(anchor),
        };

        let mut beat = 0;
        loop {
            let deadline = timeline.deadline(beat);
            self.clock.sleep_until(deadline).await;

            let (tick, interval) = {
                let mut state = self.state.lock();
                if state.generation != generation || !state.is_running() {
                    debug!("Metronome task is stale, exiting");
                    return;
                }
                let tick = state.advance();
                (tick, state.interval_at(deadline))
            };

            let (sound, base) = if tick.accent {
                (Sound::ClickAccent, ACCENT_GAIN)
            } else {
                (Sound::ClickBeat, BEAT_GAIN)
            };
            let gain = base * tick.volume;
            if gain > 0.0 {
                self.engine.play(sound, gain);
            }

            let listener = self.listener.lock().clone();
            if let Some(listener) = listener {
                listener(BeatEvent {
                    beat_in_bar: tick.beat_in_bar,
                    bar: tick.bar,
                    accent: tick.accent,
                    scheduled_at: deadline,
                });
            }

            timeline.retime(beat, deadline, interval);
            beat += 1;
        }
    }
}

/// A drift-free metronome that plays its clicks through the playback engine.
pub struct Metronome {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Metronome {
    /// Creates a stopped metronome on tokio's clock.
    pub fn new(
        config: &config::Metronome,
        engine: Arc<PlaybackEngine>,
    ) -> Result<Metronome, ConfigError> {
        Metronome::with_clock(config, engine, Arc::new(TokioClock))
    }

    /// Creates a stopped metronome on the given clock.
    pub fn with_clock(
        config: &config::Metronome,
        engine: Arc<PlaybackEngine>,
        clock: Arc<dyn Clock>,
    ) -> Result<Metronome, ConfigError> {
        let mut state = MetronomeState::new(config.bpm(), config.beats_per_bar());
        for (beat, accent) in config.accents().unwrap_or_default().iter().enumerate() {
            state.set_accent_for_beat(beat, *accent);
        }
        for (beat, volume) in config.volumes().unwrap_or_default().iter().enumerate() {
            state.set_volume_for_beat(beat, *volume);
        }

        Ok(Metronome {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                listener: Mutex::new(None),
                clock,
                engine,
                tempo_ramp: config.tempo_ramp()?,
            }),
            task: Mutex::new(None),
        })
    }

    /// Starts ticking from beat one. Does nothing if already running.
    pub fn start(&self) -> Result<(), MetronomeError> {
        let handle = Handle::try_current().map_err(|_| MetronomeError::NoRuntime)?;

        let mut task = self.task.lock();
        let (generation, bpm, beats_per_bar) = {
            let mut state = self.inner.state.lock();
            if state.is_running() {
                return Ok(());
            }
            (state.start(), state.bpm(), state.beats_per_bar())
        };
        info!(bpm, beats_per_bar, "Metronome started");

        let anchor = self.inner.clock.now();
        let span = span!(Level::INFO, "metronome", generation);
        if let Some(previous) =
            task.replace(handle.spawn(self.inner.clone().run(generation, anchor).instrument(span)))
        {
            previous.abort();
        }
        Ok(())
    }

    /// Stops ticking. Pending ticks are cancelled; counters are kept.
    pub fn stop(&self) {
        let mut task = self.task.lock();
        {
            let mut state = self.inner.state.lock();
            if !state.is_running() {
                return;
            }
            state.stop();
        }
        if let Some(task) = task.take() {
            task.abort();
        }
        info!("Metronome stopped");
    }

    /// Starts or stops the metronome and returns whether it is now running.
    pub fn toggle(&self) -> Result<bool, MetronomeError> {
        if self.is_running() {
            self.stop();
            Ok(false)
        } else {
            self.start()?;
            Ok(true)
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().is_running()
    }

    /// Sets the tempo, clamped to 30 - 300 BPM. The change ramps in over the
    /// configured ramp time.
    pub fn set_tempo(&self, bpm: u32) {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        state.set_tempo(bpm, now, self.inner.tempo_ramp);
        info!(bpm = state.bpm(), "Metronome tempo set");
    }

    /// Sets the beats per bar, clamped to 1 - 12. A running bar finishes first.
    pub fn set_beats_per_bar(&self, beats_per_bar: u32) {
        let mut state = self.inner.state.lock();
        state.set_beats_per_bar(beats_per_bar);
        info!(beats_per_bar = state.beats_per_bar(), "Metronome meter set");
    }

    /// Sets the volume of a beat. Returns false if the beat is out of range.
    pub fn set_volume_for_beat(&self, beat: usize, volume: f32) -> bool {
        self.inner.state.lock().set_volume_for_beat(beat, volume)
    }

    /// Sets the accent of a beat. Returns false if the beat is out of range.
    pub fn set_accent_for_beat(&self, beat: usize, accent: bool) -> bool {
        self.inner.state.lock().set_accent_for_beat(beat, accent)
    }

    /// Registers the beat listener, replacing any previous one. There is a single
    /// slot: registering a second listener silently drops the first. None clears it.
    pub fn set_listener(&self, listener: Option<BeatListener>) {
        *self.inner.listener.lock() = listener;
    }

    /// A snapshot of the metronome state.
    pub fn state(&self) -> MetronomeState {
        self.inner.state.lock().clone()
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::StrategyKind;
    use crate::testutil::RecordingStrategy;

    /// Beat events with the time the listener saw them.
    type Seen = Arc<Mutex<Vec<(BeatEvent, Instant)>>>;

    async fn metronome(bpm: u32, beats_per_bar: u32) -> (Metronome, Arc<RecordingStrategy>, Seen) {
        let synth = Arc::new(RecordingStrategy::new(StrategyKind::Synth, Ok(())));
        let engine = Arc::new(PlaybackEngine::synth_only(synth.clone()));
        engine.prepare().await.unwrap();

        let metronome = Metronome::new(&config::Metronome::new(bpm, beats_per_bar), engine).unwrap();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        metronome.set_listener(Some(Arc::new(move |event: BeatEvent| {
            sink.lock().push((event, Instant::now()));
        })));
        (metronome, synth, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_drift_over_100_beats() {
        let (metronome, _, seen) = metronome(120, 4).await;
        let start = Instant::now();
        metronome.start().unwrap();

        tokio::time::sleep(Duration::from_millis(500 * 99 + 250)).await;
        metronome.stop();

        let seen = seen.lock();
        assert_eq!(100, seen.len());
        for (beat, (event, fired_at)) in seen.iter().enumerate() {
            let expected = start + Duration::from_millis(500) * beat as u32;
            assert_eq!(expected, event.scheduled_at, "beat {} drifted", beat);
            assert!(
                fired_at.duration_since(event.scheduled_at) < Duration::from_millis(2),
                "beat {} fired late",
                beat
            );
            assert_eq!(beat % 4, event.beat_in_bar);
            assert_eq!((beat / 4) as u64 + 1, event.bar);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_twice_resets_counters_once() {
        let (metronome, _, seen) = metronome(120, 4).await;

        assert!(metronome.toggle().unwrap());
        tokio::time::sleep(Duration::from_millis(1250)).await;
        assert_eq!(3, seen.lock().len());

        assert!(!metronome.toggle().unwrap());
        let stopped = metronome.state();
        assert!(!stopped.is_running());
        assert_eq!(3, stopped.total_beats());
        assert_eq!(1, stopped.bar());
        assert_eq!(3, stopped.beat_in_bar());

        assert!(metronome.toggle().unwrap());
        let restarted = metronome.state();
        assert_eq!(0, restarted.total_beats());
        assert_eq!(0, restarted.bar());
        assert_eq!(0, restarted.beat_in_bar());

        tokio::time::sleep(Duration::from_millis(10)).await;
        let (first, _) = seen.lock()[3];
        assert_eq!((0, 1), (first.beat_in_bar, first.bar));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_ticks() {
        let (metronome, strategy, seen) = metronome(120, 4).await;
        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(750)).await;
        metronome.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(2, seen.lock().len());
        assert_eq!(2, strategy.played().len());
        assert!(!metronome.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accents_and_volumes() {
        let (metronome, strategy, seen) = metronome(120, 4).await;
        assert!(metronome.set_volume_for_beat(1, 0.5));
        assert!(metronome.set_accent_for_beat(2, true));
        assert!(metronome.set_volume_for_beat(3, 0.0));
        assert!(!metronome.set_accent_for_beat(4, true));

        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(1750)).await;
        metronome.stop();

        assert_eq!(
            vec![
                (Sound::ClickAccent, ACCENT_GAIN),
                (Sound::ClickBeat, BEAT_GAIN * 0.5),
                (Sound::ClickAccent, ACCENT_GAIN),
            ],
            strategy.played()
        );
        let accents: Vec<bool> = seen.lock().iter().map(|(event, _)| event.accent).collect();
        assert_eq!(vec![true, false, true, false], accents);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tempo_change_re_anchors() {
        let (metronome, _, seen) = metronome(120, 4).await;
        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(750)).await;
        metronome.set_tempo(60);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        metronome.stop();

        let seen = seen.lock();
        let gaps: Vec<Duration> = seen
            .windows(2)
            .map(|pair| pair[1].0.scheduled_at - pair[0].0.scheduled_at)
            .collect();
        assert_eq!(
            vec![
                Duration::from_millis(500),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(1),
            ],
            gaps
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_meter_change_while_running() {
        let (metronome, _, seen) = metronome(120, 4).await;
        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        metronome.set_beats_per_bar(2);
        tokio::time::sleep(Duration::from_millis(3000)).await;
        metronome.stop();

        let positions: Vec<(usize, u64)> = seen
            .lock()
            .iter()
            .map(|(event, _)| (event.beat_in_bar, event.bar))
            .collect();
        assert_eq!(
            vec![(0, 1), (1, 1), (2, 1), (3, 1), (0, 2), (1, 2), (0, 3)],
            positions
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_listener_slot() {
        let (metronome, _, first) = metronome(120, 4).await;
        let second: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = second.clone();
        metronome.set_listener(Some(Arc::new(move |event: BeatEvent| {
            sink.lock().push((event, Instant::now()));
        })));

        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        metronome.set_listener(None);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        metronome.stop();

        assert!(first.lock().is_empty());
        assert_eq!(1, second.lock().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (metronome, _, seen) = metronome(120, 4).await;
        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let bars: Vec<(usize, u64)> = seen
            .lock()
            .iter()
            .map(|(event, _)| (event.beat_in_bar, event.bar))
            .collect();
        assert_eq!(vec![(0, 1), (1, 1)], bars);
    }

    #[test]
    fn test_start_requires_runtime() {
        let synth = Arc::new(RecordingStrategy::new(StrategyKind::Synth, Ok(())));
        let engine = Arc::new(PlaybackEngine::synth_only(synth));
        let metronome = Metronome::new(&config::Metronome::new(100, 4), engine).unwrap();
        assert!(matches!(metronome.start(), Err(MetronomeError::NoRuntime)));
        assert!(!metronome.is_running());
    }
}
