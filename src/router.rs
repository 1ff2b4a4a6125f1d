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

//! Turns input events and pad hits into sound. Applies the hi-hat choke group,
//! resolves per-voice variants and tracks the hi-hat pedal.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::{self, NoteOffBehavior};
use crate::kit::{self, Voice};
use crate::midi::{EventKind, InputEvent};
use crate::playback::PlaybackEngine;

/// The highest MIDI velocity.
const MAX_VELOCITY: u8 = 127;

/// Pedal value stored before any pedal CC has been seen.
const NO_PEDAL: u8 = u8::MAX;

/// Capacity of the visual trigger channel. Slow listeners drop old triggers.
const VISUAL_CAPACITY: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("{voice} has no variant {variant}")]
    UnknownVariant { voice: Voice, variant: String },
}

/// Routes input events to the playback engine.
pub struct Router {
    engine: Arc<PlaybackEngine>,
    /// Selected variant index of each voice.
    variants: [AtomicU8; Voice::COUNT],
    /// Latest pedal value, or [NO_PEDAL].
    pedal: AtomicU8,
    pedal_controller: u8,
    pedal_threshold: u8,
    note_off: NoteOffBehavior,
    visual: broadcast::Sender<Voice>,
}

impl Router {
    pub fn new(engine: Arc<PlaybackEngine>, config: &config::Kit) -> Router {
        let pedal = config.hi_hat_pedal();
        let (visual, _) = broadcast::channel(VISUAL_CAPACITY);
        Router {
            engine,
            variants: std::array::from_fn(|_| AtomicU8::new(0)),
            pedal: AtomicU8::new(NO_PEDAL),
            pedal_controller: pedal.controller(),
            pedal_threshold: pedal.threshold(),
            note_off: config.note_off(),
            visual,
        }
    }

    /// The playback engine sounds are sent to.
    pub fn engine(&self) -> &Arc<PlaybackEngine> {
        &self.engine
    }

    /// Subscribes to visual triggers. Every audible trigger sends its voice.
    pub fn subscribe_visual(&self) -> broadcast::Receiver<Voice> {
        self.visual.subscribe()
    }

    /// Handles a decoded input event.
    pub fn handle(&self, event: InputEvent) {
        match event.kind {
            EventKind::NoteOn => match self.resolve(event.number) {
                Some(voice) => self.trigger(voice, event.value),
                None => debug!(note = event.number, "Ignoring unmapped note"),
            },
            EventKind::NoteOff => self.note_off(event.number),
            EventKind::ControlChange if event.number == self.pedal_controller => {
                debug!(value = event.value, "Hi-hat pedal moved");
                self.pedal.store(event.value, Ordering::Relaxed);
            }
            EventKind::ControlChange => {
                debug!(controller = event.number, "Ignoring control change");
            }
        }
    }

    /// Maps a note to a voice, taking the hi-hat pedal into account.
    pub fn resolve(&self, note: u8) -> Option<Voice> {
        let voice = kit::route(note)?;
        if !matches!(voice, Voice::HiHatClosed | Voice::HiHatOpen) {
            return Some(voice);
        }
        match self.pedal_value() {
            Some(value) if value > self.pedal_threshold => Some(Voice::HiHatOpen),
            Some(_) => Some(Voice::HiHatClosed),
            None => Some(voice),
        }
    }

    /// The latest hi-hat pedal value, if any has been received.
    pub fn pedal_value(&self) -> Option<u8> {
        match self.pedal.load(Ordering::Relaxed) {
            NO_PEDAL => None,
            value => Some(value),
        }
    }

    /// Plays a voice at the given velocity. Velocity zero is silent.
    pub fn trigger(&self, voice: Voice, velocity: u8) {
        let gain = velocity.min(MAX_VELOCITY) as f32 / MAX_VELOCITY as f32;
        if gain <= 0.0 {
            debug!(voice = %voice, "Ignoring silent trigger");
            return;
        }

        if let Some(group) = voice.choke_group() {
            for member in group.members().iter().filter(|member| **member != voice) {
                self.engine.release(*member);
            }
        }

        let sound = voice.sound(self.variants[voice.index()].load(Ordering::Relaxed) as usize);
        debug!(voice = %voice, sound = %sound, gain, "Trigger");
        self.engine.play(sound, gain);

        // Nobody listening is fine.
        let _ = self.visual.send(voice);
    }

    /// Applies the note off behavior to the note's voice.
    fn note_off(&self, note: u8) {
        if self.note_off != NoteOffBehavior::Release {
            return;
        }
        if let Some(voice) = self.resolve(note) {
            self.engine.release(voice);
        }
    }

    /// Selects the variant of a voice, e.g. snare "18" or crash "2".
    pub fn set_variant(&self, voice: Voice, variant: &str) -> Result<(), RouterError> {
        let index = voice
            .variant_index(variant)
            .ok_or_else(|| RouterError::UnknownVariant {
                voice,
                variant: variant.to_string(),
            })?;
        self.variants[voice.index()].store(index as u8, Ordering::Relaxed);
        info!(voice = %voice, variant, "Variant selected");
        Ok(())
    }

    /// The selected variant of a voice.
    pub fn variant(&self, voice: Voice) -> &'static str {
        voice.variant_id(self.variants[voice.index()].load(Ordering::Relaxed) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::Sound;
    use crate::playback::StrategyKind;
    use crate::testutil::RecordingStrategy;

    async fn router(yaml: &str) -> (Router, Arc<RecordingStrategy>) {
        let config = crate::config::Config::parse(yaml).unwrap();
        let synth = Arc::new(RecordingStrategy::new(StrategyKind::Synth, Ok(())));
        let engine = Arc::new(PlaybackEngine::synth_only(synth.clone()));
        engine.prepare().await.unwrap();
        (Router::new(engine, config.kit()), synth)
    }

    #[tokio::test]
    async fn test_velocity_to_gain() {
        let (router, strategy) = router("{}").await;
        router.trigger(Voice::Kick, 127);
        router.trigger(Voice::Kick, 200);
        router.trigger(Voice::Ride, 0);
        assert_eq!(
            vec![(Sound::Kick, 1.0), (Sound::Kick, 1.0)],
            strategy.played()
        );
    }

    #[tokio::test]
    async fn test_hi_hat_choke() {
        let (router, strategy) = router("{}").await;

        router.trigger(Voice::HiHatOpen, 100);
        assert!(strategy.released().iter().all(|v| *v != Voice::HiHatOpen));

        // Every closed or pedal hit chokes the open hat, however many times.
        for voice in [Voice::HiHatClosed, Voice::HiHatPedal, Voice::HiHatClosed] {
            let before = strategy
                .released()
                .iter()
                .filter(|v| **v == Voice::HiHatOpen)
                .count();
            router.trigger(voice, 90);
            let after = strategy
                .released()
                .iter()
                .filter(|v| **v == Voice::HiHatOpen)
                .count();
            assert_eq!(before + 1, after);
            assert!(!strategy.released().contains(&Voice::Kick));
        }

        // Other voices never choke.
        let released = strategy.released().len();
        router.trigger(Voice::Crash, 100);
        router.trigger(Voice::Snare, 100);
        assert_eq!(released, strategy.released().len());
    }

    #[tokio::test]
    async fn test_silent_trigger_does_not_choke() {
        let (router, strategy) = router("{}").await;
        router.trigger(Voice::HiHatClosed, 0);
        assert!(strategy.released().is_empty());
        assert!(strategy.played().is_empty());
    }

    #[tokio::test]
    async fn test_variants() {
        let (router, strategy) = router("{}").await;
        assert_eq!("14", router.variant(Voice::Snare));
        assert_eq!("1", router.variant(Voice::Crash));

        router.set_variant(Voice::Snare, "18").unwrap();
        router.set_variant(Voice::Crash, "2").unwrap();
        assert_eq!(
            Err(RouterError::UnknownVariant {
                voice: Voice::Snare,
                variant: "13".to_string()
            }),
            router.set_variant(Voice::Snare, "13")
        );
        assert_eq!("18", router.variant(Voice::Snare));

        router.trigger(Voice::Snare, 127);
        router.trigger(Voice::Crash, 127);
        assert_eq!(
            vec![(Sound::Snare18, 1.0), (Sound::Crash2, 1.0)],
            strategy.played()
        );
    }

    #[tokio::test]
    async fn test_handle_note_events() {
        let (router, strategy) = router("kit:\n  note_off: release\n").await;
        router.handle(InputEvent::decode(&[0x99, 36, 127]).unwrap());
        router.handle(InputEvent::decode(&[0x90, 60, 127]).unwrap());
        router.handle(InputEvent::decode(&[0x89, 36, 64]).unwrap());
        assert_eq!(vec![(Sound::Kick, 1.0)], strategy.played());
        assert_eq!(vec![Voice::Kick], strategy.released());
    }

    #[tokio::test]
    async fn test_zero_velocity_note_on_is_note_off() {
        let (zero, zero_strategy) = router("kit:\n  note_off: release\n").await;
        let (off, off_strategy) = router("kit:\n  note_off: release\n").await;

        zero.handle(InputEvent::decode(&[0x90, 38, 0]).unwrap());
        off.handle(InputEvent::decode(&[0x80, 38, 0]).unwrap());

        assert!(zero_strategy.played().is_empty());
        assert_eq!(off_strategy.played(), zero_strategy.played());
        assert_eq!(off_strategy.released(), zero_strategy.released());
        assert_eq!(vec![Voice::Snare], zero_strategy.released());
    }

    #[tokio::test]
    async fn test_note_off_play_to_completion() {
        let (router, strategy) = router("{}").await;
        router.handle(InputEvent::note_on(0, 51, 100));
        router.handle(InputEvent::note_off(0, 51));
        router.handle(InputEvent::note_on(0, 51, 0));
        assert_eq!(1, strategy.played().len());
        assert!(strategy.released().is_empty());
    }

    #[tokio::test]
    async fn test_hi_hat_pedal() {
        let (router, strategy) = router("{}").await;

        // No pedal yet: the note decides.
        assert_eq!(Some(Voice::HiHatOpen), router.resolve(46));
        assert_eq!(None, router.pedal_value());

        router.handle(InputEvent::control_change(0, 4, 100));
        assert_eq!(Some(100), router.pedal_value());
        assert_eq!(Some(Voice::HiHatOpen), router.resolve(42));

        router.handle(InputEvent::control_change(0, 4, 64));
        assert_eq!(Some(Voice::HiHatClosed), router.resolve(46));
        assert_eq!(Some(Voice::HiHatPedal), router.resolve(44));

        // Other controllers are ignored.
        router.handle(InputEvent::control_change(0, 7, 127));
        assert_eq!(Some(64), router.pedal_value());

        router.handle(InputEvent::note_on(0, 46, 127));
        assert_eq!(vec![(Sound::HiHatClosed, 1.0)], strategy.played());
    }

    #[tokio::test]
    async fn test_custom_pedal_controller() {
        let (router, _) = router("kit:\n  hi_hat_pedal:\n    controller: 11\n    threshold: 10\n").await;
        router.handle(InputEvent::control_change(0, 4, 127));
        assert_eq!(None, router.pedal_value());
        router.handle(InputEvent::control_change(0, 11, 11));
        assert_eq!(Some(Voice::HiHatOpen), router.resolve(42));
    }

    #[tokio::test]
    async fn test_visual_triggers() {
        let (router, _) = router("{}").await;

        // No listeners is not an error.
        router.trigger(Voice::Kick, 100);

        let mut visual = router.subscribe_visual();
        router.trigger(Voice::TomFloor, 100);
        router.trigger(Voice::TomMid, 0);
        router.trigger(Voice::Ride, 1);
        assert_eq!(Voice::TomFloor, visual.recv().await.unwrap());
        assert_eq!(Voice::Ride, visual.recv().await.unwrap());
        assert!(visual.try_recv().is_err());
    }
}
