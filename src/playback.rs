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

//! Sound production. Two strategies exist, sample playback and parametric synthesis,
//! and the [PlaybackEngine] routes every request to whichever one is active.
//!
//! The engine starts on the sample strategy. If its resources fail to load, the engine
//! switches to the synth strategy exactly once and never goes back. Requests that
//! arrive before the outcome is known are queued and delivered to the strategy that
//! ended up active, so no request is ever split across strategies.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::{runtime::Handle, sync::OnceCell};
use tracing::{debug, error, info, warn};

use crate::kit::{Sound, Voice};

pub mod loader;
pub mod sample;
pub mod synth;

pub use loader::{FileLoader, ResourceLoader};
pub use sample::SampleStrategy;
pub use synth::SynthStrategy;

/// The maximum number of requests held while the engine is preparing.
const MAX_PENDING: usize = 256;

/// Slot of the sample strategy in the strategy table.
const SAMPLE: usize = 0;
/// Slot of the synth strategy in the strategy table.
const SYNTH: usize = 1;

/// The kind of a playback strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Sample,
    Synth,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Sample => write!(f, "samples"),
            StrategyKind::Synth => write!(f, "synth fallback"),
        }
    }
}

/// Failure to load a sound resource. Cloneable so a memoized outcome can be handed
/// to every caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("resource {resource} not found: {reason}")]
    NotFound { resource: String, reason: String },

    #[error("unable to decode resource {resource}: {reason}")]
    Decode { resource: String, reason: String },

    #[error("resource {resource} contains no audio")]
    Empty { resource: String },

    #[error("loader task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no playback strategy could be prepared: {0}")]
    Unavailable(LoadError),
}

/// The future returned by [Strategy::prepare].
pub type PrepareFuture<'a> = Pin<Box<dyn Future<Output = Result<(), LoadError>> + Send + 'a>>;

/// A way of producing sound.
pub trait Strategy: Send + Sync {
    /// The kind of this strategy.
    fn kind(&self) -> StrategyKind;

    /// Gets the strategy ready to play. Idempotent: the first outcome is memoized and
    /// returned to every later caller.
    fn prepare(&self) -> PrepareFuture<'_>;

    /// Starts a sound at the given linear gain. Never blocks.
    fn play(&self, sound: Sound, gain: f32);

    /// Fades out any ringing instances of the voice.
    fn release(&self, voice: Voice);
}

/// A request that arrived before the engine was ready.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Request {
    Play(Sound, f32),
    Release(Voice),
}

/// Routes playback requests to the active strategy.
pub struct PlaybackEngine {
    /// Fixed strategy table. The synth slot is always filled.
    strategies: [Option<Arc<dyn Strategy>>; 2],
    /// Index of the active strategy. Written only before readiness is published.
    active: AtomicUsize,
    /// Set once the active strategy is final.
    ready: AtomicBool,
    /// Set once somebody has kicked off preparation.
    prepare_started: AtomicBool,
    /// Requests waiting for readiness.
    pending: Mutex<Vec<Request>>,
    /// The memoized preparation outcome.
    prepared: OnceCell<StrategyKind>,
}

impl PlaybackEngine {
    /// Creates an engine that prefers samples and falls back to the synth.
    pub fn new(sample: Arc<dyn Strategy>, synth: Arc<dyn Strategy>) -> PlaybackEngine {
        PlaybackEngine {
            strategies: [Some(sample), Some(synth)],
            active: AtomicUsize::new(SAMPLE),
            ready: AtomicBool::new(false),
            prepare_started: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            prepared: OnceCell::new(),
        }
    }

    /// Creates an engine that only ever synthesizes.
    pub fn synth_only(synth: Arc<dyn Strategy>) -> PlaybackEngine {
        PlaybackEngine {
            strategies: [None, Some(synth)],
            active: AtomicUsize::new(SYNTH),
            ready: AtomicBool::new(false),
            prepare_started: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            prepared: OnceCell::new(),
        }
    }

    /// The currently active strategy kind.
    pub fn kind(&self) -> StrategyKind {
        match self.active.load(Ordering::Acquire) {
            SAMPLE => StrategyKind::Sample,
            _ => StrategyKind::Synth,
        }
    }

    /// True once the active strategy is final and prepared.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Prepares the engine. Concurrent callers all wait on the same single attempt.
    /// A sample load failure is not an error: the engine falls back to the synth and
    /// reports [StrategyKind::Synth].
    pub async fn prepare(&self) -> Result<StrategyKind, PlaybackError> {
        self.prepare_started.store(true, Ordering::Release);
        let kind = self
            .prepared
            .get_or_try_init(|| self.prepare_strategies())
            .await?;
        Ok(*kind)
    }

    async fn prepare_strategies(&self) -> Result<StrategyKind, PlaybackError> {
        if let Some(sample) = &self.strategies[SAMPLE] {
            match sample.prepare().await {
                Ok(()) => {
                    self.publish(SAMPLE);
                    info!(strategy = %StrategyKind::Sample, "Playback ready");
                    return Ok(StrategyKind::Sample);
                }
                Err(e) => {
                    warn!(err = %e, "Unable to load samples, falling back to synthesis");
                }
            }
        }

        // The swap happens before readiness, so nothing has been dispatched yet.
        self.active.store(SYNTH, Ordering::Release);
        let result = match &self.strategies[SYNTH] {
            Some(synth) => synth.prepare().await,
            None => Err(LoadError::Task("no synth strategy".to_string())),
        };
        self.publish(SYNTH);
        match result {
            Ok(()) => {
                info!(strategy = %StrategyKind::Synth, "Playback ready");
                Ok(StrategyKind::Synth)
            }
            Err(e) => {
                error!(err = %e, "Unable to prepare synthesis");
                Err(PlaybackError::Unavailable(e))
            }
        }
    }

    /// Marks the strategy at the index as final and delivers queued requests to it.
    fn publish(&self, index: usize) {
        self.active.store(index, Ordering::Release);

        // Readiness flips under the queue lock, so a request either lands in the
        // queue before the drain or sees readiness and dispatches directly.
        let mut pending = self.pending.lock();
        self.ready.store(true, Ordering::Release);
        if pending.is_empty() {
            return;
        }
        debug!(count = pending.len(), "Delivering queued playback requests");
        if let Some(strategy) = &self.strategies[index] {
            for request in pending.drain(..) {
                Self::dispatch(strategy.as_ref(), request);
            }
        } else {
            pending.clear();
        }
    }

    /// Plays a sound at the given gain on the active strategy. If the engine is not
    /// ready yet the request is queued and preparation is started in the background.
    pub fn play(self: &Arc<Self>, sound: Sound, gain: f32) {
        self.submit(Request::Play(sound, gain));
    }

    /// Fades out the voice on the active strategy.
    pub fn release(self: &Arc<Self>, voice: Voice) {
        self.submit(Request::Release(voice));
    }

    fn submit(self: &Arc<Self>, request: Request) {
        if !self.is_ready() {
            let mut pending = self.pending.lock();
            if !self.ready.load(Ordering::Acquire) {
                if pending.len() >= MAX_PENDING {
                    debug!(?request, "Playback queue full, dropping oldest request");
                    pending.remove(0);
                }
                pending.push(request);
                drop(pending);
                self.ensure_preparing();
                return;
            }
        }

        if let Some(strategy) = &self.strategies[self.active.load(Ordering::Acquire)] {
            Self::dispatch(strategy.as_ref(), request);
        }
    }

    fn dispatch(strategy: &dyn Strategy, request: Request) {
        match request {
            Request::Play(sound, gain) => strategy.play(sound, gain),
            Request::Release(voice) => strategy.release(voice),
        }
    }

    /// Starts preparation on the current runtime if nobody has yet.
    fn ensure_preparing(self: &Arc<Self>) {
        if self.prepare_started.swap(true, Ordering::AcqRel) {
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let engine = self.clone();
                handle.spawn(async move {
                    if let Err(e) = engine.prepare().await {
                        error!(err = %e, "Playback preparation failed");
                    }
                });
            }
            Err(_) => {
                self.prepare_started.store(false, Ordering::Release);
                warn!("No async runtime available to prepare playback");
            }
        }
    }
}

impl fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("kind", &self.kind())
            .field("ready", &self.is_ready())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::{eventually_async, RecordingStrategy};

    fn engine(
        sample_result: Result<(), LoadError>,
    ) -> (Arc<PlaybackEngine>, Arc<RecordingStrategy>, Arc<RecordingStrategy>) {
        let sample = Arc::new(RecordingStrategy::new(StrategyKind::Sample, sample_result));
        let synth = Arc::new(RecordingStrategy::new(StrategyKind::Synth, Ok(())));
        let engine = Arc::new(PlaybackEngine::new(sample.clone(), synth.clone()));
        (engine, sample, synth)
    }

    fn missing() -> LoadError {
        LoadError::NotFound {
            resource: "kick.wav".to_string(),
            reason: "no such file".to_string(),
        }
    }

    #[tokio::test]
    async fn test_prepare_samples() {
        let (engine, sample, synth) = engine(Ok(()));
        assert!(!engine.is_ready());
        assert_eq!(StrategyKind::Sample, engine.prepare().await.unwrap());
        assert!(engine.is_ready());
        assert_eq!(StrategyKind::Sample, engine.kind());

        engine.play(Sound::Kick, 0.5);
        assert_eq!(vec![(Sound::Kick, 0.5)], sample.played());
        assert!(synth.played().is_empty());
        assert_eq!(0, synth.prepare_count());
    }

    #[tokio::test]
    async fn test_prepare_is_memoized() {
        let (engine, sample, _) = engine(Ok(()));
        let (a, b) = tokio::join!(engine.prepare(), engine.prepare());
        assert_eq!(StrategyKind::Sample, a.unwrap());
        assert_eq!(StrategyKind::Sample, b.unwrap());
        engine.prepare().await.unwrap();
        assert_eq!(1, sample.prepare_count());
    }

    #[tokio::test]
    async fn test_fallback_to_synth() {
        let (engine, sample, synth) = engine(Err(missing()));
        assert_eq!(StrategyKind::Synth, engine.prepare().await.unwrap());
        assert_eq!(StrategyKind::Synth, engine.kind());
        assert_eq!(1, synth.prepare_count());

        engine.play(Sound::Snare14, 1.0);
        engine.release(Voice::HiHatOpen);
        assert!(sample.played().is_empty());
        assert_eq!(vec![(Sound::Snare14, 1.0)], synth.played());
        assert_eq!(vec![Voice::HiHatOpen], synth.released());

        // The fallback is permanent.
        assert_eq!(StrategyKind::Synth, engine.prepare().await.unwrap());
        assert_eq!(1, sample.prepare_count());
    }

    #[tokio::test]
    async fn test_in_flight_requests_follow_fallback() {
        let sample = Arc::new(
            RecordingStrategy::new(StrategyKind::Sample, Err(missing()))
                .with_delay(Duration::from_millis(50)),
        );
        let synth = Arc::new(RecordingStrategy::new(StrategyKind::Synth, Ok(())));
        let engine = Arc::new(PlaybackEngine::new(sample.clone(), synth.clone()));

        // Issued while the sample load is still in flight.
        engine.play(Sound::Kick, 1.0);
        engine.play(Sound::HiHatClosed, 0.5);
        assert!(!engine.is_ready());

        eventually_async(
            || {
                let engine = engine.clone();
                async move { engine.is_ready() }
            },
            "Engine never became ready",
        )
        .await;

        assert!(sample.played().is_empty());
        assert_eq!(
            vec![(Sound::Kick, 1.0), (Sound::HiHatClosed, 0.5)],
            synth.played()
        );
        assert_eq!(StrategyKind::Synth, engine.kind());
    }

    #[tokio::test]
    async fn test_lazy_prepare_on_first_play() {
        let (engine, sample, _) = engine(Ok(()));
        engine.play(Sound::Ride, 0.25);

        eventually_async(
            || {
                let sample = sample.clone();
                async move { !sample.played().is_empty() }
            },
            "Queued request was never delivered",
        )
        .await;
        assert_eq!(vec![(Sound::Ride, 0.25)], sample.played());
        assert_eq!(1, sample.prepare_count());
    }

    #[tokio::test]
    async fn test_synth_only() {
        let synth = Arc::new(RecordingStrategy::new(StrategyKind::Synth, Ok(())));
        let engine = Arc::new(PlaybackEngine::synth_only(synth.clone()));
        assert_eq!(StrategyKind::Synth, engine.kind());
        assert_eq!(StrategyKind::Synth, engine.prepare().await.unwrap());
        engine.play(Sound::ClickAccent, 0.9);
        assert_eq!(vec![(Sound::ClickAccent, 0.9)], synth.played());
    }

    #[tokio::test]
    async fn test_synth_failure_reported() {
        let sample = Arc::new(RecordingStrategy::new(StrategyKind::Sample, Err(missing())));
        let synth = Arc::new(RecordingStrategy::new(
            StrategyKind::Synth,
            Err(LoadError::Task("boom".to_string())),
        ));
        let engine = Arc::new(PlaybackEngine::new(sample, synth));
        assert!(matches!(
            engine.prepare().await,
            Err(PlaybackError::Unavailable(LoadError::Task(_)))
        ));
        assert!(engine.is_ready());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!("samples", StrategyKind::Sample.to_string());
        assert_eq!("synth fallback", StrategyKind::Synth.to_string());
    }
}
