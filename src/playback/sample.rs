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

//! Playback of pre-recorded one-shot samples.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::synth::{self, SynthVoice};
use super::{LoadError, PrepareFuture, ResourceLoader, Strategy, StrategyKind};
use crate::audio::{next_source_id, ActiveSource, MixerHandle, Source};
use crate::kit::{Sound, Voice};

/// Loaded sample data indexed by [Sound::index]. A click without a sample is None
/// and gets synthesized.
type Bank = Vec<Option<Arc<[f32]>>>;

/// A one-shot read of a shared sample buffer.
pub struct BufferSource {
    data: Arc<[f32]>,
    position: usize,
}

impl BufferSource {
    pub fn new(data: Arc<[f32]>) -> BufferSource {
        BufferSource { data, position: 0 }
    }
}

impl Source for BufferSource {
    fn next_sample(&mut self) -> Option<f32> {
        let sample = self.data.get(self.position).copied();
        self.position += 1;
        sample
    }
}

/// Returns the default resource name of every sound.
pub fn default_resources() -> [String; Sound::COUNT] {
    Sound::ALL.map(|sound| sound.default_resource().to_string())
}

/// Plays sounds from a fixed bank of samples, one per [Sound].
pub struct SampleStrategy {
    loader: Arc<dyn ResourceLoader>,
    /// Resource names indexed by [Sound::index].
    resources: [String; Sound::COUNT],
    mixer: MixerHandle,
    release_time: Duration,
    bank: OnceCell<Result<Bank, LoadError>>,
}

impl SampleStrategy {
    pub fn new(
        loader: Arc<dyn ResourceLoader>,
        resources: [String; Sound::COUNT],
        mixer: MixerHandle,
        release_time: Duration,
    ) -> SampleStrategy {
        SampleStrategy {
            loader,
            resources,
            mixer,
            release_time,
            bank: OnceCell::new(),
        }
    }

    /// Loads every resource once, even when sounds share it. Fails on the first kit
    /// resource that cannot be loaded. Missing clicks are not an error.
    async fn load_bank(&self) -> Result<Bank, LoadError> {
        let mut loaded: HashMap<&str, Arc<[f32]>> = HashMap::new();
        let mut bank: Bank = Vec::with_capacity(Sound::COUNT);
        for sound in Sound::ALL {
            let resource = self.resources[sound.index()].as_str();
            if let Some(samples) = loaded.get(resource) {
                bank.push(Some(samples.clone()));
                continue;
            }

            debug!(sound = %sound, resource, "Loading sample");
            let samples = match self.load(resource).await {
                Ok(samples) => samples,
                Err(e) if sound.is_click() => {
                    info!(sound = %sound, err = %e, "No click sample, synthesizing it");
                    bank.push(None);
                    continue;
                }
                Err(e) => return Err(e),
            };
            loaded.insert(resource, samples.clone());
            bank.push(Some(samples));
        }

        let total_kb = loaded
            .values()
            .map(|samples| samples.len() * std::mem::size_of::<f32>())
            .sum::<usize>()
            / 1024;
        info!(
            samples = loaded.len(),
            memory_kb = total_kb,
            "Sample bank loaded"
        );
        Ok(bank)
    }

    async fn load(&self, resource: &str) -> Result<Arc<[f32]>, LoadError> {
        let samples = self.loader.load(resource).await?;
        if samples.is_empty() {
            return Err(LoadError::Empty {
                resource: resource.to_string(),
            });
        }
        Ok(Arc::from(samples))
    }
}

impl Strategy for SampleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sample
    }

    fn prepare(&self) -> PrepareFuture<'_> {
        Box::pin(async move {
            match self.bank.get_or_init(|| self.load_bank()).await {
                Ok(_) => Ok(()),
                Err(e) => Err(e.clone()),
            }
        })
    }

    fn play(&self, sound: Sound, gain: f32) {
        let Some(Ok(bank)) = self.bank.get() else {
            debug!(sound = %sound, "Samples not loaded, ignoring");
            return;
        };
        let source: Box<dyn Source> = match &bank[sound.index()] {
            Some(samples) => Box::new(BufferSource::new(samples.clone())),
            None => Box::new(SynthVoice::new(
                synth::profile(sound),
                self.mixer.sample_rate(),
                0,
            )),
        };
        self.mixer.start(ActiveSource {
            id: next_source_id(),
            sound,
            gain,
            source,
        });
    }

    fn release(&self, voice: Voice) {
        self.mixer.release(voice, self.release_time);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::audio::{mixer::Mixer, MixerCommand};
    use crate::playback::loader::LoadFuture;
    use crate::playback::{FileLoader, PlaybackEngine, SynthStrategy};
    use crate::testutil::write_wav;

    /// Serves constant buffers by name, counting loads.
    struct MapLoader {
        resources: HashMap<String, Vec<f32>>,
        loads: AtomicUsize,
    }

    impl MapLoader {
        fn complete() -> MapLoader {
            let resources = Sound::ALL
                .iter()
                .map(|sound| {
                    (
                        sound.default_resource().to_string(),
                        vec![(sound.index() + 1) as f32 / 100.0; 4],
                    )
                })
                .collect();
            MapLoader {
                resources,
                loads: AtomicUsize::new(0),
            }
        }
    }

    impl ResourceLoader for MapLoader {
        fn load<'a>(&'a self, resource: &'a str) -> LoadFuture<'a> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let result = self
                .resources
                .get(resource)
                .cloned()
                .ok_or_else(|| LoadError::NotFound {
                    resource: resource.to_string(),
                    reason: "missing".to_string(),
                });
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn test_prepare_and_play() {
        let loader = Arc::new(MapLoader::complete());
        let (handle, receiver) = MixerHandle::new(1000);
        let strategy = SampleStrategy::new(
            loader.clone(),
            default_resources(),
            handle,
            Duration::from_millis(10),
        );

        strategy.prepare().await.unwrap();
        strategy.prepare().await.unwrap();
        // The pedal hat and second crash share files with the closed hat and crash.
        assert_eq!(Sound::COUNT - 2, loader.loads.load(Ordering::SeqCst));

        strategy.play(Sound::Snare18, 0.5);
        let mut mixer = Mixer::new(receiver, 1);
        let mut output = vec![0.0f32; 5];
        mixer.process_into_output(&mut output);
        let expected = (Sound::Snare18.index() + 1) as f32 / 100.0 * 0.5;
        assert_eq!(vec![expected, expected, expected, expected, 0.0], output);
    }

    #[tokio::test]
    async fn test_missing_resource_fails() {
        let mut loader = MapLoader::complete();
        loader.resources.remove("hh-open.wav");
        let (handle, receiver) = MixerHandle::new(1000);
        let strategy = SampleStrategy::new(
            Arc::new(loader),
            default_resources(),
            handle,
            Duration::from_millis(10),
        );

        assert!(matches!(
            strategy.prepare().await,
            Err(LoadError::NotFound { resource, .. }) if resource == "hh-open.wav"
        ));
        // The failure is memoized.
        assert!(strategy.prepare().await.is_err());

        strategy.play(Sound::Kick, 1.0);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_clicks_are_synthesized() {
        let mut loader = MapLoader::complete();
        loader.resources.remove("click-high.wav");
        loader.resources.remove("click-low.wav");
        let (handle, receiver) = MixerHandle::new(1000);
        let strategy = SampleStrategy::new(
            Arc::new(loader),
            default_resources(),
            handle,
            Duration::from_millis(10),
        );

        strategy.prepare().await.unwrap();
        strategy.play(Sound::ClickAccent, 1.0);
        let mut active = match receiver.try_recv() {
            Ok(MixerCommand::Start(active)) => active,
            other => panic!("unexpected command: {:?}", other),
        };
        assert_eq!(Sound::ClickAccent, active.sound);

        let mut rendered = Vec::new();
        while let Some(sample) = active.source.next_sample() {
            rendered.push(sample);
        }
        assert!(rendered.len() > 4);
        assert!(rendered.iter().any(|sample| *sample != 0.0));
    }

    #[tokio::test]
    async fn test_original_sample_set_prepares_samples() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempfile::tempdir()?;
        for name in [
            "kick.wav",
            "snare-14.wav",
            "snare-18.wav",
            "stick.wav",
            "hh-closed.wav",
            "hh-open.wav",
            "crash.wav",
            "ride.wav",
            "tom-high.wav",
            "tom-mid.wav",
            "tom-floor.wav",
        ] {
            write_wav(dir.path().join(name), vec![vec![0.5f32; 64]], 1000)?;
        }

        let (handle, receiver) = MixerHandle::new(1000);
        let sample = Arc::new(SampleStrategy::new(
            Arc::new(FileLoader::new(dir.path().to_path_buf(), 1000)),
            default_resources(),
            handle.clone(),
            Duration::from_millis(10),
        ));
        let synth = Arc::new(SynthStrategy::new(handle, Duration::from_millis(10)));
        let engine = Arc::new(PlaybackEngine::new(sample, synth));

        assert_eq!(StrategyKind::Sample, engine.prepare().await?);
        assert_eq!(StrategyKind::Sample, engine.kind());

        engine.play(Sound::HiHatPedal, 1.0);
        match receiver.try_recv() {
            Ok(MixerCommand::Start(mut active)) => {
                assert_eq!(Sound::HiHatPedal, active.sound);
                assert!((active.source.next_sample().unwrap_or_default() - 0.5).abs() < 1e-3);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_release_sends_fade() {
        let (handle, receiver) = MixerHandle::new(1000);
        let strategy = SampleStrategy::new(
            Arc::new(MapLoader::complete()),
            default_resources(),
            handle,
            Duration::from_millis(30),
        );
        strategy.release(Voice::HiHatOpen);
        match receiver.try_recv() {
            Ok(MixerCommand::Release { voice, fade_frames }) => {
                assert_eq!(Voice::HiHatOpen, voice);
                assert_eq!(30, fade_frames);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
