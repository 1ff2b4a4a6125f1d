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

//! Loading of sample resources into memory.
//!
//! Samples are decoded entirely into memory up front, downmixed to mono and resampled
//! to the output rate, so triggering one is a buffer copy and nothing more.

use std::{
    fs::File,
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    time::Duration,
};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, info};

use super::LoadError;

/// The future returned by [ResourceLoader::load].
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>, LoadError>> + Send + 'a>>;

/// Loads a named resource as mono samples at the output sample rate.
pub trait ResourceLoader: Send + Sync {
    fn load<'a>(&'a self, resource: &'a str) -> LoadFuture<'a>;
}

/// Loads resources from files in a directory.
#[derive(Debug, Clone)]
pub struct FileLoader {
    /// The directory resources are resolved against.
    directory: PathBuf,
    /// The rate samples are resampled to.
    target_sample_rate: u32,
}

impl FileLoader {
    pub fn new(directory: PathBuf, target_sample_rate: u32) -> FileLoader {
        FileLoader {
            directory,
            target_sample_rate,
        }
    }

    fn path_for(&self, resource: &str) -> PathBuf {
        if Path::new(resource).is_absolute() {
            PathBuf::from(resource)
        } else {
            self.directory.join(resource)
        }
    }
}

impl ResourceLoader for FileLoader {
    fn load<'a>(&'a self, resource: &'a str) -> LoadFuture<'a> {
        let path = self.path_for(resource);
        let target_sample_rate = self.target_sample_rate;
        let name = resource.to_string();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || decode_file(&name, &path, target_sample_rate))
                .await
                .map_err(|e| LoadError::Task(e.to_string()))?
        })
    }
}

/// Decodes an audio file into mono samples at the target rate.
pub fn decode_file(
    resource: &str,
    path: &Path,
    target_sample_rate: u32,
) -> Result<Vec<f32>, LoadError> {
    info!(path = ?path, "Loading sample into memory");

    let decode_error = |reason: String| LoadError::Decode {
        resource: resource.to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| LoadError::NotFound {
        resource: resource.to_string(),
        reason: format!("{}: {}", path.display(), e),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| decode_error(e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error("no audio track found".to_string()))?;
    let track_id = track.id;
    let source_sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_error("sample rate not specified".to_string()))?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &decoder_opts)
        .map_err(|e| decode_error(e.to_string()))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(decode_error(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(decode_error(e.to_string())),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        mono.extend(downmix(buffer.samples(), channels));
    }

    if mono.is_empty() {
        return Err(LoadError::Empty {
            resource: resource.to_string(),
        });
    }

    let samples = if source_sample_rate != target_sample_rate {
        debug!(
            source_rate = source_sample_rate,
            target_rate = target_sample_rate,
            "Resampling sample"
        );
        resample(&mono, source_sample_rate, target_sample_rate)
    } else {
        mono
    };

    let duration = Duration::from_secs_f64(samples.len() as f64 / target_sample_rate as f64);
    info!(
        path = ?path,
        sample_rate = target_sample_rate,
        duration_ms = duration.as_millis(),
        "Sample loaded"
    );
    Ok(samples)
}

/// Averages interleaved frames down to a single channel.
fn downmix(interleaved: &[f32], channels: usize) -> impl Iterator<Item = f32> + '_ {
    interleaved
        .chunks(channels)
        .map(move |frame| frame.iter().sum::<f32>() / channels as f32)
}

/// Resamples mono audio using linear interpolation, which is plenty for one-shots.
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let target_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..target_len)
        .map(|i| {
            let source_pos = i as f64 / ratio;
            let index = source_pos.floor() as usize;
            let frac = source_pos.fract() as f32;
            let s0 = samples.get(index).copied().unwrap_or(0.0);
            let s1 = samples.get(index + 1).copied().unwrap_or(s0);
            s0 + (s1 - s0) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_resample_length() {
        let samples: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let result = resample(&samples, 44100, 48000);
        let expected_len = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(expected_len, result.len());
    }

    #[test]
    fn test_resample_interpolates() {
        let result = resample(&[0.0, 1.0], 1, 2);
        assert_eq!(vec![0.0, 0.5, 1.0, 1.0], result);
    }

    #[test]
    fn test_downmix() {
        let mono: Vec<f32> = downmix(&[1.0, -1.0, 0.5, 0.25], 2).collect();
        assert_eq!(vec![0.0, 0.375], mono);
    }

    #[tokio::test]
    async fn test_load_stereo_wav() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        write_wav(
            dir.path().join("kick.wav"),
            vec![vec![0.5f32; 100], vec![0.25f32; 100]],
            44100,
        )?;

        let loader = FileLoader::new(dir.path().to_path_buf(), 44100);
        let samples = loader.load("kick.wav").await?;
        assert_eq!(100, samples.len());
        assert!(samples.iter().all(|s| (s - 0.375).abs() < 1e-6));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_resamples() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        write_wav(dir.path().join("ride.wav"), vec![vec![0.1f32; 100]], 22050)?;

        let loader = FileLoader::new(dir.path().to_path_buf(), 44100);
        let samples = loader.load("ride.wav").await?;
        assert_eq!(200, samples.len());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileLoader::new(dir.path().to_path_buf(), 44100);
        match loader.load("nope.wav").await {
            Err(LoadError::NotFound { resource, .. }) => assert_eq!("nope.wav", resource),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("snare-14.wav"), b"definitely not audio").unwrap();
        let loader = FileLoader::new(dir.path().to_path_buf(), 44100);
        assert!(matches!(
            loader.load("snare-14.wav").await,
            Err(LoadError::Decode { .. })
        ));
    }
}
