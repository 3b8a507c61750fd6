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

//! The sampled piano.
//!
//! A sample set is a directory of recordings named after the note they hold
//! (`C4.wav`, `Eb4.flac`, ...). Everything is decoded into memory up front. Pitches
//! without their own recording are played by repitching the closest one.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::decode::{decode_mono, is_audio_file, resample};
use super::Voice;
use crate::pitch::{note_to_pitch, Pitch};

/// Fade applied after the note duration so samples don't click off.
pub const RELEASE: Duration = Duration::from_millis(80);

/// Why the sampled instrument is not in use.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error("no instrument sample set is configured")]
    NotConfigured,

    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: symphonia::core::errors::Error,
    },

    #[error("unsupported audio in {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("no note samples found in {0}")]
    NoSamples(PathBuf),

    #[error("instrument loading task failed: {0}")]
    Task(String),
}

/// Note recordings keyed by pitch, resampled to the output rate.
pub struct Instrument {
    directory: PathBuf,
    samples: BTreeMap<Pitch, Arc<Vec<f32>>>,
    sample_rate: u32,
}

impl Instrument {
    /// Loads every note recording in the directory.
    pub fn load(directory: &Path, sample_rate: u32) -> Result<Instrument, InstrumentError> {
        info!(directory = ?directory, sample_rate, "Loading instrument");

        let entries = fs::read_dir(directory).map_err(|source| InstrumentError::Io {
            path: directory.to_path_buf(),
            source,
        })?;

        let mut samples = BTreeMap::new();
        for entry in entries {
            let path = entry
                .map_err(|source| InstrumentError::Io {
                    path: directory.to_path_buf(),
                    source,
                })?
                .path();
            if !path.is_file() || !is_audio_file(&path) {
                continue;
            }

            let Some(pitch) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| note_to_pitch(stem).ok())
            else {
                debug!(path = ?path, "Skipping file that isn't named after a note");
                continue;
            };

            let decoded = decode_mono(&path)?;
            if decoded.samples.is_empty() {
                warn!(path = ?path, "Skipping empty sample");
                continue;
            }

            let data = resample(&decoded.samples, decoded.sample_rate, sample_rate);
            debug!(
                path = ?path,
                pitch = %pitch,
                frames = data.len(),
                "Loaded note sample"
            );
            samples.insert(pitch, Arc::new(data));
        }

        if samples.is_empty() {
            return Err(InstrumentError::NoSamples(directory.to_path_buf()));
        }

        info!(notes = samples.len(), "Instrument loaded");
        Ok(Instrument {
            directory: directory.to_path_buf(),
            samples,
            sample_rate,
        })
    }

    /// Number of recorded notes.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The recording closest to the pitch. Ties go to the lower recording.
    fn nearest(&self, pitch: Pitch) -> Option<(Pitch, &Arc<Vec<f32>>)> {
        let below = self.samples.range(..=pitch).next_back();
        let above = self.samples.range(pitch..).next();

        match (below, above) {
            (Some(b), Some(a)) => {
                let target = pitch.value() as i64;
                if target - b.0.value() as i64 <= a.0.value() as i64 - target {
                    Some((*b.0, b.1))
                } else {
                    Some((*a.0, a.1))
                }
            }
            (Some(b), None) => Some((*b.0, b.1)),
            (None, Some(a)) => Some((*a.0, a.1)),
            (None, None) => None,
        }
    }

    /// Creates a voice for the pitch that holds for `duration` and then fades out.
    pub fn voice(&self, pitch: Pitch, duration: Duration, gain: f32) -> Option<SampleVoice> {
        let (recorded, data) = self.nearest(pitch)?;
        let semitones = (pitch.value() as i64 - recorded.value() as i64) as f64;

        Some(SampleVoice {
            pitch,
            data: data.clone(),
            position: 0.0,
            step: 2f64.powf(semitones / 12.0),
            gain,
            emitted: 0,
            hold: (duration.as_secs_f64() * self.sample_rate as f64).round() as usize,
            release: (RELEASE.as_secs_f64() * self.sample_rate as f64).round() as usize,
        })
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("directory", &self.directory)
            .field("notes", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Playback of one recording, repitched by reading it at a different rate.
pub struct SampleVoice {
    pitch: Pitch,
    data: Arc<Vec<f32>>,
    position: f64,
    step: f64,
    gain: f32,
    emitted: usize,
    hold: usize,
    release: usize,
}

impl SampleVoice {
    /// The playback rate relative to the recording.
    pub fn playback_rate(&self) -> f64 {
        self.step
    }
}

impl Voice for SampleVoice {
    fn pitch(&self) -> Pitch {
        self.pitch
    }

    fn next_sample(&mut self) -> Option<f32> {
        if self.emitted >= self.hold + self.release {
            return None;
        }

        let index = self.position.floor() as usize;
        let s0 = *self.data.get(index)?;
        let s1 = self.data.get(index + 1).copied().unwrap_or(s0);
        let frac = (self.position - index as f64) as f32;

        let envelope = if self.emitted < self.hold || self.release == 0 {
            1.0
        } else {
            1.0 - (self.emitted - self.hold) as f32 / self.release as f32
        };

        self.position += self.step;
        self.emitted += 1;
        Some((s0 + (s1 - s0) * frac) * self.gain * envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_note(dir: &Path, name: &str, sample_rate: u32, frames: usize, value: i16) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.join(name), spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn render(mut voice: SampleVoice) -> Vec<f32> {
        std::iter::from_fn(|| voice.next_sample()).collect()
    }

    #[test]
    fn test_load_sample_set() {
        let dir = tempfile::tempdir().unwrap();
        write_note(dir.path(), "C4.wav", 1000, 1000, 8192);
        write_note(dir.path(), "A4.wav", 1000, 1000, 8192);
        std::fs::write(dir.path().join("README.txt"), "piano").unwrap();
        write_note(dir.path(), "ambience.wav", 1000, 10, 8192);

        let instrument = Instrument::load(dir.path(), 2000).unwrap();
        assert_eq!(instrument.len(), 2);
        assert_eq!(instrument.sample_rate(), 2000);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Instrument::load(&dir.path().join("missing"), 44100),
            Err(InstrumentError::Io { .. })
        ));
        assert!(matches!(
            Instrument::load(dir.path(), 44100),
            Err(InstrumentError::NoSamples(_))
        ));
    }

    #[test]
    fn test_nearest_sample_is_repitched() {
        let dir = tempfile::tempdir().unwrap();
        write_note(dir.path(), "C4.wav", 1000, 1000, 8192);
        write_note(dir.path(), "A4.wav", 1000, 1000, 8192);
        let instrument = Instrument::load(dir.path(), 1000).unwrap();

        let exact = instrument.voice(Pitch::C4, Duration::from_millis(100), 1.0).unwrap();
        assert_eq!(exact.playback_rate(), 1.0);

        // D4 is closer to C4 than to A4, so C4 is played a whole tone up.
        let shifted = instrument
            .voice(Pitch::new(62), Duration::from_millis(100), 1.0)
            .unwrap();
        assert!((shifted.playback_rate() - 2f64.powf(2.0 / 12.0)).abs() < 1e-9);

        // Far above every recording: the top one is stretched upwards.
        let high = instrument.voice(Pitch::C6, Duration::from_millis(100), 1.0).unwrap();
        assert!((high.playback_rate() - 2f64.powf(15.0 / 12.0)).abs() < 1e-9);
    }

    #[test]
    fn test_voice_holds_then_releases() {
        let dir = tempfile::tempdir().unwrap();
        write_note(dir.path(), "C4.wav", 1000, 1000, 16384);
        let instrument = Instrument::load(dir.path(), 1000).unwrap();

        let voice = instrument.voice(Pitch::C4, Duration::from_millis(200), 1.4).unwrap();
        let samples = render(voice);
        assert_eq!(samples.len(), 280);
        assert!((samples[0] - 0.7).abs() < 1e-3);
        assert!((samples[199] - 0.7).abs() < 1e-3);
        assert!(samples[279] < samples[220]);
    }

    #[test]
    fn test_voice_ends_with_recording() {
        let dir = tempfile::tempdir().unwrap();
        write_note(dir.path(), "C4.wav", 1000, 50, 16384);
        let instrument = Instrument::load(dir.path(), 1000).unwrap();

        let voice = instrument.voice(Pitch::C4, Duration::from_secs(1), 1.0).unwrap();
        assert_eq!(render(voice).len(), 50);
    }
}
