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
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::warn;

use super::instrument::InstrumentError;

/// File extensions recognized as audio.
pub const AUDIO_EXTENSIONS: [&str; 5] = ["wav", "flac", "mp3", "ogg", "aiff"];

/// Returns true if the path has an audio file extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// A fully decoded mono recording.
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decodes an entire file with symphonia and downmixes it to mono.
pub fn decode_mono(path: &Path) -> Result<DecodedAudio, InstrumentError> {
    let decode_error = |source| InstrumentError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| InstrumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_error)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| InstrumentError::Unsupported {
            path: path.to_path_buf(),
            reason: "no audio track found".to_string(),
        })?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| InstrumentError::Unsupported {
            path: path.to_path_buf(),
            reason: "sample rate not specified".to_string(),
        })?;

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(decode_error)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(decode_error(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(path = ?path, err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(decode_error(e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 || decoded.frames() == 0 {
            continue;
        }
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend(
            buffer
                .samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Resamples mono audio using linear interpolation.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let target_frames = (samples.len() as f64 * ratio).ceil() as usize;

    (0..target_frames)
        .map(|target_frame| {
            let source_pos = target_frame as f64 / ratio;
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

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: &[Vec<i16>]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for sample in frame {
                writer.write_sample(*sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_stereo_downmix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("C4.wav");
        let frames: Vec<Vec<i16>> = (0..100).map(|_| vec![16384, 0]).collect();
        write_wav(&path, 2, 22050, &frames);

        let decoded = decode_mono(&path).unwrap();
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.samples.len(), 100);
        for sample in decoded.samples {
            assert!((sample - 0.25).abs() < 1e-3);
        }
    }

    #[test]
    fn test_decode_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = decode_mono(&dir.path().join("missing.wav"));
        assert!(matches!(result, Err(InstrumentError::Io { .. })));
    }

    #[test]
    fn test_decode_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("D4.wav");
        std::fs::write(&path, b"definitely not a wave file").unwrap();
        assert!(decode_mono(&path).is_err());
    }

    #[test]
    fn test_resample() {
        let source: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let result = resample(&source, 44100, 48000);
        assert!((4800..=4801).contains(&result.len()));
        assert!(result.iter().all(|s| s.abs() <= 1.0));

        assert_eq!(resample(&source, 44100, 44100), source);
        assert!(resample(&[], 44100, 48000).is_empty());
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("C4.wav")));
        assert!(is_audio_file(Path::new("Eb4.MP3")));
        assert!(!is_audio_file(Path::new("README.md")));
        assert!(!is_audio_file(Path::new("C4")));
    }
}
