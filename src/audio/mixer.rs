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
// Voice mixing shared by the cpal and mock devices.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::dynamics::{CompressorSettings, SignalChain};
use super::Voice;

static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Sums active voices and runs them through the master stage.
#[derive(Clone)]
pub struct AudioMixer {
    /// Voices currently sounding.
    active_voices: Arc<Mutex<Vec<ActiveVoice>>>,
    /// Master gain and compressor. Stateful, so shared by every clone.
    chain: Arc<Mutex<SignalChain>>,
    /// Number of output channels. Every channel carries the same mono mix.
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
}

/// A voice in the mixer.
pub struct ActiveVoice {
    /// Unique ID for this voice
    pub id: u64,
    pub voice: Box<dyn Voice>,
}

impl AudioMixer {
    /// Creates a new audio mixer with the default compressor.
    pub fn new(num_channels: u16, sample_rate: u32, master_gain: f32) -> Self {
        Self {
            active_voices: Arc::new(Mutex::new(Vec::new())),
            chain: Arc::new(Mutex::new(SignalChain::new(
                master_gain,
                CompressorSettings::default(),
                sample_rate,
            ))),
            num_channels: num_channels.max(1),
            sample_rate,
        }
    }

    /// Adds a voice to the mix and returns its ID.
    pub fn add_voice(&self, voice: Box<dyn Voice>) -> u64 {
        let id = NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed);
        self.active_voices.lock().push(ActiveVoice { id, voice });
        id
    }

    /// The number of voices that have not yet finished.
    pub fn active_count(&self) -> usize {
        self.active_voices.lock().len()
    }

    /// Mixes `num_frames` interleaved frames into the start of `output`.
    pub fn process_into_output(&self, output: &mut [f32], num_frames: usize) {
        let channels = self.num_channels as usize;
        let num_frames = num_frames.min(output.len() / channels);

        let mut voices = self.active_voices.lock();
        let mut chain = self.chain.lock();

        for frame in output.chunks_exact_mut(channels).take(num_frames) {
            let mut sum = 0.0f32;
            voices.retain_mut(|active| match active.voice.next_sample() {
                Some(sample) => {
                    sum += sample;
                    true
                }
                None => false,
            });

            frame.fill(chain.process(sum));
        }
    }

    /// Processes multiple frames of audio mixing
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0f32; num_frames * self.num_channels as usize];
        self.process_into_output(&mut frames, num_frames);
        frames
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::Pitch;

    /// Plays back a fixed list of samples.
    struct FixedVoice {
        samples: std::vec::IntoIter<f32>,
    }

    impl FixedVoice {
        fn new(samples: Vec<f32>) -> Box<dyn Voice> {
            Box::new(FixedVoice {
                samples: samples.into_iter(),
            })
        }
    }

    impl Voice for FixedVoice {
        fn pitch(&self) -> Pitch {
            Pitch::C4
        }

        fn next_sample(&mut self) -> Option<f32> {
            self.samples.next()
        }
    }

    #[test]
    fn test_voices_are_summed_into_every_channel() {
        // Unity gain and tiny levels keep the compressor out of the way.
        let mixer = AudioMixer::new(2, 44100, 1.0);
        mixer.add_voice(FixedVoice::new(vec![0.001, 0.002]));
        mixer.add_voice(FixedVoice::new(vec![0.001]));

        let frames = mixer.process_frames(3);
        assert_eq!(frames.len(), 6);
        assert!((frames[0] - 0.002).abs() < 1e-6);
        assert_eq!(frames[0], frames[1]);
        assert!((frames[2] - 0.002).abs() < 1e-6);
        assert_eq!(frames[2], frames[3]);
        assert_eq!(frames[4], 0.0);
        assert_eq!(frames[5], 0.0);
    }

    #[test]
    fn test_finished_voices_are_removed() {
        let mixer = AudioMixer::new(1, 44100, 1.0);
        let first = mixer.add_voice(FixedVoice::new(vec![0.0; 4]));
        let second = mixer.add_voice(FixedVoice::new(vec![0.0; 8]));
        assert_ne!(first, second);
        assert_eq!(mixer.active_count(), 2);

        mixer.process_frames(5);
        assert_eq!(mixer.active_count(), 1);
        mixer.process_frames(5);
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn test_master_gain_is_applied() {
        let mixer = AudioMixer::new(1, 44100, 1.5);
        mixer.add_voice(FixedVoice::new(vec![0.002]));
        let frames = mixer.process_frames(1);
        assert!((frames[0] - 0.003).abs() < 1e-6);
    }

    #[test]
    fn test_loud_chords_do_not_clip() {
        let mixer = AudioMixer::new(1, 44100, 1.5);
        for _ in 0..3 {
            mixer.add_voice(FixedVoice::new(vec![1.0; 44100]));
        }

        let frames = mixer.process_frames(44100);
        let tail = &frames[22050..];
        assert!(tail.iter().all(|s| s.abs() < 1.0));
    }
}
