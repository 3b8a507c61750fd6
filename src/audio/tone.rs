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

//! The fallback synthesizer: a sine wave with an exponential attack and decay.

use std::f64::consts::TAU;
use std::time::Duration;

use super::Voice;
use crate::pitch::Pitch;

/// Envelope floor. Exponential ramps can't start or end at zero.
pub const ENVELOPE_FLOOR: f32 = 0.0001;

/// Time to ramp from the floor to the peak.
pub const ATTACK: Duration = Duration::from_millis(20);

/// The oscillator keeps running this long past the note duration.
pub const TAIL: Duration = Duration::from_millis(50);

/// A sine tone voice.
pub struct ToneVoice {
    pitch: Pitch,
    phase: f64,
    phase_step: f64,
    position: usize,
    attack_end: usize,
    decay_end: usize,
    stop_at: usize,
    peak: f32,
}

fn frames(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

impl ToneVoice {
    /// Creates a tone that peaks at `peak` and decays to the floor at `duration`.
    pub fn new(pitch: Pitch, duration: Duration, sample_rate: u32, peak: f32) -> ToneVoice {
        let decay_end = frames(duration, sample_rate);
        // Very short notes get a symmetric envelope.
        let attack_end = frames(ATTACK, sample_rate).min(decay_end / 2);

        ToneVoice {
            pitch,
            phase: 0.0,
            phase_step: TAU * pitch.frequency() as f64 / sample_rate as f64,
            position: 0,
            attack_end,
            decay_end,
            stop_at: decay_end + frames(TAIL, sample_rate),
            peak: peak.max(ENVELOPE_FLOOR),
        }
    }

    /// Envelope value at the given frame.
    fn envelope(&self, position: usize) -> f32 {
        let ramp = |from: f32, to: f32, start: usize, end: usize| {
            if end <= start {
                return to;
            }
            let progress = (position - start) as f32 / (end - start) as f32;
            from * (to / from).powf(progress)
        };

        if position < self.attack_end {
            ramp(ENVELOPE_FLOOR, self.peak, 0, self.attack_end)
        } else if position < self.decay_end {
            ramp(self.peak, ENVELOPE_FLOOR, self.attack_end, self.decay_end)
        } else {
            ENVELOPE_FLOOR
        }
    }

    /// Total frames this voice will produce.
    pub fn len(&self) -> usize {
        self.stop_at
    }

    pub fn is_empty(&self) -> bool {
        self.stop_at == 0
    }
}

impl Voice for ToneVoice {
    fn pitch(&self) -> Pitch {
        self.pitch
    }

    fn next_sample(&mut self) -> Option<f32> {
        if self.position >= self.stop_at {
            return None;
        }

        let sample = self.phase.sin() as f32 * self.envelope(self.position);
        self.phase = (self.phase + self.phase_step) % TAU;
        self.position += 1;
        Some(sample)
    }
}
