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

//! The master stage: a fixed gain followed by a soft-knee compressor.
//!
//! Overlapping notes are summed before this stage, so the compressor is what keeps
//! chords and the boosted master gain from clipping.

/// Levels below this are treated as silence when converting to decibels.
const SILENCE_FLOOR: f32 = 1e-6;

/// Fixed compressor parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    /// Level in dB above which compression starts.
    pub threshold_db: f32,
    /// Width in dB of the soft knee around the threshold.
    pub knee_db: f32,
    /// Input/output ratio above the knee.
    pub ratio: f32,
    /// Seconds to reach the target gain reduction.
    pub attack: f32,
    /// Seconds to recover from gain reduction.
    pub release: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        CompressorSettings {
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 4.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

/// A feed-forward peak compressor with a smoothed gain reduction envelope.
#[derive(Debug, Clone)]
pub struct Compressor {
    settings: CompressorSettings,
    attack_coeff: f32,
    release_coeff: f32,
    /// Current gain reduction in dB (always >= 0).
    reduction_db: f32,
}

impl Compressor {
    pub fn new(settings: CompressorSettings, sample_rate: u32) -> Self {
        let coeff = |seconds: f32| {
            if seconds <= 0.0 {
                0.0
            } else {
                (-1.0 / (seconds * sample_rate as f32)).exp()
            }
        };
        Compressor {
            attack_coeff: coeff(settings.attack),
            release_coeff: coeff(settings.release),
            settings,
            reduction_db: 0.0,
        }
    }

    pub fn settings(&self) -> &CompressorSettings {
        &self.settings
    }

    /// The static input/output curve in dB.
    fn curve(&self, input_db: f32) -> f32 {
        let CompressorSettings {
            threshold_db,
            knee_db,
            ratio,
            ..
        } = self.settings;
        let over = input_db - threshold_db;

        if 2.0 * over < -knee_db {
            input_db
        } else if knee_db > 0.0 && 2.0 * over.abs() <= knee_db {
            let x = over + knee_db / 2.0;
            input_db + (1.0 / ratio - 1.0) * x * x / (2.0 * knee_db)
        } else {
            threshold_db + over / ratio
        }
    }

    /// Compresses one sample.
    pub fn process(&mut self, sample: f32) -> f32 {
        let input_db = 20.0 * sample.abs().max(SILENCE_FLOOR).log10();
        let target = input_db - self.curve(input_db);

        let coeff = if target > self.reduction_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.reduction_db = coeff * self.reduction_db + (1.0 - coeff) * target;

        sample * 10f32.powf(-self.reduction_db / 20.0)
    }
}

/// Master gain into compressor.
#[derive(Debug, Clone)]
pub struct SignalChain {
    master_gain: f32,
    compressor: Compressor,
}

impl SignalChain {
    pub fn new(master_gain: f32, settings: CompressorSettings, sample_rate: u32) -> Self {
        SignalChain {
            master_gain,
            compressor: Compressor::new(settings, sample_rate),
        }
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        self.compressor.process(sample * self.master_gain)
    }
}
