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
use std::path::PathBuf;

use serde::Deserialize;

/// The device name that selects the host's default output.
pub const DEFAULT_DEVICE: &str = "default";

/// Headroom boost applied before the compressor.
pub const DEFAULT_MASTER_GAIN: f32 = 1.5;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. Names starting with "mock" select the mock device.
    #[serde(default = "default_device")]
    device: String,

    /// Output sample rate in Hz. Uses the device's preferred rate when unset.
    sample_rate: Option<u32>,

    /// Gain of the master stage that feeds the compressor (default: 1.5).
    master_gain: Option<f32>,

    /// Directory holding the piano sample set, one file per note (e.g. C4.wav).
    /// Playback falls back to a synthesized tone when unset or unloadable.
    instrument: Option<String>,
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            master_gain: None,
            instrument: None,
        }
    }

    /// Replaces the device name.
    pub fn with_device(mut self, device: &str) -> Audio {
        self.device = device.to_string();
        self
    }

    /// Replaces the instrument sample set directory.
    pub fn with_instrument(mut self, instrument: Option<String>) -> Audio {
        self.instrument = instrument;
        self
    }

    /// Sets the output sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Audio {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the requested sample rate, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Returns the master gain (default: 1.5). Negative values are treated as silence.
    pub fn master_gain(&self) -> f32 {
        self.master_gain.unwrap_or(DEFAULT_MASTER_GAIN).max(0.0)
    }

    /// Returns the instrument sample set directory.
    pub fn instrument(&self) -> Option<PathBuf> {
        self.instrument.as_ref().map(PathBuf::from)
    }
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new(DEFAULT_DEVICE)
    }
}
