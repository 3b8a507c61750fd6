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
use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use std::error::Error;

use crate::config;
use crate::pitch::Pitch;

pub mod cpal;
pub mod decode;
pub mod dynamics;
pub mod engine;
pub mod instrument;
pub mod mixer;
pub mod mock;
pub mod tone;

pub use engine::{AudioEngine, Backend, EngineState};
pub use instrument::InstrumentError;

/// Errors raised by output devices.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No output device found with name {0}")]
    NoDevice(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Unable to resume audio output: {0}")]
    Resume(String),

    #[error("Audio output is closed")]
    Closed,
}

/// A single sounding note. Voices are pulled one mono sample at a time by the mixer.
pub trait Voice: Send {
    /// The pitch this voice is sounding.
    fn pitch(&self) -> Pitch;

    /// Returns the next sample, or None once the voice has finished.
    fn next_sample(&mut self) -> Option<f32>;
}

/// A sound output device with a master gain and compressor in front of it.
pub trait Device: Any + fmt::Display + Send + Sync {
    /// The output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Returns true if the output is not currently running.
    fn is_suspended(&self) -> bool;

    /// Starts (or restarts) the output.
    fn resume(&self) -> Result<(), AudioError>;

    /// Starts playing the given voice. Returns immediately. A suspended device
    /// discards the voice so nothing is held back for a later resume.
    fn add_voice(&self, voice: Box<dyn Voice>) -> Result<(), AudioError>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, AudioError> {
    cpal::Device::list()
}

/// Opens the device named in the configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, AudioError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(config)));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
