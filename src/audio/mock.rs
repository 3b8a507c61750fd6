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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

#[cfg(test)]
use std::error::Error;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::mixer::AudioMixer;
use super::{AudioError, Voice};
use crate::config;
use crate::pitch::Pitch;

/// Sample rate used when the configuration doesn't ask for one.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// A note handed to the mock device.
#[derive(Debug, Clone, Copy)]
pub struct PlayedNote {
    pub pitch: Pitch,
    pub at: Instant,
}

/// A mock device. Nothing is sent to hardware: voices go into a mixer that is only
/// advanced when someone asks it for frames.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    mixer: AudioMixer,
    suspended: Arc<AtomicBool>,
    fail_resume: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    resume_attempts: Arc<AtomicUsize>,
    played: Arc<Mutex<Vec<PlayedNote>>>,
}

impl Device {
    /// Gets the given mock device. Names containing "suspended" start suspended.
    pub fn get(config: &config::Audio) -> Device {
        let name = config.device().to_string();
        let sample_rate = config.sample_rate().unwrap_or(DEFAULT_SAMPLE_RATE);
        let suspended = name.contains("suspended");

        Device {
            mixer: AudioMixer::new(2, sample_rate, config.master_gain()),
            name,
            sample_rate,
            suspended: Arc::new(AtomicBool::new(suspended)),
            fail_resume: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            resume_attempts: Arc::new(AtomicUsize::new(0)),
            played: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The mixer voices are added to.
    pub fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }

    /// Every note started on this device, in order.
    pub fn played(&self) -> Vec<PlayedNote> {
        self.played.lock().clone()
    }

    /// The pitches started on this device, in order.
    pub fn played_pitches(&self) -> Vec<Pitch> {
        self.played.lock().iter().map(|note| note.pitch).collect()
    }

    /// How many times resume has been called.
    pub fn resume_attempts(&self) -> usize {
        self.resume_attempts.load(Ordering::Relaxed)
    }

    /// Puts the device into (or out of) the suspended state.
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::Relaxed);
    }

    /// Makes subsequent resume calls fail.
    pub fn set_fail_resume(&self, fail: bool) {
        self.fail_resume.store(fail, Ordering::Relaxed);
    }

    /// Makes subsequent voices fail to start, as if the output had shut down.
    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::Relaxed);
    }
}

impl super::Device for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Relaxed)
    }

    fn resume(&self) -> Result<(), AudioError> {
        self.resume_attempts.fetch_add(1, Ordering::Relaxed);
        if self.fail_resume.load(Ordering::Relaxed) {
            return Err(AudioError::Resume("mock device refused to resume".to_string()));
        }

        info!(device = self.name, "Resumed (mock)");
        self.suspended.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn add_voice(&self, voice: Box<dyn Voice>) -> Result<(), AudioError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(AudioError::Closed);
        }
        let pitch = voice.pitch();
        debug!(device = self.name, pitch = %pitch, "Voice started (mock)");
        self.played.lock().push(PlayedNote {
            pitch,
            at: Instant::now(),
        });
        if self.suspended.load(Ordering::Relaxed) {
            debug!(device = self.name, "Suspended, dropping voice (mock)");
            return Ok(());
        }
        self.mixer.add_voice(voice);
        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
