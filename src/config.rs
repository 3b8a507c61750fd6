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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

pub mod audio;
pub mod error;
pub mod playback;

pub use audio::Audio;
pub use error::ConfigError;
pub use playback::Playback;

/// Default location of the practice log, relative to the working directory.
const DEFAULT_STATS_PATH: &str = "intervalo-stats.json";

/// The configuration for the trainer.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Trainer {
    /// The audio output and instrument configuration.
    #[serde(default)]
    audio: Audio,

    /// Interval playback timing.
    #[serde(default)]
    playback: Playback,

    /// Where daily practice statistics are kept.
    stats_path: Option<String>,
}

impl Trainer {
    /// Parse a trainer configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Trainer, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Trainer>()?)
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Replaces the audio configuration.
    pub fn set_audio(&mut self, audio: Audio) {
        self.audio = audio;
    }

    /// Returns the playback configuration.
    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    /// Returns the practice log path.
    pub fn stats_path(&self) -> PathBuf {
        PathBuf::from(
            self.stats_path
                .as_deref()
                .unwrap_or(DEFAULT_STATS_PATH),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use super::*;

    #[test]
    fn test_trainer_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trainer.yaml");
        fs::write(
            &path,
            r#"
audio:
  device: mock-trainer
  master_gain: 1.2
playback:
  note_duration: 500ms
stats_path: /tmp/stats.json
"#,
        )
        .unwrap();

        let trainer = Trainer::deserialize(&path).unwrap();
        assert_eq!(trainer.audio().device(), "mock-trainer");
        assert_eq!(trainer.audio().master_gain(), 1.2);
        assert_eq!(
            trainer.playback().note_duration().unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(
            trainer.playback().note_delay().unwrap(),
            playback::DEFAULT_NOTE_DELAY
        );
        assert_eq!(trainer.stats_path(), PathBuf::from("/tmp/stats.json"));
    }

    #[test]
    fn test_trainer_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Trainer::deserialize(&dir.path().join("missing.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_trainer_default() {
        let trainer = Trainer::default();
        assert_eq!(trainer.audio().device(), audio::DEFAULT_DEVICE);
        assert_eq!(trainer.stats_path(), PathBuf::from(DEFAULT_STATS_PATH));
    }
}
