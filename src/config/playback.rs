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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;

pub const DEFAULT_NOTE_DURATION: Duration = Duration::from_millis(700);
pub const DEFAULT_NOTE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_PAIR_GAP: Duration = Duration::from_millis(500);

/// A YAML representation of the interval playback timing.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Playback {
    /// How long each note of an interval sounds (default: 700ms).
    note_duration: Option<String>,

    /// Silence between the two notes of an interval (default: 100ms).
    note_delay: Option<String>,

    /// Silence between the two intervals of a comparison (default: 500ms).
    pair_gap: Option<String>,
}

impl Playback {
    /// Returns the note duration from the configuration.
    pub fn note_duration(&self) -> Result<Duration, ConfigError> {
        parse_duration("note_duration", &self.note_duration, DEFAULT_NOTE_DURATION)
    }

    /// Returns the note delay from the configuration.
    pub fn note_delay(&self) -> Result<Duration, ConfigError> {
        parse_duration("note_delay", &self.note_delay, DEFAULT_NOTE_DELAY)
    }

    /// Returns the pair gap from the configuration.
    pub fn pair_gap(&self) -> Result<Duration, ConfigError> {
        parse_duration("pair_gap", &self.pair_gap, DEFAULT_PAIR_GAP)
    }
}

fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|e| ConfigError::Duration {
                field,
                value: value.clone(),
                reason: e.to_string(),
            })?
            .into()),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Playback {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_playback_defaults() {
        let playback = Playback::default();
        assert_eq!(playback.note_duration().unwrap(), DEFAULT_NOTE_DURATION);
        assert_eq!(playback.note_delay().unwrap(), DEFAULT_NOTE_DELAY);
        assert_eq!(playback.pair_gap().unwrap(), DEFAULT_PAIR_GAP);
    }

    #[test]
    fn test_playback_durations() {
        let playback = parse(
            r#"
            note_duration: 1s
            note_delay: 250ms
            pair_gap: 2s
        "#,
        );
        assert_eq!(playback.note_duration().unwrap(), Duration::from_secs(1));
        assert_eq!(playback.note_delay().unwrap(), Duration::from_millis(250));
        assert_eq!(playback.pair_gap().unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn test_playback_invalid_duration() {
        let playback = parse("note_delay: soon");
        match playback.note_delay() {
            Err(ConfigError::Duration { field, value, .. }) => {
                assert_eq!(field, "note_delay");
                assert_eq!(value, "soon");
            }
            other => panic!("expected duration error, got {:?}", other),
        }
    }
}
