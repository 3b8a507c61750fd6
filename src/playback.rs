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
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, span, warn, Instrument, Level};

use crate::audio::AudioEngine;
use crate::config::{self, ConfigError};
use crate::exercise::{ComparisonExercise, IntervalPlay};
use crate::interval::{Direction, Interval};
use crate::pitch::{Pitch, PitchRange};

/// The result of asking for an interval to be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalPlayback {
    /// Both notes were played, in this order.
    Played { first: Pitch, second: Pitch },
    /// The second note falls outside the playable range. Nothing was played.
    OutOfRange { target: Pitch },
}

/// Plays intervals as two consecutive notes. Calls are not queued: callers should
/// wait for one sequence to finish before starting the next.
pub struct Sequencer {
    engine: Arc<AudioEngine>,
    note_duration: Duration,
    note_delay: Duration,
    pair_gap: Duration,
}

impl Sequencer {
    /// Creates a sequencer with the default timing.
    pub fn new(engine: Arc<AudioEngine>) -> Sequencer {
        Sequencer::with_timing(
            engine,
            config::playback::DEFAULT_NOTE_DURATION,
            config::playback::DEFAULT_NOTE_DELAY,
            config::playback::DEFAULT_PAIR_GAP,
        )
    }

    /// Creates a sequencer with the configured timing.
    pub fn from_config(
        engine: Arc<AudioEngine>,
        config: &config::Playback,
    ) -> Result<Sequencer, ConfigError> {
        Ok(Sequencer::with_timing(
            engine,
            config.note_duration()?,
            config.note_delay()?,
            config.pair_gap()?,
        ))
    }

    pub fn with_timing(
        engine: Arc<AudioEngine>,
        note_duration: Duration,
        note_delay: Duration,
        pair_gap: Duration,
    ) -> Sequencer {
        Sequencer {
            engine,
            note_duration,
            note_delay,
            pair_gap,
        }
    }

    pub fn note_duration(&self) -> Duration {
        self.note_duration
    }

    pub fn note_delay(&self) -> Duration {
        self.note_delay
    }

    /// Plays root then target (ascending) or target then root (descending), waiting
    /// `note_delay` between the two.
    pub async fn play_interval(
        &self,
        root: Pitch,
        interval: &Interval,
        direction: Direction,
        note_delay: Duration,
    ) -> IntervalPlayback {
        let target = root.transpose(interval.semitones, direction);
        if !PitchRange::PLAYABLE.contains(target) {
            warn!(
                root = %root,
                interval = interval.name,
                direction = %direction,
                target = %target,
                "Interval leaves the playable range, skipping"
            );
            return IntervalPlayback::OutOfRange { target };
        }

        let (first, second) = match direction {
            Direction::Ascending => (root, target),
            Direction::Descending => (target, root),
        };

        let span = span!(Level::INFO, "play interval", interval = interval.name);
        async {
            info!(first = %first, second = %second, direction = %direction, "Playing interval");
            self.engine.play_pitch(first, self.note_duration).await;
            tokio::time::sleep(note_delay).await;
            self.engine.play_pitch(second, self.note_duration).await;
        }
        .instrument(span)
        .await;

        IntervalPlayback::Played { first, second }
    }

    /// Plays an exercise interval with the configured delay.
    pub async fn play(&self, play: IntervalPlay) -> IntervalPlayback {
        self.play_interval(play.root, play.interval, play.direction, self.note_delay)
            .await
    }

    /// Plays interval A, pauses, then plays interval B.
    pub async fn play_comparison(
        &self,
        exercise: &ComparisonExercise,
    ) -> (IntervalPlayback, IntervalPlayback) {
        let a = self.play(exercise.a()).await;
        tokio::time::sleep(self.pair_gap).await;
        let b = self.play(exercise.b()).await;
        (a, b)
    }
}
