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

//! Randomized exercise generation.
//!
//! Every root produced here is chosen so that the interval played from it stays within
//! the generator's pitch range. Exercises are plain data: the caller owns them and
//! generates a fresh one for every round.

use std::fmt;

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use tracing::debug;

use crate::interval::{Direction, Interval, CATALOG};
use crate::pitch::{Pitch, PitchRange};

/// How many times the second interval of a pair is redrawn when it matches the first.
pub const PAIR_RETRIES: usize = 10;

/// Number of multiple-choice options offered for identification exercises.
pub const DEFAULT_OPTION_COUNT: usize = 3;

/// Root candidates span two octaves from the bottom of the range.
const ROOT_WINDOW: i32 = 24;

/// Draws attempted per option before falling back to catalog order.
const OPTION_DRAWS_PER_SLOT: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ExerciseError {
    #[error("No valid root for {interval} ({direction}) between {low} and {high}")]
    NoValidRoot {
        interval: &'static str,
        direction: Direction,
        low: Pitch,
        high: Pitch,
    },
}

/// The answer to a comparison exercise: which interval is larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    A,
    B,
    Equal,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::A => write!(f, "A is larger"),
            Comparison::B => write!(f, "B is larger"),
            Comparison::Equal => write!(f, "equal"),
        }
    }
}

/// Compares two intervals by distance. Equal distances compare equal regardless of name.
pub fn compare(a: &Interval, b: &Interval) -> Comparison {
    match a.semitones.cmp(&b.semitones) {
        std::cmp::Ordering::Greater => Comparison::A,
        std::cmp::Ordering::Less => Comparison::B,
        std::cmp::Ordering::Equal => Comparison::Equal,
    }
}

/// An interval together with the root it is played from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalPlay {
    pub interval: &'static Interval,
    pub root: Pitch,
    pub direction: Direction,
}

impl IntervalPlay {
    /// The second note of the interval.
    pub fn target(&self) -> Pitch {
        self.root
            .transpose(self.interval.semitones, self.direction)
    }
}

/// Name the interval you hear.
#[derive(Debug, Clone)]
pub struct IdentificationExercise {
    play: IntervalPlay,
    options: Vec<&'static Interval>,
}

impl IdentificationExercise {
    pub fn play(&self) -> IntervalPlay {
        self.play
    }

    pub fn interval(&self) -> &'static Interval {
        self.play.interval
    }

    pub fn direction(&self) -> Direction {
        self.play.direction
    }

    pub fn root(&self) -> Pitch {
        self.play.root
    }

    /// The shuffled multiple-choice options. Always contains the correct interval once.
    pub fn options(&self) -> &[&'static Interval] {
        &self.options
    }

    /// Scores an answer given by interval name.
    pub fn is_correct(&self, name: &str) -> bool {
        self.play.interval.name == name
    }
}

/// Which of two intervals is larger?
#[derive(Debug, Clone)]
pub struct ComparisonExercise {
    a: IntervalPlay,
    b: IntervalPlay,
    answer: Comparison,
}

impl ComparisonExercise {
    pub fn a(&self) -> IntervalPlay {
        self.a
    }

    pub fn b(&self) -> IntervalPlay {
        self.b
    }

    pub fn answer(&self) -> Comparison {
        self.answer
    }

    pub fn is_correct(&self, answer: Comparison) -> bool {
        self.answer == answer
    }
}

/// Produces randomized, range-valid exercises.
pub struct ExerciseGenerator<R = StdRng> {
    rng: R,
    range: PitchRange,
}

impl ExerciseGenerator<StdRng> {
    /// Creates a generator seeded from the operating system.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a reproducible generator.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for ExerciseGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ExerciseGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            range: PitchRange::PLAYABLE,
        }
    }

    /// Restricts generated pitches to the given range.
    pub fn with_range(mut self, range: PitchRange) -> Self {
        self.range = range;
        self
    }

    pub fn range(&self) -> PitchRange {
        self.range
    }

    /// Picks a catalog interval uniformly.
    pub fn random_interval(&mut self) -> &'static Interval {
        &CATALOG[self.rng.gen_range(0..CATALOG.len())]
    }

    /// Picks a root uniformly among those whose interval target stays within the range.
    pub fn valid_root_pitch(
        &mut self,
        interval: &Interval,
        direction: Direction,
    ) -> Result<Pitch, ExerciseError> {
        let low = self.range.low().value();
        let high = self.range.high().value().min(low.saturating_add(ROOT_WINDOW - 1));

        let valid: Vec<Pitch> = (low..=high)
            .map(Pitch::new)
            .filter(|root| {
                self.range
                    .contains(root.transpose(interval.semitones, direction))
            })
            .collect();

        match valid.choose(&mut self.rng) {
            Some(root) => Ok(*root),
            None => Err(ExerciseError::NoValidRoot {
                interval: interval.name,
                direction,
                low: self.range.low(),
                high: self.range.high(),
            }),
        }
    }

    /// Draws two intervals, redrawing the second a bounded number of times to avoid a
    /// matching pair. A matching pair is still possible and is a valid outcome.
    pub fn generate_pair(&mut self) -> (&'static Interval, &'static Interval) {
        let a = self.random_interval();
        let mut b = self.random_interval();
        let mut retries = 0;
        while b.name == a.name && retries < PAIR_RETRIES {
            b = self.random_interval();
            retries += 1;
        }
        (a, b)
    }

    /// Builds a shuffled set of options containing `correct` plus distinct distractors.
    pub fn generate_options(
        &mut self,
        correct: &'static Interval,
        count: usize,
    ) -> Vec<&'static Interval> {
        let count = count.clamp(1, CATALOG.len());
        let mut options = vec![correct];

        let mut draws = 0;
        while options.len() < count && draws < count * OPTION_DRAWS_PER_SLOT {
            let candidate = self.random_interval();
            if !options.iter().any(|o| o.name == candidate.name) {
                options.push(candidate);
            }
            draws += 1;
        }

        // Only reachable with a degenerate random source.
        for candidate in CATALOG.iter() {
            if options.len() >= count {
                break;
            }
            if !options.iter().any(|o| o.name == candidate.name) {
                options.push(candidate);
            }
        }

        options.shuffle(&mut self.rng);
        options
    }

    /// Generates an identification exercise with a random direction.
    pub fn identification(
        &mut self,
        option_count: usize,
    ) -> Result<IdentificationExercise, ExerciseError> {
        let interval = self.random_interval();
        let direction = if self.rng.gen_bool(0.5) {
            Direction::Ascending
        } else {
            Direction::Descending
        };
        let root = self.valid_root_pitch(interval, direction)?;
        let options = self.generate_options(interval, option_count);

        debug!(
            interval = interval.name,
            %direction,
            %root,
            "Generated identification exercise"
        );

        Ok(IdentificationExercise {
            play: IntervalPlay {
                interval,
                root,
                direction,
            },
            options,
        })
    }

    /// Generates a comparison exercise. Both intervals are played ascending.
    pub fn comparison(&mut self) -> Result<ComparisonExercise, ExerciseError> {
        let (a, b) = self.generate_pair();
        let a = IntervalPlay {
            interval: a,
            root: self.valid_root_pitch(a, Direction::Ascending)?,
            direction: Direction::Ascending,
        };
        let b = IntervalPlay {
            interval: b,
            root: self.valid_root_pitch(b, Direction::Ascending)?,
            direction: Direction::Ascending,
        };
        let answer = compare(a.interval, b.interval);

        debug!(
            a = a.interval.name,
            b = b.interval.name,
            %answer,
            "Generated comparison exercise"
        );

        Ok(ComparisonExercise { a, b, answer })
    }
}
