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

//! Conversion between note names ("C#4", "Bb5") and pitch numbers.
//!
//! Pitches are semitone indices on a 12-tone equal-tempered scale where C4 is 60.

use std::{fmt, str::FromStr};

use crate::interval::Direction;

/// Sharp spellings, indexed by pitch class.
const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Every accepted letter/accidental spelling and its pitch class.
const SPELLINGS: [(&str, i32); 17] = [
    ("C", 0),
    ("C#", 1),
    ("Db", 1),
    ("D", 2),
    ("D#", 3),
    ("Eb", 3),
    ("E", 4),
    ("F", 5),
    ("F#", 6),
    ("Gb", 6),
    ("G", 7),
    ("G#", 8),
    ("Ab", 8),
    ("A", 9),
    ("A#", 10),
    ("Bb", 10),
    ("B", 11),
];

/// Errors produced while parsing a note name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PitchError {
    #[error("Invalid note: {0}")]
    InvalidNoteFormat(String),

    #[error("Invalid note name: {0}")]
    InvalidNoteName(String),
}

/// A semitone index. 60 is C4, 69 is A4 (440 Hz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pitch(i32);

impl Pitch {
    /// Middle C.
    pub const C4: Pitch = Pitch(60);
    /// The tuning reference, A4.
    pub const A4: Pitch = Pitch(69);
    /// Two octaves above middle C.
    pub const C6: Pitch = Pitch(84);

    pub const fn new(value: i32) -> Pitch {
        Pitch(value)
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    /// Frequency in Hz, A4 = 440.
    pub fn frequency(self) -> f32 {
        440.0 * 2f32.powf((self.0 - Pitch::A4.0) as f32 / 12.0)
    }

    /// Moves this pitch by the given number of semitones in the given direction.
    pub fn transpose(self, semitones: u8, direction: Direction) -> Pitch {
        match direction {
            Direction::Ascending => Pitch(self.0.saturating_add(i32::from(semitones))),
            Direction::Descending => Pitch(self.0.saturating_sub(i32::from(semitones))),
        }
    }

    /// Pitch class, 0 (C) through 11 (B).
    pub fn pitch_class(self) -> usize {
        self.0.rem_euclid(12) as usize
    }

    /// Octave number, with C4 being the first note of octave 4.
    pub fn octave(self) -> i32 {
        self.0.div_euclid(12) - 1
    }
}

/// An inclusive range of pitches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchRange {
    low: Pitch,
    high: Pitch,
}

impl PitchRange {
    /// The playable range, C4 through C6.
    pub const PLAYABLE: PitchRange = PitchRange {
        low: Pitch::C4,
        high: Pitch::C6,
    };

    /// Creates a new range. The bounds are swapped if given in reverse.
    pub fn new(low: Pitch, high: Pitch) -> PitchRange {
        if low <= high {
            PitchRange { low, high }
        } else {
            PitchRange {
                low: high,
                high: low,
            }
        }
    }

    pub fn low(&self) -> Pitch {
        self.low
    }

    pub fn high(&self) -> Pitch {
        self.high
    }

    pub fn contains(&self, pitch: Pitch) -> bool {
        self.low <= pitch && pitch <= self.high
    }
}

impl Default for PitchRange {
    fn default() -> Self {
        PitchRange::PLAYABLE
    }
}

/// Parses a note name such as "F#3" or "Bb5" into a pitch.
pub fn note_to_pitch(note: &str) -> Result<Pitch, PitchError> {
    let invalid_format = || PitchError::InvalidNoteFormat(note.to_string());

    let mut chars = note.char_indices();
    match chars.next() {
        Some((_, 'A'..='G')) => {}
        _ => return Err(invalid_format()),
    }

    // The name is the letter plus an optional accidental.
    let name_end = match chars.next() {
        Some((i, '#' | 'b')) => i + 1,
        Some((i, _)) => i,
        None => return Err(invalid_format()),
    };
    let (name, octave) = note.split_at(name_end);

    // Negative octaves are only produced for pitches below C-1.
    let digits = octave.strip_prefix('-').unwrap_or(octave);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid_format());
    }
    let octave: i64 = octave.parse().map_err(|_| invalid_format())?;

    let offset = SPELLINGS
        .iter()
        .find(|(spelling, _)| *spelling == name)
        .map(|(_, offset)| *offset)
        .ok_or_else(|| PitchError::InvalidNoteName(name.to_string()))?;

    octave
        .checked_add(1)
        .and_then(|o| o.checked_mul(12))
        .and_then(|base| base.checked_add(i64::from(offset)))
        .and_then(|value| i32::try_from(value).ok())
        .map(Pitch)
        .ok_or_else(invalid_format)
}

/// Renders a pitch as a note name using sharp spellings.
pub fn pitch_to_note(pitch: Pitch) -> String {
    format!("{}{}", SHARP_NAMES[pitch.pitch_class()], pitch.octave())
}

impl FromStr for Pitch {
    type Err = PitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        note_to_pitch(s)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", pitch_to_note(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_notes() {
        assert_eq!(note_to_pitch("C4"), Ok(Pitch::new(60)));
        assert_eq!(note_to_pitch("C6"), Ok(Pitch::new(84)));
        assert_eq!(note_to_pitch("A4"), Ok(Pitch::A4));
        assert_eq!(note_to_pitch("C-1"), Ok(Pitch::new(0)));
    }

    #[test]
    fn test_accidentals() {
        assert_eq!(note_to_pitch("F#3"), Ok(Pitch::new(54)));
        assert_eq!(note_to_pitch("Gb3"), Ok(Pitch::new(54)));
        assert_eq!(note_to_pitch("Bb5"), Ok(Pitch::new(82)));
        assert_eq!(note_to_pitch("A#5"), Ok(Pitch::new(82)));
        assert_eq!(note_to_pitch("B10"), Ok(Pitch::new(143)));
    }

    #[test]
    fn test_invalid_format() {
        for note in ["", "C", "H4", "c4", "C#", "C##4", "C4x", "4C", " C4", "C+4", "C-"] {
            assert!(
                matches!(note_to_pitch(note), Err(PitchError::InvalidNoteFormat(_))),
                "{note:?} should be rejected as malformed"
            );
        }
        assert!(matches!(
            note_to_pitch("C99999999999"),
            Err(PitchError::InvalidNoteFormat(_))
        ));
    }

    #[test]
    fn test_invalid_name() {
        for (note, name) in [("E#4", "E#"), ("Cb4", "Cb"), ("B#3", "B#"), ("Fb2", "Fb")] {
            assert_eq!(
                note_to_pitch(note),
                Err(PitchError::InvalidNoteName(name.to_string()))
            );
        }
    }

    #[test]
    fn test_pitch_to_note_uses_sharps() {
        assert_eq!(pitch_to_note(Pitch::new(60)), "C4");
        assert_eq!(pitch_to_note(Pitch::new(61)), "C#4");
        assert_eq!(pitch_to_note(Pitch::new(70)), "A#4");
        assert_eq!(pitch_to_note(Pitch::new(84)), "C6");
        assert_eq!(pitch_to_note(Pitch::new(11)), "B-1");
        assert_eq!(pitch_to_note(Pitch::new(-1)), "B-2");
        assert_eq!(Pitch::new(67).to_string(), "G4");
    }

    #[test]
    fn test_round_trip() {
        for value in -300..300 {
            let pitch = Pitch::new(value);
            assert_eq!(note_to_pitch(&pitch_to_note(pitch)), Ok(pitch));
        }
        for value in [i32::MIN, i32::MIN + 11, i32::MAX - 11, i32::MAX] {
            let pitch = Pitch::new(value);
            assert_eq!(pitch_to_note(pitch).parse::<Pitch>(), Ok(pitch));
        }
    }

    #[test]
    fn test_flat_spellings_canonicalize_to_sharps() {
        let pitch = note_to_pitch("Eb4").unwrap();
        assert_eq!(pitch_to_note(pitch), "D#4");
    }

    #[test]
    fn test_frequency() {
        assert!((Pitch::A4.frequency() - 440.0).abs() < 1e-3);
        assert!((Pitch::new(81).frequency() - 880.0).abs() < 1e-2);
        assert!((Pitch::C4.frequency() - 261.6256).abs() < 1e-2);
    }

    #[test]
    fn test_transpose() {
        assert_eq!(Pitch::C4.transpose(7, Direction::Ascending), Pitch::new(67));
        assert_eq!(Pitch::C4.transpose(3, Direction::Descending), Pitch::new(57));
    }

    #[test]
    fn test_range() {
        let range = PitchRange::PLAYABLE;
        assert!(range.contains(Pitch::new(60)));
        assert!(range.contains(Pitch::new(84)));
        assert!(!range.contains(Pitch::new(59)));
        assert!(!range.contains(Pitch::new(85)));

        let reversed = PitchRange::new(Pitch::new(70), Pitch::new(65));
        assert_eq!(reversed.low(), Pitch::new(65));
        assert_eq!(reversed.high(), Pitch::new(70));
    }
}
