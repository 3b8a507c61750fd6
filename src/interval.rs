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
use std::fmt;

/// A named, fixed distance between two pitches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    /// Short symbolic name. Unique within the catalog.
    pub name: &'static str,
    /// Distance in semitones.
    pub semitones: u8,
    /// Human-readable label.
    pub label: &'static str,
}

/// The intervals used by every exercise, ordered by size.
pub static CATALOG: [Interval; 6] = [
    Interval {
        name: "2M",
        semitones: 2,
        label: "Major second",
    },
    Interval {
        name: "3m",
        semitones: 3,
        label: "Minor third",
    },
    Interval {
        name: "3M",
        semitones: 4,
        label: "Major third",
    },
    Interval {
        name: "4J",
        semitones: 5,
        label: "Perfect fourth",
    },
    Interval {
        name: "5J",
        semitones: 7,
        label: "Perfect fifth",
    },
    Interval {
        name: "8J",
        semitones: 12,
        label: "Perfect octave",
    },
];

/// Looks up a catalog interval by its symbolic name.
pub fn by_name(name: &str) -> Option<&'static Interval> {
    CATALOG.iter().find(|interval| interval.name == name)
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.name)
    }
}

/// Which way an interval is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Root first, then the higher note.
    Ascending,
    /// The higher note first, then the root.
    Descending,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ascending => write!(f, "ascending"),
            Direction::Descending => write!(f, "descending"),
        }
    }
}
