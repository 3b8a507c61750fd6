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

//! Practice statistics: today's attempts and successes plus the last few results,
//! kept as JSON values in a key-value store.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Key holding today's [`DailyStats`].
pub const DAILY_STATS_KEY: &str = "musicTraining_dailyStats";

/// Key holding the recent [`ExerciseResult`]s, newest first.
pub const RECENT_RESULTS_KEY: &str = "musicTraining_recentResults";

/// How many recent results are kept.
pub const RECENT_RESULTS: usize = 5;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("unable to access {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid statistics data: {0}")]
    Json(#[from] serde_json::Error),
}

/// String storage for practice data.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StatsError>;
    fn set(&self, key: &str, value: String) -> Result<(), StatsError>;
}

/// A store that forgets everything when dropped.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StatsError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StatsError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// A store backed by a single JSON object on disk, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens the store. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<FileStore, StatsError> {
        let values = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StatsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        debug!(path = ?path, "Opened statistics store");

        Ok(FileStore {
            path: path.to_path_buf(),
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StatsError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StatsError> {
        let mut values = self.values.lock();
        let mut updated = values.clone();
        updated.insert(key.to_string(), value);

        let contents = serde_json::to_string_pretty(&updated)?;
        fs::write(&self.path, contents).map_err(|source| StatsError::Io {
            path: self.path.clone(),
            source,
        })?;
        *values = updated;
        Ok(())
    }
}

/// Attempts and successes for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub attempts: u32,
    pub successes: u32,
    pub date: String,
}

impl DailyStats {
    fn empty(date: NaiveDate) -> DailyStats {
        DailyStats {
            attempts: 0,
            successes: 0,
            date: date.format(DATE_FORMAT).to_string(),
        }
    }
}

impl fmt::Display for DailyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} of {} correct",
            self.date, self.successes, self.attempts
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseMode {
    Comparator,
    Identification,
}

impl fmt::Display for ExerciseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExerciseMode::Comparator => "comparator",
            ExerciseMode::Identification => "identification",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseResult {
    pub mode: ExerciseMode,
    pub success: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Decides whether more exercises may be attempted today.
pub trait AttemptPolicy: Send + Sync {
    /// The daily limit, or None when there isn't one.
    fn daily_limit(&self) -> Option<u32>;

    fn is_limit_reached(&self, stats: &DailyStats) -> bool {
        self.daily_limit()
            .map(|limit| stats.attempts >= limit)
            .unwrap_or(false)
    }

    /// Attempts left today, or None when unlimited.
    fn remaining(&self, stats: &DailyStats) -> Option<u32> {
        self.daily_limit()
            .map(|limit| limit.saturating_sub(stats.attempts))
    }
}

/// No daily limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl AttemptPolicy for Unlimited {
    fn daily_limit(&self) -> Option<u32> {
        None
    }
}

/// Records exercise results into a store.
pub struct PracticeLog<S: KeyValueStore> {
    store: S,
    policy: Box<dyn AttemptPolicy>,
}

impl<S: KeyValueStore> PracticeLog<S> {
    pub fn new(store: S) -> PracticeLog<S> {
        PracticeLog::with_policy(store, Box::new(Unlimited))
    }

    pub fn with_policy(store: S, policy: Box<dyn AttemptPolicy>) -> PracticeLog<S> {
        PracticeLog { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Today's statistics, or zeroes if nothing was recorded today.
    pub fn today(&self) -> Result<DailyStats, StatsError> {
        self.stats_on(Local::now().date_naive())
    }

    fn stats_on(&self, date: NaiveDate) -> Result<DailyStats, StatsError> {
        let fresh = DailyStats::empty(date);
        let Some(stored) = self.store.get(DAILY_STATS_KEY)? else {
            return Ok(fresh);
        };

        match serde_json::from_str::<DailyStats>(&stored) {
            Ok(stats) if stats.date == fresh.date => Ok(stats),
            Ok(_) => Ok(fresh),
            Err(e) => {
                warn!(err = e.to_string(), "Discarding unreadable daily statistics");
                Ok(fresh)
            }
        }
    }

    /// Records a result. Returns false, recording nothing, if today's limit is reached.
    pub fn record(&self, mode: ExerciseMode, success: bool) -> Result<bool, StatsError> {
        self.record_at(mode, success, Local::now())
    }

    fn record_at(
        &self,
        mode: ExerciseMode,
        success: bool,
        now: DateTime<Local>,
    ) -> Result<bool, StatsError> {
        let mut stats = self.stats_on(now.date_naive())?;
        if self.policy.is_limit_reached(&stats) {
            debug!(attempts = stats.attempts, "Daily limit reached");
            return Ok(false);
        }

        stats.attempts += 1;
        if success {
            stats.successes += 1;
        }
        self.store
            .set(DAILY_STATS_KEY, serde_json::to_string(&stats)?)?;

        let mut results = self.recent_results()?;
        results.insert(
            0,
            ExerciseResult {
                mode,
                success,
                timestamp: now.timestamp_millis(),
            },
        );
        results.truncate(RECENT_RESULTS);
        self.store
            .set(RECENT_RESULTS_KEY, serde_json::to_string(&results)?)?;

        debug!(mode = %mode, success, attempts = stats.attempts, "Recorded result");
        Ok(true)
    }

    /// The most recent results, newest first.
    pub fn recent_results(&self) -> Result<Vec<ExerciseResult>, StatsError> {
        match self.store.get(RECENT_RESULTS_KEY)? {
            Some(stored) => Ok(serde_json::from_str(&stored).unwrap_or_else(|e| {
                warn!(err = e.to_string(), "Discarding unreadable recent results");
                Vec::new()
            })),
            None => Ok(Vec::new()),
        }
    }

    pub fn is_limit_reached(&self) -> Result<bool, StatsError> {
        Ok(self.policy.is_limit_reached(&self.today()?))
    }

    /// Attempts left today, or None when unlimited.
    pub fn remaining_attempts(&self) -> Result<Option<u32>, StatsError> {
        Ok(self.policy.remaining(&self.today()?))
    }

    pub fn daily_limit(&self) -> Option<u32> {
        self.policy.daily_limit()
    }
}
