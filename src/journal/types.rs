//! Location and session types shared by providers, writers and readers.
//!
//! A [`Location`] is the immutable key `(mode, category, group, name)` that
//! names one logical stream. Its total order is also the tie-break order of
//! the aggregate reader, so two frames carrying the same `trigger_time` are
//! always replayed in the same order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a page within one location. The first page is `1`.
pub type PageId = u32;

/// The first page id allocated for a fresh location.
pub const FIRST_PAGE_ID: PageId = 1;

/// Runtime mode a stream was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Production trading against live venues.
    Live,
    /// Market data recording without trading.
    Data,
    /// Replaying a previously recorded journal.
    Replay,
    /// Simulated trading over historical data.
    Backtest,
}

impl Mode {
    /// Lowercase name used in paths and subjects.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Data => "data",
            Mode::Replay => "replay",
            Mode::Backtest => "backtest",
        }
    }
}

/// Kind of traffic a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Market data (quotes, trades, book updates).
    Md,
    /// Trading (orders, executions).
    Td,
    /// Strategy-generated events.
    Strategy,
    /// Runtime and control traffic.
    System,
}

impl Category {
    /// Lowercase name used in paths and subjects.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Md => "md",
            Category::Td => "td",
            Category::Strategy => "strategy",
            Category::System => "system",
        }
    }
}

/// Immutable key identifying one logical stream.
///
/// Ordering is lexicographic over `(mode, category, group, name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Runtime mode.
    pub mode: Mode,
    /// Traffic category.
    pub category: Category,
    /// Owning group, e.g. a venue or strategy family.
    pub group: String,
    /// Stream name within the group.
    pub name: String,
}

impl Location {
    /// Create a new location key.
    pub fn new(
        mode: Mode,
        category: Category,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            category,
            group: group.into(),
            name: name.into(),
        }
    }

    /// Dot-separated form, suitable as a message-bus subject suffix.
    #[must_use]
    pub fn subject(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.mode.as_str(),
            self.category.as_str(),
            self.group,
            self.name
        )
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.mode.as_str(),
            self.category.as_str(),
            self.group,
            self.name
        )
    }
}

/// Half-open interval `[start_time, end_time)` during which a location had
/// continuously available data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Session {
    /// Trigger time of the first data frame, in nanoseconds.
    pub start_time: i64,
    /// One past the trigger time of the last data frame, in nanoseconds.
    pub end_time: i64,
    /// Number of data frames recorded in the session.
    pub frame_count: u64,
    /// Whether the writer ended the session cleanly.
    pub closed: bool,
}

impl Session {
    /// Whether `time` falls inside the session.
    #[must_use]
    #[inline]
    pub fn contains(&self, time: i64) -> bool {
        self.start_time <= time && time < self.end_time
    }

    /// Length of the interval in nanoseconds.
    #[must_use]
    #[inline]
    pub fn duration_ns(&self) -> i64 {
        self.end_time.saturating_sub(self.start_time)
    }
}
