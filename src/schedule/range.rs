//! Calendar-aligned splitting of harvest date ranges.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};

use super::ScheduleError;

/// Chunk size for splitting a harvest range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    Day,
    /// ISO weeks, starting Monday.
    Week,
    #[default]
    Month,
}

impl Granularity {
    /// First boundary strictly after `date`.
    ///
    /// Returns `None` only at the end of chrono's representable range.
    #[must_use]
    pub fn next_boundary(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Day => date.checked_add_days(Days::new(1)),
            Self::Week => {
                let to_monday = 7 - u64::from(date.weekday().num_days_from_monday());
                date.checked_add_days(Days::new(to_monday))
            }
            Self::Month => date
                .with_day(1)
                .and_then(|first| first.checked_add_months(Months::new(1))),
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            _ => Err(ScheduleError::InvalidGranularity {
                value: s.to_string(),
            }),
        }
    }
}

/// Half-open date interval `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateRange {
    pub begin: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting empty or inverted intervals.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::InvalidRange`] when `begin >= end`.
    pub fn new(begin: NaiveDate, end: NaiveDate) -> Result<Self, ScheduleError> {
        if begin >= end {
            return Err(ScheduleError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.begin, self.end)
    }
}

/// Splits `[begin, end)` into contiguous, non-overlapping sub-ranges.
///
/// Interior boundaries fall on calendar boundaries of `granularity`; the
/// first and last sub-range are clamped to the requested interval.
///
/// ```
/// use chrono::NaiveDate;
/// use harvester_core::schedule::{Granularity, split_range};
///
/// let d = |s: &str| s.parse::<NaiveDate>().unwrap();
/// let chunks = split_range(d("2020-01-15"), d("2020-03-10"), Granularity::Month)?;
/// let labels: Vec<_> = chunks.iter().map(ToString::to_string).collect();
/// assert_eq!(
///     labels,
///     ["2020-01-15_2020-02-01", "2020-02-01_2020-03-01", "2020-03-01_2020-03-10"]
/// );
/// # Ok::<(), harvester_core::schedule::ScheduleError>(())
/// ```
///
/// # Errors
///
/// [`ScheduleError::InvalidRange`] when `begin >= end`.
pub fn split_range(
    begin: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
) -> Result<Vec<DateRange>, ScheduleError> {
    DateRange::new(begin, end)?;

    let mut ranges = Vec::new();
    let mut cursor = begin;
    while cursor < end {
        let next = granularity
            .next_boundary(cursor)
            .map_or(end, |boundary| boundary.min(end));
        ranges.push(DateRange {
            begin: cursor,
            end: next,
        });
        cursor = next;
    }
    Ok(ranges)
}

/// Date field the upstream API filters on, e.g. `deposit`, `update`, `index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterKind(String);

impl FilterKind {
    /// Validates a filter kind: non-empty ASCII letters, digits and hyphens.
    ///
    /// The value becomes both part of the upstream filter expression and a
    /// directory name, so nothing else is allowed.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::InvalidFilterKind`] for any other input.
    pub fn new(kind: &str) -> Result<Self, ScheduleError> {
        let valid = !kind.is_empty()
            && kind
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if valid {
            Ok(Self(kind.to_string()))
        } else {
            Err(ScheduleError::InvalidFilterKind {
                value: kind.to_string(),
            })
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FilterKind {
    fn default() -> Self {
        Self("deposit".to_string())
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FilterKind {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// One independently harvestable unit: a date range and the field it filters on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HarvestChunk {
    pub range: DateRange,
    pub filter: FilterKind,
}

impl HarvestChunk {
    #[must_use]
    pub fn new(range: DateRange, filter: FilterKind) -> Self {
        Self { range, filter }
    }

    /// Upstream filter expression for this chunk.
    ///
    /// The upstream treats `until` as inclusive, so neighbouring chunks share
    /// their boundary day; the normalizer drops the resulting duplicates.
    #[must_use]
    pub fn filter_expr(&self) -> String {
        let kind = &self.filter;
        format!(
            "from-{kind}-date:{},until-{kind}-date:{}",
            self.range.begin, self.range.end
        )
    }
}

impl fmt::Display for HarvestChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.filter, self.range)
    }
}
