//! Population tags and their freshness order.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::MergeError;

/// Which population a record row came from.
///
/// Ordered by freshness: `Update > Dump`. An update always supersedes the
/// dump it corrects, whatever the positions of the two rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Full baseline snapshot.
    Dump,
    /// Incremental corrections and additions.
    Update,
}

impl Provenance {
    /// All provenances, freshest first.
    pub const FRESHEST_FIRST: [Self; 2] = [Self::Update, Self::Dump];

    /// Freshness rank; higher wins.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Dump => 0,
            Self::Update => 1,
        }
    }

    /// Tag used in indicator rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dump => "dump",
            Self::Update => "update",
        }
    }
}

impl Ord for Provenance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Provenance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dump" => Ok(Self::Dump),
            "update" => Ok(Self::Update),
            other => Err(MergeError::InvalidProvenance {
                value: other.to_string(),
            }),
        }
    }
}
