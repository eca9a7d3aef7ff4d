//! Freshness-correct merging of a dump and an update population.
//!
//! Both populations are line-delimited JSON records keyed by an external
//! identifier. The merged stream contains every identifier exactly once,
//! taken from the freshest population that has it:
//!
//! 1. **index**: scan each population into compact [`IndicatorRow`]s
//! 2. **rank**: per key, keep the top row under [`IndicatorRow::freshness_cmp`]
//! 3. **partition**: split the winners by provenance
//! 4. **select**: re-scan each population, keeping a line iff it is its
//!    key's winner; lines without a key are always kept
//! 5. **concatenate**: dump selection first, then update selection
//!
//! Only step 4 touches payloads a second time; ranking works on
//! `(key, provenance, line)` triples.
//!
//! # Example
//!
//! ```
//! use harvester_core::key::KeyField;
//! use harvester_core::merge::{MergeEngine, Population, Provenance};
//!
//! let dump = Population::memory(Provenance::Dump, "{\"id\":1,\"v\":\"old\"}\n{\"id\":2,\"v\":\"old\"}\n");
//! let update = Population::memory(Provenance::Update, "{\"id\":2,\"v\":\"new\"}\n{\"id\":3,\"v\":\"new\"}\n");
//!
//! let mut merged = Vec::new();
//! let stats = MergeEngine::new(KeyField::new("id")).merge(&dump, &update, &mut merged)?;
//!
//! assert_eq!(
//!     String::from_utf8(merged).unwrap(),
//!     "{\"id\":1,\"v\":\"old\"}\n{\"id\":2,\"v\":\"new\"}\n{\"id\":3,\"v\":\"new\"}\n"
//! );
//! assert_eq!(stats.superseded, 1);
//! # Ok::<(), harvester_core::merge::MergeError>(())
//! ```

mod indicator;
mod population;
mod provenance;

use std::collections::HashMap;
use std::io::Write;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::key::KeyField;
use crate::ldj::Lines;

pub use indicator::{IndicatorRow, read_indicators, write_indicators};
pub use population::{Population, PopulationSource};
pub use provenance::Provenance;

/// Errors that abort a merge.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Reading a population or writing output failed.
    #[error("I/O error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A population line is not a JSON value.
    #[error("malformed record in {population} at line {line}: {reason}")]
    Malformed {
        population: String,
        line: u64,
        reason: String,
    },

    /// A key cannot be carried in an indicator row.
    #[error("key {key:?} contains a tab or line break")]
    InvalidKey { key: String },

    #[error("unknown provenance {value:?}: expected dump or update")]
    InvalidProvenance { value: String },
}

impl MergeError {
    pub fn io(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            target: target.into(),
            source,
        }
    }
}

/// The winning row for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeDecision {
    pub key: String,
    pub winner: Provenance,
    /// Line of the winning record in the winner's population.
    pub line_number: u64,
}

/// Step 1 output for one population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationIndex {
    pub provenance: Provenance,
    /// Keyed rows in stream order.
    pub rows: Vec<IndicatorRow>,
    /// Non-blank lines seen.
    pub records: u64,
    /// Lines without an identifier.
    pub unkeyed: u64,
}

/// Winning keys per provenance, each mapped to the winning line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WinningKeys {
    pub from_dump: HashMap<String, u64>,
    pub from_update: HashMap<String, u64>,
}

impl WinningKeys {
    /// Winners contributed by `provenance`.
    #[must_use]
    pub fn for_provenance(&self, provenance: Provenance) -> &HashMap<String, u64> {
        match provenance {
            Provenance::Dump => &self.from_dump,
            Provenance::Update => &self.from_update,
        }
    }
}

/// Step 4 counters for one population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectStats {
    /// Keyed lines written.
    pub kept: u64,
    /// Lines without a key written.
    pub unkeyed: u64,
    /// Keyed lines dropped in favour of another row.
    pub superseded: u64,
}

/// Summary of a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub dump_rows: u64,
    pub update_rows: u64,
    pub unkeyed_dump: u64,
    pub unkeyed_update: u64,
    /// Keys whose winner is the dump.
    pub from_dump: u64,
    /// Keys whose winner is the update.
    pub from_update: u64,
    /// Keyed lines dropped from either population.
    pub superseded: u64,
}

impl MergeStats {
    /// Lines in the merged output.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.from_dump + self.from_update + self.unkeyed_dump + self.unkeyed_update
    }
}

/// Merges populations by identifier, freshest version winning.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    key_field: KeyField,
}

impl MergeEngine {
    #[must_use]
    pub fn new(key_field: KeyField) -> Self {
        Self { key_field }
    }

    #[must_use]
    pub fn key_field(&self) -> &KeyField {
        &self.key_field
    }

    fn record_key(
        &self,
        population: &Population,
        line: u64,
        bytes: &[u8],
    ) -> Result<Option<String>, MergeError> {
        let record: Value =
            serde_json::from_slice(bytes).map_err(|e| MergeError::Malformed {
                population: population.label(),
                line,
                reason: e.to_string(),
            })?;
        Ok(self.key_field.extract(&record))
    }

    /// Step 1: indexes one population.
    ///
    /// # Errors
    ///
    /// [`MergeError::Io`] on read failure, [`MergeError::Malformed`] for a
    /// line that is not JSON.
    pub fn index(&self, population: &Population) -> Result<PopulationIndex, MergeError> {
        let mut index = PopulationIndex {
            provenance: population.provenance,
            rows: Vec::new(),
            records: 0,
            unkeyed: 0,
        };
        for line in Lines::new(population.open()?) {
            let (line, bytes) = line.map_err(|e| MergeError::io(population.label(), e))?;
            index.records += 1;
            match self.record_key(population, line, &bytes)? {
                Some(key) => index
                    .rows
                    .push(IndicatorRow::new(population.provenance, key, line)),
                None => index.unkeyed += 1,
            }
        }
        debug!(
            population = %population.label(),
            records = index.records,
            keyed = index.rows.len(),
            "population indexed"
        );
        Ok(index)
    }

    /// Step 2: keeps the freshest row per key.
    ///
    /// Decisions are returned sorted by key.
    #[must_use]
    pub fn rank<'a>(rows: impl IntoIterator<Item = &'a IndicatorRow>) -> Vec<MergeDecision> {
        let mut best: HashMap<&str, &IndicatorRow> = HashMap::new();
        for row in rows {
            best.entry(row.key.as_str())
                .and_modify(|current| {
                    if row.outranks(*current) {
                        *current = row;
                    }
                })
                .or_insert(row);
        }
        let mut decisions: Vec<MergeDecision> = best
            .into_values()
            .map(|row| MergeDecision {
                key: row.key.clone(),
                winner: row.provenance,
                line_number: row.line_number,
            })
            .collect();
        decisions.sort_by(|a, b| a.key.cmp(&b.key));
        decisions
    }

    /// Step 3: splits decisions by winning provenance.
    #[must_use]
    pub fn partition(decisions: Vec<MergeDecision>) -> WinningKeys {
        let mut winners = WinningKeys::default();
        for decision in decisions {
            let target = match decision.winner {
                Provenance::Dump => &mut winners.from_dump,
                Provenance::Update => &mut winners.from_update,
            };
            target.insert(decision.key, decision.line_number);
        }
        winners
    }

    /// Step 4: writes the lines of `population` that survive the merge,
    /// byte for byte, in their original order.
    ///
    /// # Errors
    ///
    /// [`MergeError::Io`] on read or write failure, [`MergeError::Malformed`]
    /// for a line that is not JSON.
    pub fn select<W: Write>(
        &self,
        population: &Population,
        winners: &WinningKeys,
        out: &mut W,
    ) -> Result<SelectStats, MergeError> {
        let wanted = winners.for_provenance(population.provenance);
        let mut stats = SelectStats::default();
        for line in Lines::new(population.open()?) {
            let (line, bytes) = line.map_err(|e| MergeError::io(population.label(), e))?;
            let keep = match self.record_key(population, line, &bytes)? {
                None => {
                    stats.unkeyed += 1;
                    true
                }
                Some(key) if wanted.get(&key) == Some(&line) => {
                    stats.kept += 1;
                    true
                }
                Some(_) => {
                    stats.superseded += 1;
                    false
                }
            };
            if keep {
                out.write_all(&bytes)
                    .and_then(|()| out.write_all(b"\n"))
                    .map_err(|e| MergeError::io("merged output", e))?;
            }
        }
        Ok(stats)
    }

    /// Runs all five steps, writing dump survivors then update survivors to `out`.
    ///
    /// # Errors
    ///
    /// See [`index`](Self::index) and [`select`](Self::select).
    #[instrument(skip_all, fields(dump = %dump.label(), update = %update.label()))]
    pub fn merge<W: Write>(
        &self,
        dump: &Population,
        update: &Population,
        out: &mut W,
    ) -> Result<MergeStats, MergeError> {
        let dump_index = self.index(dump)?;
        let update_index = self.index(update)?;

        let decisions = Self::rank(dump_index.rows.iter().chain(update_index.rows.iter()));
        let winners = Self::partition(decisions);

        let dump_selected = self.select(dump, &winners, out)?;
        let update_selected = self.select(update, &winners, out)?;
        out.flush()
            .map_err(|e| MergeError::io("merged output", e))?;

        let stats = MergeStats {
            dump_rows: dump_index.records,
            update_rows: update_index.records,
            unkeyed_dump: dump_selected.unkeyed,
            unkeyed_update: update_selected.unkeyed,
            from_dump: dump_selected.kept,
            from_update: update_selected.kept,
            superseded: dump_selected.superseded + update_selected.superseded,
        };
        info!(
            from_dump = stats.from_dump,
            from_update = stats.from_update,
            superseded = stats.superseded,
            unkeyed = stats.unkeyed_dump + stats.unkeyed_update,
            "merge complete"
        );
        Ok(stats)
    }

    /// Writes the indicator rows of both populations (dump first) as TSV.
    ///
    /// # Errors
    ///
    /// See [`index`](Self::index) and [`write_indicators`].
    pub fn indicators<W: Write>(
        &self,
        dump: &Population,
        update: &Population,
        out: &mut W,
    ) -> Result<u64, MergeError> {
        let dump_index = self.index(dump)?;
        let update_index = self.index(update)?;
        let written = write_indicators(dump_index.rows.iter().chain(&update_index.rows), out)?;
        out.flush().map_err(|e| MergeError::io("indicators", e))?;
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn engine() -> MergeEngine {
        MergeEngine::new(KeyField::new("id"))
    }

    fn merge(dump: &str, update: &str) -> (String, MergeStats) {
        let mut out = Vec::new();
        let stats = engine()
            .merge(
                &Population::memory(Provenance::Dump, dump),
                &Population::memory(Provenance::Update, update),
                &mut out,
            )
            .unwrap();
        (String::from_utf8(out).unwrap(), stats)
    }

    #[test]
    fn test_update_supersedes_dump() {
        let (out, stats) = merge(
            "{\"id\":1,\"v\":\"old\"}\n{\"id\":2,\"v\":\"old\"}\n",
            "{\"id\":2,\"v\":\"new\"}\n{\"id\":3,\"v\":\"new\"}\n",
        );
        assert_eq!(
            out,
            "{\"id\":1,\"v\":\"old\"}\n{\"id\":2,\"v\":\"new\"}\n{\"id\":3,\"v\":\"new\"}\n"
        );
        assert_eq!(stats.from_dump, 1);
        assert_eq!(stats.from_update, 2);
        assert_eq!(stats.superseded, 1);
        assert_eq!(stats.written(), 3);
    }

    #[test]
    fn test_numeric_and_string_identifiers_merge_as_one() {
        let (out, stats) = merge(
            "{\"id\":1,\"v\":\"old\"}\n",
            "{\"id\":\"1\",\"v\":\"new\"}\n",
        );
        assert_eq!(out, "{\"id\":\"1\",\"v\":\"new\"}\n");
        assert_eq!(stats.superseded, 1);
    }

    #[test]
    fn test_duplicate_key_within_population_keeps_first() {
        let (out, stats) = merge(
            "{\"id\":\"a\",\"n\":1}\n{\"id\":\"a\",\"n\":2}\n",
            "",
        );
        assert_eq!(out, "{\"id\":\"a\",\"n\":1}\n");
        assert_eq!(stats.superseded, 1);
    }

    #[test]
    fn test_duplicate_key_in_update_keeps_first_update() {
        let (out, _) = merge(
            "{\"id\":\"a\",\"n\":0}\n",
            "{\"id\":\"a\",\"n\":1}\n{\"id\":\"a\",\"n\":2}\n",
        );
        assert_eq!(out, "{\"id\":\"a\",\"n\":1}\n");
    }

    #[test]
    fn test_unkeyed_records_always_survive() {
        let (out, stats) = merge(
            "{\"v\":\"x\"}\n{\"v\":\"x\"}\n{\"id\":1}\n",
            "{\"id\":null,\"v\":\"x\"}\n",
        );
        assert_eq!(out.lines().count(), 4);
        assert_eq!(stats.unkeyed_dump, 2);
        assert_eq!(stats.unkeyed_update, 1);
    }

    #[test]
    fn test_lines_are_copied_verbatim() {
        let (out, _) = merge("{ \"id\" : 1 ,  \"z\":1, \"a\":2 }\n", "");
        assert_eq!(out, "{ \"id\" : 1 ,  \"z\":1, \"a\":2 }\n");
    }

    #[test]
    fn test_malformed_line_reports_population_and_line() {
        let mut out = Vec::new();
        let result = engine().merge(
            &Population::memory(Provenance::Dump, "{\"id\":1}\n\n{oops\n"),
            &Population::memory(Provenance::Update, ""),
            &mut out,
        );
        match result {
            Err(MergeError::Malformed { population, line, .. }) => {
                assert_eq!(population, "<dump buffer>");
                assert_eq!(line, 3);
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_rank_and_partition() {
        let rows = vec![
            IndicatorRow::new(Provenance::Dump, "k1", 1),
            IndicatorRow::new(Provenance::Dump, "k2", 2),
            IndicatorRow::new(Provenance::Update, "k2", 5),
        ];
        let decisions = MergeEngine::rank(&rows);
        assert_eq!(
            decisions,
            vec![
                MergeDecision {
                    key: "k1".into(),
                    winner: Provenance::Dump,
                    line_number: 1
                },
                MergeDecision {
                    key: "k2".into(),
                    winner: Provenance::Update,
                    line_number: 5
                },
            ]
        );
        let winners = MergeEngine::partition(decisions);
        assert_eq!(winners.from_dump.get("k1"), Some(&1));
        assert_eq!(winners.from_update.get("k2"), Some(&5));
        assert!(!winners.from_dump.contains_key("k2"));
    }

    #[test]
    fn test_indicators_tsv() {
        let mut out = Vec::new();
        let written = engine()
            .indicators(
                &Population::memory(Provenance::Dump, "{\"id\":\"a\"}\n{\"x\":1}\n{\"id\":\"b\"}\n"),
                &Population::memory(Provenance::Update, "{\"id\":\"a\"}\n"),
                &mut out,
            )
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1\tdump\ta\n3\tdump\tb\n1\tupdate\ta\n"
        );
    }
}
