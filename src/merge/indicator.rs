//! Compact per-record rows used to rank populations without their payloads.
//!
//! Serialized as tab-separated `sequence, provenance, key` lines.

use std::cmp::Ordering;
use std::io::{BufRead, Write};

use super::{MergeError, Provenance};

/// One keyed record of a population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorRow {
    /// Position within the population, strictly increasing in stream order.
    pub sequence: u64,
    pub provenance: Provenance,
    pub key: String,
    /// 1-based line of the record in its population.
    pub line_number: u64,
}

impl IndicatorRow {
    /// Creates a row whose sequence is its line number.
    #[must_use]
    pub fn new(provenance: Provenance, key: impl Into<String>, line_number: u64) -> Self {
        Self {
            sequence: line_number,
            provenance,
            key: key.into(),
            line_number,
        }
    }

    /// Freshness comparison between two rows for the same key: higher
    /// provenance wins, then the lower sequence.
    #[must_use]
    pub fn freshness_cmp(&self, other: &Self) -> Ordering {
        self.provenance
            .cmp(&other.provenance)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }

    /// Returns true if this row beats `other` as the contributor for a key.
    #[must_use]
    pub fn outranks(&self, other: &Self) -> bool {
        self.freshness_cmp(other) == Ordering::Greater
    }

    /// Renders the TSV line (no trailing newline).
    ///
    /// # Errors
    ///
    /// [`MergeError::InvalidKey`] if the key contains a tab or line break.
    pub fn to_tsv(&self) -> Result<String, MergeError> {
        if self.key.contains(['\t', '\n', '\r']) {
            return Err(MergeError::InvalidKey {
                key: self.key.clone(),
            });
        }
        Ok(format!("{}\t{}\t{}", self.sequence, self.provenance, self.key))
    }

    /// Parses a TSV line. The line number is taken from the sequence.
    ///
    /// # Errors
    ///
    /// [`MergeError::Malformed`] with `line` for anything but three fields
    /// with a numeric sequence and a known provenance.
    pub fn parse_tsv(text: &str, line: u64) -> Result<Self, MergeError> {
        let malformed = |reason: String| MergeError::Malformed {
            population: "indicators".to_string(),
            line,
            reason,
        };
        let mut fields = text.splitn(3, '\t');
        let (Some(sequence), Some(provenance), Some(key)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed(format!("expected 3 tab-separated fields: {text:?}")));
        };
        let sequence: u64 = sequence
            .parse()
            .map_err(|_| malformed(format!("bad sequence {sequence:?}")))?;
        let provenance: Provenance = provenance.parse().map_err(|e: MergeError| malformed(e.to_string()))?;
        Ok(Self {
            sequence,
            provenance,
            key: key.to_string(),
            line_number: sequence,
        })
    }
}

/// Writes rows as TSV lines.
///
/// # Errors
///
/// [`MergeError::InvalidKey`] for unserializable keys, [`MergeError::Io`]
/// on write failure.
pub fn write_indicators<'a, W: Write>(
    rows: impl IntoIterator<Item = &'a IndicatorRow>,
    out: &mut W,
) -> Result<u64, MergeError> {
    let mut written = 0;
    for row in rows {
        let line = row.to_tsv()?;
        writeln!(out, "{line}").map_err(|e| MergeError::io("indicators", e))?;
        written += 1;
    }
    Ok(written)
}

/// Reads TSV rows written by [`write_indicators`].
///
/// # Errors
///
/// [`MergeError::Malformed`] for a bad line, [`MergeError::Io`] on read failure.
pub fn read_indicators<R: BufRead>(reader: R) -> Result<Vec<IndicatorRow>, MergeError> {
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| MergeError::io("indicators", e))?;
        if line.is_empty() {
            continue;
        }
        rows.push(IndicatorRow::parse_tsv(&line, index as u64 + 1)?);
    }
    Ok(rows)
}
