//! Flattening chunk artifacts into one deduplicated record stream.
//!
//! Chunk artifacts hold one envelope per line. [`StreamNormalizer`] walks
//! them in the order given (ascending chunk date), checks every envelope's
//! status, and writes each item on its own line unless an item with the same
//! identifier was already written. Items without an identifier are always
//! written.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::envelope::{EnvelopeError, parse_envelope};
use crate::key::KeyField;
use crate::ldj::{Lines, open_reader};

/// Errors that abort normalization.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// A chunk artifact could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line is not a well-formed envelope.
    #[error("malformed envelope at {path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// An envelope reports a status other than `ok`.
    #[error("envelope at {path}:{line} has status {status:?}")]
    Protocol {
        path: PathBuf,
        line: u64,
        status: String,
    },

    /// The normalized stream could not be written.
    #[error("failed to write normalized output: {source}")]
    Output {
        #[source]
        source: std::io::Error,
    },
}

/// Counters for one normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Envelopes read.
    pub envelopes: u64,
    /// Items seen across all envelopes.
    pub items: u64,
    /// Items written.
    pub emitted: u64,
    /// Items dropped because their identifier was already written.
    pub duplicates: u64,
    /// Items written without an identifier.
    pub unkeyed: u64,
}

/// First-write-wins deduplication over a stream of records.
#[derive(Debug)]
pub struct StreamNormalizer {
    key_field: KeyField,
    seen: HashSet<String>,
    stats: NormalizeStats,
}

impl StreamNormalizer {
    #[must_use]
    pub fn new(key_field: KeyField) -> Self {
        Self {
            key_field,
            seen: HashSet::new(),
            stats: NormalizeStats::default(),
        }
    }

    /// Decides whether `record` belongs in the output, remembering its
    /// identifier if so.
    pub fn admit(&mut self, record: &Value) -> bool {
        self.stats.items += 1;
        let admitted = match self.key_field.extract(record) {
            None => {
                self.stats.unkeyed += 1;
                true
            }
            Some(key) => {
                if self.seen.insert(key) {
                    true
                } else {
                    self.stats.duplicates += 1;
                    false
                }
            }
        };
        if admitted {
            self.stats.emitted += 1;
        }
        admitted
    }

    /// Normalizes the envelopes read from `reader` into `out`.
    ///
    /// `path` is used only in diagnostics. Identifiers seen in earlier calls
    /// stay seen, so consecutive calls form one deduplicated stream.
    ///
    /// # Errors
    ///
    /// [`NormalizeError::Malformed`] or [`NormalizeError::Protocol`] for a
    /// bad envelope line, [`NormalizeError::Io`] / [`NormalizeError::Output`]
    /// for I/O failures.
    pub fn normalize_reader<R: BufRead, W: Write>(
        &mut self,
        path: &Path,
        reader: R,
        out: &mut W,
    ) -> Result<(), NormalizeError> {
        for line in Lines::new(reader) {
            let (line, bytes) = line.map_err(|source| NormalizeError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            let envelope = parse_envelope(&bytes).map_err(|e| match e {
                EnvelopeError::Status { status } => NormalizeError::Protocol {
                    path: path.to_path_buf(),
                    line,
                    status,
                },
                EnvelopeError::Malformed { reason } => NormalizeError::Malformed {
                    path: path.to_path_buf(),
                    line,
                    reason,
                },
            })?;
            self.stats.envelopes += 1;

            for item in envelope.items() {
                if !self.admit(item) {
                    continue;
                }
                let mut encoded =
                    serde_json::to_vec(item).map_err(|e| NormalizeError::Output {
                        source: e.into(),
                    })?;
                encoded.push(b'\n');
                out.write_all(&encoded)
                    .map_err(|source| NormalizeError::Output { source })?;
            }
        }
        Ok(())
    }

    /// Normalizes chunk artifacts, in the given order, into `out`.
    ///
    /// # Errors
    ///
    /// See [`normalize_reader`](Self::normalize_reader); also
    /// [`NormalizeError::Io`] if a file cannot be opened.
    #[instrument(skip(self, paths, out), fields(files = paths.len()))]
    pub fn normalize_files<W: Write>(
        &mut self,
        paths: &[PathBuf],
        out: &mut W,
    ) -> Result<NormalizeStats, NormalizeError> {
        for path in paths {
            let reader = open_reader(path).map_err(|source| NormalizeError::Io {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "normalizing chunk");
            self.normalize_reader(path, reader, out)?;
        }
        out.flush()
            .map_err(|source| NormalizeError::Output { source })?;
        info!(
            envelopes = self.stats.envelopes,
            emitted = self.stats.emitted,
            duplicates = self.stats.duplicates,
            unkeyed = self.stats.unkeyed,
            "normalization complete"
        );
        Ok(self.stats)
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> NormalizeStats {
        self.stats
    }
}

/// Lists `.ldj` / `.ldj.gz` chunk artifacts in `dir` in file name order.
///
/// Artifact names start with the chunk's begin date, so name order is date order.
///
/// # Errors
///
/// [`NormalizeError::Io`] if the directory cannot be listed.
pub fn chunk_files(dir: &Path) -> Result<Vec<PathBuf>, NormalizeError> {
    let io_err = |source| NormalizeError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if path.is_file() && (name.ends_with(".ldj") || name.ends_with(".ldj.gz")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(items: &[Value]) -> String {
        json!({"status": "ok", "message": {"items": items}}).to_string()
    }

    fn run(input: &str) -> (Vec<Value>, NormalizeStats) {
        let mut normalizer = StreamNormalizer::new(KeyField::new("id"));
        let mut out = Vec::new();
        normalizer
            .normalize_reader(Path::new("chunk.ldj"), input.as_bytes(), &mut out)
            .unwrap();
        let records = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (records, normalizer.stats())
    }

    #[test]
    fn test_first_occurrence_wins() {
        let input = format!(
            "{}\n{}\n",
            envelope(&[json!({"id": "A", "n": 1}), json!({"id": "B", "n": 2})]),
            envelope(&[
                json!({"id": "A", "n": 3}),
                json!({"id": "C", "n": 4}),
                json!({"id": "B", "n": 5}),
            ]),
        );
        let (records, stats) = run(&input);
        let ids: Vec<_> = records.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("A"), json!("B"), json!("C")]);
        assert_eq!(records[0]["n"], json!(1));
        assert_eq!(stats.duplicates, 2);
        assert_eq!(stats.envelopes, 2);
        assert_eq!(stats.items, 5);
    }

    #[test]
    fn test_null_identifiers_never_dropped() {
        let input = envelope(&[
            json!({"id": null, "n": 1}),
            json!({"id": null, "n": 1}),
            json!({"n": 1}),
        ]);
        let (records, stats) = run(&input);
        assert_eq!(records.len(), 3);
        assert_eq!(stats.unkeyed, 3);
        assert_eq!(stats.duplicates, 0);
    }

    #[test]
    fn test_status_violation_is_fatal_with_position() {
        let input = format!(
            "{}\n{}\n",
            envelope(&[json!({"id": "A"})]),
            json!({"status": "error", "message": {"items": []}})
        );
        let mut normalizer = StreamNormalizer::new(KeyField::new("id"));
        let result = normalizer.normalize_reader(Path::new("c.ldj"), input.as_bytes(), &mut Vec::new());
        match result {
            Err(NormalizeError::Protocol { line, status, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(status, "error");
            }
            other => panic!("expected Protocol, got {other:?}"),
        }
    }

    #[test]
    fn test_undecodable_line_is_fatal() {
        let mut normalizer = StreamNormalizer::new(KeyField::default());
        let result =
            normalizer.normalize_reader(Path::new("c.ldj"), &b"{\"status\":"[..], &mut Vec::new());
        assert!(matches!(result, Err(NormalizeError::Malformed { line: 1, .. })));
    }

    #[test]
    fn test_dedup_spans_multiple_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = dir.path().join("2020-01-01_2020-02-01.ldj");
        let second = dir.path().join("2020-02-01_2020-03-01.ldj");
        std::fs::write(&first, envelope(&[json!({"URL": "x"})]) + "\n").unwrap();
        std::fs::write(
            &second,
            envelope(&[json!({"URL": "x"}), json!({"URL": "y"})]) + "\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = chunk_files(dir.path()).unwrap();
        assert_eq!(files, vec![first, second]);

        let mut out = Vec::new();
        let stats = StreamNormalizer::new(KeyField::default())
            .normalize_files(&files, &mut out)
            .unwrap();
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "{\"URL\":\"x\"}\n{\"URL\":\"y\"}\n");
    }
}
