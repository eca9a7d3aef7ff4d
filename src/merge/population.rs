//! Record populations: line-delimited JSON from a file or a buffer.

use std::io::BufRead;
use std::path::PathBuf;

use super::{MergeError, Provenance};
use crate::ldj::open_reader;

/// Where a population's lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulationSource {
    /// Plain or `.gz` file.
    File(PathBuf),
    /// In-memory line-delimited JSON.
    Memory(Vec<u8>),
}

/// One tagged population of records.
///
/// Populations are read twice during a merge (index, then select), so the
/// source must be re-openable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Population {
    pub provenance: Provenance,
    pub source: PopulationSource,
}

impl Population {
    #[must_use]
    pub fn file(provenance: Provenance, path: impl Into<PathBuf>) -> Self {
        Self {
            provenance,
            source: PopulationSource::File(path.into()),
        }
    }

    #[must_use]
    pub fn memory(provenance: Provenance, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            provenance,
            source: PopulationSource::Memory(bytes.into()),
        }
    }

    /// Name used in diagnostics: the file path, or the provenance tag.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.source {
            PopulationSource::File(path) => path.display().to_string(),
            PopulationSource::Memory(_) => format!("<{} buffer>", self.provenance),
        }
    }

    /// Opens the population for a fresh scan from the first line.
    ///
    /// # Errors
    ///
    /// [`MergeError::Io`] if the file cannot be opened.
    pub fn open(&self) -> Result<Box<dyn BufRead + Send + '_>, MergeError> {
        match &self.source {
            PopulationSource::File(path) => {
                open_reader(path).map_err(|e| MergeError::io(self.label(), e))
            }
            PopulationSource::Memory(bytes) => Ok(Box::new(bytes.as_slice())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_memory_population_can_be_read_twice() {
        let population = Population::memory(Provenance::Dump, "{\"id\":1}\n");
        for _ in 0..2 {
            let mut text = String::new();
            population.open().unwrap().read_to_string(&mut text).unwrap();
            assert_eq!(text, "{\"id\":1}\n");
        }
    }

    #[test]
    fn test_missing_file_reports_path() {
        let population = Population::file(Provenance::Update, "/nonexistent/update.ldj");
        let error = population.open().err().unwrap();
        assert!(error.to_string().contains("/nonexistent/update.ldj"));
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            Population::memory(Provenance::Update, Vec::new()).label(),
            "<update buffer>"
        );
        assert_eq!(Population::file(Provenance::Dump, "a.ldj").label(), "a.ldj");
    }
}
