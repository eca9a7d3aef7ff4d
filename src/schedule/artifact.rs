//! Chunk output artifacts on disk.
//!
//! A chunk's artifact is addressed solely by `(kind, begin, end)`:
//! `<root>/<kind>/<begin>_<end>.ldj`. The file only ever appears through a
//! rename from its `.partial` sibling, so its existence means the chunk
//! completed.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::ScheduleError;
use super::range::HarvestChunk;
use crate::ldj::{OutputFile, partial_path};

/// Extension of completed chunk artifacts.
pub const ARTIFACT_EXTENSION: &str = "ldj";

/// Directory of chunk artifacts.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final artifact path of `chunk`.
    #[must_use]
    pub fn path_for(&self, chunk: &HarvestChunk) -> PathBuf {
        self.root
            .join(chunk.filter.as_str())
            .join(format!("{}.{ARTIFACT_EXTENSION}", chunk.range))
    }

    /// Returns true if `chunk` has a completed artifact.
    #[must_use]
    pub fn is_complete(&self, chunk: &HarvestChunk) -> bool {
        self.path_for(chunk).is_file()
    }

    /// Starts writing `chunk`'s artifact, discarding any leftover partial file.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Io`] if the partial file cannot be created.
    pub fn begin(&self, chunk: &HarvestChunk) -> Result<OutputFile, ScheduleError> {
        let path = self.path_for(chunk);
        let partial = partial_path(&path);
        if partial.exists() {
            debug!(path = %partial.display(), "discarding leftover partial artifact");
        }
        OutputFile::create(&path).map_err(|e| ScheduleError::io(partial, e))
    }
}
