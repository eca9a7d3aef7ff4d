//! Resumable, chunked harvests over date ranges.
//!
//! [`ChunkScheduler`] splits a requested `[begin, end)` range into
//! calendar-aligned [`HarvestChunk`]s and harvests each one through the
//! [`Fetcher`] into its own artifact file. Completed artifacts are never
//! rewritten, so re-running a failed or interrupted harvest only fetches the
//! chunks that are still missing.
//!
//! Chunks run concurrently, bounded by a semaphore. Pages within one chunk
//! are always fetched sequentially, since offsets depend on the page before.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use harvester_core::cache::{Cache, FsStore};
//! use harvester_core::fetch::{Fetcher, HttpTransport, RequestTemplate};
//! use harvester_core::schedule::{ChunkScheduler, ChunkStore, FilterKind, Granularity};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Cache::new(Arc::new(FsStore::default_location()), Arc::new(HttpTransport::new()?));
//! let scheduler = ChunkScheduler::new(
//!     Fetcher::new(cache),
//!     ChunkStore::new("./crossref"),
//!     RequestTemplate::new("https://api.crossref.org/works", 1000)?,
//!     4,
//! );
//! let report = scheduler
//!     .run(
//!         "2020-01-01".parse()?,
//!         "2020-07-01".parse()?,
//!         Granularity::Month,
//!         &FilterKind::new("deposit")?,
//!     )
//!     .await?;
//! println!("{} harvested, {} skipped", report.harvested(), report.skipped());
//! # Ok(())
//! # }
//! ```

mod artifact;
mod range;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::fetch::{Fetcher, HarvestError, PageCursor, RequestTemplate};
use crate::ldj::OutputFile;

pub use artifact::{ARTIFACT_EXTENSION, ChunkStore};
pub use range::{DateRange, FilterKind, Granularity, HarvestChunk, split_range};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 32;

/// Default number of chunks harvested at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Errors that fail a scheduler run.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid date range: begin {begin} must be before end {end}")]
    InvalidRange { begin: NaiveDate, end: NaiveDate },

    #[error("invalid granularity {value:?}: expected day, week or month")]
    InvalidGranularity { value: String },

    #[error("invalid filter kind {value:?}: expected letters, digits and hyphens")]
    InvalidFilterKind { value: String },

    /// Artifact I/O failed.
    #[error("artifact I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A chunk's harvest failed fatally.
    #[error("chunk {chunk} failed: {source}")]
    Harvest {
        chunk: String,
        #[source]
        source: HarvestError,
    },

    /// A page could not be re-serialized into the artifact.
    #[error("failed to encode page for {chunk}: {source}")]
    Encode {
        chunk: String,
        #[source]
        source: serde_json::Error,
    },

    /// The run was interrupted before the chunk finished.
    #[error("chunk {chunk} cancelled")]
    Cancelled { chunk: String },

    /// A chunk task panicked or was aborted.
    #[error("chunk task failed: {reason}")]
    TaskFailed { reason: String },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

impl ScheduleError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the run stopped because of an interrupt.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// What happened to one chunk during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// A completed artifact already existed.
    Skipped,
    /// Harvested in this run.
    Harvested { pages: u64, items: u64 },
}

/// Outcome of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub chunk: HarvestChunk,
    pub path: PathBuf,
    pub status: ChunkStatus,
}

/// Result of a scheduler run, chunks in ascending date order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub chunks: Vec<ChunkOutcome>,
}

impl ScheduleReport {
    /// Artifact paths in ascending date order, ready for normalization.
    #[must_use]
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        self.chunks.iter().map(|c| c.path.clone()).collect()
    }

    /// Chunks harvested in this run.
    #[must_use]
    pub fn harvested(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c.status, ChunkStatus::Harvested { .. }))
            .count()
    }

    /// Chunks skipped because they were already complete.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Skipped)
            .count()
    }

    /// Items written in this run.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.chunks
            .iter()
            .map(|c| match c.status {
                ChunkStatus::Harvested { items, .. } => items,
                ChunkStatus::Skipped => 0,
            })
            .sum()
    }
}

/// Page and item counts of one written artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    pub path: PathBuf,
    pub pages: u64,
    pub items: u64,
}

/// Drives the [`Fetcher`] over the chunks of a date range.
#[derive(Debug, Clone)]
pub struct ChunkScheduler {
    fetcher: Fetcher,
    store: ChunkStore,
    template: RequestTemplate,
    concurrency: usize,
    interrupted: Arc<AtomicBool>,
}

impl ChunkScheduler {
    /// Creates a scheduler. `concurrency` is clamped to
    /// [`MIN_CONCURRENCY`]`..=`[`MAX_CONCURRENCY`].
    ///
    /// `template` supplies endpoint, page size and fixed parameters; each
    /// chunk adds its own date filter.
    #[must_use]
    pub fn new(
        fetcher: Fetcher,
        store: ChunkStore,
        template: RequestTemplate,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            store,
            template,
            concurrency: concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an interrupt flag; once set, running chunks stop before their
    /// next page and the run fails with [`ScheduleError::Cancelled`].
    #[must_use]
    pub fn with_interrupt_flag(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Harvests every chunk of `[begin, end)` that has no completed artifact.
    ///
    /// The first chunk failure aborts the chunks still running and fails the
    /// run. Artifacts completed before that stay on disk and are skipped by
    /// the next run.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::InvalidRange`] when `begin >= end`
    /// - [`ScheduleError::Harvest`] when a chunk's harvest fails
    /// - [`ScheduleError::Cancelled`] when the interrupt flag is set
    /// - [`ScheduleError::Io`] when an artifact cannot be written
    #[instrument(skip(self, granularity, kind), fields(%granularity, %kind))]
    pub async fn run(
        &self,
        begin: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
        kind: &FilterKind,
    ) -> Result<ScheduleReport, ScheduleError> {
        let chunks: Vec<HarvestChunk> = split_range(begin, end, granularity)?
            .into_iter()
            .map(|range| HarvestChunk::new(range, kind.clone()))
            .collect();
        info!(chunks = chunks.len(), concurrency = self.concurrency, "starting harvest");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut outcomes: Vec<Option<ChunkOutcome>> = vec![None; chunks.len()];
        let mut tasks = JoinSet::new();

        for (index, chunk) in chunks.into_iter().enumerate() {
            if self.store.is_complete(&chunk) {
                debug!(%chunk, "artifact complete, skipping");
                outcomes[index] = Some(ChunkOutcome {
                    path: self.store.path_for(&chunk),
                    chunk,
                    status: ChunkStatus::Skipped,
                });
                continue;
            }

            let semaphore = Arc::clone(&semaphore);
            let fetcher = self.fetcher.clone();
            let store = self.store.clone();
            let template = self.template.clone();
            let interrupted = Arc::clone(&self.interrupted);

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        harvest_chunk(&fetcher, &store, template, chunk, &interrupted).await
                    }
                    Err(_) => Err(ScheduleError::SemaphoreClosed),
                };
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tasks.abort_all();
                    return Err(ScheduleError::TaskFailed {
                        reason: e.to_string(),
                    });
                }
            };
            match result {
                Ok(outcome) => outcomes[index] = Some(outcome),
                Err(error) => {
                    warn!(error = %error, "chunk failed, aborting remaining chunks");
                    tasks.abort_all();
                    return Err(error);
                }
            }
        }

        let report = ScheduleReport {
            chunks: outcomes.into_iter().flatten().collect(),
        };
        info!(
            harvested = report.harvested(),
            skipped = report.skipped(),
            items = report.total_items(),
            "harvest complete"
        );
        Ok(report)
    }
}

/// Harvests one chunk into its artifact.
async fn harvest_chunk(
    fetcher: &Fetcher,
    store: &ChunkStore,
    template: RequestTemplate,
    chunk: HarvestChunk,
    interrupted: &AtomicBool,
) -> Result<ChunkOutcome, ScheduleError> {
    let label = chunk.to_string();
    let out = store.begin(&chunk)?;
    let cursor = fetcher.pages(template.with_filter(chunk.filter_expr()));

    let (pages, items) = write_pages(cursor, out.path().to_path_buf(), out, &label, interrupted)
        .await
        .map(|summary| (summary.pages, summary.items))?;
    info!(chunk = %label, pages, items, "chunk complete");

    Ok(ChunkOutcome {
        path: store.path_for(&chunk),
        chunk,
        status: ChunkStatus::Harvested { pages, items },
    })
}

/// Harvests a resource without date filter (e.g. `members`, `funders`) into `path`.
///
/// Uses the same page validation and cache as chunked harvests. The file at
/// `path` only appears once the last page has been written.
///
/// # Errors
///
/// [`ScheduleError::Harvest`] when a page fails, [`ScheduleError::Io`] when
/// the output cannot be written, [`ScheduleError::Cancelled`] on interrupt.
#[instrument(skip(fetcher, template, path, interrupted), fields(path = %path.display()))]
pub async fn harvest_to_file(
    fetcher: &Fetcher,
    template: RequestTemplate,
    path: &Path,
    interrupted: &AtomicBool,
) -> Result<HarvestSummary, ScheduleError> {
    let out = OutputFile::create(path).map_err(|e| ScheduleError::io(path, e))?;
    let label = template.endpoint().to_string();
    let cursor = fetcher.pages(template);
    let summary = write_pages(cursor, path.to_path_buf(), out, &label, interrupted).await?;
    info!(pages = summary.pages, items = summary.items, "resource harvested");
    Ok(summary)
}

/// Writes every page of `cursor` as one compact envelope per line, then
/// commits `out`.
async fn write_pages(
    mut cursor: PageCursor,
    path: PathBuf,
    mut out: OutputFile,
    label: &str,
    interrupted: &AtomicBool,
) -> Result<HarvestSummary, ScheduleError> {
    let mut items = 0u64;
    loop {
        if interrupted.load(Ordering::SeqCst) {
            return Err(ScheduleError::Cancelled {
                chunk: label.to_string(),
            });
        }
        let page = cursor
            .next_page()
            .await
            .map_err(|source| ScheduleError::Harvest {
                chunk: label.to_string(),
                source,
            })?;
        let Some(page) = page else { break };

        let line = page
            .envelope
            .to_line()
            .map_err(|source| ScheduleError::Encode {
                chunk: label.to_string(),
                source,
            })?;
        out.write_line(line.as_bytes())
            .map_err(|e| ScheduleError::io(&path, e))?;
        items += page.items().len() as u64;
    }

    out.finish().map_err(|e| ScheduleError::io(&path, e))?;
    Ok(HarvestSummary {
        path,
        pages: cursor.pages_fetched(),
        items,
    })
}
