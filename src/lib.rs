//! Harvester Core Library
//!
//! Incremental harvesting of bibliographic metadata from paginated APIs,
//! and freshness-correct merging of baseline dumps with incremental updates.
//!
//! # Architecture
//!
//! Leaves first:
//! - [`cache`] - durable read-through response cache with corruption recovery
//! - [`fetch`] - HTTP transport and the paginated, validating [`Fetcher`]
//! - [`schedule`] - resumable date-range harvests split into calendar chunks
//! - [`normalize`] - chunk envelopes to one deduplicated record stream
//! - [`merge`] - per-identifier freshness resolution between two populations
//!
//! Supporting modules: [`envelope`] (upstream page shape), [`key`]
//! (identifier extraction) and [`ldj`] (line-delimited JSON files).

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod envelope;
pub mod fetch;
pub mod key;
pub mod ldj;
pub mod merge;
pub mod normalize;
pub mod schedule;
mod user_agent;

// Re-export commonly used types
pub use cache::{Cache, CacheError, CacheStore, FsStore, MemoryStore};
pub use fetch::{
    FetchError, Fetcher, HarvestError, HttpTransport, RequestTemplate, Transport,
    TransportSettings,
};
pub use key::KeyField;
pub use merge::{MergeEngine, MergeError, MergeStats, Population, Provenance};
pub use normalize::{NormalizeError, NormalizeStats, StreamNormalizer};
pub use schedule::{ChunkScheduler, ChunkStore, FilterKind, Granularity, ScheduleError, ScheduleReport};
