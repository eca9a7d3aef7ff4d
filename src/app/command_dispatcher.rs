//! Subcommand handlers: resolve CLI flags over file config, build the
//! library components and run them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use harvester_core::fetch::{DEFAULT_ENDPOINT, DEFAULT_ROWS, RetryPolicy};
use harvester_core::ldj::OutputFile;
use harvester_core::normalize::chunk_files;
use harvester_core::schedule::{DEFAULT_CONCURRENCY, harvest_to_file};
use harvester_core::{
    Cache, ChunkScheduler, ChunkStore, Fetcher, FilterKind, FsStore, Granularity, HttpTransport,
    KeyField, MergeEngine, Population, Provenance, RequestTemplate, StreamNormalizer,
    TransportSettings,
};
use tracing::{debug, info};

use crate::ProcessExit;
use crate::app::{exit_handler, runtime};
use crate::app_config::FileConfig;
use crate::cli::{
    ApiArgs, Command, HarvestArgs, HarvestGenericArgs, IndicatorsArgs, MergeArgs, NormalizeArgs,
    PopulationArgs,
};

/// Runs `command` to completion.
///
/// Only the harvest subcommands trap Ctrl-C; the file-only ones are stopped
/// by the default signal disposition.
pub(crate) async fn dispatch(command: &Command, config: &FileConfig) -> Result<ProcessExit> {
    match command {
        Command::Harvest(args) => run_harvest(args, config).await,
        Command::HarvestGeneric(args) => run_harvest_generic(args, config).await,
        Command::Normalize(args) => run_normalize(args, config).await,
        Command::Merge(args) => run_merge(args, config).await,
        Command::Indicators(args) => run_indicators(args, config).await,
    }
}

async fn run_harvest(args: &HarvestArgs, config: &FileConfig) -> Result<ProcessExit> {
    let granularity = match (args.granularity, config.harvest.granularity.as_deref()) {
        (Some(granularity), _) => granularity,
        (None, Some(value)) => value.parse::<Granularity>()?,
        (None, None) => Granularity::default(),
    };
    let kind = match (&args.filter, config.harvest.filter.as_deref()) {
        (Some(kind), _) => kind.clone(),
        (None, Some(value)) => FilterKind::new(value)?,
        (None, None) => FilterKind::default(),
    };
    let concurrency = args
        .concurrency
        .or(config.harvest.concurrency)
        .map_or(DEFAULT_CONCURRENCY, usize::from);
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| config.harvest.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let fetcher = build_fetcher(&args.api, config)?;
    let template = build_template(&args.api, config, "works")?;
    let scheduler = ChunkScheduler::new(
        fetcher.clone(),
        ChunkStore::new(&output_dir),
        template,
        concurrency,
    )
    .with_interrupt_flag(runtime::watch_interrupt());

    let report = match scheduler
        .run(args.begin, args.end, granularity, &kind)
        .await
    {
        Ok(report) => report,
        Err(error) => return exit_handler::harvest_failure(error),
    };

    let stats = fetcher.cache().stats();
    info!(
        harvested = report.harvested(),
        skipped = report.skipped(),
        items = report.total_items(),
        fetches = stats.fetches(),
        cache_hits = stats.hits(),
        "harvest complete"
    );
    for path in report.artifact_paths() {
        println!("{}", path.display());
    }
    Ok(ProcessExit::Success)
}

async fn run_harvest_generic(
    args: &HarvestGenericArgs,
    config: &FileConfig,
) -> Result<ProcessExit> {
    let kind = args.kind.trim_matches('/');
    if kind.is_empty() || kind.contains(['?', '#']) {
        bail!("Invalid resource kind: {:?}", args.kind);
    }

    let fetcher = build_fetcher(&args.api, config)?;
    let template = build_template(&args.api, config, kind)?;
    let interrupted = runtime::watch_interrupt();
    match harvest_to_file(&fetcher, template, &args.output, &interrupted).await {
        Ok(summary) => {
            info!(
                pages = summary.pages,
                items = summary.items,
                path = %summary.path.display(),
                "resource harvested"
            );
            println!("{}", summary.path.display());
            Ok(ProcessExit::Success)
        }
        Err(error) => exit_handler::harvest_failure(error),
    }
}

async fn run_normalize(args: &NormalizeArgs, config: &FileConfig) -> Result<ProcessExit> {
    let paths = match &args.chunk_dir {
        Some(dir) => chunk_files(dir)?,
        None => args.chunks.clone(),
    };
    if paths.is_empty() {
        bail!("No chunk artifacts to normalize");
    }
    let key_field = resolve_key_field(args.key_field.as_ref(), config);
    let output = args.output.clone();

    let stats = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut normalizer = StreamNormalizer::new(key_field);
        let mut out = create_output(&output)?;
        let stats = normalizer.normalize_files(&paths, &mut out)?;
        commit_output(out)?;
        Ok(stats)
    })
    .await
    .context("normalize task failed")??;

    info!(
        envelopes = stats.envelopes,
        emitted = stats.emitted,
        duplicates = stats.duplicates,
        path = %args.output.display(),
        "records written"
    );
    Ok(ProcessExit::Success)
}

async fn run_merge(args: &MergeArgs, config: &FileConfig) -> Result<ProcessExit> {
    let (engine, dump, update) = populations(&args.populations, config);
    let output = args.output.clone();

    let stats = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut out = create_output(&output)?;
        let stats = engine.merge(&dump, &update, &mut out)?;
        commit_output(out)?;
        Ok(stats)
    })
    .await
    .context("merge task failed")??;

    info!(
        written = stats.written(),
        dump_rows = stats.dump_rows,
        update_rows = stats.update_rows,
        path = %args.output.display(),
        "merged population written"
    );
    Ok(ProcessExit::Success)
}

async fn run_indicators(args: &IndicatorsArgs, config: &FileConfig) -> Result<ProcessExit> {
    let (engine, dump, update) = populations(&args.populations, config);
    let output = args.output.clone();

    let rows = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut out = create_output(&output)?;
        let rows = engine.indicators(&dump, &update, &mut out)?;
        commit_output(out)?;
        Ok(rows)
    })
    .await
    .context("indicators task failed")??;

    info!(rows, path = %args.output.display(), "indicators written");
    Ok(ProcessExit::Success)
}

fn build_fetcher(api: &ApiArgs, config: &FileConfig) -> Result<Fetcher> {
    let defaults = TransportSettings::default();
    let settings = TransportSettings {
        connect_timeout: config
            .api
            .connect_timeout_secs
            .map_or(defaults.connect_timeout, Duration::from_secs),
        read_timeout: config
            .api
            .read_timeout_secs
            .map_or(defaults.read_timeout, Duration::from_secs),
        mailto: config.api.mailto.clone(),
        retry_policy: config
            .api
            .max_connect_attempts
            .map_or(defaults.retry_policy, RetryPolicy::with_max_attempts),
        host_spacing: config
            .api
            .host_spacing_ms
            .map_or(defaults.host_spacing, Duration::from_millis),
    };
    let transport = HttpTransport::with_settings(settings).context("Failed to build HTTP client")?;

    let store = match api.cache_dir.as_ref().or(config.cache.dir.as_ref()) {
        Some(dir) => FsStore::new(dir),
        None => FsStore::default_location(),
    };
    debug!(cache_dir = %store.root().display(), "response cache ready");

    Ok(Fetcher::new(Cache::new(Arc::new(store), Arc::new(transport))))
}

/// Template for `<endpoint>/<resource>` with the configured page size and
/// polite-pool contact.
fn build_template(api: &ApiArgs, config: &FileConfig, resource: &str) -> Result<RequestTemplate> {
    let base = api
        .endpoint
        .as_deref()
        .or(config.api.endpoint.as_deref())
        .unwrap_or(DEFAULT_ENDPOINT);
    let url = format!("{}/{resource}", base.trim_end_matches('/'));
    let rows = api.rows.or(config.api.rows).unwrap_or(DEFAULT_ROWS);

    let mut template = RequestTemplate::new(&url, rows)?;
    if let Some(mailto) = &config.api.mailto {
        template = template.with_param("mailto", mailto);
    }
    Ok(template)
}

fn resolve_key_field(flag: Option<&KeyField>, config: &FileConfig) -> KeyField {
    match (flag, config.records.key_field.as_deref()) {
        (Some(key_field), _) => key_field.clone(),
        (None, Some(spec)) => KeyField::new(spec),
        (None, None) => KeyField::default(),
    }
}

fn populations(args: &PopulationArgs, config: &FileConfig) -> (MergeEngine, Population, Population) {
    let engine = MergeEngine::new(resolve_key_field(args.key_field.as_ref(), config));
    (
        engine,
        Population::file(Provenance::Dump, &args.dump),
        Population::file(Provenance::Update, &args.update),
    )
}

fn create_output(path: &Path) -> Result<OutputFile> {
    OutputFile::create(path)
        .with_context(|| format!("Failed to create output file '{}'", path.display()))
}

fn commit_output(out: OutputFile) -> Result<PathBuf> {
    let path = out.path().to_path_buf();
    out.finish()
        .with_context(|| format!("Failed to write output file '{}'", path.display()))
}
