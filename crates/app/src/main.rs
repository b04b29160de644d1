use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use voxlid_cache::{DiskFeatureCache, FeatureCache};
use voxlid_dataset::{warm_cache, BatchPipeline, DataGroup, Dataset, FeatureExtractor};
use voxlid_foundation::config::PipelineConfig;

mod manifest;

#[derive(Parser)]
#[command(name = "voxlid", about = "Speech feature extraction and caching pipeline")]
struct Cli {
    /// TOML configuration file; defaults apply for anything omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract features for every recording in a manifest into the
    /// cache, in parallel.
    Extract {
        /// Tab-separated `wav-path<TAB>label` lines.
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long, default_value = "train")]
        group: String,
    },
    /// Stream shuffled batches from the cache (extracting on misses)
    /// and report their shape.
    Stream {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long, default_value = "train")]
        group: String,
        /// Stop after this many batches.
        #[arg(long)]
        max_batches: Option<usize>,
    },
    /// Drop every cached feature entry.
    Purge,
}

fn init_logging() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_level).init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    let cfg = match path {
        Some(p) => PipelineConfig::from_file(p)
            .with_context(|| format!("loading configuration from {}", p.display()))?,
        None => PipelineConfig::default(),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;
    let cache = DiskFeatureCache::open(&cfg.cache.root)?;

    match cli.command {
        Command::Extract { manifest, group } => {
            let entries = manifest::read(&manifest)?;
            let group = DataGroup::new(group, entries);
            tracing::info!(group = %group.name, recordings = group.len(), "starting extraction");

            let extractor = FeatureExtractor::new(cfg.clone());
            let summary = warm_cache(&extractor, &cache, &group, cfg.batch.workers)?;
            let stats = cache.stats();
            tracing::info!(
                recordings = summary.recordings,
                skipped = summary.skipped,
                chunks = summary.chunks,
                cache_hits = stats.hits,
                cache_misses = stats.misses,
                "extraction complete"
            );
        }
        Command::Stream {
            manifest,
            group,
            max_batches,
        } => {
            let entries = manifest::read(&manifest)?;
            let dataset = Dataset::new(vec![DataGroup::new(group.clone(), entries)]);
            let group = dataset.group(&group).expect("group was just inserted");

            let extractor = FeatureExtractor::new(cfg.clone());
            let pipeline = BatchPipeline::new(&extractor, &cache, dataset.label_fn());

            let mut batches = 0usize;
            for batch in pipeline.stream(group) {
                let batch = batch?;
                let (b, frames, bins) = batch.shape();
                tracing::debug!(batch = batches, b, frames, bins, "batch ready");
                batches += 1;
                if max_batches.is_some_and(|limit| batches >= limit) {
                    break;
                }
            }
            let stats = cache.stats();
            tracing::info!(
                batches,
                cache_hits = stats.hits,
                cache_misses = stats.misses,
                "stream finished"
            );
            if batches == 0 {
                bail!("no complete batches produced; check the manifest and batch size");
            }
        }
        Command::Purge => {
            cache.purge_all()?;
            tracing::info!(root = %cfg.cache.root.display(), "cache purged");
        }
    }
    Ok(())
}
