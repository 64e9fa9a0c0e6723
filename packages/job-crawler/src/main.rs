//! Job crawler CLI
//!
//! Crawls the configured boards, writes JSON and CSV output and prints a
//! per-board summary. Ctrl-C stops the run and still writes what was gathered.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use job_crawler::config::{parse_sources, split_list};
use job_crawler::{
    AppConfig, BoardDefinition, CachePolicy, CacheStore, CsvFileSink, FileCache, HttpBoard,
    JobSource, JsonFileSink, Orchestrator, OutputSink, RunReport, SourceAdapter, SourceStatus,
};

#[derive(Parser)]
#[command(name = "job-crawler")]
#[command(about = "Crawl Kenyan job boards into a deduplicated daily listing")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the boards and write today's output
    Run {
        /// Comma-separated search keywords
        #[arg(long)]
        keywords: Option<String>,

        /// Comma-separated board ids (see `sources`)
        #[arg(long)]
        sources: Option<String>,

        /// Only keep postings from the last N days
        #[arg(long)]
        window_days: Option<i64>,

        /// Directory for JSON and CSV output
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Directory for the daily result cache
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Ignore today's cached results but still cache the fresh ones
        #[arg(long, conflicts_with = "no_cache")]
        refresh: bool,

        /// Neither read nor write the cache
        #[arg(long)]
        no_cache: bool,

        /// Give up on the whole run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Pages per keyword before stopping regardless of dates
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Delete cache entries from previous days
    Purge {
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// List the supported boards
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,job_crawler=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let app = AppConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        None => run(app, RunArgs::default()).await,
        Some(Commands::Run {
            keywords,
            sources,
            window_days,
            output_dir,
            cache_dir,
            refresh,
            no_cache,
            timeout_secs,
            max_pages,
        }) => {
            let args = RunArgs {
                keywords,
                sources,
                window_days,
                output_dir,
                cache_dir,
                refresh,
                no_cache,
                timeout_secs,
                max_pages,
            };
            run(app, args).await
        }
        Some(Commands::Purge { cache_dir }) => {
            let dir = cache_dir.unwrap_or(app.cache_dir);
            let cache = FileCache::open(&dir)
                .await
                .with_context(|| format!("Failed to open cache at {}", dir.display()))?;
            let removed = cache
                .purge_before(Local::now().date_naive())
                .await
                .context("Failed to purge cache")?;
            println!("Removed {removed} stale cache entries from {}", dir.display());
            Ok(())
        }
        Some(Commands::Sources) => {
            for source in JobSource::ALL {
                let definition = BoardDefinition::for_source(source)
                    .with_context(|| format!("Invalid layout for {}", source.display_name()))?;
                println!(
                    "{:<18} {:<20} {}",
                    source.id(),
                    source.display_name(),
                    definition.search_url_template
                );
            }
            Ok(())
        }
    }
}

#[derive(Default)]
struct RunArgs {
    keywords: Option<String>,
    sources: Option<String>,
    window_days: Option<i64>,
    output_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    refresh: bool,
    no_cache: bool,
    timeout_secs: Option<u64>,
    max_pages: Option<u32>,
}

async fn run(mut app: AppConfig, args: RunArgs) -> Result<()> {
    // Flags override the environment.
    if let Some(keywords) = args.keywords {
        app.keywords = Some(split_list(&keywords));
    }
    if let Some(sources) = args.sources {
        app.sources = Some(parse_sources(&sources).context("Invalid --sources")?);
    }
    if let Some(days) = args.window_days {
        app.window_days = days;
    }
    if let Some(dir) = args.output_dir {
        app.output_dir = dir;
    }
    if let Some(dir) = args.cache_dir {
        app.cache_dir = dir;
    }
    if let Some(secs) = args.timeout_secs {
        app.run_timeout = Some(Duration::from_secs(secs));
    }

    let mut config = app.crawl_config();
    if args.refresh {
        config = config.with_cache_policy(CachePolicy::Refresh);
    }
    if args.no_cache {
        config = config.with_cache_policy(CachePolicy::Disabled);
    }
    if let Some(max_pages) = args.max_pages {
        config = config.with_max_pages(max_pages);
    }
    config.validate().context("Invalid crawl configuration")?;

    let mut orchestrator = Orchestrator::new();
    for source in &config.sources {
        let board = HttpBoard::for_source(*source)
            .with_context(|| format!("Failed to set up {}", source.display_name()))?
            .with_requests_per_second(app.requests_per_second);
        orchestrator = orchestrator.with_adapter(Arc::new(board) as Arc<dyn SourceAdapter>);
    }

    let cache = FileCache::open(&app.cache_dir)
        .await
        .with_context(|| format!("Failed to open cache at {}", app.cache_dir.display()))?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing with what has been gathered");
            ctrl_c.cancel();
        }
    });

    let output = orchestrator
        .run(&config, &cache, cancel)
        .await
        .context("Crawl run rejected")?;

    let json = JsonFileSink::new(&app.output_dir);
    let records = match json.merge_today(&output.records, &output.report).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(
                path = %json.records_path(&output.report).display(),
                error = %e,
                "Could not read today's earlier output, writing this run only"
            );
            output.records.clone()
        }
    };

    let sinks: Vec<Box<dyn OutputSink>> = vec![
        Box::new(json),
        Box::new(CsvFileSink::new(&app.output_dir)),
    ];
    let mut written = Vec::new();
    for sink in &sinks {
        let paths = sink
            .write(&records, &output.report)
            .await
            .with_context(|| format!("Failed to write {} output", sink.name()))?;
        written.extend(paths);
    }

    print_summary(&output.report, records.len(), &written);
    Ok(())
}

fn print_summary(report: &RunReport, day_total: usize, written: &[PathBuf]) {
    println!();
    println!("Run {} for {}", report.run_id, report.run_date);
    for source in &report.sources {
        let status = match source.status {
            SourceStatus::Success => "success",
            SourceStatus::Partial => "partial",
            SourceStatus::Failed => "failed",
        };
        let origin = if source.cache_hit { " (cached)" } else { "" };
        let error = source
            .last_error_kind
            .map(|kind| format!(", last error: {kind}"))
            .unwrap_or_default();
        println!(
            "  {:<20} {:<8} {:>4} jobs{origin}{error}",
            source.source.display_name(),
            status,
            source.record_count
        );
    }
    println!(
        "Total: {} unique jobs ({} duplicates merged){}",
        report.total_records,
        report.duplicates_merged,
        if report.cancelled { ", run cancelled" } else { "" }
    );
    if day_total != report.total_records {
        println!("Today's output now holds {day_total} jobs across runs");
    }
    for path in written {
        println!("  wrote {}", path.display());
    }
}
