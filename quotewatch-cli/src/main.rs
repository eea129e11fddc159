//! quotewatch CLI: collection, dashboard and cache management commands.
//!
//! Commands:
//! - `fetch` - run one collection cycle and print the result
//! - `run` - run collection cycles on the configured interval
//! - `serve` - the scheduler plus the dashboard HTTP server
//! - `cache status` - report cache entries for the configured symbols
//! - `cache clean` - remove cache entries older than N days

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use quotewatch_core::clock::{Clock, SystemClock};
use quotewatch_core::data::QuoteCache;
use quotewatch_core::pipeline::Provenance;
use quotewatch_dashboard::{serve, DashboardState};
use quotewatch_runner::export::init_metrics;
use quotewatch_runner::{build_point_source, AppConfig, Collector, CycleReport, Scheduler};

#[derive(Parser)]
#[command(
    name = "quotewatch",
    about = "Stock quote collector with caching, rate limiting and a price dashboard"
)]
struct Cli {
    /// Config file (TOML, or YAML by .yml/.yaml extension).
    #[arg(long, short, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one collection cycle and print prices and portfolio worth.
    Fetch,
    /// Run collection cycles on the configured interval until interrupted.
    Run,
    /// Run the scheduler and serve the dashboard API.
    Serve {
        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,

        /// Serve only; do not collect.
        #[arg(long, default_value_t = false)]
        no_collect: bool,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report the cached entry for each configured symbol.
    Status,
    /// Remove cache entries created more than N days ago.
    Clean {
        #[arg(long)]
        older_than_days: u32,

        /// Only list what would be removed.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    match cli.command {
        Commands::Fetch => run_fetch(&config),
        Commands::Run => run_scheduled(&config),
        Commands::Serve { port, no_collect } => run_serve(config, port, no_collect),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config),
            CacheAction::Clean {
                older_than_days,
                dry_run,
            } => run_cache_clean(&config, older_than_days, dry_run),
        },
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_collector(config: &AppConfig) -> Result<Collector> {
    if config.export.prometheus.enabled {
        init_metrics()?;
    }
    let api_key = config.api_key_from_env()?;
    let collector = Collector::from_config(config, &api_key, Arc::new(SystemClock))?;
    info!(
        provider = %config.provider.kind,
        symbols = collector.symbols().len(),
        exporters = ?collector.exporter_names(),
        "collector ready"
    );
    Ok(collector)
}

/// Set `cancel` on Ctrl-C. The listener runs on its own small runtime so
/// the blocking commands need no async context.
fn cancel_on_ctrl_c(cancel: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping");
                    cancel.store(true, Ordering::Relaxed);
                }
            });
        })?;
    Ok(())
}

fn run_fetch(config: &AppConfig) -> Result<()> {
    let collector = build_collector(config)?;
    let cancel = Arc::new(AtomicBool::new(false));
    cancel_on_ctrl_c(cancel.clone())?;

    let report = collector.run_cycle(&cancel);
    print_report(&report);

    if report.batch.was_cancelled() {
        bail!("cycle cancelled");
    }
    if report.batch.present().next().is_none() {
        bail!("no quotes could be obtained");
    }
    Ok(())
}

fn run_scheduled(config: &AppConfig) -> Result<()> {
    let collector = build_collector(config)?;
    let cancel = Arc::new(AtomicBool::new(false));
    cancel_on_ctrl_c(cancel.clone())?;

    Scheduler::from_config(&config.scheduler).run(&SystemClock, &cancel, |n| {
        let report = collector.run_cycle(&cancel);
        info!(cycle = n, total_worth = %report.valuation.total_worth, "cycle finished");
    });
    Ok(())
}

fn run_serve(config: AppConfig, port: Option<u16>, no_collect: bool) -> Result<()> {
    let mut config = config;
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = config.server.addr();
    let cancel = Arc::new(AtomicBool::new(false));

    let scheduler_thread = if no_collect {
        None
    } else {
        let collector = build_collector(&config)?;
        let scheduler = Scheduler::from_config(&config.scheduler);
        let cancel = cancel.clone();
        Some(
            thread::Builder::new()
                .name("scheduler".into())
                .spawn(move || {
                    scheduler.run(&SystemClock, &cancel, |n| {
                        let report = collector.run_cycle(&cancel);
                        info!(cycle = n, total_worth = %report.valuation.total_worth, "cycle finished");
                    });
                })?,
        )
    };

    let source = build_point_source(&config.export);
    if source.is_none() {
        warn!("no point source configured; /api/prices will return errors");
    }
    let mut state = DashboardState::new(config.symbols.clone(), source);
    if config.export.prometheus.enabled {
        state = state.with_metrics(init_metrics()?);
    }
    // Kept outside the runtime so the last drop of blocking HTTP clients
    // happens in synchronous code.
    let state = Arc::new(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let shutdown_cancel = cancel.clone();
    let served = runtime.block_on(serve(state.clone(), &addr, async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down");
        }
        shutdown_cancel.store(true, Ordering::Relaxed);
    }));
    drop(runtime);

    cancel.store(true, Ordering::Relaxed);
    if let Some(handle) = scheduler_thread {
        if handle.join().is_err() {
            error!("scheduler thread panicked");
        }
    }
    drop(state);
    served
}

fn print_report(report: &CycleReport) {
    println!("{:<10} {:>14} {:<20}", "Symbol", "Price", "Source");
    println!("{}", "-".repeat(46));
    for entry in &report.batch.entries {
        let price = entry
            .quote
            .as_ref()
            .map(|q| q.price.to_string())
            .unwrap_or_else(|| "-".into());
        let source = match &entry.provenance {
            Provenance::FromCache => "cache".to_string(),
            Provenance::Fresh => "fetched".to_string(),
            Provenance::Absent(kind) => format!("absent ({kind})"),
            Provenance::Cancelled => "cancelled".to_string(),
        };
        println!("{:<10} {:>14} {:<20}", entry.symbol, price, source);
    }

    let valuation = &report.valuation;
    if valuation.has_positions() {
        println!();
        println!("{:<10} {:>14} {:>14}", "Holding", "Shares", "Worth");
        println!("{}", "-".repeat(40));
        for p in &valuation.positions {
            println!("{:<10} {:>14} {:>14}", p.symbol, p.shares, p.worth);
        }
        println!("Total worth on {}: {}", valuation.date, valuation.total_worth);
    }
    for symbol in &valuation.missing {
        println!("warning: no quote for held symbol {symbol}");
    }
    for (name, err) in &report.export_failures {
        println!("warning: export '{name}' failed: {err}");
    }
}

fn open_cache(config: &AppConfig) -> QuoteCache {
    QuoteCache::new(&config.cache.dir, config.cache.policy())
}

fn run_cache_status(config: &AppConfig) -> Result<()> {
    let cache = open_cache(config);
    if !cache.cache_dir().exists() {
        println!("Cache directory does not exist: {}", cache.cache_dir().display());
        return Ok(());
    }

    let now = SystemClock.now();
    let ttl = cache.policy().ttl();
    let rows = cache.status(&config.symbols);
    let total: u64 = rows.iter().map(|r| r.size_bytes).sum();

    println!("Cache: {}", cache.cache_dir().display());
    println!("Total size: {}", format_size(total));
    println!();
    println!("{:<10} {:<22} {:<8} {:>10}", "Symbol", "Created", "State", "Size");
    println!("{}", "-".repeat(53));
    for row in &rows {
        let (created, state) = match row.created_at {
            Some(at) if now - at < ttl => (at.format("%Y-%m-%d %H:%M UTC").to_string(), "fresh"),
            Some(at) => (at.format("%Y-%m-%d %H:%M UTC").to_string(), "stale"),
            None => ("-".to_string(), "missing"),
        };
        println!(
            "{:<10} {:<22} {:<8} {:>10}",
            row.symbol,
            created,
            state,
            format_size(row.size_bytes)
        );
    }
    Ok(())
}

fn run_cache_clean(config: &AppConfig, older_than_days: u32, dry_run: bool) -> Result<()> {
    let cache = open_cache(config);
    if !cache.cache_dir().exists() {
        println!("Cache directory does not exist: {}", cache.cache_dir().display());
        return Ok(());
    }

    let cutoff = SystemClock.now() - chrono::Duration::days(i64::from(older_than_days));
    let removed = cache.clean(cutoff, dry_run)?;

    if removed.is_empty() {
        println!("No entries older than {older_than_days} days.");
        return Ok(());
    }
    let verb = if dry_run { "Would remove" } else { "Removed" };
    for path in &removed {
        println!("  {}", display_relative(path, cache.cache_dir()));
    }
    println!("{verb} {} entries.", removed.len());
    Ok(())
}

fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
