//! One collection cycle: batch fetch, portfolio valuation, export.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{error, info, warn};

use quotewatch_core::clock::Clock;
use quotewatch_core::data::{
    AlphaVantageApi, FetchClient, FinnhubApi, HttpTransport, ProviderKind, QuoteApi, QuoteCache,
    RateLimiter, ReqwestTransport,
};
use quotewatch_core::pipeline::{BatchResult, BatchRunner, SymbolOrchestrator};
use quotewatch_core::Symbol;

use crate::config::{AppConfig, ProviderConfig};
use crate::export::{build_exporters, Exporter, Snapshot};
use crate::portfolio::{Holdings, PortfolioValuation};

/// What a cycle produced.
#[derive(Debug)]
pub struct CycleReport {
    pub batch: BatchResult,
    pub valuation: PortfolioValuation,
    /// `(exporter name, error message)` for each failed sink.
    pub export_failures: Vec<(String, String)>,
}

pub fn build_api(provider: &ProviderConfig, api_key: &str) -> Box<dyn QuoteApi> {
    match provider.kind {
        ProviderKind::AlphaVantage => Box::new(AlphaVantageApi::new(provider.base_url(), api_key)),
        ProviderKind::Finnhub => Box::new(FinnhubApi::new(provider.base_url(), api_key)),
    }
}

/// Wire the cache, rate limiter, fetch client and orchestrator from config.
pub fn build_orchestrator(
    config: &AppConfig,
    api_key: &str,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
) -> SymbolOrchestrator {
    let cache = Arc::new(QuoteCache::new(&config.cache.dir, config.cache.policy()));
    let limiter = Arc::new(RateLimiter::per_minute(config.rate_limit.max_calls_per_min));
    let client = FetchClient::new(
        build_api(&config.provider, api_key),
        transport,
        limiter,
        clock.clone(),
        config.provider.retry_policy(),
    );
    SymbolOrchestrator::new(cache, Arc::new(client), clock)
}

pub struct Collector {
    symbols: Vec<Symbol>,
    holdings: Holdings,
    runner: BatchRunner,
    exporters: Vec<Box<dyn Exporter>>,
    clock: Arc<dyn Clock>,
}

impl Collector {
    pub fn new(
        symbols: Vec<Symbol>,
        holdings: Holdings,
        runner: BatchRunner,
        exporters: Vec<Box<dyn Exporter>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            symbols,
            holdings,
            runner,
            exporters,
            clock,
        }
    }

    /// Collector with an explicit transport and exporter list.
    pub fn with_transport(
        config: &AppConfig,
        api_key: &str,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        exporters: Vec<Box<dyn Exporter>>,
    ) -> Self {
        let orchestrator = build_orchestrator(config, api_key, transport, clock.clone());
        let runner = BatchRunner::new(Arc::new(orchestrator), config.batch.concurrency);
        Self::new(
            config.symbols.clone(),
            config.holdings(),
            runner,
            exporters,
            clock,
        )
    }

    /// Production wiring: reqwest transport, exporters from `[export]`.
    pub fn from_config(
        config: &AppConfig,
        api_key: &str,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(config.provider.timeout())?;
        Ok(Self::with_transport(
            config,
            api_key,
            Arc::new(transport),
            clock,
            build_exporters(&config.export),
        ))
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn exporter_names(&self) -> Vec<&str> {
        self.exporters.iter().map(|e| e.name()).collect()
    }

    /// Run one cycle. Never fails: per-symbol and per-exporter errors are
    /// logged and reported.
    pub fn run_cycle(&self, cancel: &AtomicBool) -> CycleReport {
        info!(symbols = self.symbols.len(), "starting collection cycle");
        let batch = self.runner.run(&self.symbols, cancel);

        let taken_at = self.clock.now();
        let valuation = self.holdings.value(&batch, taken_at.date_naive());
        if !valuation.missing.is_empty() {
            let missing: Vec<&str> = valuation.missing.iter().map(|s| s.as_str()).collect();
            warn!(missing = ?missing, "held symbols without a quote are excluded from the total");
        }
        for position in &valuation.positions {
            info!(symbol = %position.symbol, shares = %position.shares, worth = %position.worth, "position valued");
        }
        info!(total_worth = %valuation.total_worth, "portfolio valued");

        let mut export_failures = Vec::new();
        if batch.was_cancelled() {
            warn!("cycle cancelled, skipping export");
        } else {
            let snapshot = Snapshot {
                batch: &batch,
                valuation: &valuation,
                taken_at,
            };
            for exporter in &self.exporters {
                if let Err(e) = exporter.export(&snapshot) {
                    error!(exporter = exporter.name(), error = %e, "export failed");
                    export_failures.push((exporter.name().to_string(), e.to_string()));
                }
            }
        }

        let counts = batch.counts();
        info!(
            from_cache = counts.from_cache,
            fresh = counts.fresh,
            absent = counts.absent,
            failed_exports = export_failures.len(),
            "collection cycle complete"
        );

        CycleReport {
            batch,
            valuation,
            export_failures,
        }
    }
}
