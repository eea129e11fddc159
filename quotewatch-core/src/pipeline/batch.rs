//! One batch cycle over the configured symbols.
//!
//! Duplicates are collapsed (first occurrence wins). The cancel flag is polled
//! before each symbol; symbols not yet started when it flips are recorded as
//! `Cancelled`. A symbol's failure never stops the batch.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::orchestrator::{SymbolOrchestrator, SymbolOutcome};
use crate::data::provider::FetchErrorKind;
use crate::domain::{QuoteRecord, Symbol};

/// Where a batch entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "kind", rename_all = "snake_case")]
pub enum Provenance {
    FromCache,
    Fresh,
    Absent(FetchErrorKind),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub symbol: Symbol,
    pub quote: Option<QuoteRecord>,
    pub provenance: Provenance,
}

impl BatchEntry {
    fn from_outcome(symbol: Symbol, outcome: SymbolOutcome) -> Self {
        let provenance = match &outcome {
            SymbolOutcome::FromCache(_) => Provenance::FromCache,
            SymbolOutcome::Fresh(_) => Provenance::Fresh,
            SymbolOutcome::Absent(kind) => Provenance::Absent(*kind),
        };
        Self {
            symbol,
            quote: outcome.into_record(),
            provenance,
        }
    }

    fn cancelled(symbol: Symbol) -> Self {
        Self {
            symbol,
            quote: None,
            provenance: Provenance::Cancelled,
        }
    }
}

/// Result of one batch, in configured symbol order.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<BatchEntry>,
}

/// Per-provenance tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub from_cache: usize,
    pub fresh: usize,
    pub absent: usize,
    pub cancelled: usize,
}

impl BatchResult {
    pub fn get(&self, symbol: &Symbol) -> Option<&BatchEntry> {
        self.entries.iter().find(|e| &e.symbol == symbol)
    }

    /// `symbol -> quote`, with `None` for symbols that produced nothing.
    pub fn quotes(&self) -> BTreeMap<Symbol, Option<QuoteRecord>> {
        self.entries
            .iter()
            .map(|e| (e.symbol.clone(), e.quote.clone()))
            .collect()
    }

    /// Only the symbols that have a quote.
    pub fn present(&self) -> impl Iterator<Item = &QuoteRecord> {
        self.entries.iter().filter_map(|e| e.quote.as_ref())
    }

    pub fn counts(&self) -> BatchCounts {
        let mut counts = BatchCounts::default();
        for e in &self.entries {
            match e.provenance {
                Provenance::FromCache => counts.from_cache += 1,
                Provenance::Fresh => counts.fresh += 1,
                Provenance::Absent(_) => counts.absent += 1,
                Provenance::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn was_cancelled(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.provenance == Provenance::Cancelled)
    }
}

/// Drop repeated symbols, keeping first-occurrence order.
pub fn dedupe_symbols(symbols: &[Symbol]) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .filter(|s| seen.insert((*s).clone()))
        .cloned()
        .collect()
}

pub struct BatchRunner {
    orchestrator: Arc<SymbolOrchestrator>,
    thread_pool: Option<rayon::ThreadPool>,
}

impl BatchRunner {
    /// `concurrency > 1` runs symbols on a private rayon pool of that size.
    pub fn new(orchestrator: Arc<SymbolOrchestrator>, concurrency: usize) -> Self {
        let thread_pool = if concurrency > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(concurrency)
                .thread_name(|i| format!("quotewatch-batch-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(error = %e, "failed to build batch thread pool, running sequentially");
                    None
                }
            }
        } else {
            None
        };
        Self {
            orchestrator,
            thread_pool,
        }
    }

    pub fn orchestrator(&self) -> &SymbolOrchestrator {
        &self.orchestrator
    }

    pub fn run(&self, symbols: &[Symbol], cancel: &AtomicBool) -> BatchResult {
        let started_at = self.orchestrator.clock().now();
        let symbols = dedupe_symbols(symbols);

        let resolve_one = |symbol: &Symbol| -> BatchEntry {
            if cancel.load(Ordering::Relaxed) {
                return BatchEntry::cancelled(symbol.clone());
            }
            let outcome = self.orchestrator.resolve(symbol);
            BatchEntry::from_outcome(symbol.clone(), outcome)
        };

        let entries: Vec<BatchEntry> = match self.thread_pool {
            Some(ref tp) => tp.install(|| symbols.par_iter().map(resolve_one).collect()),
            None => symbols.iter().map(resolve_one).collect(),
        };

        let result = BatchResult {
            started_at,
            finished_at: self.orchestrator.clock().now(),
            entries,
        };

        let counts = result.counts();
        info!(
            symbols = result.entries.len(),
            from_cache = counts.from_cache,
            fresh = counts.fresh,
            absent = counts.absent,
            cancelled = counts.cancelled,
            "batch complete"
        );
        result
    }
}
