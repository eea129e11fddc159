//! Per-symbol decision: reuse the cache or hit the network.
//!
//! ```text
//! CheckCache --fresh+parseable--> FromCache
//!     |
//!     +--miss/stale/unparseable--> Fetch --ok--> WriteBack --> Fresh
//!                                        |
//!                                        +--err--> Absent(kind)
//! ```
//!
//! Each call walks the states once. A write-back failure is logged and the
//! freshly fetched record is still returned.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::data::cache::{is_fresh, CacheEntry, QuoteCache};
use crate::data::provider::{FetchErrorKind, QuoteFetcher};
use crate::domain::{QuoteRecord, Symbol};

/// How a symbol was resolved this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolOutcome {
    FromCache(QuoteRecord),
    Fresh(QuoteRecord),
    Absent(FetchErrorKind),
}

impl SymbolOutcome {
    pub fn record(&self) -> Option<&QuoteRecord> {
        match self {
            SymbolOutcome::FromCache(r) | SymbolOutcome::Fresh(r) => Some(r),
            SymbolOutcome::Absent(_) => None,
        }
    }

    pub fn into_record(self) -> Option<QuoteRecord> {
        match self {
            SymbolOutcome::FromCache(r) | SymbolOutcome::Fresh(r) => Some(r),
            SymbolOutcome::Absent(_) => None,
        }
    }
}

pub struct SymbolOrchestrator {
    cache: Arc<QuoteCache>,
    fetcher: Arc<dyn QuoteFetcher>,
    clock: Arc<dyn Clock>,
}

impl SymbolOrchestrator {
    pub fn new(
        cache: Arc<QuoteCache>,
        fetcher: Arc<dyn QuoteFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            clock,
        }
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn resolve(&self, symbol: &Symbol) -> SymbolOutcome {
        if let Some(record) = self.check_cache(symbol) {
            debug!(%symbol, price = %record.price, "cache hit");
            return SymbolOutcome::FromCache(record);
        }

        let raw = match self.fetcher.fetch(symbol) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(%symbol, kind = %e.kind(), error = %e, "no quote this cycle");
                return SymbolOutcome::Absent(e.kind());
            }
        };

        // The client already validated the body; a failure here means the
        // provider and parser disagree, so report it like any invalid body.
        let price = match raw.provider.extract_price(&raw.body) {
            Ok(p) => p,
            Err(e) => {
                warn!(%symbol, kind = %e.kind(), error = %e, "fetched body has no usable price");
                return SymbolOutcome::Absent(e.kind());
            }
        };

        let fetched_at = self.clock.now();
        let entry = CacheEntry::new(symbol.clone(), raw, fetched_at);
        if let Err(e) = self.cache.write(&entry) {
            warn!(%symbol, error = %e, "cache write-back failed");
        }

        info!(%symbol, %price, provider = %entry.provider, "fetched fresh quote");
        SymbolOutcome::Fresh(QuoteRecord {
            symbol: symbol.clone(),
            price,
            observed_at: fetched_at,
        })
    }

    /// A cached record, if the entry is within TTL and its body still parses.
    fn check_cache(&self, symbol: &Symbol) -> Option<QuoteRecord> {
        let entry = self.cache.read(symbol)?;
        let now = self.clock.now();
        if !is_fresh(&entry, self.cache.policy().ttl(), now) {
            debug!(%symbol, created_at = %entry.created_at, "cache entry stale");
            return None;
        }
        match entry.provider.extract_price(&entry.body) {
            Ok(price) => Some(QuoteRecord {
                symbol: symbol.clone(),
                price,
                observed_at: entry.created_at,
            }),
            Err(e) => {
                warn!(%symbol, error = %e, "cached body unusable, refetching");
                None
            }
        }
    }
}
