//! quotewatch core: domain types, providers, cache and the fetch pipeline.
//!
//! This crate contains the fetch-cache-retry pipeline:
//! - Domain types (validated symbols, quote records)
//! - Injectable clock so TTLs and backoff are testable without waiting
//! - Blocking HTTP seam with a reqwest implementation
//! - Alpha Vantage and Finnhub quote APIs
//! - Process-wide rate limiter and retrying fetch client
//! - On-disk response cache with symbol or daily buckets
//! - Per-symbol orchestrator and the batch runner

pub mod clock;
pub mod data;
pub mod domain;
pub mod pipeline;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{QuoteRecord, Symbol, SymbolError};
