//! quotewatch runner: configuration, valuation, exporters and scheduling.
//!
//! This crate builds on `quotewatch-core` to provide:
//! - TOML/YAML configuration with env-var credential overrides
//! - Portfolio valuation from configured holdings
//! - Exporters (JSONL point store, InfluxDB, CSV summary, Prometheus gauges)
//! - Dashboard time ranges and the point-source read side
//! - The collection cycle and its interval scheduler

pub mod config;
pub mod export;
pub mod job;
pub mod portfolio;
pub mod range;
pub mod scheduler;

pub use config::{AppConfig, ConfigError};
pub use export::{
    build_exporters, build_point_source, ExportError, Exporter, PointSource, PricePoint, Snapshot,
    SourceError,
};
pub use job::{build_orchestrator, Collector, CycleReport};
pub use portfolio::{Holdings, PortfolioValuation, Position};
pub use range::TimeRange;
pub use scheduler::Scheduler;
