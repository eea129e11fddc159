//! Sinks for each collection cycle and the read side used by the dashboard.
//!
//! Exporters:
//! - **JSONL**: append-only point store, readable back as a `PointSource`
//! - **InfluxDB**: v2 line protocol over HTTP, queried back with Flux
//! - **CSV**: one `date,daily_total_worth` row per day
//! - **Prometheus**: latest-price and worth gauges through `metrics`
//!
//! Every exporter failure is reported to the caller, which logs it and moves
//! on; a failing sink never aborts the cycle.

pub mod csv_summary;
pub mod influx;
pub mod prometheus;
pub mod store;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use quotewatch_core::pipeline::BatchResult;
use quotewatch_core::Symbol;

use crate::config::ExportConfig;
use crate::portfolio::PortfolioValuation;
use crate::range::TimeRange;

pub use csv_summary::CsvSummary;
pub use influx::InfluxSink;
pub use prometheus::{init_metrics, metrics_handle, PrometheusGauges};
pub use store::JsonlPointStore;

/// Measurement name shared by every point sink.
pub const MEASUREMENT: &str = "stock_price";

/// Everything an exporter may consume from one cycle.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub batch: &'a BatchResult,
    pub valuation: &'a PortfolioValuation,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("incomplete configuration, missing: {0}")]
    Incomplete(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("sink rejected write with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("metrics recorder: {0}")]
    Metrics(String),
}

pub trait Exporter: Send + Sync {
    fn name(&self) -> &str;

    fn export(&self, snapshot: &Snapshot<'_>) -> Result<(), ExportError>;
}

/// One stored price observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: DateTime<Utc>,
    pub price: Decimal,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("query failed: {0}")]
    Query(String),

    #[error("unparseable query result: {0}")]
    Parse(String),
}

/// Read side for the dashboard: price history of one symbol.
pub trait PointSource: Send + Sync {
    /// Points for `symbol` inside `range` as seen from `now`, oldest first.
    fn prices(
        &self,
        symbol: &Symbol,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, SourceError>;
}

/// Build the configured exporters. An InfluxDB section that is missing
/// url/token/org/bucket is skipped with an error log.
pub fn build_exporters(config: &ExportConfig) -> Vec<Box<dyn Exporter>> {
    let mut exporters: Vec<Box<dyn Exporter>> = Vec::new();

    if let Some(jsonl) = &config.jsonl {
        exporters.push(Box::new(JsonlPointStore::new(jsonl.path.clone())));
    }

    if let Some(influx) = &config.influxdb {
        match InfluxSink::from_config(influx) {
            Ok(sink) => exporters.push(Box::new(sink)),
            Err(e) => error!(error = %e, "InfluxDB configuration is incomplete, skipping export"),
        }
    }

    if let Some(csv) = &config.csv {
        exporters.push(Box::new(CsvSummary::new(csv.path.clone(), csv.once_per_day)));
    }

    if config.prometheus.enabled {
        exporters.push(Box::new(PrometheusGauges));
    }

    exporters
}

/// The point source the dashboard should read: InfluxDB when fully
/// configured, otherwise the JSONL store.
pub fn build_point_source(config: &ExportConfig) -> Option<Arc<dyn PointSource>> {
    if let Some(influx) = &config.influxdb {
        if let Ok(sink) = InfluxSink::from_config(influx) {
            return Some(Arc::new(sink));
        }
    }
    config
        .jsonl
        .as_ref()
        .map(|j| Arc::new(JsonlPointStore::new(j.path.clone())) as Arc<dyn PointSource>)
}
