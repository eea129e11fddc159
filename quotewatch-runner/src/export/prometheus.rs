//! Prometheus gauges for prices and portfolio worth.
//!
//! Gauges are recorded through the `metrics` facade; `init_metrics` installs
//! the process-wide Prometheus recorder whose handle renders `/metrics`.

use std::sync::OnceLock;

use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::{ExportError, Exporter, Snapshot};

pub const LATEST_PRICE: &str = "stock_latest_price";
pub const SYMBOL_WORTH: &str = "stock_total_worth";
pub const PORTFOLIO_WORTH: &str = "portfolio_total_worth";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the same handle.
pub fn init_metrics() -> Result<PrometheusHandle, ExportError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ExportError::Metrics(e.to_string()))?;
    describe_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Handle for rendering, if `init_metrics` has run.
pub fn metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn describe_metrics() {
    describe_gauge!(LATEST_PRICE, "Latest fetched price per symbol");
    describe_gauge!(SYMBOL_WORTH, "Worth of held shares per symbol");
    describe_gauge!(PORTFOLIO_WORTH, "Total worth of all priced holdings");
}

fn as_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(f64::NAN)
}

/// Sets gauges on whatever recorder is installed.
pub struct PrometheusGauges;

impl Exporter for PrometheusGauges {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn export(&self, snapshot: &Snapshot<'_>) -> Result<(), ExportError> {
        for quote in snapshot.batch.present() {
            gauge!(LATEST_PRICE, "symbol" => quote.symbol.to_string()).set(as_f64(quote.price));
        }
        for position in &snapshot.valuation.positions {
            gauge!(SYMBOL_WORTH, "symbol" => position.symbol.to_string())
                .set(as_f64(position.worth));
        }
        if snapshot.valuation.has_positions() {
            gauge!(PORTFOLIO_WORTH).set(as_f64(snapshot.valuation.total_worth));
        }
        Ok(())
    }
}
