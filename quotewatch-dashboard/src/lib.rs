//! quotewatch dashboard: read-only HTTP API over collected prices.
//!
//! # Endpoints
//!
//! - `GET /api/symbols` - configured symbols as a JSON array
//! - `GET /api/prices?symbol=S&range=R` - `{"times": [...], "prices": [...]}`
//! - `GET /healthz` - liveness probe (plain `OK`)
//! - `GET /metrics` - Prometheus text, when a recorder is installed

mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::info;

use quotewatch_core::clock::{Clock, SystemClock};
use quotewatch_core::Symbol;
use quotewatch_runner::PointSource;

pub use handlers::{ErrorBody, PriceSeries};

/// Shared, read-only state behind every handler.
pub struct DashboardState {
    symbols: Vec<Symbol>,
    source: Option<Arc<dyn PointSource>>,
    metrics: Option<PrometheusHandle>,
    clock: Arc<dyn Clock>,
}

impl DashboardState {
    pub fn new(symbols: Vec<Symbol>, source: Option<Arc<dyn PointSource>>) -> Self {
        Self {
            symbols,
            source,
            metrics: None,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Clock used to anchor range lookbacks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

pub fn router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/api/symbols", get(handlers::symbols))
        .route("/api/prices", get(handlers::prices))
        .route("/healthz", get(handlers::liveness))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    state: Arc<DashboardState>,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "dashboard listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("dashboard stopped");
    Ok(())
}
