use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use quotewatch_core::Symbol;
use quotewatch_runner::TimeRange;

use super::DashboardState;

const DB_ERROR: &str = "Failed to retrieve data from database";

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Parallel arrays, as the dashboard frontend plots them.
#[derive(Debug, Serialize, Deserialize)]
pub struct PriceSeries {
    pub times: Vec<DateTime<Utc>>,
    pub prices: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct PricesQuery {
    symbol: Option<String>,
    range: Option<String>,
}

pub async fn symbols(State(state): State<Arc<DashboardState>>) -> Json<Vec<Symbol>> {
    Json(state.symbols.clone())
}

pub async fn prices(
    State(state): State<Arc<DashboardState>>,
    Query(query): Query<PricesQuery>,
) -> Response {
    let raw = match query.symbol.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return error_response(StatusCode::BAD_REQUEST, "'symbol' parameter is required"),
    };
    let symbol = match Symbol::new(raw) {
        Ok(s) => s,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let range = TimeRange::parse_lenient(query.range.as_deref());

    let Some(source) = state.source.clone() else {
        error!("no point source configured");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, DB_ERROR);
    };

    let now = state.clock.now();
    let lookup = symbol.clone();
    // Sources do blocking I/O.
    let result = tokio::task::spawn_blocking(move || source.prices(&lookup, range, now)).await;

    match result {
        Ok(Ok(points)) => {
            debug!(%symbol, %range, count = points.len(), "prices served");
            let (times, prices) = points
                .into_iter()
                .map(|p| (p.time, p.price.to_f64().unwrap_or(f64::NAN)))
                .unzip();
            Json(PriceSeries { times, prices }).into_response()
        }
        Ok(Err(e)) => {
            error!(%symbol, %range, error = %e, "error querying point source");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, DB_ERROR)
        }
        Err(e) => {
            error!(%symbol, error = %e, "point source task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, DB_ERROR)
        }
    }
}

pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn metrics(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}
