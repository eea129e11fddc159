//! InfluxDB v2 sink and Flux-backed point source.
//!
//! Writes use line protocol (`stock_price,symbol=AAPL price=150.00 <ns>`)
//! with the quote's `observed_at` as timestamp, so re-exporting a cached quote
//! overwrites the same point instead of adding one. Reads run a Flux query
//! and parse the CSV response.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use quotewatch_core::{QuoteRecord, Symbol};

use super::{ExportError, Exporter, PointSource, PricePoint, Snapshot, SourceError, MEASUREMENT};
use crate::config::InfluxConfig;
use crate::range::TimeRange;

pub struct InfluxSink {
    client: reqwest::blocking::Client,
    url: String,
    token: String,
    org: String,
    bucket: String,
}

impl InfluxSink {
    /// All of url, token, org and bucket must be set.
    pub fn from_config(config: &InfluxConfig) -> Result<Self, ExportError> {
        let missing: Vec<&str> = [
            ("url", &config.url),
            ("token", &config.token),
            ("org", &config.org),
            ("bucket", &config.bucket),
        ]
        .iter()
        .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();
        if !missing.is_empty() {
            return Err(ExportError::Incomplete(missing.join(", ")));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExportError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone().unwrap_or_default().trim_end_matches('/').to_string(),
            token: config.token.clone().unwrap_or_default(),
            org: config.org.clone().unwrap_or_default(),
            bucket: config.bucket.clone().unwrap_or_default(),
        })
    }

    fn write_lines(&self, body: String) -> Result<(), ExportError> {
        let resp = self
            .client
            .post(format!("{}/api/v2/write", self.url))
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .map_err(|e| ExportError::Http(e.without_url().to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().unwrap_or_default();
        Err(ExportError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl Exporter for InfluxSink {
    fn name(&self) -> &str {
        "influxdb"
    }

    fn export(&self, snapshot: &Snapshot<'_>) -> Result<(), ExportError> {
        let lines: Vec<String> = snapshot.batch.present().map(line_protocol).collect();
        if lines.is_empty() {
            warn!("no valid price data to write to InfluxDB");
            return Ok(());
        }
        let count = lines.len();
        self.write_lines(lines.join("\n"))?;
        info!(count, bucket = %self.bucket, "wrote points to InfluxDB");
        Ok(())
    }
}

impl PointSource for InfluxSink {
    fn prices(
        &self,
        symbol: &Symbol,
        range: TimeRange,
        _now: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, SourceError> {
        let query = flux_query(&self.bucket, symbol, range);
        debug!(%symbol, %range, "running Flux query");

        let resp = self
            .client
            .post(format!("{}/api/v2/query", self.url))
            .query(&[("org", self.org.as_str())])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "application/vnd.flux")
            .header("Accept", "application/csv")
            .body(query)
            .send()
            .map_err(|e| SourceError::Query(e.without_url().to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| SourceError::Query(e.without_url().to_string()))?;
        if !status.is_success() {
            return Err(SourceError::Query(format!("HTTP {}: {text}", status.as_u16())));
        }
        parse_flux_csv(&text)
    }
}

/// One line-protocol record for a quote, timestamp in nanoseconds.
pub fn line_protocol(quote: &QuoteRecord) -> String {
    let ts = quote
        .observed_at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| quote.observed_at.timestamp().saturating_mul(1_000_000_000));
    format!(
        "{MEASUREMENT},symbol={} price={} {ts}",
        escape_tag(quote.symbol.as_str()),
        quote.price.normalize()
    )
}

/// Tag values escape commas, equals signs and spaces.
fn escape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Flux query for one symbol's price series over `range`, oldest first.
pub fn flux_query(bucket: &str, symbol: &Symbol, range: TimeRange) -> String {
    let bucket = bucket.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        r#"from(bucket: "{bucket}")
  |> range(start: {start})
  |> filter(fn: (r) => r._measurement == "{MEASUREMENT}")
  |> filter(fn: (r) => r.symbol == "{symbol}")
  |> filter(fn: (r) => r._field == "price")
  |> sort(columns: ["_time"])"#,
        start = range.flux_start(),
    )
}

/// Parse the CSV body of a Flux query response.
///
/// Handles annotation rows (`#datatype`, ...), repeated header rows between
/// tables and blank separators. Only `_time` and `_value` are read.
pub fn parse_flux_csv(text: &str) -> Result<Vec<PricePoint>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());

    let mut columns: Option<(usize, usize)> = None;
    let mut points = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| SourceError::Parse(e.to_string()))?;
        let time_idx = record.iter().position(|f| f == "_time");
        let value_idx = record.iter().position(|f| f == "_value");
        if let (Some(t), Some(v)) = (time_idx, value_idx) {
            columns = Some((t, v));
            continue;
        }
        let Some((t, v)) = columns else {
            return Err(SourceError::Parse("data row before header".into()));
        };
        let (Some(time), Some(value)) = (record.get(t), record.get(v)) else {
            continue;
        };
        if time.is_empty() || value.is_empty() {
            continue;
        }
        let time = DateTime::parse_from_rfc3339(time)
            .map_err(|e| SourceError::Parse(format!("bad _time '{time}': {e}")))?
            .with_timezone(&Utc);
        let price = Decimal::from_str(value)
            .or_else(|_| Decimal::from_scientific(value))
            .map_err(|e| SourceError::Parse(format!("bad _value '{value}': {e}")))?;
        points.push(PricePoint { time, price });
    }

    points.sort_by_key(|p| p.time);
    Ok(points)
}
