//! JSONL point store: one JSON object per line, append-only.
//!
//! Points carry the quote's `observed_at` as their time, so a cached quote
//! re-exported on a later cycle produces a duplicate line with the same time.
//! Reads collapse those duplicates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use quotewatch_core::Symbol;

use super::{ExportError, Exporter, PointSource, PricePoint, Snapshot, SourceError, MEASUREMENT};
use crate::range::TimeRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPoint {
    pub measurement: String,
    pub symbol: Symbol,
    pub price: Decimal,
    pub time: DateTime<Utc>,
}

pub struct JsonlPointStore {
    path: PathBuf,
}

impl JsonlPointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append points, creating the parent directory and file as needed.
    pub fn append(&self, points: &[StoredPoint]) -> Result<(), ExportError> {
        if points.is_empty() {
            return Ok(());
        }
        let io_err = |source| ExportError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let mut buf = String::new();
        for point in points {
            buf.push_str(&serde_json::to_string(point)?);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(buf.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        Ok(())
    }

    /// Every readable point in file order. Malformed lines are skipped.
    pub fn read_all(&self) -> io::Result<Vec<StoredPoint>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = io::BufReader::new(file);
        let mut points = Vec::new();

        // Raw bytes, so a line of invalid UTF-8 is skipped like any other bad line.
        for (lineno, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<StoredPoint>(&line) {
                Ok(point) => points.push(point),
                Err(e) => {
                    warn!(path = %self.path.display(), line = lineno + 1, error = %e, "skipping malformed point");
                }
            }
        }

        Ok(points)
    }
}

impl Exporter for JsonlPointStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn export(&self, snapshot: &Snapshot<'_>) -> Result<(), ExportError> {
        let points: Vec<StoredPoint> = snapshot
            .batch
            .present()
            .map(|q| StoredPoint {
                measurement: MEASUREMENT.to_string(),
                symbol: q.symbol.clone(),
                price: q.price,
                time: q.observed_at,
            })
            .collect();
        if points.is_empty() {
            warn!("no quotes to store");
            return Ok(());
        }
        self.append(&points)?;
        debug!(count = points.len(), path = %self.path.display(), "points appended");
        Ok(())
    }
}

impl PointSource for JsonlPointStore {
    fn prices(
        &self,
        symbol: &Symbol,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, SourceError> {
        let start = range.start(now);
        let points = self.read_all().map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;

        // Keyed by time: sorts and drops re-exported duplicates (last wins).
        let by_time: BTreeMap<DateTime<Utc>, Decimal> = points
            .into_iter()
            .filter(|p| p.measurement == MEASUREMENT && &p.symbol == symbol)
            .filter(|p| start.map_or(true, |s| p.time >= s))
            .map(|p| (p.time, p.price))
            .collect();

        Ok(by_time
            .into_iter()
            .map(|(time, price)| PricePoint { time, price })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 3, 12, 0, 0).unwrap()
    }

    fn point(symbol: &str, days_ago: i64, price: Decimal) -> StoredPoint {
        StoredPoint {
            measurement: MEASUREMENT.into(),
            symbol: sym(symbol),
            price,
            time: now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlPointStore::new(dir.path().join("none.jsonl"));
        assert!(store.prices(&sym("GE"), TimeRange::All, now()).unwrap().is_empty());
    }

    #[test]
    fn filters_by_symbol_and_range_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlPointStore::new(dir.path().join("nested/points.jsonl"));
        store
            .append(&[
                point("GE", 0, dec!(12)),
                point("GE", 3, dec!(11)),
                point("GE", 40, dec!(9)),
                point("HD", 1, dec!(300)),
            ])
            .unwrap();

        let all = store.prices(&sym("GE"), TimeRange::All, now()).unwrap();
        let prices: Vec<_> = all.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![dec!(9), dec!(11), dec!(12)]);

        let week = store.prices(&sym("GE"), TimeRange::SevenDays, now()).unwrap();
        assert_eq!(week.len(), 2);
        assert!(week[0].time < week[1].time);
    }

    #[test]
    fn duplicate_times_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlPointStore::new(dir.path().join("points.jsonl"));
        store.append(&[point("GE", 1, dec!(10))]).unwrap();
        store.append(&[point("GE", 1, dec!(10))]).unwrap();
        assert_eq!(store.read_all().unwrap().len(), 2);
        assert_eq!(store.prices(&sym("GE"), TimeRange::All, now()).unwrap().len(), 1);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.jsonl");
        let store = JsonlPointStore::new(path.clone());
        store.append(&[point("GE", 1, dec!(10))]).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{truncated").unwrap();
        drop(file);
        store.append(&[point("GE", 0, dec!(11))]).unwrap();

        assert_eq!(store.read_all().unwrap().len(), 2);
    }

    #[test]
    fn invalid_utf8_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.jsonl");
        let store = JsonlPointStore::new(path.clone());
        store.append(&[point("GE", 1, dec!(10))]).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        drop(file);
        store.append(&[point("GE", 0, dec!(11))]).unwrap();

        let prices: Vec<_> = store
            .prices(&sym("GE"), TimeRange::All, now())
            .unwrap()
            .into_iter()
            .map(|p| p.price)
            .collect();
        assert_eq!(prices, vec![dec!(10), dec!(11)]);
    }
}
