//! Daily portfolio summary as CSV: `date,daily_total_worth`.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{ExportError, Exporter, Snapshot};

const HEADER: [&str; 2] = ["date", "daily_total_worth"];

pub struct CsvSummary {
    path: PathBuf,
    once_per_day: bool,
}

impl CsvSummary {
    pub fn new(path: PathBuf, once_per_day: bool) -> Self {
        Self { path, once_per_day }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Date column of the last data row, if the file has one.
    fn last_date(&self) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;
        content
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(|l| l.split(',').next())
            .filter(|d| *d != HEADER[0])
            .map(str::to_string)
    }
}

impl Exporter for CsvSummary {
    fn name(&self) -> &str {
        "csv"
    }

    fn export(&self, snapshot: &Snapshot<'_>) -> Result<(), ExportError> {
        let valuation = snapshot.valuation;
        if !valuation.has_positions() {
            warn!("no priced holdings, skipping CSV summary");
            return Ok(());
        }

        let date = valuation.date.format("%Y-%m-%d").to_string();
        if self.once_per_day && self.last_date().as_deref() == Some(date.as_str()) {
            info!(%date, path = %self.path.display(), "summary already written today");
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

        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if is_new {
            wtr.write_record(HEADER)?;
        }
        let total = valuation.total_worth.to_string();
        wtr.write_record([date.as_str(), total.as_str()])?;
        wtr.flush().map_err(io_err)?;

        info!(path = %self.path.display(), total = %valuation.total_worth, "appended daily summary");
        Ok(())
    }
}
