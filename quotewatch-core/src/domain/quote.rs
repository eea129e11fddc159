use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Symbol;

/// Normalized quote for one symbol.
///
/// Built only from a successful fetch (`observed_at` is the fetch time) or a
/// fresh cache entry (`observed_at` is the entry's creation time), so two
/// reads of the same entry produce identical records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: Symbol,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}
