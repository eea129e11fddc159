//! Holdings and their valuation against a batch of quotes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use quotewatch_core::pipeline::BatchResult;
use quotewatch_core::Symbol;

/// Share count per symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Holdings(BTreeMap<Symbol, Decimal>);

impl Holdings {
    pub fn new(shares: BTreeMap<Symbol, Decimal>) -> Self {
        Self(shares)
    }

    pub fn shares(&self, symbol: &Symbol) -> Option<Decimal> {
        self.0.get(symbol).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Decimal)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Value every held symbol that has a quote in `batch`.
    ///
    /// Held symbols without a quote are listed in `missing` and contribute
    /// nothing to the total; they are never valued at zero. A position whose
    /// worth would overflow `Decimal` is treated the same way.
    pub fn value(&self, batch: &BatchResult, date: NaiveDate) -> PortfolioValuation {
        let quotes = batch.quotes();
        let mut positions = Vec::new();
        let mut missing = Vec::new();
        let mut total_worth = Decimal::ZERO;

        for (symbol, &shares) in &self.0 {
            let Some(quote) = quotes.get(symbol).and_then(Option::as_ref) else {
                missing.push(symbol.clone());
                continue;
            };
            let valued = shares
                .checked_mul(quote.price)
                .and_then(|worth| total_worth.checked_add(worth).map(|total| (worth, total)));
            match valued {
                Some((worth, total)) => {
                    total_worth = total;
                    positions.push(Position {
                        symbol: symbol.clone(),
                        shares,
                        price: quote.price,
                        worth,
                    });
                }
                None => {
                    warn!(%symbol, %shares, price = %quote.price, "position worth overflows, excluding from total");
                    missing.push(symbol.clone());
                }
            }
        }

        PortfolioValuation {
            date,
            positions,
            total_worth,
            missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    pub shares: Decimal,
    pub price: Decimal,
    pub worth: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioValuation {
    pub date: NaiveDate,
    pub positions: Vec<Position>,
    pub total_worth: Decimal,
    pub missing: Vec<Symbol>,
}

impl PortfolioValuation {
    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.iter().find(|p| &p.symbol == symbol)
    }

    /// True when at least one held symbol was priced.
    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }
}
