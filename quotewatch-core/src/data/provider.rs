//! Quote provider seams and structured error types.
//!
//! `QuoteFetcher` is what the orchestrator talks to. `QuoteApi` is the
//! provider-specific half (URL shape, body inspection) that the retrying
//! `FetchClient` drives; Alpha Vantage and Finnhub each implement it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::Symbol;

use super::{alpha_vantage, finnhub};

/// Why a symbol could not be fetched this cycle.
///
/// All variants are per-symbol and non-fatal: the orchestrator turns them
/// into an absent batch entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("rate limited by provider after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    #[error("transient failure after {attempts} attempt(s): {reason}")]
    Transient { attempts: u32, reason: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no quote data: {0}")]
    NoData(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::RateLimited { .. } => FetchErrorKind::RateLimited,
            FetchError::Transient { .. } => FetchErrorKind::Transient,
            FetchError::InvalidResponse(_) => FetchErrorKind::InvalidResponse,
            FetchError::NoData(_) => FetchErrorKind::NoData,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    RateLimited,
    Transient,
    InvalidResponse,
    NoData,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchErrorKind::RateLimited => "rate_limited",
            FetchErrorKind::Transient => "transient",
            FetchErrorKind::InvalidResponse => "invalid_response",
            FetchErrorKind::NoData => "no_data",
        };
        f.write_str(s)
    }
}

/// Which provider produced a body. Stored with cache entries so a cached
/// body is always parsed by the provider that wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    AlphaVantage,
    Finnhub,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::AlphaVantage => "alpha_vantage",
            ProviderKind::Finnhub => "finnhub",
        }
    }

    /// Pull the current price out of a successful body.
    pub fn extract_price(&self, body: &str) -> Result<Decimal, FetchError> {
        match self {
            ProviderKind::AlphaVantage => alpha_vantage::extract_price(body),
            ProviderKind::Finnhub => finnhub::extract_price(body),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Verbatim body of a validated, successful provider response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    pub provider: ProviderKind,
    pub body: String,
}

/// Provider-specific reading of a 2xx body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyVerdict {
    /// Quote present. `soft_limited` is set when the body also carried a
    /// rate-limit note.
    Quote { price: Decimal, soft_limited: bool },
    /// Rate-limit note and no quote.
    SoftLimited(String),
    /// Provider reported an application error (bad symbol, bad key, ...).
    Rejected(String),
    /// Well-formed body without a usable price.
    NoData(String),
}

pub trait QuoteApi: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn quote_url(&self, symbol: &Symbol) -> String;

    fn inspect(&self, body: &str) -> BodyVerdict;
}

/// Fetch one symbol's raw quote.
pub trait QuoteFetcher: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(&self, symbol: &Symbol) -> Result<RawResponse, FetchError>;
}

/// Parse a provider price string. Zero or negative prices count as missing.
pub(crate) fn parse_price(raw: &str) -> Result<Decimal, String> {
    let raw = raw.trim();
    let price = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| format!("unparseable price '{raw}': {e}"))?;
    if price <= Decimal::ZERO {
        return Err(format!("non-positive price '{raw}'"));
    }
    Ok(price)
}
