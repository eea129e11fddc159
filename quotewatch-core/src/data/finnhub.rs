//! Finnhub `/quote` API. The current price is field `c`; unknown symbols come
//! back as HTTP 200 with `c == 0`.

use rust_decimal::Decimal;
use serde_json::Value;

use super::provider::{parse_price, BodyVerdict, FetchError, ProviderKind, QuoteApi};
use crate::domain::Symbol;

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

pub struct FinnhubApi {
    base_url: String,
    api_key: String,
}

impl FinnhubApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

impl QuoteApi for FinnhubApi {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Finnhub
    }

    fn quote_url(&self, symbol: &Symbol) -> String {
        format!("{}/quote?symbol={symbol}&token={}", self.base_url, self.api_key)
    }

    fn inspect(&self, body: &str) -> BodyVerdict {
        let value: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => return BodyVerdict::Rejected(format!("malformed JSON: {e}")),
        };
        if let Some(msg) = value.get("error").and_then(Value::as_str) {
            return BodyVerdict::Rejected(msg.to_string());
        }
        match price_from_value(&value) {
            Ok(price) => BodyVerdict::Quote {
                price,
                soft_limited: false,
            },
            Err(reason) => BodyVerdict::NoData(reason),
        }
    }
}

pub(crate) fn extract_price(body: &str) -> Result<Decimal, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::InvalidResponse(format!("malformed JSON: {e}")))?;
    price_from_value(&value).map_err(FetchError::NoData)
}

fn price_from_value(value: &Value) -> Result<Decimal, String> {
    match value.get("c") {
        Some(Value::Number(n)) => parse_price(&n.to_string()),
        Some(Value::String(s)) => parse_price(s),
        _ => Err("missing current price field 'c'".into()),
    }
}
