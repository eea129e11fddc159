//! Alpha Vantage quote API.
//!
//! Requests `GLOBAL_QUOTE`; bodies in the `TIME_SERIES_DAILY` layout are read
//! too (latest date's close). Alpha Vantage answers throttled calls with HTTP
//! 200 and a `Note` or `Information` field instead of a 429.

use rust_decimal::Decimal;
use serde_json::Value;

use super::provider::{parse_price, BodyVerdict, FetchError, ProviderKind, QuoteApi};
use crate::domain::Symbol;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

pub struct AlphaVantageApi {
    base_url: String,
    api_key: String,
}

impl AlphaVantageApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

impl QuoteApi for AlphaVantageApi {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AlphaVantage
    }

    fn quote_url(&self, symbol: &Symbol) -> String {
        format!(
            "{}/query?function=GLOBAL_QUOTE&symbol={symbol}&apikey={}",
            self.base_url, self.api_key
        )
    }

    fn inspect(&self, body: &str) -> BodyVerdict {
        let value: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => return BodyVerdict::Rejected(format!("malformed JSON: {e}")),
        };

        if let Some(msg) = value.get("Error Message").and_then(Value::as_str) {
            return BodyVerdict::Rejected(msg.to_string());
        }

        let note = value
            .get("Note")
            .or_else(|| value.get("Information"))
            .and_then(Value::as_str);

        match price_from_value(&value) {
            Ok(price) => BodyVerdict::Quote {
                price,
                soft_limited: note.is_some(),
            },
            Err(reason) => match note {
                Some(note) => BodyVerdict::SoftLimited(note.to_string()),
                None => BodyVerdict::NoData(reason),
            },
        }
    }
}

pub(crate) fn extract_price(body: &str) -> Result<Decimal, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::InvalidResponse(format!("malformed JSON: {e}")))?;
    price_from_value(&value).map_err(FetchError::NoData)
}

fn price_from_value(value: &Value) -> Result<Decimal, String> {
    if let Some(quote) = value.get("Global Quote") {
        let raw = quote
            .get("05. price")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing '05. price' in Global Quote".to_string())?;
        return parse_price(raw);
    }

    if let Some(series) = value.get("Time Series (Daily)").and_then(Value::as_object) {
        // ISO dates sort lexicographically.
        let (_, latest) = series
            .iter()
            .max_by(|a, b| a.0.cmp(b.0))
            .ok_or_else(|| "empty daily time series".to_string())?;
        let raw = latest
            .get("4. close")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing '4. close' in daily series".to_string())?;
        return parse_price(raw);
    }

    Err("no quote field in response".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn api() -> AlphaVantageApi {
        AlphaVantageApi::new("https://example.test/", "KEY")
    }

    #[test]
    fn builds_global_quote_url() {
        let url = api().quote_url(&Symbol::new("ibm").unwrap());
        assert_eq!(
            url,
            "https://example.test/query?function=GLOBAL_QUOTE&symbol=IBM&apikey=KEY"
        );
    }

    #[test]
    fn reads_global_quote() {
        let body = r#"{"Global Quote": {"01. symbol": "IBM", "05. price": "150.0000"}}"#;
        assert_eq!(
            api().inspect(body),
            BodyVerdict::Quote {
                price: dec!(150),
                soft_limited: false
            }
        );
    }

    #[test]
    fn reads_latest_daily_close() {
        let body = r#"{"Time Series (Daily)": {
            "2025-07-02": {"4. close": "148.10"},
            "2025-07-03": {"4. close": "150.00"}
        }}"#;
        assert_eq!(extract_price(body).unwrap(), dec!(150.00));
    }

    #[test]
    fn note_without_quote_is_soft_limited() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute"}"#;
        assert!(matches!(api().inspect(body), BodyVerdict::SoftLimited(_)));
    }

    #[test]
    fn information_with_quote_is_flagged() {
        let body = r#"{"Information": "slow down", "Global Quote": {"05. price": "10.5"}}"#;
        assert_eq!(
            api().inspect(body),
            BodyVerdict::Quote {
                price: dec!(10.5),
                soft_limited: true
            }
        );
    }

    #[test]
    fn error_message_is_rejected() {
        let body = r#"{"Error Message": "Invalid API call."}"#;
        assert_eq!(
            api().inspect(body),
            BodyVerdict::Rejected("Invalid API call.".into())
        );
    }

    #[test]
    fn empty_global_quote_is_no_data() {
        assert!(matches!(
            api().inspect(r#"{"Global Quote": {}}"#),
            BodyVerdict::NoData(_)
        ));
        assert!(matches!(
            api().inspect(r#"{"Global Quote": {"05. price": "0.0000"}}"#),
            BodyVerdict::NoData(_)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(api().inspect("<html>"), BodyVerdict::Rejected(_)));
    }
}
