//! Quote acquisition: providers, HTTP seam, rate limiting, retries and caching

pub mod alpha_vantage;
pub mod cache;
pub mod client;
pub mod finnhub;
pub mod http;
pub mod provider;
pub mod rate_limit;
pub mod retry;

pub use alpha_vantage::AlphaVantageApi;
pub use cache::{is_fresh, CacheEntry, CacheError, CachePolicy, CacheStatus, QuoteCache};
pub use client::FetchClient;
pub use finnhub::FinnhubApi;
pub use http::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use provider::{
    BodyVerdict, FetchError, FetchErrorKind, ProviderKind, QuoteApi, QuoteFetcher, RawResponse,
};
pub use rate_limit::RateLimiter;
pub use retry::{backoff_delay, RetryPolicy};
