//! Rate-limited, retrying fetch client.
//!
//! Each attempt first waits on the shared `RateLimiter`, then issues one GET.
//! Outcomes per attempt:
//! - 2xx with a valid quote: done
//! - 429, or a 2xx carrying only a rate-limit note: retry as `RateLimited`
//! - 5xx or transport failure: retry as `Transient`
//! - any other status, provider error payload, malformed body: `InvalidResponse`
//! - 2xx without a usable price: `NoData`
//!
//! After `max_attempts` retryable failures the last kind is returned. The
//! caller must not retry again within the same batch cycle.

use std::sync::Arc;

use tracing::{debug, warn};

use super::http::HttpTransport;
use super::provider::{BodyVerdict, FetchError, QuoteApi, QuoteFetcher, RawResponse};
use super::rate_limit::RateLimiter;
use super::retry::RetryPolicy;
use crate::clock::Clock;
use crate::domain::Symbol;

enum Attempt {
    Success(RawResponse),
    Retry(FetchError),
    Fail(FetchError),
}

pub struct FetchClient {
    api: Box<dyn QuoteApi>,
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl FetchClient {
    pub fn new(
        api: Box<dyn QuoteApi>,
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            api,
            transport,
            limiter,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn attempt(&self, symbol: &Symbol, url: &str) -> Attempt {
        self.limiter.acquire(self.clock.as_ref());

        let resp = match self.transport.get(url) {
            Ok(resp) => resp,
            Err(e) => {
                return Attempt::Retry(FetchError::Transient {
                    attempts: 0,
                    reason: e.to_string(),
                })
            }
        };

        match resp.status {
            429 => Attempt::Retry(FetchError::RateLimited { attempts: 0 }),
            s if s >= 500 => Attempt::Retry(FetchError::Transient {
                attempts: 0,
                reason: format!("HTTP {s}"),
            }),
            s if !resp.is_success() => {
                Attempt::Fail(FetchError::InvalidResponse(format!("HTTP {s}")))
            }
            _ => match self.api.inspect(&resp.body) {
                BodyVerdict::Quote {
                    price,
                    soft_limited,
                } => {
                    if soft_limited {
                        warn!(%symbol, "provider rate-limit note on successful response, cooling down");
                        self.limiter.cool_down(self.clock.as_ref());
                    }
                    debug!(%symbol, %price, provider = %self.api.kind(), "quote fetched");
                    Attempt::Success(RawResponse {
                        provider: self.api.kind(),
                        body: resp.body,
                    })
                }
                BodyVerdict::SoftLimited(note) => {
                    warn!(%symbol, note = %note, "provider rate-limit note without data");
                    self.limiter.cool_down(self.clock.as_ref());
                    Attempt::Retry(FetchError::RateLimited { attempts: 0 })
                }
                BodyVerdict::Rejected(msg) => Attempt::Fail(FetchError::InvalidResponse(msg)),
                BodyVerdict::NoData(reason) => Attempt::Fail(FetchError::NoData(reason)),
            },
        }
    }
}

impl QuoteFetcher for FetchClient {
    fn name(&self) -> &str {
        self.api.kind().name()
    }

    fn fetch(&self, symbol: &Symbol) -> Result<RawResponse, FetchError> {
        let url = self.api.quote_url(symbol);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            match self.attempt(symbol, &url) {
                Attempt::Success(raw) => return Ok(raw),
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry(err) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(with_attempts(err, attempts));
                    }
                    let delay = self.policy.delay_after(attempts - 1);
                    debug!(
                        %symbol,
                        attempt = attempts,
                        kind = %err.kind(),
                        delay_ms = delay.as_millis() as u64,
                        "retrying after backoff"
                    );
                    self.clock.sleep(delay);
                }
            }
        }
    }
}

fn with_attempts(err: FetchError, attempts: u32) -> FetchError {
    match err {
        FetchError::RateLimited { .. } => FetchError::RateLimited { attempts },
        FetchError::Transient { reason, .. } => FetchError::Transient { attempts, reason },
        other => other,
    }
}
