//! Shared fakes for pipeline integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use quotewatch_core::data::{
    AlphaVantageApi, CachePolicy, FetchClient, FinnhubApi, HttpResponse, HttpTransport, QuoteApi,
    QuoteCache, RateLimiter, RetryPolicy, TransportError,
};
use quotewatch_core::pipeline::{BatchResult, BatchRunner, SymbolOrchestrator};
use quotewatch_core::{ManualClock, Symbol};

type Handler = dyn Fn(&str) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Transport answering each GET with a closure and recording every URL.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&str) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Same response for every call.
    pub fn always(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::new(move |_| Ok(HttpResponse::new(status, body.clone())))
    }

    /// Responses served in order; the last one repeats.
    pub fn sequence(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
        let queue = Mutex::new(responses);
        Self::new(move |_| {
            let mut queue = queue.lock().unwrap();
            if queue.len() > 1 {
                queue.remove(0)
            } else {
                match queue.first() {
                    Some(Ok(resp)) => Ok(resp.clone()),
                    Some(Err(e)) => Err(TransportError::Other(e.to_string())),
                    None => Err(TransportError::Other("script exhausted".into())),
                }
            }
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Symbols requested, in call order.
    pub fn requested_symbols(&self) -> Vec<String> {
        self.calls().iter().map(|u| symbol_in(u)).collect()
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        (self.handler)(url)
    }
}

/// The `symbol=` query value of a provider URL.
pub fn symbol_in(url: &str) -> String {
    url.split(['?', '&'])
        .find_map(|part| part.strip_prefix("symbol="))
        .unwrap_or_default()
        .to_string()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 3, 14, 0, 0).unwrap()
}

pub fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

pub fn syms(list: &[&str]) -> Vec<Symbol> {
    list.iter().map(|s| sym(s)).collect()
}

pub fn finnhub_body(price: &str) -> String {
    format!(r#"{{"c":{price},"d":0.1,"dp":0.05,"h":0,"l":0,"o":0,"pc":0,"t":1751551200}}"#)
}

pub fn global_quote_body(price: &str) -> String {
    format!(r#"{{"Global Quote": {{"01. symbol": "IBM", "05. price": "{price}"}}}}"#)
}

pub fn ok(body: String) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(200, body))
}

/// A complete pipeline over a temp cache, a manual clock and a scripted
/// transport.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub transport: Arc<ScriptedTransport>,
    pub cache: Arc<QuoteCache>,
    pub runner: BatchRunner,
    pub cache_dir: TempDir,
}

pub struct HarnessBuilder {
    api: Box<dyn QuoteApi>,
    policy: RetryPolicy,
    cache_policy: CachePolicy,
    calls_per_min: u32,
    concurrency: usize,
    clock: Option<Arc<ManualClock>>,
}

impl HarnessBuilder {
    pub fn finnhub() -> Self {
        Self {
            api: Box::new(FinnhubApi::new("https://finnhub.test/api/v1", "tok")),
            policy: RetryPolicy::default(),
            cache_policy: CachePolicy::Symbol { ttl_minutes: 29 },
            calls_per_min: 60,
            concurrency: 1,
            clock: None,
        }
    }

    pub fn alpha_vantage() -> Self {
        Self {
            api: Box::new(AlphaVantageApi::new("https://av.test", "KEY")),
            ..Self::finnhub()
        }
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn calls_per_min(mut self, n: u32) -> Self {
        self.calls_per_min = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    /// Share a clock with the transport, e.g. to simulate request latency.
    pub fn clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self, transport: ScriptedTransport) -> Harness {
        let cache_dir = tempfile::tempdir().unwrap();
        let clock = self.clock.unwrap_or_else(|| Arc::new(ManualClock::new(t0())));
        let transport = Arc::new(transport);
        let cache = Arc::new(QuoteCache::new(cache_dir.path(), self.cache_policy));
        let client = FetchClient::new(
            self.api,
            transport.clone(),
            Arc::new(RateLimiter::per_minute(self.calls_per_min)),
            clock.clone(),
            self.policy,
        );
        let orchestrator =
            SymbolOrchestrator::new(cache.clone(), Arc::new(client), clock.clone());
        let runner = BatchRunner::new(Arc::new(orchestrator), self.concurrency);
        Harness {
            clock,
            transport,
            cache,
            runner,
            cache_dir,
        }
    }
}

impl Harness {
    pub fn run(&self, symbols: &[Symbol]) -> BatchResult {
        self.runner.run(symbols, &AtomicBool::new(false))
    }
}
