//! Cache-or-fetch pipeline behavior driven by a scripted transport and a
//! manual clock.

mod common;

use chrono::Duration as ChronoDuration;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use quotewatch_core::data::{
    CacheEntry, CachePolicy, FetchErrorKind, HttpResponse, ProviderKind, RetryPolicy,
    TransportError,
};
use quotewatch_core::pipeline::Provenance;
use quotewatch_core::{Clock, ManualClock};

// ── Cache hits ──

#[test]
fn fresh_cache_entry_never_calls_the_provider() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::always(200, &finnhub_body("1")));
    h.cache
        .write(&CacheEntry {
            symbol: sym("AAPL"),
            provider: ProviderKind::Finnhub,
            created_at: t0() - ChronoDuration::minutes(5),
            body: finnhub_body("150.25"),
        })
        .unwrap();

    let result = h.run(&syms(&["AAPL"]));

    assert_eq!(h.transport.call_count(), 0);
    let entry = result.get(&sym("AAPL")).unwrap();
    assert_eq!(entry.provenance, Provenance::FromCache);
    let quote = entry.quote.as_ref().unwrap();
    assert_eq!(quote.price, dec!(150.25));
    assert_eq!(quote.observed_at, t0() - ChronoDuration::minutes(5));
}

#[test]
fn missing_entry_fetches_once_and_writes_once() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::always(200, &finnhub_body("42.5")));

    let result = h.run(&syms(&["GE"]));

    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(result.get(&sym("GE")).unwrap().provenance, Provenance::Fresh);
    let cached = h.cache.read(&sym("GE")).unwrap();
    assert_eq!(cached.created_at, t0());
    assert_eq!(cached.body, finnhub_body("42.5"));
    let files: Vec<_> = std::fs::read_dir(h.cache_dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn expired_entry_is_refetched_and_overwritten() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::always(200, &finnhub_body("301")));
    h.cache
        .write(&CacheEntry {
            symbol: sym("HD"),
            provider: ProviderKind::Finnhub,
            created_at: t0() - ChronoDuration::minutes(29),
            body: finnhub_body("299"),
        })
        .unwrap();

    let result = h.run(&syms(&["HD"]));

    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(result.get(&sym("HD")).unwrap().quote.as_ref().unwrap().price, dec!(301));
    assert_eq!(h.cache.read(&sym("HD")).unwrap().created_at, t0());
}

#[test]
fn corrupt_cache_file_is_quarantined_and_refetched() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::always(200, &finnhub_body("12")));
    std::fs::write(h.cache_dir.path().join("TSLA.json"), "{{{{").unwrap();

    let result = h.run(&syms(&["TSLA"]));

    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(result.get(&sym("TSLA")).unwrap().provenance, Provenance::Fresh);
    assert!(h.cache_dir.path().join("TSLA.json.quarantined").exists());
}

#[test]
fn cached_body_without_price_counts_as_miss() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::always(200, &finnhub_body("7")));
    h.cache
        .write(&CacheEntry {
            symbol: sym("DIS"),
            provider: ProviderKind::Finnhub,
            created_at: t0(),
            body: r#"{"c":0}"#.into(),
        })
        .unwrap();

    let result = h.run(&syms(&["DIS"]));

    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(result.get(&sym("DIS")).unwrap().quote.as_ref().unwrap().price, dec!(7));
}

#[test]
fn failed_write_back_still_returns_fresh_quote() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::always(200, &finnhub_body("64.5")));
    // A regular file where the cache directory should be.
    std::fs::remove_dir(h.cache_dir.path()).unwrap();
    std::fs::write(h.cache_dir.path(), "not a directory").unwrap();

    let result = h.run(&syms(&["GE"]));

    assert_eq!(h.transport.call_count(), 1);
    let entry = result.get(&sym("GE")).unwrap();
    assert_eq!(entry.provenance, Provenance::Fresh);
    assert_eq!(entry.quote.as_ref().unwrap().price, dec!(64.5));
    assert!(h.cache.read(&sym("GE")).is_none());
    std::fs::remove_file(h.cache_dir.path()).unwrap();
}

#[test]
fn daily_bucket_serves_same_day_requests_from_cache() {
    let h = HarnessBuilder::finnhub()
        .cache_policy(CachePolicy::Daily { ttl_days: 1 })
        .build(ScriptedTransport::always(200, &finnhub_body("110")));

    h.run(&syms(&["DIS"]));
    h.clock.advance(ChronoDuration::hours(6));
    let second = h.run(&syms(&["DIS"]));

    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(second.get(&sym("DIS")).unwrap().provenance, Provenance::FromCache);
    assert!(h
        .cache_dir
        .path()
        .join("symbol=DIS/2025-07-03.json")
        .exists());
}

// ── Idempotence and TTL ──

#[test]
fn repeated_runs_inside_ttl_are_identical() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::always(200, &finnhub_body("88.8")));
    let symbols = syms(&["AAPL", "GE"]);

    let first = h.run(&symbols);
    h.clock.advance(ChronoDuration::minutes(10));
    let second = h.run(&symbols);

    assert_eq!(first.quotes(), second.quotes());
    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(second.counts().from_cache, 2);
}

#[test]
fn aapl_scenario_fetch_then_cache_then_refetch() {
    let price = Arc::new(Mutex::new("150.00".to_string()));
    let served = price.clone();
    let transport = ScriptedTransport::new(move |_| ok(finnhub_body(&served.lock().unwrap())));
    let h = HarnessBuilder::finnhub().build(transport);
    let aapl = syms(&["AAPL"]);

    // T: miss, one fetch
    let at_t = h.run(&aapl);
    let rec_t = at_t.get(&sym("AAPL")).unwrap().quote.clone().unwrap();
    assert_eq!(rec_t.price, dec!(150.00));
    assert_eq!(rec_t.observed_at, t0());
    assert_eq!(h.transport.call_count(), 1);

    // T+10: provider moved but the cached record is returned unchanged
    *price.lock().unwrap() = "151.00".into();
    h.clock.set(t0() + ChronoDuration::minutes(10));
    let at_t10 = h.run(&aapl);
    assert_eq!(at_t10.get(&sym("AAPL")).unwrap().quote.clone().unwrap(), rec_t);
    assert_eq!(h.transport.call_count(), 1);

    // T+40: expired, refetched
    h.clock.set(t0() + ChronoDuration::minutes(40));
    let at_t40 = h.run(&aapl);
    let rec_t40 = at_t40.get(&sym("AAPL")).unwrap().quote.clone().unwrap();
    assert_eq!(rec_t40.price, dec!(151.00));
    assert_eq!(rec_t40.observed_at, t0() + ChronoDuration::minutes(40));
    assert_eq!(h.transport.call_count(), 2);
}

// ── Retries ──

#[test]
fn always_429_stops_after_three_attempts_with_backoff() {
    let h = HarnessBuilder::finnhub()
        .retry(RetryPolicy::default())
        .build(ScriptedTransport::always(429, ""));

    let result = h.run(&syms(&["AAPL"]));

    assert_eq!(h.transport.call_count(), 3);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    let entry = result.get(&sym("AAPL")).unwrap();
    assert_eq!(entry.provenance, Provenance::Absent(FetchErrorKind::RateLimited));
    assert!(entry.quote.is_none());
    assert!(h.cache.read(&sym("AAPL")).is_none());
}

#[test]
fn transient_failure_then_success_is_fresh() {
    let transport = ScriptedTransport::sequence(vec![
        Ok(HttpResponse::new(503, "unavailable")),
        Err(TransportError::Timeout("read timed out".into())),
        ok(finnhub_body("20")),
    ]);
    let h = HarnessBuilder::finnhub().build(transport);

    let result = h.run(&syms(&["GE"]));

    assert_eq!(h.transport.call_count(), 3);
    assert_eq!(result.get(&sym("GE")).unwrap().provenance, Provenance::Fresh);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[test]
fn no_retry_policy_makes_a_single_call() {
    let h = HarnessBuilder::finnhub()
        .retry(RetryPolicy::no_retry())
        .build(ScriptedTransport::always(500, ""));

    let result = h.run(&syms(&["GE"]));

    assert_eq!(h.transport.call_count(), 1);
    assert!(h.clock.sleeps().is_empty());
    assert_eq!(
        result.get(&sym("GE")).unwrap().provenance,
        Provenance::Absent(FetchErrorKind::Transient)
    );
}

#[test]
fn client_errors_and_missing_data_are_not_retried() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::new(|url| {
        match symbol_in(url).as_str() {
            "BAD" => Ok(HttpResponse::new(403, "forbidden")),
            _ => ok(finnhub_body("0")),
        }
    }));

    let result = h.run(&syms(&["BAD", "ZERO"]));

    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(
        result.get(&sym("BAD")).unwrap().provenance,
        Provenance::Absent(FetchErrorKind::InvalidResponse)
    );
    assert_eq!(
        result.get(&sym("ZERO")).unwrap().provenance,
        Provenance::Absent(FetchErrorKind::NoData)
    );
}

#[test]
fn soft_limit_note_cools_down_before_retry() {
    let transport = ScriptedTransport::sequence(vec![
        ok(r#"{"Note": "Our standard API call frequency is 5 calls per minute"}"#.into()),
        ok(global_quote_body("150.0000")),
    ]);
    let h = HarnessBuilder::alpha_vantage()
        .calls_per_min(5)
        .build(transport);

    let result = h.run(&syms(&["IBM"]));

    assert_eq!(h.transport.call_count(), 2);
    // 1s backoff, then the limiter holds the rest of the 12s cooldown.
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(11)]
    );
    let quote = result.get(&sym("IBM")).unwrap().quote.clone().unwrap();
    assert_eq!(quote.price, dec!(150));
    assert_eq!(quote.observed_at, t0() + ChronoDuration::seconds(12));
}

/// Two calls where every request takes one second of clock time. With 20
/// calls per minute the slots are 3s apart.
fn second_call_wait_after_first_body(first_body: String) -> Vec<Duration> {
    let clock = Arc::new(ManualClock::new(t0()));
    let latency_clock = clock.clone();
    let transport = ScriptedTransport::new(move |url| {
        latency_clock.advance(ChronoDuration::seconds(1));
        match symbol_in(url).as_str() {
            "A" => ok(first_body.clone()),
            _ => ok(global_quote_body("20.0000")),
        }
    });
    let h = HarnessBuilder::alpha_vantage()
        .calls_per_min(20)
        .clock(clock)
        .build(transport);

    let result = h.run(&syms(&["A", "B"]));

    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(result.counts().fresh, 2);
    h.clock.sleeps()
}

#[test]
fn soft_limit_note_with_quote_cools_down_the_next_call() {
    let plain = second_call_wait_after_first_body(global_quote_body("10.0000"));
    assert_eq!(plain, vec![Duration::from_secs(2)]);

    let noted = second_call_wait_after_first_body(
        r#"{"Information": "Please consider spreading out your free API requests", "Global Quote": {"05. price": "10.0000"}}"#.into(),
    );
    // Cooldown restarts the full 3s interval from when the note arrived.
    assert_eq!(noted, vec![Duration::from_secs(3)]);
}

#[test]
fn network_calls_respect_the_minimum_spacing() {
    let h = HarnessBuilder::finnhub()
        .calls_per_min(5)
        .build(ScriptedTransport::always(200, &finnhub_body("10")));

    h.run(&syms(&["A", "B", "C"]));

    assert_eq!(h.transport.call_count(), 3);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_secs(12), Duration::from_secs(12)]
    );
}

// ── Batch behavior ──

#[test]
fn one_failing_symbol_does_not_affect_the_others() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::new(|url| {
        match symbol_in(url).as_str() {
            "B" => Ok(HttpResponse::new(404, "not found")),
            _ => ok(finnhub_body("5")),
        }
    }));

    let result = h.run(&syms(&["A", "B", "C"]));

    let quotes = result.quotes();
    assert!(quotes[&sym("A")].is_some());
    assert!(quotes[&sym("B")].is_none());
    assert!(quotes[&sym("C")].is_some());
    let symbols: Vec<_> = result.entries.iter().map(|e| e.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["A", "B", "C"]);
}

#[test]
fn duplicate_symbols_are_fetched_once() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::always(200, &finnhub_body("3")));

    let result = h.run(&syms(&["GE", "ge", "GE"]));

    assert_eq!(result.entries.len(), 1);
    assert_eq!(h.transport.call_count(), 1);
}

#[test]
fn cancel_before_start_skips_every_symbol() {
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::always(200, &finnhub_body("3")));
    let cancel = AtomicBool::new(true);

    let result = h.runner.run(&syms(&["A", "B"]), &cancel);

    assert_eq!(h.transport.call_count(), 0);
    assert!(result.was_cancelled());
    assert_eq!(result.counts().cancelled, 2);
}

#[test]
fn cancel_mid_batch_leaves_remaining_symbols_cancelled() {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    let h = HarnessBuilder::finnhub().build(ScriptedTransport::new(move |_| {
        flag.store(true, Ordering::Relaxed);
        ok(finnhub_body("9"))
    }));

    let result = h.runner.run(&syms(&["A", "B", "C"]), &cancel);

    assert_eq!(h.transport.requested_symbols(), vec!["A"]);
    assert_eq!(result.get(&sym("A")).unwrap().provenance, Provenance::Fresh);
    assert_eq!(result.get(&sym("B")).unwrap().provenance, Provenance::Cancelled);
    assert_eq!(result.get(&sym("C")).unwrap().provenance, Provenance::Cancelled);
}

#[test]
fn concurrent_batch_resolves_every_symbol() {
    let h = HarnessBuilder::finnhub()
        .calls_per_min(6000)
        .concurrency(4)
        .build(ScriptedTransport::always(200, &finnhub_body("1.5")));
    let symbols = syms(&["AAPL", "DIS", "GE", "HD", "TSLA", "MSFT"]);

    let result = h.run(&symbols);

    assert_eq!(h.transport.call_count(), 6);
    assert_eq!(result.counts().fresh, 6);
    let order: Vec<_> = result.entries.iter().map(|e| e.symbol.clone()).collect();
    assert_eq!(order, symbols);
}

#[test]
fn batch_timestamps_follow_the_clock() {
    let h = HarnessBuilder::finnhub()
        .calls_per_min(5)
        .build(ScriptedTransport::always(200, &finnhub_body("10")));

    let result = h.run(&syms(&["A", "B"]));

    assert_eq!(result.started_at, t0());
    assert_eq!(result.finished_at, h.clock.now());
    assert_eq!(result.finished_at, t0() + ChronoDuration::seconds(12));
}
