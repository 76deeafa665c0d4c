//! SQLite-backed signal source and PnL cache through the full timeframe run.
#![cfg(feature = "sqlite")]

mod common;

use approx::assert_relative_eq;
use common::*;
use sigpnl::adapters::json_report_adapter::JsonReportAdapter;
use sigpnl::adapters::sqlite_adapter::SqliteAdapter;
use sigpnl::cli::run_timeframe;
use sigpnl::domain::aggregate::DayLabel;
use sigpnl::domain::rules::RuleBook;
use sigpnl::domain::runner::{RunContext, RunSettings};
use sigpnl::domain::signal::Timeframe;
use sigpnl::domain::symbol::Blacklist;
use sigpnl::ports::cache_port::PnlCachePort;
use sigpnl::ports::signal_port::SignalPort;
use tempfile::TempDir;

fn seeded() -> SqliteAdapter {
    let db = SqliteAdapter::in_memory().unwrap();
    db.initialize_schema().unwrap();
    db.insert_signals(
        Timeframe::M15,
        &[
            buy("BTCUSDT", at(3, 0), 100.0),
            sell("BTCUSDT", at(2, 3_600), 104.0),
            buy("ETHUSDT", at(2, 0), 50.0),
            sell("ETHUSDT", at(2, 900), 55.0),
            buy("ETHUSDT", at(20, 0), 10.0),
        ],
    )
    .unwrap();
    db.insert_signals(Timeframe::H1, &[buy("SOLUSDT", at(1, 0), 20.0)])
        .unwrap();
    db
}

fn read_json(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn lookback_limits_loaded_signals() {
    let db = seeded();
    let settings = RunSettings::new(Timeframe::M15, now());
    let signals = db
        .fetch_signals(Timeframe::M15, settings.lookback_start())
        .unwrap();
    assert_eq!(signals.len(), 4);
    assert!(signals.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn timeframe_run_populates_and_reuses_cache() {
    let db = seeded();
    let out = TempDir::new().unwrap();
    let candles = MockCandlePort::new().with_bars(
        "BTCUSDT",
        vec![bar(at(3, 60), 100.5, 102.5), bar(at(3, 120), 101.0, 103.5)],
    );
    let rules = RuleBook::default();
    let cache = db.pnl_cache(Timeframe::M15);
    let report = JsonReportAdapter::new(out.path().to_path_buf(), None, DayLabel::EpochDay);
    let ctx = RunContext {
        settings: RunSettings::new(Timeframe::M15, now()),
        rules: &rules,
        candles: &candles,
        cache: Some(&cache),
    };

    let path = run_timeframe(&db, &ctx, &Blacklist::default(), 2, &report)
        .unwrap()
        .unwrap();
    let json = read_json(&path);
    let btc_day = json["BTCUSDT"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["day"] == TODAY - 3)
        .unwrap()
        .clone();
    assert_relative_eq!(btc_day["pnl"].as_f64().unwrap(), 625.0, epsilon = 1e-9);
    assert_eq!(cache.get("BTCUSDT", TODAY - 3).unwrap(), Some(625.0));
    // The reversing sell is still open and ETH had no candles: neither is cached.
    assert_eq!(cache.get("BTCUSDT", TODAY - 2).unwrap(), None);
    assert_eq!(cache.get("ETHUSDT", TODAY - 2).unwrap(), None);

    // A settled day is served from the cache on the next run.
    cache.put("BTCUSDT", TODAY - 3, 1.5).unwrap();
    let calls_before = candles.calls().len();
    let path = run_timeframe(&db, &ctx, &Blacklist::default(), 2, &report)
        .unwrap()
        .unwrap();
    let json = read_json(&path);
    let btc_day = json["BTCUSDT"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["day"] == TODAY - 3)
        .unwrap()
        .clone();
    assert_eq!(btc_day["pnl"], 1.5);

    // Only the open position's day is fetched again for BTC.
    let btc_fetch = candles.calls()[calls_before..]
        .iter()
        .find(|(symbol, _, _)| symbol == "BTCUSDT")
        .cloned()
        .unwrap();
    assert_eq!(btc_fetch.1, at(2, 3_600));

    // Other timeframes never see this cache.
    assert_eq!(db.pnl_cache(Timeframe::H1).get("BTCUSDT", TODAY - 3).unwrap(), None);
}
