//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::CsvCandleAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::aggregate::{DailyPnl, DayLabel, DayLabelError};
use crate::domain::error::SigpnlError;
use crate::domain::rules::{AssetRules, RuleBook};
use crate::domain::runner::{default_worker_count, run_batch, CandleStatus, RunContext, RunSettings};
use crate::domain::signal::{parse_timeframes, Timeframe};
use crate::domain::symbol::{normalize_symbol, price_multiplier, Blacklist};
use crate::ports::candle_port::CandlePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;
use crate::ports::signal_port::SignalPort;

#[derive(Parser, Debug)]
#[command(name = "sigpnl", about = "Daily PnL simulation for trading signals")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate every symbol and write pnl_results_<tf>.json per timeframe
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Repeatable; defaults to [simulation] timeframes
        #[arg(short, long)]
        timeframe: Vec<Timeframe>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        no_cache: bool,
        #[arg(long)]
        clear_cache: bool,
    },
    /// Remove cached daily PnL
    ClearCache {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        timeframe: Option<Timeframe>,
    },
    /// List symbols with signals in the lookback period
    Symbols {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        timeframe: Timeframe,
    },
    /// Print the canonical form and price multiplier of symbols
    Normalize {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            timeframe,
            output,
            no_cache,
            clear_cache,
        } => run_simulation(&config, &timeframe, output.as_deref(), !no_cache, clear_cache),
        Command::ClearCache { config, timeframe } => run_clear_cache(&config, timeframe),
        Command::Symbols { config, timeframe } => run_symbols(&config, timeframe),
        Command::Normalize { symbols } => run_normalize(&symbols),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        error!("{e}");
        ExitCode::from(&e)
    })
}

fn exit_with(err: SigpnlError) -> ExitCode {
    error!("{err}");
    ExitCode::from(&err)
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SigpnlError {
    SigpnlError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: reason.into(),
    }
}

/// Timeframes from the command line, else `[simulation] timeframes`, else the default set.
pub fn resolve_timeframes(
    overrides: &[Timeframe],
    config: &dyn ConfigPort,
) -> Result<Vec<Timeframe>, SigpnlError> {
    if !overrides.is_empty() {
        return Ok(overrides.to_vec());
    }
    let raw = config
        .get_string("simulation", "timeframes")
        .unwrap_or_else(|| "1m,5m,15m,30m,1h".to_string());
    let timeframes =
        parse_timeframes(&raw).map_err(|e| invalid("simulation", "timeframes", e.to_string()))?;
    if timeframes.is_empty() {
        return Err(invalid("simulation", "timeframes", "no timeframes listed"));
    }
    Ok(timeframes)
}

pub fn build_run_settings(
    config: &dyn ConfigPort,
    timeframe: Timeframe,
    now: i64,
) -> Result<RunSettings, SigpnlError> {
    let defaults = RunSettings::new(timeframe, now);

    let notional = config
        .get_double_opt("simulation", "notional")
        .map_err(|e| invalid("simulation", "notional", e))?
        .unwrap_or(defaults.notional);
    if !(notional.is_finite() && notional > 0.0) {
        return Err(invalid("simulation", "notional", "must be a positive number"));
    }

    let window_days = config.get_int("simulation", "window_days", i64::from(defaults.window_days));
    if !(1..=366).contains(&window_days) {
        return Err(invalid("simulation", "window_days", "must be between 1 and 366"));
    }
    let lookback_days =
        config.get_int("simulation", "lookback_days", i64::from(defaults.lookback_days));
    if lookback_days < window_days || lookback_days > 366 {
        return Err(invalid(
            "simulation",
            "lookback_days",
            "must cover window_days and be at most 366",
        ));
    }

    Ok(RunSettings {
        notional,
        window_days: window_days as u32,
        lookback_days: lookback_days as u32,
        include_today: config.get_bool("simulation", "include_today", defaults.include_today),
        ..defaults
    })
}

fn read_rules(
    config: &dyn ConfigPort,
    section: &str,
    base: AssetRules,
) -> Result<AssetRules, SigpnlError> {
    let ratio = |key: &str, fallback: f64| -> Result<f64, SigpnlError> {
        config
            .get_double_opt(section, key)
            .map(|v| v.unwrap_or(fallback))
            .map_err(|e| invalid(section, key, e))
    };
    let rules = AssetRules {
        tp1_ratio: ratio("tp1_ratio", base.tp1_ratio)?,
        tp2_ratio: ratio("tp2_ratio", base.tp2_ratio)?,
        sl_ratio: ratio("sl_ratio", base.sl_ratio)?,
    };
    rules
        .validate()
        .map_err(|e| invalid(section, "ratios", e.to_string()))?;
    Ok(rules)
}

/// `[rules]` defaults plus one `[rules.<SYMBOL>]` section per override.
pub fn build_rule_book(config: &dyn ConfigPort) -> Result<RuleBook, SigpnlError> {
    let default = read_rules(config, "rules", AssetRules::default())?;
    let mut book = RuleBook::new(default);
    for section in config.sections() {
        let Some(symbol) = section.strip_prefix("rules.") else {
            continue;
        };
        if symbol.trim().is_empty() {
            continue;
        }
        let rules = read_rules(config, &section, default)?;
        book = book.with_override(&normalize_symbol(symbol.trim()), rules);
    }
    Ok(book)
}

pub fn build_blacklist(config: &dyn ConfigPort) -> Blacklist {
    match config.get_list("blacklist", "symbols") {
        Some(symbols) => Blacklist::new(symbols),
        None => Blacklist::default(),
    }
}

pub fn build_day_label(config: &dyn ConfigPort) -> Result<DayLabel, SigpnlError> {
    match config.get_string("simulation", "day_label") {
        Some(raw) => raw
            .parse()
            .map_err(|e: DayLabelError| invalid("simulation", "day_label", e.to_string())),
        None => Ok(DayLabel::default()),
    }
}

pub fn worker_count(config: &dyn ConfigPort) -> usize {
    match config.get_int("simulation", "threads", 0) {
        n if n > 0 => n as usize,
        _ => default_worker_count(),
    }
}

pub fn build_report(config: &dyn ConfigPort, output_override: Option<&Path>) -> Result<JsonReportAdapter, SigpnlError> {
    let output_dir = match output_override {
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::from(config.get_string("output", "dir").unwrap_or_else(|| ".".into())),
    };
    let publish_dir = config.get_string("output", "publish_dir").map(PathBuf::from);
    Ok(JsonReportAdapter::new(output_dir, publish_dir, build_day_label(config)?))
}

/// Offline CSV directory when configured, otherwise the HTTP feed.
pub fn build_candle_port(config: &dyn ConfigPort) -> Result<Box<dyn CandlePort>, SigpnlError> {
    if let Some(dir) = config.get_string("candles", "csv_dir") {
        info!(dir = %dir, "reading candles from CSV files");
        return Ok(Box::new(CsvCandleAdapter::new(PathBuf::from(dir))));
    }

    #[cfg(feature = "http")]
    {
        use crate::adapters::http_candle_adapter::HttpCandleAdapter;
        Ok(Box::new(HttpCandleAdapter::from_config(config)?))
    }

    #[cfg(not(feature = "http"))]
    {
        Err(SigpnlError::ConfigMissing {
            section: "candles".into(),
            key: "csv_dir".into(),
        })
    }
}

/// Simulate one timeframe and write its artifact. `Ok(None)` when there were no signals.
pub fn run_timeframe(
    signals: &dyn SignalPort,
    ctx: &RunContext<'_>,
    blacklist: &Blacklist,
    workers: usize,
    report: &dyn ReportPort,
) -> Result<Option<PathBuf>, SigpnlError> {
    let started = Instant::now();
    let timeframe = ctx.settings.timeframe;

    let loaded = signals.fetch_signals(timeframe, ctx.settings.lookback_start())?;
    if loaded.is_empty() {
        info!(%timeframe, "no signals in lookback, skipping");
        return Ok(None);
    }

    let reports = run_batch(&loaded, blacklist, ctx, workers);

    let trades: usize = reports.values().map(|r| r.trades).sum();
    let cached: usize = reports.values().map(|r| r.cached_days).sum();
    let missing = reports
        .values()
        .filter(|r| r.candles == CandleStatus::Missing)
        .count();

    let results: BTreeMap<String, Vec<DailyPnl>> = reports
        .into_iter()
        .map(|(symbol, r)| (symbol, r.series))
        .collect();
    let path = report.write(timeframe, &results)?;
    if let Err(e) = report.publish(&path) {
        warn!(error = %e, "publishing artifact failed");
    }

    info!(
        %timeframe,
        symbols = results.len(),
        trades,
        cached_days = cached,
        missing_candles = missing,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "timeframe complete"
    );
    Ok(Some(path))
}

fn run_simulation(
    config_path: &Path,
    timeframe_overrides: &[Timeframe],
    output_override: Option<&Path>,
    use_cache: bool,
    clear_cache: bool,
) -> ExitCode {
    info!(path = %config_path.display(), "loading config");
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let prepared = (|| -> Result<_, SigpnlError> {
        Ok((
            resolve_timeframes(timeframe_overrides, &config)?,
            build_rule_book(&config)?,
            build_report(&config, output_override)?,
        ))
    })();
    let (timeframes, rules, report) = match prepared {
        Ok(p) => p,
        Err(e) => return exit_with(e),
    };
    let blacklist = build_blacklist(&config);
    let workers = worker_count(&config);
    let use_cache = use_cache && config.get_bool("cache", "enabled", true);
    let clear_cache = clear_cache || config.get_bool("cache", "clear_on_start", false);

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::ports::cache_port::PnlCachePort;

        let result = (|| -> Result<(), SigpnlError> {
            let db = SqliteAdapter::from_config(&config)?;
            db.initialize_schema()?;
            let candles = build_candle_port(&config)?;
            let started = Instant::now();

            for timeframe in timeframes {
                let now = chrono::Utc::now().timestamp();
                let settings = build_run_settings(&config, timeframe, now)?;
                let cache = db.pnl_cache(timeframe);
                if clear_cache {
                    cache.clear()?;
                    info!(%timeframe, "cache cleared");
                }
                let ctx = RunContext {
                    settings,
                    rules: &rules,
                    candles: candles.as_ref(),
                    cache: use_cache.then_some(&cache as &dyn PnlCachePort),
                };
                run_timeframe(&db, &ctx, &blacklist, workers, &report)?;
            }

            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "all timeframes complete"
            );
            Ok(())
        })();

        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => exit_with(e),
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (timeframes, rules, report, blacklist, workers, use_cache, clear_cache);
        error!("sqlite feature is required for run");
        ExitCode::from(1)
    }
}

fn run_clear_cache(config_path: &Path, timeframe: Option<Timeframe>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        use crate::ports::cache_port::PnlCachePort;

        let result = (|| -> Result<(), SigpnlError> {
            let db = SqliteAdapter::from_config(&config)?;
            db.initialize_schema()?;
            match timeframe {
                Some(tf) => {
                    db.pnl_cache(tf).clear()?;
                    info!(timeframe = %tf, "cache cleared");
                }
                None => {
                    let removed = db.clear_all_cache()?;
                    info!(removed, "cache cleared for all timeframes");
                }
            }
            Ok(())
        })();

        match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => exit_with(e),
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config, timeframe);
        error!("sqlite feature is required for clear-cache");
        ExitCode::from(1)
    }
}

/// One line per symbol: raw, canonical, signal count, status.
pub fn symbol_lines(
    signals: &dyn SignalPort,
    timeframe: Timeframe,
    since: i64,
    blacklist: &Blacklist,
) -> Result<Vec<String>, SigpnlError> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for s in signals.fetch_signals(timeframe, since)? {
        *counts.entry(s.symbol).or_default() += 1;
    }
    Ok(counts
        .into_iter()
        .map(|(symbol, count)| {
            let status = if blacklist.excludes(&symbol) {
                "blacklisted"
            } else {
                "active"
            };
            format!("{symbol}\t{}\t{count}\t{status}", normalize_symbol(&symbol))
        })
        .collect())
}

fn run_symbols(config_path: &Path, timeframe: Timeframe) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let result = (|| -> Result<Vec<String>, SigpnlError> {
            let db = SqliteAdapter::from_config(&config)?;
            db.initialize_schema()?;
            let settings =
                build_run_settings(&config, timeframe, chrono::Utc::now().timestamp())?;
            symbol_lines(&db, timeframe, settings.lookback_start(), &build_blacklist(&config))
        })();

        match result {
            Ok(lines) => {
                for line in lines {
                    println!("{line}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => exit_with(e),
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config, timeframe);
        error!("sqlite feature is required for symbols");
        ExitCode::from(1)
    }
}

fn run_normalize(symbols: &[String]) -> ExitCode {
    for symbol in symbols {
        println!(
            "{symbol}\t{}\t{}",
            normalize_symbol(symbol),
            price_multiplier(symbol)
        );
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_cache::MemoryPnlCache;
    use crate::domain::aggregate::{day_start, DayIndex};
    use crate::domain::candle::Candle;
    use crate::domain::signal::{Direction, Signal};
    use crate::ports::cache_port::PnlCachePort;
    use tempfile::TempDir;

    fn config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    struct StaticSignals(Vec<Signal>);

    impl SignalPort for StaticSignals {
        fn fetch_signals(&self, _timeframe: Timeframe, since: i64) -> Result<Vec<Signal>, SigpnlError> {
            Ok(self.0.iter().filter(|s| s.timestamp >= since).cloned().collect())
        }
    }

    struct NoCandles;

    impl CandlePort for NoCandles {
        fn fetch_candles(&self, symbol: &str, _start: i64, _end: i64) -> Result<Vec<Candle>, SigpnlError> {
            Err(SigpnlError::NoData {
                symbol: symbol.to_string(),
            })
        }
    }

    #[test]
    fn settings_defaults() {
        let s = build_run_settings(&config(""), Timeframe::M5, 1_000_000).unwrap();
        assert_eq!(s, RunSettings::new(Timeframe::M5, 1_000_000));
    }

    #[test]
    fn settings_from_config() {
        let cfg = config(
            "[simulation]\nnotional = 1000\nwindow_days = 3\nlookback_days = 4\ninclude_today = true\n",
        );
        let s = build_run_settings(&cfg, Timeframe::H1, 0).unwrap();
        assert_eq!(s.notional, 1000.0);
        assert_eq!(s.window_days, 3);
        assert_eq!(s.lookback_days, 4);
        assert!(s.include_today);
    }

    #[test]
    fn settings_reject_bad_values() {
        for body in [
            "[simulation]\nnotional = -5\n",
            "[simulation]\nnotional = lots\n",
            "[simulation]\nwindow_days = 0\n",
            "[simulation]\nwindow_days = 9\nlookback_days = 8\n",
        ] {
            assert!(
                matches!(
                    build_run_settings(&config(body), Timeframe::M1, 0),
                    Err(SigpnlError::ConfigInvalid { .. })
                ),
                "accepted: {body}"
            );
        }
    }

    #[test]
    fn rule_book_with_overrides() {
        let cfg = config(
            "[rules]\ntp1_ratio = 1.01\n\n[rules.BTCUSDT.P]\nsl_ratio = 0.98\n\n[rules.ethusdt]\ntp2_ratio = 1.05\n",
        );
        let book = build_rule_book(&cfg).unwrap();
        assert_eq!(book.default.tp1_ratio, 1.01);
        assert_eq!(book.default.tp2_ratio, 1.03);

        let btc = book.for_symbol("BTCUSDT");
        assert_eq!(btc.sl_ratio, 0.98);
        assert_eq!(btc.tp1_ratio, 1.01);
        assert_eq!(book.for_symbol("ETHUSDT").tp2_ratio, 1.05);
        assert_eq!(book.for_symbol("SOLUSDT"), book.default);
    }

    #[test]
    fn rule_book_rejects_inverted_stop() {
        let cfg = config("[rules.BTCUSDT]\nsl_ratio = 1.2\n");
        match build_rule_book(&cfg) {
            Err(SigpnlError::ConfigInvalid { section, .. }) => assert_eq!(section, "rules.BTCUSDT"),
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn blacklist_from_config_or_default() {
        assert!(build_blacklist(&config("")).excludes("XAUUSD"));
        let custom = build_blacklist(&config("[blacklist]\nsymbols = dogeusdt, SHIBUSDT\n"));
        assert_eq!(custom.len(), 2);
        assert!(custom.excludes("DOGEUSDT.P"));
        assert!(!custom.excludes("XAUUSD"));
    }

    #[test]
    fn timeframes_resolution_order() {
        let cfg = config("[simulation]\ntimeframes = 15m, 1h\n");
        assert_eq!(
            resolve_timeframes(&[Timeframe::M1], &cfg).unwrap(),
            vec![Timeframe::M1]
        );
        assert_eq!(
            resolve_timeframes(&[], &cfg).unwrap(),
            vec![Timeframe::M15, Timeframe::H1]
        );
        assert_eq!(resolve_timeframes(&[], &config("")).unwrap().len(), 5);
        assert!(resolve_timeframes(&[], &config("[simulation]\ntimeframes = 2m\n")).is_err());
    }

    #[test]
    fn day_label_and_threads() {
        assert_eq!(build_day_label(&config("")).unwrap(), DayLabel::DayOfMonth);
        assert_eq!(
            build_day_label(&config("[simulation]\nday_label = epoch_day\n")).unwrap(),
            DayLabel::EpochDay
        );
        assert!(build_day_label(&config("[simulation]\nday_label = weekday\n")).is_err());
        assert_eq!(worker_count(&config("[simulation]\nthreads = 3\n")), 3);
        assert!(worker_count(&config("")) >= 1);
    }

    #[test]
    fn csv_dir_selects_csv_port() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&format!("[candles]\ncsv_dir = {}\n", dir.path().display()));
        let port = build_candle_port(&cfg).unwrap();
        assert!(matches!(
            port.fetch_candles("BTCUSDT", 0, 10),
            Err(SigpnlError::NoData { .. })
        ));
    }

    const TODAY: DayIndex = 19_900;

    fn sig(symbol: &str, ts: i64, price: f64, direction: Direction) -> Signal {
        Signal {
            symbol: symbol.into(),
            timestamp: ts,
            price,
            direction,
        }
    }

    #[test]
    fn run_timeframe_writes_artifact_without_caching_missing_candles() {
        let out = TempDir::new().unwrap();
        let d = day_start(TODAY - 2);
        let signals = StaticSignals(vec![
            sig("BTCUSDT", d + 60, 100.0, Direction::Buy),
            sig("BTCUSDT", d + 7_200, 110.0, Direction::Sell),
            sig("XAUUSD", d + 60, 2_000.0, Direction::Buy),
        ]);
        let rules = RuleBook::default();
        let cache = MemoryPnlCache::new();
        let ctx = RunContext {
            settings: RunSettings::new(Timeframe::M15, day_start(TODAY) + 600),
            rules: &rules,
            candles: &NoCandles,
            cache: Some(&cache),
        };
        let report = JsonReportAdapter::new(out.path().to_path_buf(), None, DayLabel::EpochDay);

        let path = run_timeframe(&signals, &ctx, &Blacklist::default(), 2, &report)
            .unwrap()
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let series = json["BTCUSDT"].as_array().unwrap();
        assert_eq!(series.len(), 7);
        assert!(json.get("XAUUSD").is_none());

        let day = series
            .iter()
            .find(|e| e["day"] == TODAY - 2)
            .unwrap();
        assert_eq!(day["pnl"], 2_500.0);
        // No candles came back, so the no-data result is reported but not cached.
        assert!(cache.is_empty());
    }

    #[test]
    fn run_timeframe_without_signals_writes_nothing() {
        let out = TempDir::new().unwrap();
        let rules = RuleBook::default();
        let ctx = RunContext {
            settings: RunSettings::new(Timeframe::M1, day_start(TODAY)),
            rules: &rules,
            candles: &NoCandles,
            cache: None,
        };
        let report = JsonReportAdapter::new(out.path().to_path_buf(), None, DayLabel::DayOfMonth);
        let written = run_timeframe(&StaticSignals(Vec::new()), &ctx, &Blacklist::empty(), 1, &report)
            .unwrap();
        assert_eq!(written, None);
        assert!(!out.path().join("pnl_results_1m.json").exists());
    }

    #[test]
    fn symbol_lines_mark_blacklisted() {
        let signals = StaticSignals(vec![
            sig("1000PEPEUSDT.P", 10, 1.0, Direction::Buy),
            sig("1000PEPEUSDT.P", 20, 1.0, Direction::Sell),
            sig("NDX", 10, 1.0, Direction::Buy),
        ]);
        let lines = symbol_lines(&signals, Timeframe::M1, 0, &Blacklist::default()).unwrap();
        assert_eq!(
            lines,
            vec![
                "1000PEPEUSDT.P\tPEPEUSDT\t2\tactive".to_string(),
                "NDX\tNDX\t1\tblacklisted".to_string(),
            ]
        );
    }
}
