//! Per-symbol pipeline and batch fan-out.
//!
//! For each symbol: normalize, debounce, plan legs, fetch candles only for the
//! legs whose open day still needs computing, simulate, aggregate, and merge
//! with cached days. Symbols run on a rayon pool and report back over a channel.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::mpsc;

use tracing::{debug, error, info, warn};

use super::aggregate::{aggregate, day_index, DailyPnl, DayIndex, DayWindow};
use super::candle::Candle;
use super::debounce::debounce;
use super::position::DEFAULT_NOTIONAL;
use super::rules::RuleBook;
use super::signal::{Signal, Timeframe};
use super::simulation::{evaluate_leg, plan_legs, Leg, SimulationParams};
use super::symbol::{normalize_symbol, price_multiplier, Blacklist};
use crate::ports::cache_port::PnlCachePort;
use crate::ports::candle_port::CandlePort;

const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub timeframe: Timeframe,
    pub notional: f64,
    pub window_days: u32,
    pub lookback_days: u32,
    pub include_today: bool,
    /// Wall clock of the run, UTC seconds.
    pub now: i64,
}

impl RunSettings {
    pub fn new(timeframe: Timeframe, now: i64) -> Self {
        RunSettings {
            timeframe,
            notional: DEFAULT_NOTIONAL,
            window_days: 7,
            lookback_days: 8,
            include_today: false,
            now,
        }
    }

    pub fn today(&self) -> DayIndex {
        day_index(self.now)
    }

    pub fn window(&self) -> DayWindow {
        DayWindow::trailing(self.today(), self.window_days, self.include_today)
    }

    /// Earliest signal timestamp loaded for a run.
    pub fn lookback_start(&self) -> i64 {
        self.now - i64::from(self.lookback_days) * SECS_PER_DAY
    }
}

/// Read-only inputs shared by every symbol worker.
pub struct RunContext<'a> {
    pub settings: RunSettings,
    pub rules: &'a RuleBook,
    pub candles: &'a dyn CandlePort,
    pub cache: Option<&'a dyn PnlCachePort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleStatus {
    /// Every day needed was cached; nothing fetched.
    NotNeeded,
    Loaded(usize),
    /// Fetch failed or returned nothing; legs fell back to the no-data rule.
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolReport {
    pub symbol: String,
    pub canonical: String,
    pub series: Vec<DailyPnl>,
    pub trades: usize,
    pub cached_days: usize,
    pub candles: CandleStatus,
}

/// Days of `window` already settled in the cache. Today is never settled.
fn settled_days(
    symbol: &str,
    window: DayWindow,
    today: DayIndex,
    cache: Option<&dyn PnlCachePort>,
) -> HashMap<DayIndex, f64> {
    let Some(cache) = cache else {
        return HashMap::new();
    };
    let mut settled = HashMap::new();
    for day in window.days().filter(|d| *d < today) {
        match cache.get(symbol, day) {
            Ok(Some(pnl)) => {
                settled.insert(day, pnl);
            }
            Ok(None) => {}
            Err(e) => warn!(symbol, day, error = %e, "cache read failed, recomputing day"),
        }
    }
    settled
}

fn load_candles(
    canonical: &str,
    start: i64,
    end: i64,
    port: &dyn CandlePort,
) -> (Vec<Candle>, CandleStatus) {
    match port.fetch_candles(canonical, start, end) {
        Ok(bars) if !bars.is_empty() => {
            let n = bars.len();
            (bars, CandleStatus::Loaded(n))
        }
        Ok(_) => {
            warn!(symbol = canonical, "no candle data, using signal prices");
            (Vec::new(), CandleStatus::Missing)
        }
        Err(e) if e.is_missing_data() => {
            warn!(symbol = canonical, error = %e, "candle fetch failed, using signal prices");
            (Vec::new(), CandleStatus::Missing)
        }
        Err(e) => {
            error!(symbol = canonical, error = %e, "candle source error, using signal prices");
            (Vec::new(), CandleStatus::Missing)
        }
    }
}

/// Store computed days that are final. Nothing is stored when candles were
/// missing, and the open day of a still-open position stays uncached.
fn write_back(
    symbol: &str,
    series: &[DailyPnl],
    settled: &HashMap<DayIndex, f64>,
    legs: &[Leg],
    status: CandleStatus,
    cache: &dyn PnlCachePort,
) {
    if status == CandleStatus::Missing {
        debug!(symbol, "candles missing, results not cached");
        return;
    }
    let open_days: HashSet<DayIndex> = legs
        .iter()
        .filter(|leg| leg.close.is_none())
        .map(|leg| day_index(leg.open.timestamp))
        .collect();

    for entry in series
        .iter()
        .filter(|e| !settled.contains_key(&e.day) && !open_days.contains(&e.day))
    {
        if let Err(e) = cache.put(symbol, entry.day, entry.pnl) {
            warn!(symbol, day = entry.day, error = %e, "cache write failed");
        }
    }
}

/// Simulate one symbol. Never fails: missing data degrades to the no-data rule.
pub fn run_symbol(symbol: &str, signals: &[Signal], ctx: &RunContext<'_>) -> SymbolReport {
    let settings = &ctx.settings;
    let canonical = normalize_symbol(symbol);
    let params = SimulationParams {
        rules: ctx.rules.for_symbol(&canonical),
        notional: settings.notional,
        price_multiplier: price_multiplier(symbol),
    };
    debug!(symbol, canonical = %canonical, "processing");

    let window = settings.window();
    let settled = settled_days(symbol, window, settings.today(), ctx.cache);

    let debounced = debounce(signals, settings.timeframe);
    let legs: Vec<_> = plan_legs(&debounced)
        .into_iter()
        .filter(|leg| {
            let day = day_index(leg.open.timestamp);
            window.contains(day) && !settled.contains_key(&day)
        })
        .collect();

    let (candles, status) = match legs.iter().map(|l| l.open.timestamp).min() {
        Some(first_open) => load_candles(&canonical, first_open, settings.now, ctx.candles),
        None => (Vec::new(), CandleStatus::NotNeeded),
    };

    let trades: Vec<_> = legs
        .iter()
        .flat_map(|leg| evaluate_leg(leg, &candles, &params))
        .collect();

    let series: Vec<DailyPnl> = aggregate(&trades, window)
        .into_iter()
        .map(|computed| match settled.get(&computed.day) {
            Some(&pnl) => DailyPnl {
                day: computed.day,
                pnl,
            },
            None => computed,
        })
        .collect();

    if let Some(cache) = ctx.cache {
        write_back(symbol, &series, &settled, &legs, status, cache);
    }

    debug!(symbol, trades = trades.len(), cached = settled.len(), "finished");
    SymbolReport {
        symbol: symbol.to_string(),
        canonical,
        series,
        trades: trades.len(),
        cached_days: settled.len(),
        candles: status,
    }
}

/// Group signals per symbol, each group timestamp-ascending.
pub fn group_by_symbol(signals: &[Signal]) -> BTreeMap<String, Vec<Signal>> {
    let mut groups: BTreeMap<String, Vec<Signal>> = BTreeMap::new();
    for signal in signals {
        groups
            .entry(signal.symbol.clone())
            .or_default()
            .push(signal.clone());
    }
    for group in groups.values_mut() {
        group.sort_by_key(|s| s.timestamp);
    }
    groups
}

/// One worker per CPU, leaving one for the caller.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Run every non-blacklisted symbol on a pool of `workers` threads.
pub fn run_batch(
    signals: &[Signal],
    blacklist: &Blacklist,
    ctx: &RunContext<'_>,
    workers: usize,
) -> BTreeMap<String, SymbolReport> {
    let groups: Vec<(String, Vec<Signal>)> = group_by_symbol(signals)
        .into_iter()
        .filter(|(symbol, _)| {
            let excluded = blacklist.excludes(symbol);
            if excluded {
                debug!(symbol = %symbol, "blacklisted, skipping");
            }
            !excluded
        })
        .collect();

    info!(
        timeframe = %ctx.settings.timeframe,
        symbols = groups.len(),
        workers,
        "starting simulation"
    );

    let (tx, rx) = mpsc::channel::<SymbolReport>();
    match rayon::ThreadPoolBuilder::new().num_threads(workers.max(1)).build() {
        Ok(pool) => pool.scope(|scope| {
            for (symbol, group) in &groups {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let _ = tx.send(run_symbol(symbol, group, ctx));
                });
            }
        }),
        Err(e) => {
            warn!(error = %e, "worker pool unavailable, running sequentially");
            for (symbol, group) in &groups {
                let _ = tx.send(run_symbol(symbol, group, ctx));
            }
        }
    }
    drop(tx);

    rx.into_iter()
        .map(|report| (report.symbol.clone(), report))
        .collect()
}
