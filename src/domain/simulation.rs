//! Trade simulation over debounced signals and candles.
//!
//! Which positions exist is decided by the signals alone: a position opens on
//! the first signal, same-direction signals are ignored, and an opposite signal
//! closes it and opens the reverse. [`plan_legs`] captures that. The candles
//! only decide *how* each leg exits (stop-loss, two-stage take-profit with a
//! breakeven stop, or fallback closes), which [`evaluate_leg`] walks bar by bar.

use super::candle::{slice_between, slice_from, Candle};
use super::position::{ExitReason, Position, RealizedTrade, DEFAULT_NOTIONAL, FULL, HALF};
use super::rules::AssetRules;
use super::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    pub rules: AssetRules,
    pub notional: f64,
    /// Applied to every candle price before comparison (1000× feeds).
    pub price_multiplier: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            rules: AssetRules::default(),
            notional: DEFAULT_NOTIONAL,
            price_multiplier: 1.0,
        }
    }
}

/// One position lifetime: the opening signal and the reversing signal, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub open: Signal,
    pub close: Option<Signal>,
}

/// Walk the signal sequence through the NoPosition / PositionOpen states.
pub fn plan_legs(signals: &[Signal]) -> Vec<Leg> {
    let mut legs = Vec::new();
    let mut current: Option<&Signal> = None;

    for signal in signals {
        match current {
            None => current = Some(signal),
            Some(open) if open.direction == signal.direction => {}
            Some(open) => {
                legs.push(Leg {
                    open: open.clone(),
                    close: Some(signal.clone()),
                });
                current = Some(signal);
            }
        }
    }

    if let Some(open) = current {
        legs.push(Leg {
            open: open.clone(),
            close: None,
        });
    }
    legs
}

/// Realized exits of one leg.
///
/// A closed leg is evaluated on candles in `[open, close)`; the final open leg
/// on every candle from its open time. With no usable candles a closed leg
/// exits in full at the reversing signal's price and an open leg yields nothing.
pub fn evaluate_leg(leg: &Leg, candles: &[Candle], params: &SimulationParams) -> Vec<RealizedTrade> {
    let position = Position::open(&leg.open, params.notional);
    let window = match &leg.close {
        Some(close) => slice_between(candles, leg.open.timestamp, close.timestamp),
        None => slice_from(candles, leg.open.timestamp),
    };

    let bars: Vec<Candle> = window
        .iter()
        .map(|c| c.scaled(params.price_multiplier))
        .filter(Candle::is_well_formed)
        .collect();

    if bars.is_empty() {
        return match &leg.close {
            Some(close) => vec![RealizedTrade::close(
                &position,
                close.timestamp,
                close.price,
                FULL,
                ExitReason::NoData,
            )],
            None => Vec::new(),
        };
    }

    walk_exits(position, &bars, &params.rules)
}

/// Apply the exit ladder to already-scaled bars. At most one level fires per bar.
fn walk_exits(mut position: Position, bars: &[Candle], rules: &AssetRules) -> Vec<RealizedTrade> {
    let levels = rules.levels(position.entry_price, position.direction);
    let mut trades = Vec::with_capacity(2);

    for bar in bars {
        if !position.half_closed {
            // Adverse fill first when both the stop and tp1 sit inside the bar.
            if position.adverse_reached(bar.high, bar.low, levels.sl) {
                trades.push(RealizedTrade::close(
                    &position,
                    bar.timestamp,
                    levels.sl,
                    FULL,
                    ExitReason::StopLoss,
                ));
                return trades;
            }
            if position.favorable_reached(bar.high, bar.low, levels.tp1) {
                trades.push(RealizedTrade::close(
                    &position,
                    bar.timestamp,
                    levels.tp1,
                    HALF,
                    ExitReason::TakeProfit1,
                ));
                position.half_closed = true;
            }
        } else {
            let entry = position.entry_price;
            if position.adverse_reached(bar.high, bar.low, entry) {
                trades.push(RealizedTrade::close(
                    &position,
                    bar.timestamp,
                    entry,
                    HALF,
                    ExitReason::Breakeven,
                ));
                return trades;
            }
            if position.favorable_reached(bar.high, bar.low, levels.tp2) {
                trades.push(RealizedTrade::close(
                    &position,
                    bar.timestamp,
                    levels.tp2,
                    HALF,
                    ExitReason::TakeProfit2,
                ));
                return trades;
            }
        }
    }

    if let Some(last) = bars.last() {
        trades.push(RealizedTrade::close(
            &position,
            last.timestamp,
            last.close,
            position.remaining_portion(),
            ExitReason::EndOfData,
        ));
    }
    trades
}

/// Realized trades for a symbol's debounced signals, in leg order.
pub fn simulate(signals: &[Signal], candles: &[Candle], params: &SimulationParams) -> Vec<RealizedTrade> {
    simulate_selected(signals, candles, params, |_| true)
}

/// Like [`simulate`] but only legs accepted by `keep` are evaluated.
pub fn simulate_selected<F>(
    signals: &[Signal],
    candles: &[Candle],
    params: &SimulationParams,
    keep: F,
) -> Vec<RealizedTrade>
where
    F: Fn(&Leg) -> bool,
{
    plan_legs(signals)
        .iter()
        .filter(|leg| keep(leg))
        .flat_map(|leg| evaluate_leg(leg, candles, params))
        .collect()
}
