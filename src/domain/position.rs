//! Simulated position state and realized exits.

use super::signal::{Direction, Signal};

pub const DEFAULT_NOTIONAL: f64 = 25_000.0;

pub const HALF: f64 = 0.5;
pub const FULL: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub open_time: i64,
    pub half_closed: bool,
}

impl Position {
    /// Every position carries the same notional exposure.
    pub fn open(signal: &Signal, notional: f64) -> Self {
        Position {
            direction: signal.direction,
            entry_price: signal.price,
            quantity: notional / signal.price,
            open_time: signal.timestamp,
            half_closed: false,
        }
    }

    pub fn remaining_portion(&self) -> f64 {
        if self.half_closed { HALF } else { FULL }
    }

    /// Price moved against the position to `level` (low for buy, high for sell).
    pub fn adverse_reached(&self, high: f64, low: f64, level: f64) -> bool {
        match self.direction {
            Direction::Buy => low <= level,
            Direction::Sell => high >= level,
        }
    }

    /// Price moved in favour of the position to `level`.
    pub fn favorable_reached(&self, high: f64, low: f64, level: f64) -> bool {
        match self.direction {
            Direction::Buy => high >= level,
            Direction::Sell => low <= level,
        }
    }

    pub fn pnl_at(&self, exit_price: f64, portion: f64) -> f64 {
        trade_pnl(
            self.direction,
            self.entry_price,
            exit_price,
            self.quantity,
            portion,
        )
    }
}

/// `(exit - entry) * qty * portion` for buys, mirrored for sells.
pub fn trade_pnl(direction: Direction, entry: f64, exit: f64, quantity: f64, portion: f64) -> f64 {
    let per_unit = match direction {
        Direction::Buy => exit - entry,
        Direction::Sell => entry - exit,
    };
    per_unit * quantity * portion
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit1,
    TakeProfit2,
    Breakeven,
    /// Candle slice ran out; remainder closed at the last close.
    EndOfData,
    /// No candles before the reversing signal; closed at its price.
    NoData,
}

/// One full or partial close. PnL is attributed to the day of `open_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedTrade {
    pub direction: Direction,
    pub open_time: i64,
    pub exit_time: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub portion: f64,
    pub reason: ExitReason,
    pub pnl: f64,
}

impl RealizedTrade {
    pub fn close(
        position: &Position,
        exit_time: i64,
        exit_price: f64,
        portion: f64,
        reason: ExitReason,
    ) -> Self {
        RealizedTrade {
            direction: position.direction,
            open_time: position.open_time,
            exit_time,
            entry_price: position.entry_price,
            exit_price,
            portion,
            reason,
            pnl: position.pnl_at(exit_price, portion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_signal(price: f64) -> Signal {
        Signal {
            symbol: "BTCUSDT".into(),
            timestamp: 1_700_000_000,
            price,
            direction: Direction::Buy,
        }
    }

    #[test]
    fn open_sizes_by_notional() {
        let pos = Position::open(&buy_signal(100.0), DEFAULT_NOTIONAL);
        assert!((pos.quantity - 250.0).abs() < 1e-9);
        assert_eq!(pos.open_time, 1_700_000_000);
        assert!(!pos.half_closed);
        assert!((pos.remaining_portion() - FULL).abs() < f64::EPSILON);
    }

    #[test]
    fn pnl_buy_and_sell() {
        assert!((trade_pnl(Direction::Buy, 100.0, 102.0, 250.0, HALF) - 250.0).abs() < 1e-9);
        assert!((trade_pnl(Direction::Sell, 100.0, 102.0, 250.0, FULL) + 500.0).abs() < 1e-9);
        assert!((trade_pnl(Direction::Sell, 100.0, 97.0, 250.0, HALF) - 375.0).abs() < 1e-9);
    }

    #[test]
    fn adverse_and_favorable_for_buy() {
        let pos = Position::open(&buy_signal(100.0), DEFAULT_NOTIONAL);
        assert!(pos.adverse_reached(101.0, 99.0, 99.0));
        assert!(!pos.adverse_reached(101.0, 99.5, 99.0));
        assert!(pos.favorable_reached(102.0, 99.5, 102.0));
        assert!(!pos.favorable_reached(101.9, 99.5, 102.0));
    }

    #[test]
    fn adverse_and_favorable_for_sell() {
        let mut sig = buy_signal(100.0);
        sig.direction = Direction::Sell;
        let pos = Position::open(&sig, DEFAULT_NOTIONAL);
        assert!(pos.adverse_reached(101.0, 99.0, 101.0));
        assert!(!pos.adverse_reached(100.9, 99.0, 101.0));
        assert!(pos.favorable_reached(100.5, 98.0, 98.0));
    }

    #[test]
    fn realized_trade_keeps_open_time() {
        let mut pos = Position::open(&buy_signal(100.0), DEFAULT_NOTIONAL);
        pos.half_closed = true;
        let t = RealizedTrade::close(&pos, 1_700_090_000, 103.0, HALF, ExitReason::TakeProfit2);
        assert_eq!(t.open_time, 1_700_000_000);
        assert_eq!(t.exit_time, 1_700_090_000);
        assert!((t.pnl - 375.0).abs() < 1e-9);
    }
}
