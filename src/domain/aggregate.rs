//! Daily PnL aggregation over a trailing window of UTC days.
//!
//! Days are canonical indices (days since 1970-01-01 UTC). Trade PnL is summed
//! unrounded per day and rounded to cents once, when the series is built.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use super::position::RealizedTrade;

pub type DayIndex = i64;

const SECS_PER_DAY: i64 = 86_400;

pub fn day_index(timestamp: i64) -> DayIndex {
    timestamp.div_euclid(SECS_PER_DAY)
}

pub fn day_start(day: DayIndex) -> i64 {
    day * SECS_PER_DAY
}

pub fn day_to_date(day: DayIndex) -> NaiveDate {
    NaiveDate::default() + chrono::Duration::days(day)
}

pub fn date_to_day(date: NaiveDate) -> DayIndex {
    date.signed_duration_since(NaiveDate::default()).num_days()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Inclusive range of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DayIndex,
    pub end: DayIndex,
}

impl DayWindow {
    pub fn new(start: DayIndex, end: DayIndex) -> Self {
        DayWindow { start, end }
    }

    /// `days` days ending at `today` (inclusive) or at the day before.
    pub fn trailing(today: DayIndex, days: u32, include_today: bool) -> Self {
        let end = if include_today { today } else { today - 1 };
        DayWindow {
            start: end - i64::from(days) + 1,
            end,
        }
    }

    pub fn contains(&self, day: DayIndex) -> bool {
        day >= self.start && day <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = DayIndex> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyPnl {
    pub day: DayIndex,
    pub pnl: f64,
}

/// Unrounded PnL per attributed (open) day.
pub fn accumulate(trades: &[RealizedTrade]) -> BTreeMap<DayIndex, f64> {
    let mut by_day: BTreeMap<DayIndex, f64> = BTreeMap::new();
    for trade in trades {
        *by_day.entry(day_index(trade.open_time)).or_insert(0.0) += trade.pnl;
    }
    by_day
}

/// One entry per day of `window`, ascending; inactive days are `0.0`.
pub fn aggregate(trades: &[RealizedTrade], window: DayWindow) -> Vec<DailyPnl> {
    let by_day = accumulate(trades);
    window
        .days()
        .map(|day| DailyPnl {
            day,
            pnl: round2(by_day.get(&day).copied().unwrap_or(0.0)),
        })
        .collect()
}

/// How a day is rendered in the output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayLabel {
    #[default]
    DayOfMonth,
    EpochDay,
}

impl DayLabel {
    pub fn label(self, day: DayIndex) -> i64 {
        match self {
            DayLabel::DayOfMonth => i64::from(day_to_date(day).day()),
            DayLabel::EpochDay => day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown day label {0:?} (expected day_of_month or epoch_day)")]
pub struct DayLabelError(pub String);

impl FromStr for DayLabel {
    type Err = DayLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day_of_month" => Ok(DayLabel::DayOfMonth),
            "epoch_day" => Ok(DayLabel::EpochDay),
            _ => Err(DayLabelError(s.to_string())),
        }
    }
}
