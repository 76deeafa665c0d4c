//! Symbol normalization and the index/FX blacklist.
//!
//! Signals arrive with venue spellings (`BTCUSDT.P` for perpetuals, `1000PEPEUSDT`
//! for 1000× quote-unit contracts). The price feed only knows the canonical pair.

use std::collections::HashSet;

const PERPETUAL_SUFFIX: &str = ".P";

const THOUSAND_X_ALIASES: &[(&str, &str)] = &[
    ("1000BONKUSDT", "BONKUSDT"),
    ("1000FLOKIUSDT", "FLOKIUSDT"),
    ("1000PEPEUSDT", "PEPEUSDT"),
    ("1000SHIBUSDT", "SHIBUSDT"),
];

pub const DEFAULT_BLACKLIST: &[&str] = &[
    "NDX", "SPX", "DJI", "000001", "GBPUSD", "USDJPY", "XAUUSD", "EURUSD", "BZ1!", "NI225",
];

/// Canonical price-feed symbol for a venue symbol. Total: unknown input passes through.
pub fn normalize_symbol(symbol: &str) -> String {
    let stripped = symbol.strip_suffix(PERPETUAL_SUFFIX).unwrap_or(symbol);
    THOUSAND_X_ALIASES
        .iter()
        .find(|(alias, _)| *alias == stripped)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| stripped.to_string())
}

/// Factor aligning feed prices with the signal's price level.
///
/// A `1000`-prefixed venue symbol quotes 1000 units of the base asset, so the
/// canonical feed price must be multiplied by 1000.
pub fn price_multiplier(symbol: &str) -> f64 {
    if symbol.starts_with("1000") {
        1000.0
    } else {
        1.0
    }
}

/// Canonical symbols excluded from simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Blacklist {
    symbols: HashSet<String>,
}

impl Blacklist {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            symbols: symbols
                .into_iter()
                .map(|s| s.as_ref().trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            symbols: HashSet::new(),
        }
    }

    /// Checks the normalized form of `symbol`.
    pub fn excludes(&self, symbol: &str) -> bool {
        self.symbols.contains(&normalize_symbol(symbol))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new(DEFAULT_BLACKLIST)
    }
}
