//! Take-profit / stop-loss ratio configuration.

use std::collections::HashMap;

use super::signal::Direction;

/// Multipliers applied to the entry price of a `buy`. A `sell` mirrors them
/// around the entry (`entry * (2 - ratio)`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetRules {
    pub tp1_ratio: f64,
    pub tp2_ratio: f64,
    pub sl_ratio: f64,
}

impl Default for AssetRules {
    fn default() -> Self {
        AssetRules {
            tp1_ratio: 1.02,
            tp2_ratio: 1.03,
            sl_ratio: 0.99,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("ratios must be positive finite numbers")]
    NotFinite,
    #[error("take-profit ratios must be greater than 1")]
    TargetBelowEntry,
    #[error("tp2_ratio must not be below tp1_ratio")]
    TargetsInverted,
    #[error("sl_ratio must be below 1")]
    StopAboveEntry,
}

/// Absolute exit prices for one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitLevels {
    pub tp1: f64,
    pub tp2: f64,
    pub sl: f64,
}

impl AssetRules {
    pub fn levels(&self, entry: f64, direction: Direction) -> ExitLevels {
        let scale = |ratio: f64| match direction {
            Direction::Buy => entry * ratio,
            Direction::Sell => entry * (2.0 - ratio),
        };
        ExitLevels {
            tp1: scale(self.tp1_ratio),
            tp2: scale(self.tp2_ratio),
            sl: scale(self.sl_ratio),
        }
    }

    /// Targets above 1, stop below 1, tp2 at least as far as tp1.
    pub fn validate(&self) -> Result<(), RulesError> {
        let finite = [self.tp1_ratio, self.tp2_ratio, self.sl_ratio]
            .iter()
            .all(|r| r.is_finite() && *r > 0.0);
        if !finite {
            return Err(RulesError::NotFinite);
        }
        if self.tp1_ratio <= 1.0 || self.tp2_ratio <= 1.0 {
            return Err(RulesError::TargetBelowEntry);
        }
        if self.tp2_ratio < self.tp1_ratio {
            return Err(RulesError::TargetsInverted);
        }
        if self.sl_ratio >= 1.0 {
            return Err(RulesError::StopAboveEntry);
        }
        Ok(())
    }
}

/// Default rules plus per-canonical-symbol overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleBook {
    pub default: AssetRules,
    pub overrides: HashMap<String, AssetRules>,
}

impl RuleBook {
    pub fn new(default: AssetRules) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, symbol: &str, rules: AssetRules) -> Self {
        self.overrides.insert(symbol.to_uppercase(), rules);
        self
    }

    pub fn for_symbol(&self, canonical: &str) -> AssetRules {
        self.overrides
            .get(canonical)
            .copied()
            .unwrap_or(self.default)
    }
}
