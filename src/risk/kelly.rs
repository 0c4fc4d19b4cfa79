//! Kelly criterion position sizing
//!
//! Converts a signal confidence score into the fraction of the account to
//! put at risk on a single trade.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// How a raw confidence score combines with the Kelly fraction
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ConfidenceScaling {
    /// effective = kelly_fraction * confidence
    #[default]
    Linear,
    /// Confidence is read as win probability `p` against a fixed payoff
    /// ratio `b`: f* = (p*b - q) / b, floored at zero, then scaled by the
    /// Kelly fraction.
    Edge {
        /// Average win divided by average loss
        payoff_ratio: Decimal,
    },
}

/// Kelly criterion calculator
#[derive(Debug, Clone)]
pub struct KellyCalculator {
    /// Kelly fraction (e.g., 0.25 for quarter Kelly)
    pub fraction: Decimal,
    /// Confidence scaling mode
    pub scaling: ConfidenceScaling,
}

impl KellyCalculator {
    /// Create a new Kelly calculator
    pub fn new(fraction: Decimal, scaling: ConfidenceScaling) -> Self {
        Self { fraction, scaling }
    }

    /// Effective fraction of the account to risk for a confidence in [0, 1].
    ///
    /// A confidence of zero always yields zero.
    pub fn effective_fraction(&self, confidence: Decimal) -> Decimal {
        if confidence <= dec!(0) {
            return dec!(0);
        }

        match self.scaling {
            ConfidenceScaling::Linear => self.fraction * confidence,
            ConfidenceScaling::Edge { payoff_ratio } => {
                if payoff_ratio <= dec!(0) {
                    return dec!(0);
                }
                let lose_prob = Decimal::ONE - confidence;
                let full_kelly = (confidence * payoff_ratio - lose_prob) / payoff_ratio;
                (full_kelly * self.fraction).max(dec!(0))
            }
        }
    }
}

impl Default for KellyCalculator {
    fn default() -> Self {
        Self::new(dec!(0.25), ConfidenceScaling::Linear)
    }
}
