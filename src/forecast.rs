//! The validated forecast shared by the gateway, the client and the renderer.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Number of entries `keyFactors` must carry.
pub const KEY_FACTOR_COUNT: usize = 4;

/// When the war is expected to end. Ordered from further-out to imminent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineCategory {
    NotSoon,
    Soon,
    VerySoon,
}

impl TimelineCategory {
    pub const ALL: [TimelineCategory; 3] = [
        TimelineCategory::NotSoon,
        TimelineCategory::Soon,
        TimelineCategory::VerySoon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineCategory::NotSoon => "NOT_SOON",
            TimelineCategory::Soon => "SOON",
            TimelineCategory::VerySoon => "VERY_SOON",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimelineCategory::NotSoon => "Not Soon",
            TimelineCategory::Soon => "Soon",
            TimelineCategory::VerySoon => "Very Soon",
        }
    }
}

impl fmt::Display for TimelineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction a key factor pushes the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactorTrend {
    PositiveForUkraine,
    NegativeForUkraine,
    Neutral,
}

impl FactorTrend {
    pub const ALL: [FactorTrend; 3] = [
        FactorTrend::PositiveForUkraine,
        FactorTrend::NegativeForUkraine,
        FactorTrend::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactorTrend::PositiveForUkraine => "POSITIVE_FOR_UKRAINE",
            FactorTrend::NegativeForUkraine => "NEGATIVE_FOR_UKRAINE",
            FactorTrend::Neutral => "NEUTRAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFactor {
    pub title: String,
    pub impact: String,
    pub trend: FactorTrend,
}

/// Percentages for the three long-term outcomes.
///
/// Values are kept exactly as the model produced them. Only the sum is
/// rounded when checked, so `33.4 + 33.3 + 33.3` passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeProbabilities {
    #[serde(serialize_with = "percent")]
    pub ukraine_win: f64,
    #[serde(serialize_with = "percent")]
    pub frozen_conflict: f64,
    #[serde(serialize_with = "percent")]
    pub russia_win: f64,
}

/// Whole percentages go out as JSON integers, anything else as a float.
fn percent<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && *value >= 0.0 && *value <= u32::MAX as f64 {
        serializer.serialize_u64(*value as u64)
    } else {
        serializer.serialize_f64(*value)
    }
}

impl OutcomeProbabilities {
    pub const FIELDS: [&'static str; 3] = ["ukraineWin", "frozenConflict", "russiaWin"];

    pub fn values(&self) -> [f64; 3] {
        [self.ukraine_win, self.frozen_conflict, self.russia_win]
    }

    pub fn rounded_sum(&self) -> f64 {
        self.values().iter().sum::<f64>().round()
    }

    pub fn sums_to_hundred(&self) -> bool {
        self.rounded_sum() == 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

impl Source {
    pub fn new(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.uri.trim().is_empty() && !self.title.trim().is_empty()
    }
}

/// A forecast that passed every structural check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub timeline_category: TimelineCategory,
    pub timeline_justification: String,
    pub key_factors: Vec<KeyFactor>,
    pub outcome_probabilities: OutcomeProbabilities,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Forecast {
    /// Re-check the invariants of an already typed forecast.
    ///
    /// Used on the client side, where the payload arrives as typed JSON
    /// from the gateway and still cannot be trusted.
    pub fn check(&self) -> Result<(), String> {
        if self.timeline_justification.trim().is_empty() {
            return Err("timelineJustification is empty".to_string());
        }
        if self.key_factors.len() != KEY_FACTOR_COUNT {
            return Err(format!(
                "keyFactors has {} entries, expected {}",
                self.key_factors.len(),
                KEY_FACTOR_COUNT
            ));
        }
        for (i, factor) in self.key_factors.iter().enumerate() {
            if factor.title.trim().is_empty() || factor.impact.trim().is_empty() {
                return Err(format!("keyFactors[{}] has empty text", i));
            }
        }
        let probs = self.outcome_probabilities;
        if probs.values().iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err("outcomeProbabilities has a negative or non-finite value".to_string());
        }
        if !probs.sums_to_hundred() {
            return Err(format!(
                "outcomeProbabilities sum to {}, expected 100",
                probs.rounded_sum()
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !source.is_complete() {
                return Err("sources contains an incomplete entry".to_string());
            }
            if !seen.insert(source.uri.as_str()) {
                return Err(format!("sources repeats uri {}", source.uri));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn forecast() -> Forecast {
        Forecast {
            timeline_category: TimelineCategory::NotSoon,
            timeline_justification: "Entrenched positions keep the front static.".to_string(),
            key_factors: vec![
                KeyFactor {
                    title: "Western aid".to_string(),
                    impact: "Sustains Ukrainian defence.".to_string(),
                    trend: FactorTrend::PositiveForUkraine,
                },
                KeyFactor {
                    title: "Manpower".to_string(),
                    impact: "Mobilisation strain on Kyiv.".to_string(),
                    trend: FactorTrend::NegativeForUkraine,
                },
                KeyFactor {
                    title: "Sanctions".to_string(),
                    impact: "Slow erosion of Russian revenue.".to_string(),
                    trend: FactorTrend::PositiveForUkraine,
                },
                KeyFactor {
                    title: "Diplomacy".to_string(),
                    impact: "No talks scheduled.".to_string(),
                    trend: FactorTrend::Neutral,
                },
            ],
            outcome_probabilities: OutcomeProbabilities {
                ukraine_win: 30.0,
                frozen_conflict: 55.0,
                russia_win: 15.0,
            },
            sources: vec![Source::new("https://example.org/a", "Report A")],
        }
    }
}
