//! Traffic-light tiering of a final score.
//!
//! Pure functions of the score alone: no transactions, no engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest score in the Green tier.
pub const GREEN_THRESHOLD: u8 = 90;
/// Lowest score in the Amber tier.
pub const AMBER_THRESHOLD: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Red,
    Amber,
    Green,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Green => "Excellent",
            Self::Amber => "Good",
            Self::Red => "Needs Improvement",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Green => "Outstanding financial management!",
            Self::Amber => "Good financial habits with room for improvement",
            Self::Red => "Significant opportunities for financial optimization",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Self::Green => "Green",
            Self::Amber => "Amber",
            Self::Red => "Red",
        }
    }

    pub fn is_reward_eligible(&self) -> bool {
        matches!(self, Self::Green)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.color())
    }
}

/// Classify a final score.
pub fn classify(score: u8) -> Tier {
    if score >= GREEN_THRESHOLD {
        Tier::Green
    } else if score >= AMBER_THRESHOLD {
        Tier::Amber
    } else {
        Tier::Red
    }
}

pub fn score_label(score: u8) -> &'static str {
    classify(score).label()
}

pub fn score_color(score: u8) -> &'static str {
    classify(score).color()
}

/// Tier plus its display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierInfo {
    #[serde(rename = "color")]
    pub tier: Tier,
    pub label: String,
    pub description: String,
    pub green_reward_eligible: bool,
}

impl From<Tier> for TierInfo {
    fn from(tier: Tier) -> Self {
        Self {
            tier,
            label: tier.label().to_string(),
            description: tier.description().to_string(),
            green_reward_eligible: tier.is_reward_eligible(),
        }
    }
}

impl TierInfo {
    pub fn for_score(score: u8) -> Self {
        classify(score).into()
    }
}
