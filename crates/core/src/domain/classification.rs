use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    Hose,
    Hnx,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Hose => "HOSE",
            Exchange::Hnx => "HNX",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HOSE" => Ok(Exchange::Hose),
            "HNX" => Ok(Exchange::Hnx),
            other => anyhow::bail!("unknown exchange: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthCategory {
    HighGrowth,
    Growth,
    Stable,
    Value,
    Distressed,
    Neutral,
}

impl GrowthCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthCategory::HighGrowth => "high_growth",
            GrowthCategory::Growth => "growth",
            GrowthCategory::Stable => "stable",
            GrowthCategory::Value => "value",
            GrowthCategory::Distressed => "distressed",
            GrowthCategory::Neutral => "neutral",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            GrowthCategory::HighGrowth => "Strong growth, good outlook",
            GrowthCategory::Growth => "Steady growth",
            GrowthCategory::Stable => "Stable, good dividends",
            GrowthCategory::Value => "Cheap, potential reversal",
            GrowthCategory::Distressed => "Distressed, high risk",
            GrowthCategory::Neutral => "Neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    LowRisk,
    MediumRisk,
    HighRisk,
    VeryHighRisk,
}

impl RiskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::LowRisk => "low_risk",
            RiskCategory::MediumRisk => "medium_risk",
            RiskCategory::HighRisk => "high_risk",
            RiskCategory::VeryHighRisk => "very_high_risk",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RiskCategory::LowRisk => "Low risk, safe",
            RiskCategory::MediumRisk => "Medium risk",
            RiskCategory::HighRisk => "High risk",
            RiskCategory::VeryHighRisk => "Very high risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCapCategory {
    MegaCap,
    LargeCap,
    MidCap,
    SmallCap,
}

impl MarketCapCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCapCategory::MegaCap => "mega_cap",
            MarketCapCategory::LargeCap => "large_cap",
            MarketCapCategory::MidCap => "mid_cap",
            MarketCapCategory::SmallCap => "small_cap",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MarketCapCategory::MegaCap => "Mega cap",
            MarketCapCategory::LargeCap => "Large cap blue-chip",
            MarketCapCategory::MidCap => "Mid cap",
            MarketCapCategory::SmallCap => "Small cap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumCategory {
    StrongUptrend,
    Uptrend,
    Sideways,
    Downtrend,
    StrongDowntrend,
    Unknown,
}

impl MomentumCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MomentumCategory::StrongUptrend => "strong_uptrend",
            MomentumCategory::Uptrend => "uptrend",
            MomentumCategory::Sideways => "sideways",
            MomentumCategory::Downtrend => "downtrend",
            MomentumCategory::StrongDowntrend => "strong_downtrend",
            MomentumCategory::Unknown => "unknown",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MomentumCategory::StrongUptrend => "Strong uptrend",
            MomentumCategory::Uptrend => "Uptrend",
            MomentumCategory::Sideways => "Sideways",
            MomentumCategory::Downtrend => "Downtrend",
            MomentumCategory::StrongDowntrend => "Strong downtrend",
            MomentumCategory::Unknown => "Insufficient technical data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RatingBand {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl RatingBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            RatingBand::APlus
        } else if score >= 7.0 {
            RatingBand::A
        } else if score >= 6.0 {
            RatingBand::B
        } else if score >= 5.0 {
            RatingBand::C
        } else if score >= 4.0 {
            RatingBand::D
        } else {
            RatingBand::F
        }
    }

    /// Lower bound of the band's score interval, used for `min_rating` filters.
    pub fn min_score(&self) -> f64 {
        match self {
            RatingBand::APlus => 8.0,
            RatingBand::A => 7.0,
            RatingBand::B => 6.0,
            RatingBand::C => 5.0,
            RatingBand::D => 4.0,
            RatingBand::F => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RatingBand::APlus => "A+",
            RatingBand::A => "A",
            RatingBand::B => "B",
            RatingBand::C => "C",
            RatingBand::D => "D",
            RatingBand::F => "F",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RatingBand::APlus => "Strong Buy",
            RatingBand::A => "Buy",
            RatingBand::B => "Hold/Accumulate",
            RatingBand::C => "Hold",
            RatingBand::D => "Watch",
            RatingBand::F => "Avoid",
        }
    }
}

impl fmt::Display for RatingBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RatingBand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A+" => Ok(RatingBand::APlus),
            "A" => Ok(RatingBand::A),
            "B" => Ok(RatingBand::B),
            "C" => Ok(RatingBand::C),
            "D" => Ok(RatingBand::D),
            "F" => Ok(RatingBand::F),
            other => anyhow::bail!("unknown rating band: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthClassification {
    pub category: GrowthCategory,
    pub score: f64,
    pub description: String,
    pub roe: f64,
    pub pe: f64,
    pub npm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskClassification {
    pub category: RiskCategory,
    /// Higher = riskier, unlike the other component scores.
    pub risk_score: f64,
    pub description: String,
    pub volatility_pct: f64,
    pub debt_equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCapClassification {
    pub category: MarketCapCategory,
    pub tier: u8,
    pub description: String,
    pub market_cap_value: f64,
    pub market_cap_trillion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumClassification {
    pub category: MomentumCategory,
    pub momentum_score: f64,
    pub description: String,
    pub bullish_signals: Vec<String>,
    pub bearish_signals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub growth: f64,
    pub risk_adjusted: f64,
    pub momentum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallRating {
    pub score: f64,
    pub rating: RatingBand,
    pub recommendation: String,
    pub component_scores: ComponentScores,
}

/// The unit of cache storage; exists only after a fully successful
/// end-to-end classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub symbol: String,
    pub exchange: Exchange,
    pub growth: GrowthClassification,
    pub risk: RiskClassification,
    pub market_cap: MarketCapClassification,
    pub momentum: MomentumClassification,
    pub overall_rating: OverallRating,
    pub scan_timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_round_trips_through_serde() {
        let v = serde_json::to_value(Exchange::Hose).unwrap();
        assert_eq!(v, serde_json::json!("HOSE"));
        let back: Exchange = serde_json::from_value(v).unwrap();
        assert_eq!(back, Exchange::Hose);
    }

    #[test]
    fn rating_band_serializes_with_plus_sign() {
        let v = serde_json::to_value(RatingBand::APlus).unwrap();
        assert_eq!(v, serde_json::json!("A+"));
        assert_eq!("A+".parse::<RatingBand>().unwrap(), RatingBand::APlus);
    }

    #[test]
    fn categories_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_value(GrowthCategory::HighGrowth).unwrap(),
            serde_json::json!("high_growth")
        );
        assert_eq!(
            serde_json::to_value(RiskCategory::VeryHighRisk).unwrap(),
            serde_json::json!("very_high_risk")
        );
        assert_eq!(
            serde_json::to_value(MomentumCategory::StrongDowntrend).unwrap(),
            serde_json::json!("strong_downtrend")
        );
    }
}
