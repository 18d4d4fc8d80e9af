pub mod metrics;

use crate::domain::classification::{
    ClassificationRecord, ComponentScores, Exchange, GrowthCategory, GrowthClassification,
    MarketCapCategory, MarketCapClassification, MomentumCategory, MomentumClassification,
    OverallRating, RatingBand, RiskCategory, RiskClassification,
};
use crate::ingest::types::{RatioSnapshot, TechnicalSnapshot};
use chrono::{DateTime, Utc};

use metrics::round2;

const MEGA_CAP_VND: f64 = 100_000_000_000_000.0;
const LARGE_CAP_VND: f64 = 10_000_000_000_000.0;
const MID_CAP_VND: f64 = 1_000_000_000_000.0;

const GROWTH_WEIGHT: f64 = 0.4;
const RISK_WEIGHT: f64 = 0.3;
const MOMENTUM_WEIGHT: f64 = 0.3;

/// Everything the classifier needs for one symbol. Volatility and market cap
/// are pre-computed by the caller so this stays a pure function set.
#[derive(Debug, Clone)]
pub struct ClassifierInput<'a> {
    pub ratios: &'a RatioSnapshot,
    pub technical: Option<&'a TechnicalSnapshot>,
    /// Annualized stdev of daily returns, in percent.
    pub volatility_pct: f64,
    /// Estimated market cap in absolute VND; 0.0 when unknown.
    pub market_cap_vnd: f64,
}

pub fn classify(
    symbol: &str,
    exchange: Exchange,
    input: ClassifierInput<'_>,
    scan_timestamp: DateTime<Utc>,
) -> ClassificationRecord {
    let growth = classify_growth(input.ratios);
    let risk = classify_risk(input.ratios, input.volatility_pct);
    let market_cap = classify_market_cap(input.market_cap_vnd);
    let momentum = classify_momentum(input.technical);
    let overall_rating = overall_rating(growth.score, risk.risk_score, momentum.momentum_score);

    ClassificationRecord {
        symbol: symbol.to_ascii_uppercase(),
        exchange,
        growth,
        risk,
        market_cap,
        momentum,
        overall_rating,
        scan_timestamp,
    }
}

// Absent ratios are coerced to 0 before the comparisons below. This mirrors
// the upstream scoring behavior and is load-bearing: do not "fix" it without
// reclassifying the whole cache.
fn coerce(v: Option<f64>) -> f64 {
    v.unwrap_or(0.0)
}

// The PE guard treats 0 as "absent": a missing PE passes every cap, a
// negative PE fails them all.
fn pe_under(pe: f64, cap: f64) -> bool {
    pe == 0.0 || (pe > 0.0 && pe < cap)
}

/// Growth decision ladder, first match wins.
pub fn classify_growth(ratios: &RatioSnapshot) -> GrowthClassification {
    let roe = coerce(ratios.roe);
    let pe = coerce(ratios.pe);
    let npm = coerce(ratios.npm);

    let (category, score) = if roe > 20.0 && pe_under(pe, 25.0) && npm > 15.0 {
        (GrowthCategory::HighGrowth, 9.0)
    } else if roe > 15.0 && pe_under(pe, 20.0) {
        (GrowthCategory::Growth, 7.0)
    } else if roe > 10.0 && pe_under(pe, 15.0) {
        (GrowthCategory::Stable, 6.0)
    } else if pe > 0.0 && pe < 10.0 {
        (GrowthCategory::Value, 5.0)
    } else if roe < 0.0 {
        (GrowthCategory::Distressed, 1.0)
    } else {
        (GrowthCategory::Neutral, 4.0)
    };

    GrowthClassification {
        category,
        score,
        description: category.description().to_string(),
        roe: round2(roe),
        pe: round2(pe),
        npm: round2(npm),
    }
}

/// Risk decision ladder, first match wins. `risk_score` is higher = riskier;
/// it is inverted only inside the overall rating.
pub fn classify_risk(ratios: &RatioSnapshot, volatility_pct: f64) -> RiskClassification {
    let roe = coerce(ratios.roe);
    let de = coerce(ratios.debt_equity);

    let (category, risk_score) = if volatility_pct < 20.0 && de < 1.0 && roe > 15.0 {
        (RiskCategory::LowRisk, 2.0)
    } else if volatility_pct < 40.0 && de < 2.0 && roe > 5.0 {
        (RiskCategory::MediumRisk, 5.0)
    } else if volatility_pct < 60.0 && de < 3.0 {
        (RiskCategory::HighRisk, 8.0)
    } else {
        (RiskCategory::VeryHighRisk, 10.0)
    };

    RiskClassification {
        category,
        risk_score,
        description: category.description().to_string(),
        volatility_pct: round2(volatility_pct),
        debt_equity: round2(de),
    }
}

pub fn classify_market_cap(market_cap_vnd: f64) -> MarketCapClassification {
    let (category, tier) = if market_cap_vnd >= MEGA_CAP_VND {
        (MarketCapCategory::MegaCap, 1)
    } else if market_cap_vnd >= LARGE_CAP_VND {
        (MarketCapCategory::LargeCap, 2)
    } else if market_cap_vnd >= MID_CAP_VND {
        (MarketCapCategory::MidCap, 3)
    } else {
        (MarketCapCategory::SmallCap, 4)
    };

    MarketCapClassification {
        category,
        tier,
        description: category.description().to_string(),
        market_cap_value: market_cap_vnd,
        market_cap_trillion: round2(market_cap_vnd / MID_CAP_VND),
    }
}

/// Momentum from named signal strings. Absent or unusable technical data is
/// a neutral `unknown`, not a failure.
pub fn classify_momentum(technical: Option<&TechnicalSnapshot>) -> MomentumClassification {
    let Some(technical) = technical else {
        return MomentumClassification {
            category: MomentumCategory::Unknown,
            momentum_score: 5.0,
            description: MomentumCategory::Unknown.description().to_string(),
            bullish_signals: Vec::new(),
            bearish_signals: Vec::new(),
        };
    };

    let mut bullish_signals = Vec::new();
    let mut bearish_signals = Vec::new();
    for signal in &technical.signals {
        let lower = signal.to_lowercase();
        if lower.contains("bullish") || lower.contains("buy") {
            bullish_signals.push(signal.clone());
        } else if lower.contains("bearish") || lower.contains("sell") {
            bearish_signals.push(signal.clone());
        }
    }

    // Bullish rungs are checked before bearish rungs.
    let (category, momentum_score) = if bullish_signals.len() >= 3 {
        (MomentumCategory::StrongUptrend, 9.0)
    } else if bullish_signals.len() >= 2 {
        (MomentumCategory::Uptrend, 7.0)
    } else if bearish_signals.len() >= 3 {
        (MomentumCategory::StrongDowntrend, 1.0)
    } else if bearish_signals.len() >= 2 {
        (MomentumCategory::Downtrend, 3.0)
    } else {
        (MomentumCategory::Sideways, 5.0)
    };

    MomentumClassification {
        category,
        momentum_score,
        description: category.description().to_string(),
        bullish_signals,
        bearish_signals,
    }
}

/// Weighted combination of the component scores; the risk score is inverted
/// here so that lower risk contributes positively.
pub fn overall_rating(growth_score: f64, risk_score: f64, momentum_score: f64) -> OverallRating {
    let risk_adjusted = 10.0 - risk_score;
    let total = round2(
        growth_score * GROWTH_WEIGHT
            + risk_adjusted * RISK_WEIGHT
            + momentum_score * MOMENTUM_WEIGHT,
    );
    let rating = RatingBand::from_score(total);

    OverallRating {
        score: total,
        rating,
        recommendation: rating.recommendation().to_string(),
        component_scores: ComponentScores {
            growth: growth_score,
            risk_adjusted: round2(risk_adjusted),
            momentum: momentum_score,
        },
    }
}
