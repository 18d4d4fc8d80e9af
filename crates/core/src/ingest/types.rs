use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-field tag describing why a ratio is present or absent. Tags the
/// upstream invents beyond these four collapse into `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    Good,
    MissingColumns,
    NoData,
    #[serde(other)]
    Error,
}

/// Per-symbol fundamental ratios. Absent fields are `None`, never silently
/// zero; the classifier owns the zero-coercion policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioSnapshot {
    pub symbol: String,
    pub pe: Option<f64>,
    pub roe: Option<f64>,
    pub npm: Option<f64>,
    pub debt_equity: Option<f64>,
    pub eps: Option<f64>,
    /// Provider-side market-cap estimate in absolute VND.
    pub market_cap_vnd: Option<f64>,
    #[serde(default)]
    pub data_quality: BTreeMap<String, DataQuality>,
}

impl RatioSnapshot {
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            pe: None,
            roe: None,
            npm: None,
            debt_equity: None,
            eps: None,
            market_cap_vnd: None,
            data_quality: BTreeMap::new(),
        }
    }
}

/// Latest technical indicator readings plus named signal strings
/// ("BULLISH: Golden Cross detected", "BEARISH: RSI Overbought", ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub symbol: String,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub rsi14: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    #[serde(default)]
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
