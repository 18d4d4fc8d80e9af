use crate::config::Settings;
use crate::ingest::types::{OhlcvBar, RatioSnapshot, TechnicalSnapshot};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RATIOS_PATH: &str = "/v1/ratios";
const DEFAULT_TECHNICAL_PATH: &str = "/v1/technical";
const DEFAULT_HISTORY_PATH: &str = "/v1/history";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network/upstream failure. Per-symbol: skip and continue.
    Unavailable,
    /// A required ratio/indicator is absent upstream.
    InsufficientData,
    /// Caller error; fails fast, never retried.
    InvalidSymbol,
}

#[derive(Debug, Clone)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub symbol: String,
    pub detail: String,
}

impl ProviderError {
    pub fn unavailable(symbol: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Unavailable,
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }

    pub fn insufficient_data(symbol: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::InsufficientData,
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }

    pub fn invalid_symbol(symbol: &str) -> Self {
        Self {
            kind: ProviderErrorKind::InvalidSymbol,
            symbol: symbol.to_string(),
            detail: "symbol must be 1-10 ASCII alphanumeric characters".to_string(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "provider error (kind={:?}, symbol={}): {}",
            self.kind, self.symbol, self.detail
        )
    }
}

impl std::error::Error for ProviderError {}

/// Symbols are short uppercase tickers (VCB, FPT, L14). Anything else is a
/// caller error and must not reach the upstream provider.
pub fn validate_symbol(symbol: &str) -> Result<String, ProviderError> {
    let s = symbol.trim().to_ascii_uppercase();
    if s.is_empty() || s.len() > 10 || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(ProviderError::invalid_symbol(symbol));
    }
    Ok(s)
}

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn get_ratios(&self, symbol: &str) -> Result<RatioSnapshot, ProviderError>;

    async fn get_technical(
        &self,
        symbol: &str,
        period_days: u32,
    ) -> Result<TechnicalSnapshot, ProviderError>;

    async fn get_price_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonMarketData {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpJsonMarketData {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_data_provider_base_url()?.to_string();
        let api_key = settings.data_provider_api_key.clone();

        let timeout_secs = std::env::var("DATA_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn url(&self, path: &str, symbol: &str) -> String {
        format!("{}{}/{}", self.base_url.trim_end_matches('/'), path, symbol)
    }

    fn headers(&self, symbol: &str) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| ProviderError::unavailable(symbol, format!("bad api key: {e}")))?;
            headers.insert("x-api-key", value);
        }
        Ok(headers)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        symbol: &str,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let headers = self.headers(symbol)?;

        let res = self
            .http
            .get(&url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(symbol, format!("request failed: {e}")))?;

        let status = res.status();
        let text = res.text().await.map_err(|e| {
            ProviderError::unavailable(symbol, format!("failed to read response: {e}"))
        })?;

        match status {
            StatusCode::NOT_FOUND => Err(ProviderError::invalid_symbol(symbol)),
            StatusCode::NO_CONTENT => Err(ProviderError::insufficient_data(
                symbol,
                "provider returned no content",
            )),
            s if !s.is_success() => Err(ProviderError::unavailable(
                symbol,
                format!("provider HTTP {s}: {text}"),
            )),
            _ => serde_json::from_str::<T>(&text).map_err(|e| {
                ProviderError::unavailable(symbol, format!("invalid provider JSON: {e}"))
            }),
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for HttpJsonMarketData {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn get_ratios(&self, symbol: &str) -> Result<RatioSnapshot, ProviderError> {
        let symbol = validate_symbol(symbol)?;
        let url = self.url(DEFAULT_RATIOS_PATH, &symbol);
        let mut snapshot: RatioSnapshot = self.fetch_json(&symbol, url, &[]).await?;
        snapshot.symbol = symbol;
        Ok(snapshot)
    }

    async fn get_technical(
        &self,
        symbol: &str,
        period_days: u32,
    ) -> Result<TechnicalSnapshot, ProviderError> {
        let symbol = validate_symbol(symbol)?;
        let url = self.url(DEFAULT_TECHNICAL_PATH, &symbol);
        let query = [("period_days", period_days.to_string())];
        let mut snapshot: TechnicalSnapshot = self.fetch_json(&symbol, url, &query).await?;
        snapshot.symbol = symbol;
        Ok(snapshot)
    }

    async fn get_price_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, ProviderError> {
        let symbol = validate_symbol(symbol)?;
        let url = self.url(DEFAULT_HISTORY_PATH, &symbol);
        let query = [("start", start.to_string()), ("end", end.to_string())];
        self.fetch_json(&symbol, url, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_and_uppercases_symbols() {
        assert_eq!(validate_symbol(" vcb ").unwrap(), "VCB");
        assert_eq!(validate_symbol("L14").unwrap(), "L14");

        let err = validate_symbol("VN-INDEX").unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidSymbol);
        assert_eq!(
            validate_symbol("").unwrap_err().kind,
            ProviderErrorKind::InvalidSymbol
        );
    }

    #[test]
    fn parses_ratio_snapshot_with_absent_fields() {
        let v = json!({
            "symbol": "VCB",
            "pe": 18.0,
            "roe": 22.0,
            "npm": null,
            "debt_equity": 0.6,
            "eps": null,
            "market_cap_vnd": 450_000_000_000_000.0,
            "data_quality": {"PE": "good", "NPM": "no_data"}
        });

        let parsed: RatioSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.pe, Some(18.0));
        assert_eq!(parsed.npm, None);
        assert_eq!(
            parsed.data_quality.get("NPM").copied(),
            Some(crate::ingest::types::DataQuality::NoData)
        );
    }

    #[test]
    fn unrecognized_quality_tags_collapse_to_error() {
        let v = json!({
            "symbol": "VCB",
            "pe": null, "roe": null, "npm": null,
            "debt_equity": null, "eps": null, "market_cap_vnd": null,
            "data_quality": {"ROE": "zero_equity"}
        });

        let parsed: RatioSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(
            parsed.data_quality.get("ROE").copied(),
            Some(crate::ingest::types::DataQuality::Error)
        );
    }

    #[test]
    fn parses_technical_snapshot_signals() {
        let v = json!({
            "symbol": "FPT",
            "ma50": 91_000.0,
            "ma200": 85_500.0,
            "rsi14": 62.1,
            "macd_line": 1.2,
            "macd_signal": 0.8,
            "macd_histogram": 0.4,
            "signals": ["BULLISH: Golden Cross detected", "BULLISH: MACD above Signal"]
        });

        let parsed: TechnicalSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.signals.len(), 2);
        assert_eq!(parsed.rsi14, Some(62.1));
    }
}
