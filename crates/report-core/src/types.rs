use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Listed market a KRX identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Kospi => "KOSPI",
            Market::Kosdaq => "KOSDAQ",
        }
    }

    /// Korean display name used in report text
    pub fn korean_name(&self) -> &'static str {
        match self {
            Market::Kospi => "코스피",
            Market::Kosdaq => "코스닥",
        }
    }

    /// KRX index code of the market's composite index
    pub fn index_code(&self) -> &'static str {
        match self {
            Market::Kospi => "1001",
            Market::Kosdaq => "2001",
        }
    }

    /// Market-map page of the market on the Hankyung markets site
    pub fn map_url(&self) -> &'static str {
        match self {
            Market::Kospi => "https://markets.hankyung.com/marketmap/kospi",
            Market::Kosdaq => "https://markets.hankyung.com/marketmap/kosdaq",
        }
    }

    /// Parse a market name as KRX spells it (`KOSPI`, `KOSDAQ`) or as a user types it
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kospi" | "stk" | "코스피" => Some(Market::Kospi),
            "kosdaq" | "ksq" | "코스닥" => Some(Market::Kosdaq),
            _ => None,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A listed company as the data source names it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// 6-digit short code, e.g. `005930`
    pub code: String,
    /// 12-character ISIN, e.g. `KR7005930003`
    pub isin: String,
    pub name: String,
    pub market: Market,
}

/// User request, created per incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Company(String),
    MarketOverview(Market),
}

const MARKET_OVERVIEW_TOKENS: &[&str] = &["market", "시장", "시장현황", "시장 현황"];

impl Query {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lowered = trimmed.to_lowercase();
        if MARKET_OVERVIEW_TOKENS.contains(&lowered.as_str()) {
            Query::MarketOverview(Market::Kospi)
        } else {
            Query::Company(trimmed.to_string())
        }
    }
}

/// One trading day of OHLCV data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Daily valuation row (PER/PBR/EPS/BPS/dividend yield) for one trading date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationRow {
    pub date: NaiveDate,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub eps: Option<f64>,
    pub bps: Option<f64>,
    pub dividend_yield: Option<f64>,
}

/// Most-recent-business-day figures for one identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub identifier: Identifier,
    pub as_of: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub eps: Option<f64>,
    pub bps: Option<f64>,
    pub dividend_yield: Option<f64>,
}

/// Latest close of a market's composite index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub market: Market,
    pub as_of: NaiveDate,
    pub close: f64,
}

/// Ascending daily bars for one identifier, only used for charting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub identifier: Identifier,
    pub bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Image attached to an outbound report
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub caption: String,
}

/// Outbound payload: text plus at most one image
#[derive(Debug, Clone, PartialEq)]
pub struct ReportArtifact {
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl ReportArtifact {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }
}

/// Per-request pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Received,
    Resolving,
    Fetching,
    Rendering,
    Summarizing,
    Dispatching,
    Done,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Done | RequestState::Failed)
    }
}

/// KRX trades Monday through Friday; holidays are only known to the data source.
pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parse_market_tokens() {
        assert_eq!(Query::parse("  Market "), Query::MarketOverview(Market::Kospi));
        assert_eq!(Query::parse("시장 현황"), Query::MarketOverview(Market::Kospi));
        assert_eq!(
            Query::parse(" 삼성전자 "),
            Query::Company("삼성전자".to_string())
        );
    }

    #[test]
    fn test_market_parse() {
        assert_eq!(Market::parse("kosdaq"), Some(Market::Kosdaq));
        assert_eq!(Market::parse("KOSPI"), Some(Market::Kospi));
        assert_eq!(Market::parse("KONEX"), None);
        assert_eq!(Market::Kosdaq.index_code(), "2001");
        assert!(Market::Kosdaq.map_url().ends_with("/marketmap/kosdaq"));
    }

    #[test]
    fn test_is_weekday() {
        // 2024-01-06 was a Saturday
        assert!(!is_weekday(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()));
        assert!(is_weekday(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()));
    }
}
