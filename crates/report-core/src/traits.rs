use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{Bar, DataError, Identifier, Market, PriceSeries, ReportArtifact, ReportError, ValuationRow};

/// Read-only market data source
#[async_trait]
pub trait MarketData: Send + Sync {
    /// All KOSPI and KOSDAQ listings
    async fn listings(&self) -> Result<Vec<Identifier>, DataError>;

    /// Daily valuation rows in `[from, to]`, ascending by date
    async fn valuations(
        &self,
        id: &Identifier,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ValuationRow>, DataError>;

    /// Daily OHLCV bars in `[from, to]`, ascending by date
    async fn daily_bars(
        &self,
        id: &Identifier,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, DataError>;

    /// Composite index bars in `[from, to]`, ascending by date
    async fn index_bars(
        &self,
        market: Market,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, DataError>;
}

/// Renders a price series into an encoded image
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(&self, title: &str, series: &PriceSeries) -> Result<Vec<u8>, ReportError>;
}

/// Generates narrative text from a prompt
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String, ReportError>;
}

/// Captures the market-map widget of a market as an encoded image
#[async_trait]
pub trait MarketMapCapture: Send + Sync {
    async fn capture(&self, market: Market) -> Result<Vec<u8>, ReportError>;
}

/// Outbound side of the messaging transport for one conversation
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, artifact: &ReportArtifact) -> Result<(), ReportError>;
}
