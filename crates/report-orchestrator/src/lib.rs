//! Per-request report pipeline: resolve, fetch, render, summarize, dispatch.

pub mod prompts;
pub mod report;
pub mod resolve;

pub use resolve::match_listing;

use chrono::{Duration, NaiveDate, Utc};
use report_core::{
    is_weekday, ChartRenderer, FailurePolicy, Identifier, ImageAttachment, IndexSnapshot, Market,
    MarketData, MarketMapCapture, PriceSeries, Query, QuoteSnapshot, ReportArtifact, ReportError,
    ReportSink, RequestState, StageOutcome, Summarizer,
};
use std::sync::Arc;

/// Lookback windows, in calendar days
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Window searched for the most recent trading day
    pub snapshot_lookback_days: i64,
    /// Chart length; the series is fetched over twice this window
    pub chart_lookback_days: i64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            snapshot_lookback_days: 14,
            chart_lookback_days: 180,
        }
    }
}

/// Today's date in Korea (UTC+9), where KRX trades
pub fn kst_today() -> NaiveDate {
    (Utc::now() + Duration::hours(9)).date_naive()
}

/// What happened to one request
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRun {
    pub state: RequestState,
    /// Payload handed to the sink, including error notices
    pub artifact: Option<ReportArtifact>,
    /// Stage failures that only shrank the report
    pub degraded: Vec<ReportError>,
    /// Error that ended the request
    pub failure: Option<ReportError>,
}

impl ReportRun {
    fn new() -> Self {
        Self {
            state: RequestState::Received,
            artifact: None,
            degraded: Vec::new(),
            failure: None,
        }
    }

    fn transition(&mut self, next: RequestState) {
        tracing::debug!("Request state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Unwrap a stage result, recording a degradation or surfacing a fatal error
    fn absorb<T>(&mut self, outcome: StageOutcome<T>) -> Result<Option<T>, ReportError> {
        match outcome {
            StageOutcome::Ok(v) => Ok(Some(v)),
            StageOutcome::Degraded(e) => {
                tracing::warn!("Report degraded at {:?}: {}", self.state, e);
                self.degraded.push(e);
                Ok(None)
            }
            StageOutcome::Fatal(e) => Err(e),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == RequestState::Done
    }
}

pub struct ReportOrchestrator {
    data: Arc<dyn MarketData>,
    chart: Arc<dyn ChartRenderer>,
    summarizer: Arc<dyn Summarizer>,
    market_map: Arc<dyn MarketMapCapture>,
    config: ReportConfig,
    clock: fn() -> NaiveDate,
}

impl ReportOrchestrator {
    pub fn new(
        data: Arc<dyn MarketData>,
        chart: Arc<dyn ChartRenderer>,
        summarizer: Arc<dyn Summarizer>,
        market_map: Arc<dyn MarketMapCapture>,
        config: ReportConfig,
    ) -> Self {
        Self {
            data,
            chart,
            summarizer,
            market_map,
            config,
            clock: kst_today,
        }
    }

    /// Replace the source of "today"
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Look a name or code up in the KOSPI + KOSDAQ listing
    pub async fn resolve(&self, query: &str) -> Result<Identifier, ReportError> {
        if query.trim().is_empty() {
            return Err(ReportError::not_found(query));
        }
        let listings = self.data.listings().await?;
        let identifier = match_listing(&listings, query)?.clone();
        tracing::info!(
            "Resolved '{}' to {} {} ({})",
            query.trim(),
            identifier.code,
            identifier.name,
            identifier.market
        );
        Ok(identifier)
    }

    /// Valuation and OHLC figures of the most recent trading day
    pub async fn fetch_snapshot(&self, identifier: &Identifier) -> Result<QuoteSnapshot, ReportError> {
        let today = self.today();
        let from = today - Duration::days(self.config.snapshot_lookback_days);
        let rows = self.data.valuations(identifier, from, today).await?;

        let Some(row) = rows
            .into_iter()
            .filter(|r| r.date <= today && is_weekday(r.date))
            .max_by_key(|r| r.date)
        else {
            return Err(ReportError::DataUnavailable(format!(
                "no trading data for {} since {} (trading halted or market closed)",
                identifier.code, from
            )));
        };

        let bar = match self.data.daily_bars(identifier, row.date, row.date).await {
            Ok(bars) => bars.into_iter().find(|b| b.date == row.date),
            Err(e) => {
                tracing::warn!("No OHLC bar for {} on {}: {}", identifier.code, row.date, e);
                None
            }
        };

        Ok(QuoteSnapshot {
            identifier: identifier.clone(),
            as_of: row.date,
            open: bar.as_ref().map(|b| b.open),
            high: bar.as_ref().map(|b| b.high),
            low: bar.as_ref().map(|b| b.low),
            close: bar.as_ref().map(|b| b.close),
            per: row.per,
            pbr: row.pbr,
            eps: row.eps,
            bps: row.bps,
            dividend_yield: row.dividend_yield,
        })
    }

    /// Latest composite index close within the snapshot lookback
    pub async fn fetch_index_snapshot(&self, market: Market) -> Result<IndexSnapshot, ReportError> {
        let today = self.today();
        let from = today - Duration::days(self.config.snapshot_lookback_days);
        let bars = self.data.index_bars(market, from, today).await?;

        bars.into_iter()
            .filter(|b| b.date <= today && is_weekday(b.date))
            .max_by_key(|b| b.date)
            .map(|b| IndexSnapshot {
                market,
                as_of: b.date,
                close: b.close,
            })
            .ok_or_else(|| {
                ReportError::DataUnavailable(format!("no {} index data since {}", market, from))
            })
    }

    /// Daily chart of the identifier; any failure here is a render failure
    pub async fn render_chart(&self, identifier: &Identifier) -> Result<Vec<u8>, ReportError> {
        let today = self.today();
        let from = today - Duration::days(self.config.chart_lookback_days * 2);
        let bars = self
            .data
            .daily_bars(identifier, from, today)
            .await
            .map_err(|e| ReportError::Render(format!("price history unavailable: {}", e)))?;

        let series = PriceSeries {
            identifier: identifier.clone(),
            bars,
        };
        if series.is_empty() {
            return Err(ReportError::Render(format!("no price history for {}", identifier.code)));
        }

        let title = format!("{} ({}) 일봉", identifier.name, identifier.code);
        self.chart.render(&title, &series).await
    }

    /// First completion for the prompt, trimmed; blank completions are errors
    pub async fn summarize(&self, prompt: &str) -> Result<String, ReportError> {
        let text = self.summarizer.summarize(prompt).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ReportError::Ai("empty completion".to_string()));
        }
        Ok(text.to_string())
    }

    /// Run the whole pipeline for one query and hand the result to `sink`.
    ///
    /// Fatal errors are reported to the user through the sink as well; the
    /// returned run records which path was taken.
    pub async fn process(&self, query: &Query, sink: &dyn ReportSink) -> ReportRun {
        let mut run = ReportRun::new();
        let built = match query {
            Query::Company(name) => self.build_company_report(name, &mut run).await,
            Query::MarketOverview(market) => self.build_market_report(*market, &mut run).await,
        };

        match built {
            Ok(artifact) => self.dispatch(run, artifact, sink).await,
            Err(e) => self.abort(run, e, sink).await,
        }
    }

    async fn build_company_report(&self, query: &str, run: &mut ReportRun) -> Result<ReportArtifact, ReportError> {
        run.transition(RequestState::Resolving);
        let identifier =
            StageOutcome::from_result(self.resolve(query).await, FailurePolicy::Abort).into_result()?;

        run.transition(RequestState::Fetching);
        let snapshot = StageOutcome::from_result(self.fetch_snapshot(&identifier).await, FailurePolicy::Abort)
            .into_result()?;

        run.transition(RequestState::Rendering);
        let chart = run.absorb(StageOutcome::from_result(
            self.render_chart(&identifier).await,
            FailurePolicy::Degrade,
        ))?;

        run.transition(RequestState::Summarizing);
        let prompt = prompts::company_prompt(&identifier.name, &report::snapshot_text(&snapshot));
        let narrative = run.absorb(StageOutcome::from_result(
            self.summarize(&prompt).await,
            FailurePolicy::Degrade,
        ))?;

        let mut artifact = ReportArtifact::text(report::company_report_text(&snapshot, narrative.as_deref()));
        if let Some(bytes) = chart {
            artifact = artifact.with_image(ImageAttachment {
                bytes,
                file_name: format!("{}_daily.png", identifier.code),
                caption: report::chart_caption(&snapshot),
            });
        }
        Ok(artifact)
    }

    async fn build_market_report(&self, market: Market, run: &mut ReportRun) -> Result<ReportArtifact, ReportError> {
        run.transition(RequestState::Fetching);
        let index = StageOutcome::from_result(self.fetch_index_snapshot(market).await, FailurePolicy::Abort)
            .into_result()?;

        run.transition(RequestState::Summarizing);
        let narrative = run.absorb(StageOutcome::from_result(
            self.summarize(&prompts::market_prompt(&index)).await,
            FailurePolicy::Degrade,
        ))?;

        Ok(ReportArtifact::text(report::market_report_text(&index, narrative.as_deref())))
    }

    /// Screenshot a market map and send it, or a link when the capture fails
    pub async fn capture_market_map(&self, market: Market, sink: &dyn ReportSink) -> ReportRun {
        let mut run = ReportRun::new();
        run.transition(RequestState::Rendering);

        let outcome = StageOutcome::from_result(self.market_map.capture(market).await, FailurePolicy::Degrade);
        let artifact = match run.absorb(outcome) {
            Ok(Some(bytes)) => ReportArtifact::text(String::new()).with_image(ImageAttachment {
                bytes,
                file_name: format!("{}_marketmap.jpg", market.as_str().to_ascii_lowercase()),
                caption: report::market_map_caption(market),
            }),
            Ok(None) => {
                let message = run
                    .degraded
                    .last()
                    .map(ReportError::user_message)
                    .unwrap_or_default();
                ReportArtifact::text(report::market_map_fallback(market, &message))
            }
            Err(e) => return self.abort(run, e, sink).await,
        };

        self.dispatch(run, artifact, sink).await
    }

    async fn dispatch(&self, mut run: ReportRun, artifact: ReportArtifact, sink: &dyn ReportSink) -> ReportRun {
        run.transition(RequestState::Dispatching);
        match sink.deliver(&artifact).await {
            Ok(()) => run.transition(RequestState::Done),
            Err(e) => {
                tracing::error!("Failed to dispatch report: {}", e);
                run.failure = Some(e);
                run.transition(RequestState::Failed);
            }
        }
        run.artifact = Some(artifact);
        run
    }

    async fn abort(&self, mut run: ReportRun, error: ReportError, sink: &dyn ReportSink) -> ReportRun {
        tracing::warn!("Request failed at {:?}: {}", run.state, error);
        let notice = ReportArtifact::text(error.user_message());
        if let Err(e) = sink.deliver(&notice).await {
            tracing::error!("Failed to deliver error notice: {}", e);
        }
        run.artifact = Some(notice);
        run.failure = Some(error);
        run.transition(RequestState::Failed);
        run
    }
}
