use crate::telegram::REQUEST_TIMEOUT;
use anyhow::{Context, Result};
use gemini_client::GeminiConfig;
use market_map::MarketMapSettings;
use report_orchestrator::ReportConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Process-wide settings, loaded once at startup
#[derive(Clone)]
pub struct BotConfig {
    // Credentials
    pub telegram_token: String,
    pub google_api_key: String,

    // Collaborator endpoints
    pub gemini_model: Option<String>,
    pub gemini_api_url: Option<String>,
    pub krx_api_url: Option<String>,
    pub chrome_executable: Option<String>,

    // Report windows (calendar days)
    pub snapshot_lookback_days: i64,
    pub chart_lookback_days: i64,

    // Transport
    pub max_concurrent: usize,
    pub poll_timeout_secs: u64,
    pub market_map_timeout_secs: u64,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            telegram_token: var("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN must be set")?,
            google_api_key: var("GOOGLE_API_KEY").context("GOOGLE_API_KEY must be set")?,

            gemini_model: var("GEMINI_MODEL"),
            gemini_api_url: var("GEMINI_API_URL"),
            krx_api_url: var("KRX_API_URL"),
            chrome_executable: var("CHROME_EXECUTABLE"),

            snapshot_lookback_days: parse_or(var("SNAPSHOT_LOOKBACK_DAYS"), "SNAPSHOT_LOOKBACK_DAYS", 14)?,
            chart_lookback_days: parse_or(var("CHART_LOOKBACK_DAYS"), "CHART_LOOKBACK_DAYS", 180)?,

            max_concurrent: parse_or(var("BOT_MAX_CONCURRENT"), "BOT_MAX_CONCURRENT", 2)?,
            poll_timeout_secs: parse_or(var("BOT_POLL_TIMEOUT_SECS"), "BOT_POLL_TIMEOUT_SECS", 50)?,
            market_map_timeout_secs: parse_or(var("MARKET_MAP_TIMEOUT_SECS"), "MARKET_MAP_TIMEOUT_SECS", 60)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.snapshot_lookback_days < 1 || self.chart_lookback_days < 1 {
            anyhow::bail!("lookback windows must be at least one day");
        }
        if self.max_concurrent == 0 {
            anyhow::bail!("BOT_MAX_CONCURRENT must be at least 1");
        }
        if self.poll_timeout_secs >= REQUEST_TIMEOUT.as_secs() {
            anyhow::bail!(
                "BOT_POLL_TIMEOUT_SECS must be below the {}s request timeout",
                REQUEST_TIMEOUT.as_secs()
            );
        }
        if self.market_map_timeout_secs == 0 {
            anyhow::bail!("MARKET_MAP_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }

    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            snapshot_lookback_days: self.snapshot_lookback_days,
            chart_lookback_days: self.chart_lookback_days,
        }
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        let mut config = GeminiConfig::new(self.google_api_key.clone());
        if let Some(model) = &self.gemini_model {
            config = config.with_model(model.clone());
        }
        if let Some(url) = &self.gemini_api_url {
            config = config.with_base_url(url.clone());
        }
        config
    }

    pub fn market_map_settings(&self) -> MarketMapSettings {
        MarketMapSettings {
            capture_deadline: Duration::from_secs(self.market_map_timeout_secs),
            chrome_executable: self.chrome_executable.clone(),
            ..MarketMapSettings::default()
        }
    }

    /// Values that must never reach a log line
    pub fn secrets(&self) -> Vec<String> {
        vec![self.telegram_token.clone(), self.google_api_key.clone()]
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("telegram_token", &"***")
            .field("google_api_key", &"***")
            .field("gemini_model", &self.gemini_model)
            .field("gemini_api_url", &self.gemini_api_url)
            .field("krx_api_url", &self.krx_api_url)
            .field("chrome_executable", &self.chrome_executable)
            .field("snapshot_lookback_days", &self.snapshot_lookback_days)
            .field("chart_lookback_days", &self.chart_lookback_days)
            .field("max_concurrent", &self.max_concurrent)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("market_map_timeout_secs", &self.market_map_timeout_secs)
            .finish()
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v.parse().with_context(|| format!("{} has an invalid value '{}'", key, v)),
        None => Ok(default),
    }
}
