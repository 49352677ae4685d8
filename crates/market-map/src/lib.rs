//! Market-map screenshots from a headless browser.
//!
//! A browser session is opened per capture and closed exactly once before
//! [`MarketMapCapturer::capture_market`] returns, whatever happened in between.

mod chromium;

pub use chromium::{ChromiumLauncher, ChromiumSession};

use async_trait::async_trait;
use report_core::{Market, MarketMapCapture, ReportError};
use std::time::{Duration, Instant};

/// Candidate selectors for the map widget, most specific first
pub const MARKET_MAP_SELECTORS: &[&str] = &[
    "#marketMap",
    "div.marketmap",
    "div.market-map",
    "div.marketmap__container",
    "section.marketmap",
    "div[class*='marketmap']",
    "div[class*='market-map']",
    "div[class*='treemap']",
    "#treemap",
    ".treemap",
    "section[class*='market'] div[class*='map']",
];

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Browser launch failed: {0}")]
    Launch(String),
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("Market map region not found")]
    RegionNotFound,
    #[error("Screenshot failed: {0}")]
    Screenshot(String),
    #[error("Capture timed out after {0:?}")]
    Timeout(Duration),
    #[error("Browser error: {0}")]
    Browser(String),
}

#[derive(Debug, Clone)]
pub struct MarketMapSettings {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout: Duration,
    /// Pause after load so client-side rendering can finish
    pub settle_delay: Duration,
    /// How long a matched element may take to become visible
    pub visibility_wait: Duration,
    pub poll_interval: Duration,
    /// Upper bound on the whole capture, session launch excluded
    pub capture_deadline: Duration,
    pub min_width: f64,
    pub min_height: f64,
    pub jpeg_quality: i64,
    pub chrome_executable: Option<String>,
}

impl Default for MarketMapSettings {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 800,
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1500),
            visibility_wait: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
            capture_deadline: Duration::from_secs(60),
            min_width: 300.0,
            min_height: 200.0,
            jpeg_quality: 80,
            chrome_executable: None,
        }
    }
}

/// Element bounding box in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// The `index`-th element matching `selector`
#[derive(Debug, Clone, PartialEq)]
pub struct ElementTarget {
    pub selector: String,
    pub index: usize,
    pub region: Region,
}

/// One open browser with one page
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), CaptureError>;

    /// Bounding boxes of every element matching `selector`, in document order.
    /// Elements without a layout box report a zero-sized region.
    async fn element_regions(&mut self, selector: &str) -> Result<Vec<Region>, CaptureError>;

    /// JPEG of exactly the target element's box
    async fn screenshot_element(&mut self, target: &ElementTarget) -> Result<Vec<u8>, CaptureError>;

    async fn close(self: Box<Self>) -> Result<(), CaptureError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, CaptureError>;
}

pub struct MarketMapCapturer<L> {
    launcher: L,
    settings: MarketMapSettings,
}

impl MarketMapCapturer<ChromiumLauncher> {
    pub fn chromium(settings: MarketMapSettings) -> Self {
        Self::new(ChromiumLauncher::new(settings.clone()), settings)
    }
}

impl<L: BrowserLauncher> MarketMapCapturer<L> {
    pub fn new(launcher: L, settings: MarketMapSettings) -> Self {
        Self { launcher, settings }
    }

    pub async fn capture_market(&self, market: Market) -> Result<Vec<u8>, CaptureError> {
        let url = market.map_url();
        let mut session = self.launcher.launch().await?;

        let deadline = self.settings.capture_deadline;
        let result = match tokio::time::timeout(
            deadline,
            capture_in_session(session.as_mut(), url, &self.settings),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Timeout(deadline)),
        };

        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close browser session: {}", e);
        }

        match &result {
            Ok(bytes) => tracing::info!("Captured {} market map ({} bytes)", market, bytes.len()),
            Err(e) => tracing::warn!("{} market map capture failed: {}", market, e),
        }
        result
    }
}

#[async_trait]
impl<L: BrowserLauncher> MarketMapCapture for MarketMapCapturer<L> {
    async fn capture(&self, market: Market) -> Result<Vec<u8>, ReportError> {
        self.capture_market(market)
            .await
            .map_err(|e| ReportError::Capture(e.to_string()))
    }
}

async fn capture_in_session(
    session: &mut dyn BrowserSession,
    url: &str,
    settings: &MarketMapSettings,
) -> Result<Vec<u8>, CaptureError> {
    match tokio::time::timeout(settings.navigation_timeout, session.navigate(url)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(CaptureError::Navigation(format!(
                "timed out after {:?}",
                settings.navigation_timeout
            )))
        }
    }
    if !settings.settle_delay.is_zero() {
        tokio::time::sleep(settings.settle_delay).await;
    }

    let target = locate_market_map(session, settings)
        .await
        .ok_or(CaptureError::RegionNotFound)?;
    tracing::debug!(
        "Market map region {} #{} ({:.0}x{:.0})",
        target.selector,
        target.index,
        target.region.width,
        target.region.height
    );

    session.screenshot_element(&target).await
}

/// First known selector whose element becomes visible at the minimum size,
/// otherwise the largest canvas on the page.
async fn locate_market_map(
    session: &mut dyn BrowserSession,
    settings: &MarketMapSettings,
) -> Option<ElementTarget> {
    for selector in MARKET_MAP_SELECTORS {
        let Some(region) = wait_visible(session, selector, settings).await else {
            continue;
        };
        if region.width >= settings.min_width && region.height >= settings.min_height {
            return Some(ElementTarget {
                selector: selector.to_string(),
                index: 0,
                region,
            });
        }
    }

    let canvases = session.element_regions("canvas").await.unwrap_or_default();
    canvases
        .into_iter()
        .enumerate()
        .filter(|(_, r)| r.area() > 0.0)
        .max_by(|(_, a), (_, b)| a.area().total_cmp(&b.area()))
        .map(|(index, region)| ElementTarget {
            selector: "canvas".to_string(),
            index,
            region,
        })
}

/// Region of the first match once it has a layout box; `None` when nothing matches.
async fn wait_visible(
    session: &mut dyn BrowserSession,
    selector: &str,
    settings: &MarketMapSettings,
) -> Option<Region> {
    let started = Instant::now();
    loop {
        let first = session
            .element_regions(selector)
            .await
            .ok()?
            .into_iter()
            .next()?;
        if first.is_visible() || started.elapsed() >= settings.visibility_wait {
            return Some(first);
        }
        tokio::time::sleep(settings.poll_interval).await;
    }
}
