use crate::{BrowserLauncher, BrowserSession, CaptureError, ElementTarget, MarketMapSettings, Region};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Launches headless Chromium with a fixed desktop window
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    settings: MarketMapSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: MarketMapSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self) -> Result<BrowserConfig, CaptureError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.settings.viewport_width, self.settings.viewport_height)
            // Let the window size drive layout instead of device emulation
            .viewport(None)
            .request_timeout(Duration::from_secs(30))
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");
        if let Some(path) = &self.settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(CaptureError::Launch)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, CaptureError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CaptureError::Launch(e.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler event error: {}", e);
                }
            }
        });

        tracing::debug!("Launched headless browser");
        Ok(Box::new(ChromiumSession {
            browser,
            events,
            page: None,
            jpeg_quality: self.settings.jpeg_quality,
        }))
    }
}

/// A running browser plus the page opened on it
pub struct ChromiumSession {
    browser: Browser,
    events: JoinHandle<()>,
    page: Option<Page>,
    jpeg_quality: i64,
}

#[derive(Debug, Deserialize)]
struct ScrollOffset {
    x: f64,
    y: f64,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, CaptureError> {
        self.page
            .as_ref()
            .ok_or_else(|| CaptureError::Browser("no page opened".into()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), CaptureError> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| CaptureError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| CaptureError::Navigation(e.to_string()))?;
        self.page = Some(page);
        Ok(())
    }

    async fn element_regions(&mut self, selector: &str) -> Result<Vec<Region>, CaptureError> {
        let page = self.page()?;
        let elements = page
            .find_elements(selector)
            .await
            .map_err(|e| CaptureError::Browser(e.to_string()))?;

        let mut regions = Vec::with_capacity(elements.len());
        for element in elements {
            let region = match element.bounding_box().await {
                Ok(b) => Region {
                    x: b.x,
                    y: b.y,
                    width: b.width,
                    height: b.height,
                },
                // Hidden elements have no box model
                Err(_) => Region {
                    x: 0.0,
                    y: 0.0,
                    width: 0.0,
                    height: 0.0,
                },
            };
            regions.push(region);
        }
        Ok(regions)
    }

    async fn screenshot_element(&mut self, target: &ElementTarget) -> Result<Vec<u8>, CaptureError> {
        let page = self.page()?;
        let elements = page
            .find_elements(target.selector.as_str())
            .await
            .map_err(|e| CaptureError::Screenshot(e.to_string()))?;
        let element = elements
            .get(target.index)
            .ok_or_else(|| CaptureError::Screenshot(format!("{} #{} detached", target.selector, target.index)))?;

        element
            .scroll_into_view()
            .await
            .map_err(|e| CaptureError::Screenshot(e.to_string()))?;
        let bounds = element
            .bounding_box()
            .await
            .map_err(|e| CaptureError::Screenshot(e.to_string()))?;
        // Bounding boxes are viewport-relative, clips are document-relative
        let scroll: ScrollOffset = page
            .evaluate("({ x: window.scrollX, y: window.scrollY })")
            .await
            .map_err(|e| CaptureError::Screenshot(e.to_string()))?
            .into_value()
            .map_err(|e| CaptureError::Screenshot(e.to_string()))?;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(self.jpeg_quality)
            .clip(Viewport {
                x: bounds.x + scroll.x,
                y: bounds.y + scroll.y,
                width: bounds.width,
                height: bounds.height,
                scale: 1.0,
            })
            .build();
        page.screenshot(params)
            .await
            .map_err(|e| CaptureError::Screenshot(e.to_string()))
    }

    async fn close(mut self: Box<Self>) -> Result<(), CaptureError> {
        let closed = self.browser.close().await.map(|_| ());
        let _ = self.browser.wait().await;
        self.events.abort();
        closed.map_err(|e| CaptureError::Browser(e.to_string()))
    }
}
