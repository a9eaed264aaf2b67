//! Historical aerial imagery capture.
//!
//! Views are taken from the IGN comparison viewer with a headless browser:
//! one page per requested year, screenshot of the map viewport once the
//! tiles have settled. The year decides which orthophoto campaign layer
//! the viewer is asked for.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::services::report::CapturedImage;

/// Seconds to let the viewer finish loading tiles before the screenshot.
const TILE_SETTLE_SECS: u64 = 6;

/// Viewer zoom level, roughly the footprint of a study site.
const VIEWER_ZOOM: u8 = 16;

/// CSS selector of the viewer's map viewport.
const MAP_VIEWPORT_SELECTOR: &str = "div.ol-viewport";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("browser could not be configured: {0}")]
    Config(String),

    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("no orthophoto campaign covers {0}")]
    NoLayer(u16),

    #[error("viewer URL could not be built: {0}")]
    Url(String),
}

/// Orthophoto campaign layer for a year, if one exists.
///
/// Campaigns run in multi-year blocks up to 2015 and yearly after that.
/// The sixties survey is the only pre-2000 coverage.
pub fn layer_for_year(year: u16) -> Option<String> {
    match year {
        1950..=1965 => Some("ORTHOIMAGERY.ORTHOPHOTOS.1950-1965".to_string()),
        2000..=2005 => Some("ORTHOIMAGERY.ORTHOPHOTOS2000-2005".to_string()),
        2006..=2010 => Some("ORTHOIMAGERY.ORTHOPHOTOS2006-2010".to_string()),
        2011..=2015 => Some("ORTHOIMAGERY.ORTHOPHOTOS2011-2015".to_string()),
        2016.. => Some(format!("ORTHOIMAGERY.ORTHOPHOTOS{year}")),
        _ => None,
    }
}

/// Comparison viewer URL centred on the site with the campaign layer up.
pub fn viewer_url(base: &str, lon: f64, lat: f64, layer: &str) -> Result<Url, CaptureError> {
    Url::parse_with_params(
        base,
        [
            ("x", lon.to_string()),
            ("y", lat.to_string()),
            ("z", VIEWER_ZOOM.to_string()),
            ("layer1", layer.to_string()),
            ("mode", "doubleMap".to_string()),
        ],
    )
    .map_err(|err| CaptureError::Url(err.to_string()))
}

/// Years out of the GUI's free-form list, first occurrence wins.
pub fn parse_years(input: &str) -> Vec<u16> {
    let mut years = Vec::new();
    for token in input.split([',', ';', ' ']) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.parse::<u16>() {
            Ok(year) if !years.contains(&year) => years.push(year),
            Ok(_) => {}
            Err(_) => debug!(token, "Ignoring unparseable year"),
        }
    }
    years
}

/// A headless browser session against the comparison viewer.
pub struct ImageryBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
    viewer_base: String,
}

impl ImageryBrowser {
    /// Launch the headless browser. Requires a Chromium install on the
    /// machine; the error message carries whatever the launcher reported.
    pub async fn launch(viewer_base: String) -> Result<Self, CaptureError> {
        let config = BrowserConfig::builder()
            .new_headless_mode()
            .window_size(1400, 1000)
            .args(vec!["--no-sandbox", "--disable-gpu", "--hide-scrollbars"])
            .build()
            .map_err(CaptureError::Config)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("Headless browser launched");
        Ok(Self {
            browser,
            handler_task,
            viewer_base,
        })
    }

    /// Capture the site at one year.
    pub async fn capture_year(
        &self,
        lon: f64,
        lat: f64,
        year: u16,
    ) -> Result<CapturedImage, CaptureError> {
        let layer = layer_for_year(year).ok_or(CaptureError::NoLayer(year))?;
        let url = viewer_url(&self.viewer_base, lon, lat, &layer)?;
        info!(year, url = %url, "Capturing aerial view");

        let page = self.browser.new_page(url.as_str()).await?;
        page.wait_for_navigation().await?;
        tokio::time::sleep(Duration::from_secs(TILE_SETTLE_SECS)).await;

        let png = match page.find_element(MAP_VIEWPORT_SELECTOR).await {
            Ok(element) => element.screenshot(CaptureScreenshotFormat::Png).await?,
            Err(err) => {
                debug!(error = %err, "Map viewport not found, taking the full page");
                page.screenshot(
                    ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .full_page(false)
                        .build(),
                )
                .await?
            }
        };
        if let Err(err) = page.close().await {
            debug!(error = %err, "Viewer page close failed");
        }
        crate::metrics::global().record_browser_capture();

        Ok(CapturedImage {
            year,
            png,
            source: layer,
        })
    }

    /// Shut the browser down and stop the event pump.
    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Browser close failed");
        }
        if let Err(err) = self.browser.wait().await {
            debug!(error = %err, "Browser wait failed");
        }
        self.handler_task.abort();
    }
}
