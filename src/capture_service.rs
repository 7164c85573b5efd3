//! One capture, end to end
//!
//! This module provides the `CaptureService` that owns a headless browser and
//! turns a [`CaptureRequest`] into files on disk plus a [`CaptureReport`].

use crate::{
    validate_url, ArtifactPaths, BrowserSession, CaptureController, CaptureError, CaptureMetrics,
    CapturePage, CaptureStats, Config,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub url: String,
    /// Base path for the outputs; extensions are appended
    pub output_base: PathBuf,
}

impl CaptureRequest {
    pub fn new(url: impl Into<String>, output_base: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_base: output_base.into(),
        }
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.url.trim().is_empty() {
            return Err(CaptureError::Usage("Url parameter must be specified".to_string()));
        }
        if self.output_base.as_os_str().is_empty() {
            return Err(CaptureError::Usage("File parameter must be specified".to_string()));
        }
        Ok(())
    }
}

/// Outcome of a successful capture
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub url: String,
    pub files: ArtifactPaths,
    #[serde(flatten)]
    pub stats: CaptureStats,
    pub image_bytes: usize,
    pub html_bytes: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub captured_at: DateTime<Utc>,
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

/// Capture `url` into `<output_base>.png` and `<output_base>.html` with a
/// freshly launched browser that is shut down afterwards.
///
/// # Examples
///
/// ```rust,no_run
/// use page_capture::{capture, Config};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let report = capture("http://example.com", "shot", Config::default()).await?;
///     println!("wrote {}", report.files.image.display());
///     Ok(())
/// }
/// ```
pub async fn capture(
    url: &str,
    output_base: impl Into<PathBuf>,
    config: Config,
) -> Result<CaptureReport, CaptureError> {
    let service = CaptureService::new(config).await?;
    let result = service
        .capture(CaptureRequest::new(url, output_base))
        .await;
    service.shutdown().await;
    result
}

pub struct CaptureService {
    browser: BrowserSession,
    config: Config,
    metrics: CaptureMetrics,
}

impl CaptureService {
    pub async fn new(config: Config) -> Result<Self, CaptureError> {
        config.validate()?;
        let browser = BrowserSession::launch(&config).await?;

        Ok(Self {
            browser,
            config,
            metrics: CaptureMetrics::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn capture(&self, request: CaptureRequest) -> Result<CaptureReport, CaptureError> {
        let started = Instant::now();
        let result = self.capture_inner(&request, started).await;

        match &result {
            Ok(report) => self.metrics.record_capture(report),
            Err(e) => {
                error!("Capture of {} failed: {}", request.url, e);
                self.metrics.record_failure(e);
            }
        }

        result
    }

    async fn capture_inner(
        &self,
        request: &CaptureRequest,
        started: Instant,
    ) -> Result<CaptureReport, CaptureError> {
        request.validate()?;
        validate_url(&request.url)
            .map_err(|e| CaptureError::InvalidUrl(format!("{}: {}", request.url, e)))?;

        let page = self.browser.open_page(&self.config).await?;
        let result = capture_page(&page, &self.config, request, started).await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }

        result
    }

    pub async fn shutdown(self) {
        self.browser.shutdown().await;
    }
}

/// Run the controller against an already prepared page and write its artifacts.
pub async fn capture_page<P: CapturePage + ?Sized>(
    page: &P,
    config: &Config,
    request: &CaptureRequest,
    started: Instant,
) -> Result<CaptureReport, CaptureError> {
    info!("Capturing {}", request.url);

    let artifacts = CaptureController::new(page, config).run(&request.url).await?;
    let files = artifacts.write(&request.output_base).await?;

    Ok(CaptureReport {
        url: request.url.clone(),
        files,
        stats: artifacts.stats.clone(),
        image_bytes: artifacts.image.len(),
        html_bytes: artifacts.html.len(),
        elapsed: started.elapsed(),
        captured_at: Utc::now(),
    })
}
