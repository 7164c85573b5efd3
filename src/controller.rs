//! Drives one page from navigation to rendered artifacts
//!
//! The controller runs a single `select!` loop over three sources: the pending
//! navigation, the page's network events and the tracker's nearest deadline.
//! Every event is applied to the [`SettleTracker`] before the next one is
//! observed, so timer cancellation and rescheduling happen atomically per event.

use crate::{
    encode_image, CaptureArtifacts, CaptureError, CapturePage, CaptureTrigger, Config,
    NetworkEvent, SettleStats, SettleTracker,
};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

/// How the wait ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub trigger: CaptureTrigger,
    /// Time from navigation start until the trigger fired
    #[serde(rename = "waited_ms", serialize_with = "serialize_millis")]
    pub waited: Duration,
    pub settle: SettleStats,
    /// HTTP status of the main document, when a response arrived
    pub status_code: Option<i64>,
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

pub struct CaptureController<'a, P: CapturePage + ?Sized> {
    page: &'a P,
    config: &'a Config,
}

impl<'a, P: CapturePage + ?Sized> CaptureController<'a, P> {
    pub fn new(page: &'a P, config: &'a Config) -> Self {
        Self { page, config }
    }

    /// Navigate, wait for the page to settle and render it, bounded by the capture timeout.
    pub async fn run(&self, url: &str) -> Result<CaptureArtifacts, CaptureError> {
        let limit = self.config.capture_timeout();

        match timeout(limit, self.wait_and_render(url)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Capture of {} exceeded {:?}", url, limit);
                Err(CaptureError::Timeout(limit))
            }
        }
    }

    async fn wait_and_render(&self, url: &str) -> Result<CaptureArtifacts, CaptureError> {
        let stats = self.wait_until_ready(url).await?;
        self.render(stats).await
    }

    /// Run the settle loop until a trigger fires or navigation fails.
    pub async fn wait_until_ready(&self, url: &str) -> Result<CaptureStats, CaptureError> {
        let mut tracker = SettleTracker::new(self.config.settle.clone());
        let mut events = self.page.network_events().await?;

        let mut status_code = None;

        let started = Instant::now();
        tracker.start_navigation(started)?;
        debug!("Navigating to {}", url);

        let navigation = self.page.navigate(url);
        tokio::pin!(navigation);

        let trigger = loop {
            tokio::select! {
                result = &mut navigation, if tracker.is_loading() => match result {
                    Ok(()) => {
                        debug!("Navigation finished after {:?}", started.elapsed());
                        tracker.navigation_succeeded(Instant::now())?;
                    }
                    Err(e) => {
                        tracker.navigation_failed()?;
                        return Err(e);
                    }
                },
                Some(event) = events.recv() => match event {
                    NetworkEvent::RequestStarted { request_id } => {
                        tracker.request_started(&request_id);
                    }
                    NetworkEvent::RequestFinished { request_id }
                    | NetworkEvent::RequestFailed { request_id } => {
                        tracker.request_finished(&request_id, Instant::now());
                    }
                    NetworkEvent::DocumentResponse { status, .. } => {
                        debug!("Document responded with HTTP {}", status);
                        status_code = Some(status);
                    }
                },
                _ = sleep_until_deadline(tracker.next_deadline()) => {}
            }

            if let Some(trigger) = tracker.poll(Instant::now()) {
                break trigger;
            }
        };

        let stats = CaptureStats {
            trigger,
            waited: started.elapsed(),
            settle: tracker.stats(),
            status_code,
        };

        info!(
            "Page ready via {} after {:?} ({} requests, {} still in flight)",
            trigger.as_str(),
            stats.waited,
            stats.settle.requests_observed,
            stats.settle.in_flight_at_capture
        );

        Ok(stats)
    }

    async fn render(&self, stats: CaptureStats) -> Result<CaptureArtifacts, CaptureError> {
        let png = self.page.screenshot(self.config.full_page).await?;
        let html = self.page.content().await?;
        let text = if self.config.scrape_text {
            Some(self.page.visible_text().await?)
        } else {
            None
        };

        let image = encode_image(png, self.config.image_format)?;

        Ok(CaptureArtifacts {
            image,
            image_format: self.config.image_format,
            html,
            text,
            stats,
        })
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
