//! Headless Chrome lifecycle for a capture
//!
//! One [`BrowserSession`] owns one Chrome process, the background task that
//! drives its DevTools protocol connection, and a throwaway profile directory.

use crate::{create_browser_config, CaptureError, ChromePage, Config};
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<Result<(), chromiumoxide::error::CdpError>>,
    profile_dir: PathBuf,
    created_at: Instant,
}

impl BrowserSession {
    pub async fn launch(config: &Config) -> Result<Self, CaptureError> {
        let profile_dir = std::env::temp_dir().join(format!(
            "page-capture-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        tokio::fs::create_dir_all(&profile_dir).await.map_err(|e| {
            CaptureError::BrowserLaunchFailed(format!("Failed to create profile dir: {}", e))
        })?;

        let browser_config = create_browser_config(config, &profile_dir)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| CaptureError::BrowserLaunchFailed(e.to_string()))?;

        // The handler is a Stream that must be polled for the CDP connection to make progress
        let handler = tokio::spawn(async move {
            loop {
                match handler.next().await {
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("Browser handler error: {}", e);
                        return Err(e);
                    }
                    None => {
                        debug!("Browser handler stream ended");
                        break;
                    }
                }
            }
            Ok(())
        });

        info!("Launched headless browser (profile {})", profile_dir.display());

        Ok(Self {
            browser,
            handler,
            profile_dir,
            created_at: Instant::now(),
        })
    }

    /// Open a blank page ready for capture. Navigation happens later so that
    /// event listeners are attached before the first request goes out.
    pub async fn open_page(&self, config: &Config) -> Result<ChromePage, CaptureError> {
        if !self.is_alive() {
            return Err(CaptureError::BrowserLaunchFailed(
                "Browser connection closed".to_string(),
            ));
        }

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| CaptureError::PageError(e.to_string()))?;

        ChromePage::prepare(page, config).await
    }

    pub fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();

        if let Err(e) = tokio::fs::remove_dir_all(&self.profile_dir).await {
            debug!(
                "Could not remove profile dir {}: {}",
                self.profile_dir.display(),
                e
            );
        }

        debug!("Browser session closed after {:?}", self.age());
    }
}
