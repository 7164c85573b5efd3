//! Browser page abstraction used by the capture controller
//!
//! [`CapturePage`] is everything the controller needs from a rendering engine.
//! [`ChromePage`] implements it on top of a `chromiumoxide` page and takes care
//! of keeping the page unattended: JavaScript dialogs are dismissed and script
//! exceptions are logged and dropped.

use crate::{CaptureError, Config};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EventExceptionThrown;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::stream::{self, BoxStream};
use futures::{future, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Script returning the rendered, visible text of the document.
const VISIBLE_TEXT_SCRIPT: &str =
    "document.body ? document.body.innerText : (document.documentElement ? document.documentElement.textContent : '')";

/// Network activity reported by the page, keyed by the engine's request id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    RequestStarted { request_id: String },
    RequestFinished { request_id: String },
    RequestFailed { request_id: String },
    /// Response headers for a top-level document; redirects end in the final hop
    DocumentResponse { request_id: String, status: i64 },
}

impl NetworkEvent {
    pub fn request_id(&self) -> &str {
        match self {
            NetworkEvent::RequestStarted { request_id }
            | NetworkEvent::RequestFinished { request_id }
            | NetworkEvent::RequestFailed { request_id }
            | NetworkEvent::DocumentResponse { request_id, .. } => request_id,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CapturePage: Send + Sync {
    /// Subscribe to request lifecycle events. Must be called before navigating.
    async fn network_events(&self) -> Result<mpsc::UnboundedReceiver<NetworkEvent>, CaptureError>;

    /// Load `url`, resolving once the load completes or fails.
    async fn navigate(&self, url: &str) -> Result<(), CaptureError>;

    /// Rasterize the current page state as PNG.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, CaptureError>;

    /// Serialized DOM of the current page.
    async fn content(&self) -> Result<String, CaptureError>;

    /// Visible text of the current page.
    async fn visible_text(&self) -> Result<String, CaptureError>;

    async fn close(&self) -> Result<(), CaptureError>;
}

pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    /// Wrap a fresh page: apply viewport and user agent, install dialog and error suppression.
    pub async fn prepare(page: Page, config: &Config) -> Result<Self, CaptureError> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(config.viewport.width)
            .height(config.viewport.height)
            .device_scale_factor(config.viewport.device_scale_factor)
            .mobile(false)
            .build()
            .map_err(CaptureError::PageError)?;

        page.execute(metrics)
            .await
            .map_err(|e| CaptureError::PageError(e.to_string()))?;

        if let Some(user_agent) = &config.user_agent {
            page.execute(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .map_err(|e| CaptureError::PageError(e.to_string()))?;
        }

        let chrome_page = Self { page };
        chrome_page.suppress_dialogs().await?;
        chrome_page.swallow_script_errors().await?;
        Ok(chrome_page)
    }

    async fn suppress_dialogs(&self) -> Result<(), CaptureError> {
        let mut dialogs = self
            .page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| CaptureError::PageError(e.to_string()))?;
        let page = self.page.clone();

        tokio::spawn(async move {
            while let Some(dialog) = dialogs.next().await {
                debug!("Dismissing {:?} dialog: {}", dialog.r#type, dialog.message);
                if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(false)).await {
                    debug!("Failed to dismiss dialog: {}", e);
                }
            }
        });

        Ok(())
    }

    async fn swallow_script_errors(&self) -> Result<(), CaptureError> {
        let mut exceptions = self
            .page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(|e| CaptureError::PageError(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(exception) = exceptions.next().await {
                debug!("Page script error: {}", exception.exception_details.text);
            }
        });

        Ok(())
    }
}

#[async_trait]
impl CapturePage for ChromePage {
    async fn network_events(&self) -> Result<mpsc::UnboundedReceiver<NetworkEvent>, CaptureError> {
        let listen_error = |e: chromiumoxide::error::CdpError| CaptureError::PageError(e.to_string());

        let started = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(listen_error)?
            .map(|event| NetworkEvent::RequestStarted {
                request_id: event.request_id.inner().to_string(),
            });
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(listen_error)?
            .map(|event| NetworkEvent::RequestFinished {
                request_id: event.request_id.inner().to_string(),
            });
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(listen_error)?
            .map(|event| NetworkEvent::RequestFailed {
                request_id: event.request_id.inner().to_string(),
            });


        // Iframe documents share the resource type, so only main frame responses count
        let main_frame = self.page.mainframe().await.map_err(listen_error)?;
        let documents = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(listen_error)?
            .filter_map(move |event| {
                let is_main_document = event.r#type == ResourceType::Document
                    && main_frame
                        .as_ref()
                        .map_or(true, |frame| event.frame_id.as_ref() == Some(frame));

                future::ready(is_main_document.then(|| NetworkEvent::DocumentResponse {
                    request_id: event.request_id.inner().to_string(),
                    status: event.response.status,
                }))
            });

        let streams: Vec<BoxStream<'static, NetworkEvent>> = vec![
            started.boxed(),
            finished.boxed(),
            failed.boxed(),
            documents.boxed(),
        ];
        let mut events = stream::select_all(streams);
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                trace!("Network event: {:?}", event);
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn navigate(&self, url: &str) -> Result<(), CaptureError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| CaptureError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, CaptureError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))
    }

    async fn content(&self) -> Result<String, CaptureError> {
        self.page
            .content()
            .await
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))
    }

    async fn visible_text(&self) -> Result<String, CaptureError> {
        let result = self
            .page
            .evaluate(VISIBLE_TEXT_SCRIPT)
            .await
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        Ok(result.into_value::<String>()?)
    }

    async fn close(&self) -> Result<(), CaptureError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| CaptureError::PageError(e.to_string()))
    }
}
