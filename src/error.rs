use crate::settle::CaptureState;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unable to load url {url}: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Page error: {0}")]
    PageError(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid capture state transition from {from:?} on {event}")]
    InvalidTransition {
        from: CaptureState,
        event: &'static str,
    },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Capture interrupted by {0}")]
    Interrupted(String),
}

/// Coarse grouping of failures, used as a log field and metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Usage,
    Navigation,
    Capture,
    Environment,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Usage => "usage",
            ErrorCategory::Navigation => "navigation",
            ErrorCategory::Capture => "capture",
            ErrorCategory::Environment => "environment",
        }
    }
}

impl CaptureError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CaptureError::Usage(_) | CaptureError::Configuration(_) => ErrorCategory::Usage,
            CaptureError::InvalidUrl(_) | CaptureError::NavigationFailed { .. } => {
                ErrorCategory::Navigation
            }
            CaptureError::PageError(_)
            | CaptureError::CaptureFailed(_)
            | CaptureError::Timeout(_)
            | CaptureError::InvalidTransition { .. } => ErrorCategory::Capture,
            CaptureError::BrowserLaunchFailed(_)
            | CaptureError::IoError(_)
            | CaptureError::SerializationError(_)
            | CaptureError::MetricsError(_)
            | CaptureError::Interrupted(_) => ErrorCategory::Environment,
        }
    }

    pub fn is_navigation_failure(&self) -> bool {
        self.category() == ErrorCategory::Navigation
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::SerializationError(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::CaptureFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            CaptureError::Usage("missing url".into()).category(),
            ErrorCategory::Usage
        );
        assert!(CaptureError::InvalidUrl("nope".into()).is_navigation_failure());
        assert!(CaptureError::NavigationFailed {
            url: "http://example.invalid".into(),
            reason: "net::ERR_NAME_NOT_RESOLVED".into(),
        }
        .is_navigation_failure());
        assert_eq!(
            CaptureError::Timeout(Duration::from_secs(35)).category(),
            ErrorCategory::Capture
        );
        assert_eq!(
            CaptureError::BrowserLaunchFailed("no chrome".into()).category(),
            ErrorCategory::Environment
        );
    }

    #[test]
    fn test_navigation_message() {
        let err = CaptureError::NavigationFailed {
            url: "http://example.invalid".into(),
            reason: "net::ERR_NAME_NOT_RESOLVED".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unable to load url http://example.invalid: net::ERR_NAME_NOT_RESOLVED"
        );
    }

    #[test]
    fn test_io_conversion() {
        let err: CaptureError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, CaptureError::IoError(_)));
        assert_eq!(err.category().as_str(), "environment");
    }
}
