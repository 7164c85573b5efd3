//! Configuration management with serde serialization/deserialization
//!
//! This module provides all configuration structures for a capture: viewport,
//! the settle policy that decides when a page is ready, output settings and the
//! headless Chrome launch arguments.

use crate::CaptureError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for a capture
///
/// # Examples
///
/// ```rust
/// use page_capture::{Config, SettlePolicy};
///
/// // Defaults: 1280x800 viewport, 400ms quiet period, 800ms max wait
/// let config = Config::default();
///
/// // Wait longer for chatty pages
/// let config = Config {
///     settle: SettlePolicy {
///         ajax_quiet_period_ms: 1000,
///         max_wait_ms: 5000,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Browser viewport used for layout and rendering
    pub viewport: Viewport,

    /// When the page counts as ready to capture
    pub settle: SettlePolicy,

    /// Hard limit for the whole capture, navigation included (default: 35 seconds)
    ///
    /// Guards against pages whose navigation never completes; the settle timers
    /// only start counting once navigation has an outcome.
    pub capture_timeout_secs: u64,

    /// Output image format (default: PNG)
    pub image_format: ImageFormat,

    /// Render the full scrollable page instead of only the viewport (default: true)
    pub full_page: bool,

    /// Also write the page's visible text to `<output-base>.txt` (default: false)
    pub scrape_text: bool,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string (default: Chrome default)
    pub user_agent: Option<String>,

    /// Load pages with broken or self-signed certificates (default: true)
    pub ignore_certificate_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            settle: SettlePolicy::default(),
            capture_timeout_secs: 35,
            image_format: ImageFormat::Png,
            full_page: true,
            scrape_text: false,
            chrome_path: None,
            user_agent: None,
            ignore_certificate_errors: true,
        }
    }
}

impl Config {
    /// Read a JSON configuration file. Missing fields take their defaults.
    pub async fn from_file(path: &Path) -> Result<Self, CaptureError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(CaptureError::Configuration(
                "Viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if self.viewport.device_scale_factor <= 0.0 {
            return Err(CaptureError::Configuration(
                "Device scale factor must be greater than 0".to_string(),
            ));
        }

        if self.settle.max_wait_ms == 0 {
            return Err(CaptureError::Configuration(
                "Max wait must be greater than 0".to_string(),
            ));
        }

        if self.capture_timeout_secs == 0 {
            return Err(CaptureError::Configuration(
                "Capture timeout must be greater than 0".to_string(),
            ));
        }

        if self.settle.max_wait() >= self.capture_timeout() {
            return Err(CaptureError::Configuration(format!(
                "Max wait ({}ms) must be shorter than the capture timeout ({}s)",
                self.settle.max_wait_ms, self.capture_timeout_secs
            )));
        }

        Ok(())
    }
}

/// Browser viewport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1280)
    pub width: u32,

    /// Viewport height in pixels (default: 800)
    pub height: u32,

    /// Device pixel ratio (default: 1.0)
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            device_scale_factor: 1.0,
        }
    }
}

/// Adaptive wait policy
///
/// A page is considered settled once no request has been in flight for
/// `ajax_quiet_period_ms`. `max_wait_ms`, counted from navigation start, bounds
/// the wait for pages that never go idle (long polling, refreshing widgets).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SettlePolicy {
    /// Quiet period after the last response before capturing (default: 400ms)
    pub ajax_quiet_period_ms: u64,

    /// Upper bound on the wait, from navigation start (default: 800ms)
    pub max_wait_ms: u64,

    /// How readiness is detected (default: network settle)
    pub strategy: WaitStrategy,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            ajax_quiet_period_ms: 400,
            max_wait_ms: 800,
            strategy: WaitStrategy::NetworkSettle,
        }
    }
}

impl SettlePolicy {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.ajax_quiet_period_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// How the controller decides the page is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WaitStrategy {
    /// Track requests and wait for a quiet period, bounded by the max wait
    NetworkSettle,
    /// Capture as soon as the load event fires; no request tracking
    LoadFinished,
}

/// Supported output image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format - lossless, what the browser renders natively
    Png,
    /// JPEG format - lossy compression, smaller files
    Jpeg,
    /// WebP format
    Webp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Generate Chrome command-line arguments for a single headless capture
///
/// `profile_dir` is a throwaway user data directory, unique per browser so
/// concurrent captures never share a profile.
///
/// # Examples
///
/// ```rust
/// use page_capture::{Config, get_chrome_args};
/// use std::path::Path;
///
/// let config = Config::default();
/// let args = get_chrome_args(&config, Path::new("/tmp/page-capture-profile"));
/// assert!(args.contains(&"--window-size=1280,800".to_string()));
/// ```
pub fn get_chrome_args(config: &Config, profile_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir={}", profile_dir.display()),
    ];

    if config.ignore_certificate_errors {
        args.push("--ignore-certificate-errors".to_string());
        args.push("--allow-running-insecure-content".to_string());
    }

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    config: &Config,
    profile_dir: &Path,
) -> Result<chromiumoxide::browser::BrowserConfig, CaptureError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config, profile_dir));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(CaptureError::BrowserLaunchFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_capture_script() {
        let config = Config::default();
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 800);
        assert_eq!(config.settle.quiet_period(), Duration::from_millis(400));
        assert_eq!(config.settle.max_wait(), Duration::from_millis(800));
        assert_eq!(config.settle.strategy, WaitStrategy::NetworkSettle);
        assert_eq!(config.capture_timeout(), Duration::from_secs(35));
        assert_eq!(config.image_format, ImageFormat::Png);
        assert!(config.full_page);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"settle": {"max_wait_ms": 3000}, "image_format": "jpeg"}"#)
                .unwrap();
        assert_eq!(config.settle.max_wait_ms, 3000);
        assert_eq!(config.settle.ajax_quiet_period_ms, 400);
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.image_format, ImageFormat::Jpeg);
    }

    #[test]
    fn test_wait_strategy_serde() {
        let policy: SettlePolicy = serde_json::from_str(r#"{"strategy": "load-finished"}"#).unwrap();
        assert_eq!(policy.strategy, WaitStrategy::LoadFinished);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.viewport.width = 0;
        assert!(matches!(config.validate(), Err(CaptureError::Configuration(_))));

        let mut config = Config::default();
        config.settle.max_wait_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture_timeout_secs = 1;
        config.settle.max_wait_ms = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_quiet_period_allowed() {
        let mut config = Config::default();
        config.settle.ajax_quiet_period_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chrome_args() {
        let mut config = Config {
            user_agent: Some("capture-bot/1.0".to_string()),
            ..Default::default()
        };
        let args = get_chrome_args(&config, Path::new("/tmp/profile-a"));
        assert!(args.contains(&"--headless".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile-a".to_string()));
        assert!(args.contains(&"--ignore-certificate-errors".to_string()));
        assert!(args.contains(&"--user-agent=capture-bot/1.0".to_string()));

        config.ignore_certificate_errors = false;
        let args = get_chrome_args(&config, Path::new("/tmp/profile-a"));
        assert!(!args.contains(&"--ignore-certificate-errors".to_string()));
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(ImageFormat::Png.extension(), "png");
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Webp.extension(), "webp");
    }
}
