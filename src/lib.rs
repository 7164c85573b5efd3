//! # Page Capture
//!
//! Load a web page in headless Chrome, wait until its network activity settles,
//! then save a screenshot and the rendered HTML.
//!
//! ## Readiness policy
//!
//! A fixed delay is either too short for pages that load content with AJAX or
//! wasted time on static pages. Instead every request the page issues is
//! tracked:
//!
//! - while any request is in flight the page is not ready;
//! - once the last request finishes, a quiet period starts (default 400ms); a
//!   new request cancels it;
//! - a hard maximum wait from navigation start (default 800ms) forces the
//!   capture on pages that never go idle.
//!
//! Whichever fires first triggers the capture. A navigation failure ends the
//! attempt without writing anything.
//!
//! | State | Leaves on | To |
//! |-------|-----------|----|
//! | `Idle` | navigation start | `Loading` |
//! | `Loading` | navigation failure | `NavigationFailed` |
//! | `Loading` | navigation success | `WatchingRequests` |
//! | `WatchingRequests` | quiet period or max wait elapsed | `Settled` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use page_capture::{capture, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let report = capture("http://example.com", "shot", Config::default()).await?;
//!     println!("{} after {:?}", report.stats.trigger.as_str(), report.stats.waited);
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! capture http://google.com google 1200 800
//! capture https://example.com out/example --max-wait 3000 --scrape-text --json
//! ```

/// Configuration and settings for a capture
pub mod config;

/// Error types
pub mod error;

/// Readiness state machine
pub mod settle;

/// Page abstraction and the Chrome implementation
pub mod page;

/// Headless browser lifecycle
pub mod browser;

/// Settle loop and rendering
pub mod controller;

/// Capture output encoding and file writing
pub mod artifacts;

/// End-to-end capture service
pub mod capture_service;

/// Command-line interface implementation
pub mod cli;

/// Capture metrics and Prometheus export
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use artifacts::*;
pub use browser::*;
pub use capture_service::*;
pub use cli::*;
pub use config::*;
pub use controller::*;
pub use error::*;
pub use self::metrics::*;
pub use page::*;
pub use settle::*;
pub use utils::*;
