//! steadypage: steady page loads and bounded waits for browser-driven UI tests
//!
//! Animation-heavy demo sites load slowly, serve stale documents and change state
//! asynchronously. This crate provides the three pieces a UI suite needs to cope:
//!
//! - [`PageLoader`] navigates with a fresh cache-bust token per attempt, checks the
//!   main-document status and ordered readiness checks, and retries with a forced
//!   reload a bounded number of times.
//! - [`poll`] / [`wait_for`] evaluate a probe until an equality, truthiness or
//!   threshold condition holds, never longer than `timeout + interval`.
//! - [`NetworkGate`] classifies outgoing requests so fonts, images, ads and
//!   analytics never slow a run down.
//!
//! All of them talk to the browser through the [`BrowserPage`] trait. Enable the
//! `playwright` feature for an implementation on `playwright_rs::Page`.
//!
//! # Examples
//!
//! ## Loading a page
//!
//! ```ignore
//! use playwright_rs::Playwright;
//! use steadypage::{NavigationRequest, NetworkGate, PageLoader, ReadinessCheck};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let playwright = Playwright::launch().await?;
//!     let browser = playwright.chromium().launch().await?;
//!     let page = browser.new_page().await?;
//!
//!     steadypage::playwright::install_network_gate(&page, NetworkGate::default()).await?;
//!
//!     let request = NavigationRequest::builder("https://demoqa.com/date-picker")
//!         .check(ReadinessCheck::visible("#datePickerMonthYearInput"))
//!         .build()?;
//!     let ready = PageLoader::new(&page).load(&request).await?;
//!     println!("ready after {} attempt(s)", ready.attempts);
//!
//!     browser.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Waiting for asynchronous state
//!
//! ```ignore
//! use std::time::Duration;
//! use steadypage::{PollSpec, Widget, wait_for};
//!
//! let spec = PollSpec::threshold(50.0, 1.0)
//!     .with_timeout(Duration::from_secs(20))
//!     .describe("progress bar");
//! let reading = wait_for(&spec, || page.evaluate("document.querySelector('[role=progressbar]').ariaValueNow")).await?;
//!
//! Widget::new(&page, "#enableAfter").wait_for_enabled().await?;
//! ```

pub mod api;
mod error;
pub mod loader;
pub mod network;
pub mod page;
pub mod poll;
pub mod widget;

#[cfg(feature = "playwright")]
pub mod playwright;

// Re-export error types
pub use error::{Error, Result};

// Re-export configuration
pub use api::{LoaderConfig, NetworkConfig, PollConfig, SuiteConfig};

// Re-export the browser capability
pub use page::{BrowserPage, ElementState, NavigationResponse, WaitUntil};

// Re-export page loading
pub use loader::{
    AttemptFailure, CacheBuster, NavigationRequest, NavigationRequestBuilder, PageLoader,
    ReadinessCheck, Ready,
};

// Re-export polling
pub use poll::{Observation, PollCondition, PollOutcome, PollSpec, PollTimeout, poll, wait_for};

// Re-export request gating
pub use network::{Decision, NetworkGate, NetworkPolicy, NetworkRequest, ResourceType};

// Re-export widget capabilities
pub use widget::{Clickable, Readable, Waitable, Widget};
