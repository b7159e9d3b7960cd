// Browser page capability
//
// The loader, poller and widget helpers only need a handful of operations from the
// browser-automation layer. `BrowserPage` names exactly those, so any driver
// (playwright-rs, a CDP client, a scripted fake in tests) can sit underneath.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// When to consider a navigation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    /// The `load` event fired
    Load,
    /// The `DOMContentLoaded` event fired (initial parse done, subresources may still load)
    DomContentLoaded,
    /// No network connections for at least 500ms
    NetworkIdle,
    /// The navigation response was received and the document started loading
    Commit,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
            WaitUntil::Commit => "commit",
        }
    }
}

/// State an element must reach for a readiness check to pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementState {
    /// Present in the DOM and rendered with a non-empty box
    Visible,
    /// Absent from the DOM or not rendered
    Hidden,
    /// Present in the DOM
    Attached,
    /// Absent from the DOM
    Detached,
}

impl ElementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementState::Visible => "visible",
            ElementState::Hidden => "hidden",
            ElementState::Attached => "attached",
            ElementState::Detached => "detached",
        }
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main-document response observed by a navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    /// URL of the response (after redirects)
    pub url: String,
    /// HTTP status code
    pub status: u16,
}

impl NavigationResponse {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
        }
    }
}

/// Operations the core consumes from a browser page.
///
/// Implementations own their page; every call is awaited to completion before the
/// next one starts, so no method needs to be reentrant.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigates to `url`, waiting for `wait_until` for at most `timeout`.
    ///
    /// Returns `None` when the navigation produces no response (data URLs,
    /// same-document navigations).
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<Option<NavigationResponse>>;

    /// Forces a full reload of the current document.
    async fn reload(&self, timeout: Duration) -> Result<Option<NavigationResponse>>;

    /// Waits until the first element matching `selector` reaches `state`.
    ///
    /// Returns an error if the state is not reached within `timeout`.
    async fn wait_for_state(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()>;

    /// Evaluates a JavaScript expression and returns its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Clicks the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<()>;
}
