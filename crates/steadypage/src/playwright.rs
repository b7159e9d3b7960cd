// playwright-rs adapter
//
// Implements `BrowserPage` for `playwright_rs::Page` and installs a `NetworkGate`
// as a catch-all route handler.

use crate::error::{Error, Result};
use crate::network::{Decision, NetworkGate, NetworkRequest, ResourceType};
use crate::page::{BrowserPage, ElementState, NavigationResponse, WaitUntil};
use crate::poll::{PollSpec, wait_for};
use async_trait::async_trait;
use playwright_rs::protocol::{Locator, Request};
use playwright_rs::server::channel_owner::ChannelOwner;
use playwright_rs::{GotoOptions, Page};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Pause between element-state probes while waiting for a readiness check
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn driver_error(e: playwright_rs::Error) -> Error {
    Error::Driver(e.to_string())
}

fn goto_options(wait_until: WaitUntil, timeout: Duration) -> GotoOptions {
    let wait_until = match wait_until {
        WaitUntil::Load => playwright_rs::WaitUntil::Load,
        WaitUntil::DomContentLoaded => playwright_rs::WaitUntil::DomContentLoaded,
        WaitUntil::NetworkIdle => playwright_rs::WaitUntil::NetworkIdle,
        WaitUntil::Commit => playwright_rs::WaitUntil::Commit,
    };
    GotoOptions::new().timeout(timeout).wait_until(wait_until)
}

async fn state_reached(locator: &Locator, state: ElementState) -> playwright_rs::Result<bool> {
    match state {
        ElementState::Visible => locator.is_visible().await,
        ElementState::Hidden => locator.is_visible().await.map(|visible| !visible),
        ElementState::Attached => locator.count().await.map(|count| count > 0),
        ElementState::Detached => locator.count().await.map(|count| count == 0),
    }
}

#[async_trait]
impl BrowserPage for Page {
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<Option<NavigationResponse>> {
        let response = self
            .goto(url, Some(goto_options(wait_until, timeout)))
            .await
            .map_err(driver_error)?;
        Ok(response.map(|r| NavigationResponse::new(r.url(), r.status())))
    }

    async fn reload(&self, timeout: Duration) -> Result<Option<NavigationResponse>> {
        let response = Page::reload(
            self,
            Some(goto_options(WaitUntil::DomContentLoaded, timeout)),
        )
        .await
        .map_err(driver_error)?;
        Ok(response.map(|r| NavigationResponse::new(r.url(), r.status())))
    }

    async fn wait_for_state(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()> {
        let locator = self.locator(selector).await;
        let spec = PollSpec::truthy()
            .with_timeout(timeout)
            .with_interval(STATE_POLL_INTERVAL)
            .describe(format!("'{}' to be {}", selector, state));
        wait_for(&spec, || state_reached(&locator, state)).await?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        Page::evaluate::<(), Value>(self, expression, None)
            .await
            .map_err(driver_error)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.locator(selector)
            .await
            .click(None)
            .await
            .map_err(driver_error)
    }
}

/// Whether `request` navigates the frame with guid `main_frame`.
///
/// Reads the protocol initializer (`isNavigationRequest`, `frame.guid`). When the
/// frame is not reported, a document navigation counts as the main frame's so the
/// page under test is never blocked.
fn is_main_frame_navigation(request: &Request, main_frame: &str) -> bool {
    let initializer = request.initializer();
    let navigation = initializer
        .get("isNavigationRequest")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| request.is_navigation_request());
    if !navigation {
        return false;
    }
    initializer
        .get("frame")
        .and_then(|frame| frame.get("guid"))
        .and_then(Value::as_str)
        .is_none_or(|guid| guid == main_frame)
}

/// Routes every request of `page` through `gate`.
///
/// Blocked requests are aborted with `blockedbyclient`; everything else continues
/// unchanged. The page's own main-frame navigations always continue; documents
/// loaded into subframes (ad iframes) go through the rules like any other request.
/// Install once, right after creating the page and before the first navigation.
pub async fn install_network_gate(page: &Page, gate: NetworkGate) -> Result<()> {
    let main_frame: Arc<str> = Arc::from(page.main_frame().await.map_err(driver_error)?.guid());

    page.route("**/*", move |route| {
        let gate = gate.clone();
        let main_frame = main_frame.clone();
        async move {
            let request = route.request();
            let resource_type = ResourceType::from_browser(request.resource_type());
            let decision = gate.decide(&NetworkRequest {
                url: request.url(),
                resource_type,
                main_frame_navigation: is_main_frame_navigation(&request, &main_frame),
            });

            match decision {
                Decision::Block => {
                    tracing::debug!(
                        url = %request.url(),
                        %resource_type,
                        "Blocking request"
                    );
                    route.abort(Some("blockedbyclient")).await
                }
                Decision::Allow => route.continue_(None).await,
            }
        }
    })
    .await
    .map_err(driver_error)
}
