// Widget capabilities
//
// Page objects for sliders, date pickers, accordions, modals and the like differ
// only in selectors. They share one handle type and three capability traits, and
// every asynchronous check goes through the poller.

use crate::api::config::PollConfig;
use crate::error::Result;
use crate::page::{BrowserPage, ElementState};
use crate::poll::{PollCondition, PollSpec, wait_for};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Something that can be waited on until it reaches an element state
#[async_trait]
pub trait Waitable {
    async fn wait_for(&self, state: ElementState, timeout: Duration) -> Result<()>;
}

/// Something that can be clicked
#[async_trait]
pub trait Clickable {
    async fn click(&self) -> Result<()>;
}

/// Something whose rendered text can be read
#[async_trait]
pub trait Readable {
    async fn text(&self) -> Result<String>;
}

/// Handle to the element matched by a selector on a page.
///
/// # Example
///
/// ```ignore
/// let progress = Widget::new(&page, "#progressBar div[role='progressbar']");
/// page.locator("#startStopButton").await.click(None).await?;
/// let reading = progress.wait_for_number(50.0, 1.0).await?;
/// ```
pub struct Widget<'p, P: BrowserPage + ?Sized> {
    page: &'p P,
    selector: String,
    poll: PollConfig,
}

impl<'p, P: BrowserPage + ?Sized> Widget<'p, P> {
    pub fn new(page: &'p P, selector: impl Into<String>) -> Self {
        Self {
            page,
            selector: selector.into(),
            poll: PollConfig::default(),
        }
    }

    /// Uses `config`'s timeout, interval and error budget for every wait on this widget.
    pub fn with_poll_config(mut self, config: PollConfig) -> Self {
        self.poll = config;
        self
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Waits until the element is visible.
    pub async fn wait_for_visible(&self) -> Result<()> {
        self.wait_for(ElementState::Visible, self.poll.timeout).await
    }

    /// Waits until the element is hidden or gone.
    pub async fn wait_for_hidden(&self) -> Result<()> {
        self.wait_for(ElementState::Hidden, self.poll.timeout).await
    }

    /// Waits until the element is enabled.
    pub async fn wait_for_enabled(&self) -> Result<()> {
        self.wait_for_enabled_state(true).await
    }

    /// Waits until the element is disabled.
    pub async fn wait_for_disabled(&self) -> Result<()> {
        self.wait_for_enabled_state(false).await
    }

    async fn wait_for_enabled_state(&self, enabled: bool) -> Result<()> {
        let state = if enabled { "enabled" } else { "disabled" };
        let spec = self.spec(PollCondition::Equals(enabled), format!("to be {}", state));
        let script =
            self.script("return !el.disabled && el.getAttribute('aria-disabled') !== 'true';");
        wait_for(&spec, || self.evaluate_bool(&script)).await?;
        Ok(())
    }

    /// Waits until the computed CSS `property` equals `expected`, returning it.
    pub async fn wait_for_style(&self, property: &str, expected: &str) -> Result<String> {
        let spec = self.spec(
            PollCondition::Equals(expected.to_string()),
            format!("computed {}", property),
        );
        let script = self.script(&format!(
            "return getComputedStyle(el).getPropertyValue({});",
            js_string(property)
        ));
        wait_for(&spec, || self.evaluate_string(&script)).await
    }

    /// Waits until the element's trimmed text equals `expected`.
    pub async fn wait_for_text(&self, expected: &str) -> Result<String> {
        let spec = self.spec(PollCondition::Equals(expected.trim().to_string()), "text");
        wait_for(&spec, || async move {
            self.text().await.map(|t| t.trim().to_string())
        })
        .await
    }

    /// Waits until the element's numeric reading is within `tolerance` of `target`.
    ///
    /// The reading is `aria-valuenow`, then the form value, then the text
    /// (so `"50%"` reads as 50). Returns the satisfying reading.
    pub async fn wait_for_number(&self, target: f64, tolerance: f64) -> Result<Value> {
        let spec = self.spec(PollCondition::Threshold { target, tolerance }, "numeric value");
        let script = self.script(
            "const now = el.getAttribute('aria-valuenow'); \
             if (now !== null) return now; \
             if ('value' in el && el.value !== '') return el.value; \
             return el.textContent;",
        );
        wait_for(&spec, || self.page.evaluate(&script)).await
    }

    /// Reads a DOM property of the element (`value`, `checked`, ...).
    pub async fn property(&self, name: &str) -> Result<Value> {
        let script = self.script(&format!("return el[{}];", js_string(name)));
        self.page.evaluate(&script).await
    }

    fn spec<T>(&self, condition: PollCondition<T>, what: impl AsRef<str>) -> PollSpec<T>
    where
        T: crate::poll::Observation,
    {
        PollSpec::from_config(condition, &self.poll)
            .describe(format!("'{}' {}", self.selector, what.as_ref()))
    }

    /// Wraps `body` in a function that binds `el` or throws when nothing matches.
    fn script(&self, body: &str) -> String {
        let selector = js_string(&self.selector);
        format!(
            "(() => {{ const el = document.querySelector({selector}); \
             if (!el) throw new Error('no element matches ' + {selector}); {body} }})()"
        )
    }

    async fn evaluate_bool(&self, script: &str) -> Result<bool> {
        Ok(self.page.evaluate(script).await?.as_bool().unwrap_or(false))
    }

    async fn evaluate_string(&self, script: &str) -> Result<String> {
        Ok(value_to_string(self.page.evaluate(script).await?))
    }
}

#[async_trait]
impl<P: BrowserPage + ?Sized> Waitable for Widget<'_, P> {
    async fn wait_for(&self, state: ElementState, timeout: Duration) -> Result<()> {
        self.page.wait_for_state(&self.selector, state, timeout).await
    }
}

#[async_trait]
impl<P: BrowserPage + ?Sized> Clickable for Widget<'_, P> {
    async fn click(&self) -> Result<()> {
        self.page.click(&self.selector).await
    }
}

#[async_trait]
impl<P: BrowserPage + ?Sized> Readable for Widget<'_, P> {
    async fn text(&self) -> Result<String> {
        let script = self.script("return el.innerText;");
        self.evaluate_string(&script).await
    }
}

/// Quotes `text` as a JavaScript string literal.
fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
