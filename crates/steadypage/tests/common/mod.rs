// Shared test helpers
//
// `ScriptedPage` is an in-memory `BrowserPage` whose navigations, readiness and
// evaluations follow a script, so loader and poller behavior can be asserted
// without a browser. Pair it with `#[tokio::test(start_paused = true)]` to make
// waits run on the virtual clock.

// Each test binary compiles this module separately and uses a different subset.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use steadypage::{BrowserPage, ElementState, Error, NavigationResponse, Result, WaitUntil};

/// Initializes tracing output for tests (honors RUST_LOG)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted result of one navigation
#[derive(Debug, Clone)]
pub enum Nav {
    /// Main document answered with this status
    Status(u16),
    /// Navigation produced no response (data: URL, same-document)
    NoResponse,
    /// Driver reported an error
    Fail(&'static str),
    /// Navigation never finishes
    Hang,
}

/// Scripted result of one evaluation
#[derive(Debug, Clone)]
pub enum Eval {
    Value(Value),
    Fail(&'static str),
}

#[derive(Default)]
struct Script {
    navigations: VecDeque<Nav>,
    last_navigation: Option<Nav>,
    evaluations: VecDeque<Eval>,
    last_evaluation: Option<Eval>,
    // selector -> first navigation count at which it reaches any requested state
    ready_from: HashMap<String, usize>,
}

/// In-memory `BrowserPage` following a script
#[derive(Default)]
pub struct ScriptedPage {
    script: Mutex<Script>,
    urls: Mutex<Vec<String>>,
    log: Mutex<Vec<String>>,
    reloads: Mutex<u32>,
    clicks: Mutex<Vec<String>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigations return these results in order; the last one repeats.
    pub fn with_navigations(self, navigations: impl IntoIterator<Item = Nav>) -> Self {
        self.script.lock().navigations.extend(navigations);
        self
    }

    /// Evaluations return these results in order; the last one repeats.
    pub fn with_evaluations(self, evaluations: impl IntoIterator<Item = Eval>) -> Self {
        self.script.lock().evaluations.extend(evaluations);
        self
    }

    /// `selector` reaches its requested state once `navigation` navigations happened.
    ///
    /// Selectors without an entry are ready immediately.
    pub fn with_selector_ready_from(self, selector: &str, navigation: usize) -> Self {
        self.script
            .lock()
            .ready_from
            .insert(selector.to_string(), navigation);
        self
    }

    /// `selector` never reaches its requested state.
    pub fn with_selector_never_ready(self, selector: &str) -> Self {
        self.with_selector_ready_from(selector, usize::MAX)
    }

    /// URLs passed to `navigate`, in order
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    pub fn navigations(&self) -> usize {
        self.urls.lock().len()
    }

    pub fn reloads(&self) -> u32 {
        *self.reloads.lock()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().clone()
    }

    /// Every call, in order (`navigate`, `reload`, `wait <selector> <state>`)
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn next_navigation(&self) -> Nav {
        let mut script = self.script.lock();
        if let Some(nav) = script.navigations.pop_front() {
            script.last_navigation = Some(nav.clone());
        }
        script.last_navigation.clone().unwrap_or(Nav::Status(200))
    }

    fn next_evaluation(&self) -> Eval {
        let mut script = self.script.lock();
        if let Some(eval) = script.evaluations.pop_front() {
            script.last_evaluation = Some(eval.clone());
        }
        script.last_evaluation.clone().unwrap_or(Eval::Value(Value::Null))
    }
}

#[async_trait]
impl BrowserPage for ScriptedPage {
    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        _timeout: Duration,
    ) -> Result<Option<NavigationResponse>> {
        self.urls.lock().push(url.to_string());
        self.log
            .lock()
            .push(format!("navigate {}", wait_until.as_str()));

        match self.next_navigation() {
            Nav::Status(status) => Ok(Some(NavigationResponse::new(url, status))),
            Nav::NoResponse => Ok(None),
            Nav::Fail(message) => Err(Error::Driver(message.to_string())),
            Nav::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn reload(&self, _timeout: Duration) -> Result<Option<NavigationResponse>> {
        *self.reloads.lock() += 1;
        self.log.lock().push("reload".to_string());
        Ok(None)
    }

    async fn wait_for_state(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()> {
        self.log.lock().push(format!("wait {} {}", selector, state));

        let ready_from = self
            .script
            .lock()
            .ready_from
            .get(selector)
            .copied()
            .unwrap_or(0);
        if self.navigations() >= ready_from {
            return Ok(());
        }

        tokio::time::sleep(timeout).await;
        Err(Error::Driver(format!(
            "'{}' did not become {} within {:?}",
            selector, state, timeout
        )))
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value> {
        match self.next_evaluation() {
            Eval::Value(value) => Ok(value),
            Eval::Fail(message) => Err(Error::Driver(message.to_string())),
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.clicks.lock().push(selector.to_string());
        Ok(())
    }
}
