// Resilient page loading
//
// Navigates with a fresh cache-bust token per attempt, checks the main-document
// status and an ordered list of readiness checks, and retries with a forced reload
// until the attempt budget is spent.

use crate::api::config::{
    DEFAULT_ALTERNATE_STATUS, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_CACHE_BUST_PARAM,
    DEFAULT_EXPECTED_STATUS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RELOAD_TIMEOUT, DEFAULT_SETTLE_DELAY,
    LoaderConfig,
};
use crate::error::{Error, Result};
use crate::page::{BrowserPage, ElementState, WaitUntil};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error as ThisError;
use tokio::time::Instant;
use url::Url;

/// Element condition that must hold before a page counts as ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessCheck {
    pub selector: String,
    pub state: ElementState,
    pub timeout: Duration,
}

impl ReadinessCheck {
    /// Waits up to the attempt's remaining budget for `selector` to reach `state`.
    pub fn new(selector: impl Into<String>, state: ElementState) -> Self {
        Self {
            selector: selector.into(),
            state,
            timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn visible(selector: impl Into<String>) -> Self {
        Self::new(selector, ElementState::Visible)
    }

    pub fn hidden(selector: impl Into<String>) -> Self {
        Self::new(selector, ElementState::Hidden)
    }

    pub fn attached(selector: impl Into<String>) -> Self {
        Self::new(selector, ElementState::Attached)
    }

    pub fn detached(selector: impl Into<String>) -> Self {
        Self::new(selector, ElementState::Detached)
    }

    /// Caps this check below the attempt budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Why a single navigation attempt failed
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum AttemptFailure {
    /// The main document came back with an unexpected status
    #[error("unexpected status {status} (expected {expected}{})", display_alternate(.alternate))]
    Status {
        status: u16,
        expected: u16,
        alternate: Option<u16>,
    },

    /// The driver reported an error while navigating
    #[error("navigation error: {0}")]
    Navigation(String),

    /// The navigation did not finish within the attempt budget
    #[error("navigation did not finish within {0:?}")]
    NavigationTimeout(Duration),

    /// A readiness check did not hold in time
    #[error("readiness check '{selector}' to be {state} failed: {message}")]
    Readiness {
        selector: String,
        state: ElementState,
        message: String,
    },
}

fn display_alternate(alternate: &Option<u16>) -> String {
    match alternate {
        Some(status) => format!(" or {}", status),
        None => String::new(),
    }
}

/// One call to [`PageLoader::load`].
///
/// Immutable once built; create it with [`NavigationRequest::builder`] or
/// [`NavigationRequest::from_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    url: String,
    expected_status: u16,
    alternate_status: Option<u16>,
    checks: Vec<ReadinessCheck>,
    max_attempts: u32,
    attempt_timeout: Duration,
    reload_timeout: Duration,
    settle_delay: Duration,
    cache_bust_param: String,
}

impl NavigationRequest {
    /// Starts a request for `url` with default options.
    pub fn builder(url: impl Into<String>) -> NavigationRequestBuilder {
        NavigationRequestBuilder::new(url.into())
    }

    /// Starts a request for `url` with options taken from configuration.
    pub fn from_config(url: impl Into<String>, config: &LoaderConfig) -> NavigationRequestBuilder {
        NavigationRequestBuilder {
            url: url.into(),
            expected_status: config.expected_status,
            alternate_status: config.alternate_status,
            checks: Vec::new(),
            max_attempts: config.max_attempts,
            attempt_timeout: config.attempt_timeout,
            reload_timeout: config.reload_timeout,
            settle_delay: config.settle_delay,
            cache_bust_param: config.cache_bust_param.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn expected_status(&self) -> u16 {
        self.expected_status
    }

    pub fn alternate_status(&self) -> Option<u16> {
        self.alternate_status
    }

    pub fn checks(&self) -> &[ReadinessCheck] {
        &self.checks
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn reload_timeout(&self) -> Duration {
        self.reload_timeout
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Part of each non-final attempt kept back for the forced reload.
    fn reload_slot(&self) -> Duration {
        self.reload_timeout.min(self.attempt_timeout / 2)
    }

    fn accepts(&self, status: u16) -> bool {
        status == self.expected_status || Some(status) == self.alternate_status
    }
}

/// Builder for [`NavigationRequest`]
#[derive(Debug, Clone)]
pub struct NavigationRequestBuilder {
    url: String,
    expected_status: u16,
    alternate_status: Option<u16>,
    checks: Vec<ReadinessCheck>,
    max_attempts: u32,
    attempt_timeout: Duration,
    reload_timeout: Duration,
    settle_delay: Duration,
    cache_bust_param: String,
}

impl NavigationRequestBuilder {
    fn new(url: String) -> Self {
        Self {
            url,
            expected_status: DEFAULT_EXPECTED_STATUS,
            alternate_status: Some(DEFAULT_ALTERNATE_STATUS),
            checks: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            reload_timeout: DEFAULT_RELOAD_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            cache_bust_param: DEFAULT_CACHE_BUST_PARAM.to_string(),
        }
    }

    pub fn expected_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Sets (or with `None`, clears) the additionally accepted status.
    pub fn alternate_status(mut self, status: Option<u16>) -> Self {
        self.alternate_status = status;
        self
    }

    /// Appends a readiness check; checks run in the order they were added.
    pub fn check(mut self, check: ReadinessCheck) -> Self {
        self.checks.push(check);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Caps the forced reload between attempts.
    ///
    /// The reload runs inside the failed attempt's budget: navigation and checks
    /// of every attempt but the last stop early to leave it this much time (at
    /// most half the attempt timeout).
    pub fn reload_timeout(mut self, timeout: Duration) -> Self {
        self.reload_timeout = timeout;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn cache_bust_param(mut self, name: impl Into<String>) -> Self {
        self.cache_bust_param = name.into();
        self
    }

    /// Validates and builds the request.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for zero attempts, a zero reload timeout or an
    ///   empty cache-bust parameter
    /// - [`Error::InvalidUrl`] if the target is not an absolute URL
    pub fn build(self) -> Result<NavigationRequest> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.reload_timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "reload_timeout must be greater than zero".to_string(),
            ));
        }
        if self.cache_bust_param.is_empty() {
            return Err(Error::InvalidArgument(
                "cache-bust parameter name must not be empty".to_string(),
            ));
        }
        Url::parse(&self.url).map_err(|source| Error::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;

        Ok(NavigationRequest {
            url: self.url,
            expected_status: self.expected_status,
            alternate_status: self.alternate_status,
            checks: self.checks,
            max_attempts: self.max_attempts,
            attempt_timeout: self.attempt_timeout,
            reload_timeout: self.reload_timeout,
            settle_delay: self.settle_delay,
            cache_bust_param: self.cache_bust_param,
        })
    }
}

/// Produces time-derived cache-bust tokens that never repeat.
///
/// Tokens are wall-clock milliseconds, bumped past the previous token when two
/// are taken within the same millisecond.
#[derive(Debug, Default)]
pub struct CacheBuster {
    last: AtomicU64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token strictly greater than every token handed out before.
    pub fn next_token(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let token = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, token, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return token,
                Err(actual) => last = actual,
            }
        }
    }

    /// Returns `url` with `param` set to a fresh token.
    ///
    /// Other query pairs and the fragment are preserved; an existing `param` is replaced.
    pub fn apply(&self, url: &Url, param: &str) -> Url {
        let token = self.next_token().to_string();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| name != param)
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        let mut busted = url.clone();
        busted.set_query(None);
        busted
            .query_pairs_mut()
            .extend_pairs(kept)
            .append_pair(param, &token);
        busted
    }
}

/// A page that passed its status and readiness checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    /// URL actually navigated to, including the cache-bust token
    pub url: String,
    /// Main-document status, if the navigation produced a response
    pub status: Option<u16>,
    /// Attempt that succeeded (1-based)
    pub attempts: u32,
}

/// Brings a [`BrowserPage`] to a ready state, retrying transient failures.
pub struct PageLoader<'a, P: BrowserPage + ?Sized> {
    page: &'a P,
    cache_buster: CacheBuster,
}

impl<'a, P: BrowserPage + ?Sized> PageLoader<'a, P> {
    pub fn new(page: &'a P) -> Self {
        Self {
            page,
            cache_buster: CacheBuster::new(),
        }
    }

    /// Navigates to `request`'s URL until the page is ready or attempts run out.
    ///
    /// Each attempt appends a fresh cache-bust token, waits for
    /// `DOMContentLoaded`, verifies the status (expected or alternate) and then
    /// every readiness check in order, all within the attempt's time budget. On
    /// success it waits the settle delay and returns. On failure it forces a
    /// reload in the slot kept back at the end of the attempt and tries again,
    /// so a load never takes longer than `max_attempts * attempt_timeout` plus
    /// the settle delay.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] immediately, without navigating, for a malformed URL
    /// - [`Error::Navigation`] once all attempts failed, naming the last status
    ///   and the last failure
    pub async fn load(&self, request: &NavigationRequest) -> Result<Ready> {
        let target = Url::parse(&request.url).map_err(|source| Error::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;

        let mut last_status = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_end = Instant::now() + request.attempt_timeout;
            let last_attempt = attempt >= request.max_attempts;
            // Every attempt but the last leaves room for the forced reload.
            let deadline = if last_attempt {
                attempt_end
            } else {
                attempt_end - request.reload_slot()
            };
            let url = self
                .cache_buster
                .apply(&target, &request.cache_bust_param)
                .to_string();

            tracing::debug!(
                url = %url,
                attempt,
                max_attempts = request.max_attempts,
                "Navigation attempt"
            );

            let failure = match self.attempt(request, &url, deadline).await {
                Ok(status) => {
                    tracing::info!(url = %url, attempt, ?status, "Page ready");
                    if !request.settle_delay.is_zero() {
                        tokio::time::sleep(request.settle_delay).await;
                    }
                    return Ok(Ready {
                        url,
                        status,
                        attempts: attempt,
                    });
                }
                Err((status, failure)) => {
                    if status.is_some() {
                        last_status = status;
                    }
                    failure
                }
            };

            if last_attempt {
                tracing::warn!(
                    url = %request.url,
                    attempts = attempt,
                    "Giving up on navigation: {}",
                    failure
                );
                return Err(Error::Navigation {
                    url: request.url.clone(),
                    attempts: attempt,
                    last_status,
                    last_failure: failure,
                });
            }

            tracing::warn!(
                url = %url,
                attempt,
                "Navigation attempt failed, retrying: {}",
                failure
            );
            self.force_reload(attempt_end).await;
        }
    }

    /// Runs one attempt: navigate, check status, check readiness.
    ///
    /// On failure returns the observed status alongside the reason.
    async fn attempt(
        &self,
        request: &NavigationRequest,
        url: &str,
        deadline: Instant,
    ) -> std::result::Result<Option<u16>, (Option<u16>, AttemptFailure)> {
        let budget = deadline.saturating_duration_since(Instant::now());
        let navigation = tokio::time::timeout(
            budget,
            self.page.navigate(url, WaitUntil::DomContentLoaded, budget),
        )
        .await;

        let status = match navigation {
            Ok(Ok(response)) => response.map(|r| r.status),
            Ok(Err(e)) => return Err((None, AttemptFailure::Navigation(e.to_string()))),
            Err(_) => return Err((None, AttemptFailure::NavigationTimeout(budget))),
        };

        if let Some(status) = status {
            if !request.accepts(status) {
                return Err((
                    Some(status),
                    AttemptFailure::Status {
                        status,
                        expected: request.expected_status,
                        alternate: request.alternate_status,
                    },
                ));
            }
        }

        for check in &request.checks {
            let timeout = check
                .timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            tracing::debug!(
                selector = %check.selector,
                state = %check.state,
                ?timeout,
                "Readiness check"
            );

            let outcome = tokio::time::timeout(
                timeout,
                self.page.wait_for_state(&check.selector, check.state, timeout),
            )
            .await;

            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("not reached within {:?}", timeout),
            };
            return Err((
                status,
                AttemptFailure::Readiness {
                    selector: check.selector.clone(),
                    state: check.state,
                    message,
                },
            ));
        }

        Ok(status)
    }

    /// Reloads the page in what remains of the failed attempt's budget.
    ///
    /// Reload failures are logged only; the next attempt navigates again anyway.
    async fn force_reload(&self, attempt_end: Instant) {
        let remaining = attempt_end.saturating_duration_since(Instant::now());

        match tokio::time::timeout(remaining, self.page.reload(remaining)).await {
            Ok(Ok(_)) => tracing::debug!("Forced reload before next attempt"),
            Ok(Err(e)) => tracing::warn!("Reload before retry failed: {}", e),
            Err(_) => tracing::warn!("Reload before retry timed out after {:?}", remaining),
        }
    }
}
