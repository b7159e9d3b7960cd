// Condition polling - bounded wait-for-condition primitive
//
// Every asynchronous UI check (toggles, visibility, computed styles, counters)
// goes through `poll`, so timeout and interval policy live in one place.

use crate::api::config::PollConfig;
use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Default total time budget for a poll (5 seconds)
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause between evaluations (100ms)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A value a probe can observe.
///
/// Provides the two views the non-equality conditions need: JavaScript-style
/// truthiness and a numeric reading.
pub trait Observation: Clone + fmt::Debug + PartialEq + Send {
    /// Whether the value counts as true for [`PollCondition::Truthy`]
    fn is_truthy(&self) -> bool;

    /// Numeric reading for [`PollCondition::Threshold`], if the value has one
    fn as_number(&self) -> Option<f64>;
}

impl Observation for bool {
    fn is_truthy(&self) -> bool {
        *self
    }

    fn as_number(&self) -> Option<f64> {
        Some(if *self { 1.0 } else { 0.0 })
    }
}

macro_rules! numeric_observation {
    ($($ty:ty),*) => {
        $(
            impl Observation for $ty {
                fn is_truthy(&self) -> bool {
                    *self != (0 as $ty)
                }

                fn as_number(&self) -> Option<f64> {
                    Some(*self as f64)
                }
            }
        )*
    };
}

numeric_observation!(i32, i64, u32, u64, usize);

impl Observation for f32 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }

    fn as_number(&self) -> Option<f64> {
        Some(*self as f64)
    }
}

impl Observation for f64 {
    fn is_truthy(&self) -> bool {
        *self != 0.0 && !self.is_nan()
    }

    fn as_number(&self) -> Option<f64> {
        Some(*self)
    }
}

impl Observation for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }

    fn as_number(&self) -> Option<f64> {
        parse_number(self)
    }
}

impl Observation for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_number(s),
            Value::Bool(b) => b.as_number(),
            _ => None,
        }
    }
}

impl<T: Observation> Observation for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().is_some_and(Observation::is_truthy)
    }

    fn as_number(&self) -> Option<f64> {
        self.as_ref().and_then(Observation::as_number)
    }
}

/// Parses readings such as `"50"`, `" 42.5 "` or `"75%"`.
fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    trimmed.parse::<f64>().ok()
}

/// Success condition of a poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollCondition<T> {
    /// Satisfied when the observed value equals the expected one
    Equals(T),
    /// Satisfied when the observed value is truthy
    Truthy,
    /// Satisfied when `|observed - target| <= tolerance`
    Threshold { target: f64, tolerance: f64 },
}

impl<T: Observation> PollCondition<T> {
    /// Checks a single observation against the condition.
    pub fn is_satisfied(&self, value: &T) -> bool {
        match self {
            PollCondition::Equals(expected) => value == expected,
            PollCondition::Truthy => value.is_truthy(),
            PollCondition::Threshold { target, tolerance } => value
                .as_number()
                .is_some_and(|observed| (observed - target).abs() <= *tolerance),
        }
    }

    fn expected(&self) -> String {
        match self {
            PollCondition::Equals(expected) => format!("{:?}", expected),
            PollCondition::Truthy => "a truthy value".to_string(),
            PollCondition::Threshold { target, tolerance } => {
                format!("{} ± {}", target, tolerance)
            }
        }
    }
}

/// How to poll: the condition plus its time budget.
///
/// The probe itself is passed to [`poll`] separately so a spec can be built once
/// from configuration and reused.
#[derive(Debug, Clone)]
pub struct PollSpec<T> {
    condition: PollCondition<T>,
    timeout: Duration,
    interval: Duration,
    max_probe_errors: Option<u32>,
    description: String,
}

impl<T: Observation> PollSpec<T> {
    /// Creates a spec with the default timeout and interval.
    pub fn new(condition: PollCondition<T>) -> Self {
        Self {
            condition,
            timeout: DEFAULT_POLL_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
            max_probe_errors: None,
            description: "condition".to_string(),
        }
    }

    /// Succeeds once the probe returns `expected`.
    pub fn equals(expected: T) -> Self {
        Self::new(PollCondition::Equals(expected))
    }

    /// Succeeds once the probe returns a truthy value.
    pub fn truthy() -> Self {
        Self::new(PollCondition::Truthy)
    }

    /// Succeeds once the probe reads within `tolerance` of `target`.
    pub fn threshold(target: f64, tolerance: f64) -> Self {
        Self::new(PollCondition::Threshold { target, tolerance })
    }

    /// Creates a spec using the timeout, interval and error budget from configuration.
    pub fn from_config(condition: PollCondition<T>, config: &PollConfig) -> Self {
        Self {
            condition,
            timeout: config.timeout,
            interval: config.interval,
            max_probe_errors: config.max_probe_errors,
            description: "condition".to_string(),
        }
    }

    /// Sets the total time budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the pause between evaluations. Must be non-zero.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Gives up with [`Error::ProbeFailed`] once the probe has failed more than `max` times.
    ///
    /// By default probe errors are swallowed until the timeout.
    pub fn max_probe_errors(mut self, max: u32) -> Self {
        self.max_probe_errors = Some(max);
        self
    }

    /// Names what is being waited for, used in log lines and error messages.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn condition(&self) -> &PollCondition<T> {
        &self.condition
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidArgument(format!(
                "poll interval for {} must be greater than zero",
                self.description
            )));
        }
        if let PollCondition::Threshold { target, tolerance } = &self.condition {
            if !target.is_finite() || !tolerance.is_finite() || *tolerance < 0.0 {
                return Err(Error::InvalidArgument(format!(
                    "threshold for {} needs a finite target and a non-negative tolerance, got {} ± {}",
                    self.description, target, tolerance
                )));
            }
        }
        Ok(())
    }
}

/// Details of a poll that ran out of time
#[derive(Debug, Clone, PartialEq)]
pub struct PollTimeout<T> {
    /// Last value the probe returned, if any evaluation succeeded
    pub last_value: Option<T>,
    /// Error of the final evaluation, if it failed
    pub last_error: Option<String>,
    /// Number of evaluations performed
    pub evaluations: u32,
    /// Time spent polling
    pub elapsed: Duration,
}

/// Result of a poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The condition held; carries the value that satisfied it
    Satisfied(T),
    /// The condition never held within the timeout
    TimedOut(PollTimeout<T>),
}

impl<T: Observation> PollOutcome<T> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied(_))
    }

    /// Converts a timeout into [`Error::PollTimeout`], keeping the satisfying value otherwise.
    pub fn into_result(self, spec: &PollSpec<T>) -> Result<T> {
        match self {
            PollOutcome::Satisfied(value) => Ok(value),
            PollOutcome::TimedOut(timeout) => Err(Error::PollTimeout {
                description: spec.description.clone(),
                expected: spec.condition.expected(),
                last_observed: timeout
                    .last_value
                    .as_ref()
                    .map(|value| format!("{:?}", value))
                    .unwrap_or_else(|| "nothing".to_string()),
                last_error: timeout.last_error,
                elapsed: timeout.elapsed,
            }),
        }
    }
}

/// Polls `probe` until `spec`'s condition holds or its timeout elapses.
///
/// The probe runs at least once. The first satisfying value is returned
/// immediately; otherwise the loop sleeps one interval between evaluations (never
/// past the timeout) and stops once the timeout has elapsed. An evaluation is cut
/// off at `timeout + interval`, so the poll never runs longer than that. A probe
/// error or a cut-off evaluation counts as "not yet satisfied".
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if the spec has a zero interval or a bad threshold
/// - [`Error::ProbeFailed`] if the probe failed more often than `max_probe_errors`
///
/// A timeout is not an error here: it comes back as [`PollOutcome::TimedOut`].
pub async fn poll<T, F, Fut, E>(spec: &PollSpec<T>, mut probe: F) -> Result<PollOutcome<T>>
where
    T: Observation,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: fmt::Display,
{
    spec.validate()?;

    let start = Instant::now();
    // Hard bound for the whole poll, including an evaluation still in flight.
    let limit = spec.timeout.saturating_add(spec.interval);
    let mut evaluations = 0u32;
    let mut failures = 0u32;
    let mut last_value = None;
    let mut last_error = None;

    loop {
        // Evaluations only start before the timeout, so this is never below one interval.
        let budget = limit.saturating_sub(start.elapsed());
        evaluations += 1;

        let failure = match tokio::time::timeout(budget, probe()).await {
            Ok(Ok(value)) => {
                if spec.condition.is_satisfied(&value) {
                    tracing::debug!(
                        description = %spec.description,
                        evaluations,
                        elapsed = ?start.elapsed(),
                        "Condition satisfied"
                    );
                    return Ok(PollOutcome::Satisfied(value));
                }
                last_value = Some(value);
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("probe did not complete within {:?}", budget)),
        };

        match failure {
            Some(message) => {
                failures += 1;
                tracing::debug!(
                    description = %spec.description,
                    evaluation = evaluations,
                    "Probe failed, treating as not yet satisfied: {}",
                    message
                );
                if let Some(max) = spec.max_probe_errors {
                    if failures > max {
                        return Err(Error::ProbeFailed {
                            description: spec.description.clone(),
                            failures,
                            message,
                        });
                    }
                }
                last_error = Some(message);
            }
            None => last_error = None,
        }

        let elapsed = start.elapsed();
        if elapsed >= spec.timeout {
            tracing::debug!(
                description = %spec.description,
                evaluations,
                ?elapsed,
                "Condition not satisfied before timeout"
            );
            return Ok(PollOutcome::TimedOut(PollTimeout {
                last_value,
                last_error,
                evaluations,
                elapsed,
            }));
        }

        tokio::time::sleep(spec.interval.min(spec.timeout.saturating_sub(elapsed))).await;
    }
}

/// Polls like [`poll`] but turns a timeout into [`Error::PollTimeout`].
pub async fn wait_for<T, F, Fut, E>(spec: &PollSpec<T>, probe: F) -> Result<T>
where
    T: Observation,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: fmt::Display,
{
    poll(spec, probe).await?.into_result(spec)
}
