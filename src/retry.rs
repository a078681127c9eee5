use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::RngExt;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Disposition, Error, ErrorKind};
use crate::observe::{RetryContext, RetryDelay, RetryObserver};

const DEFAULT_MAX_ATTEMPTS: usize = 10;
const DEFAULT_BACKOFF_CEILING: u32 = 6;
const DEFAULT_BACKOFF_SLOT: Duration = Duration::from_millis(1);
const MAX_BACKOFF_CEILING: u32 = 31;
const ANONYMOUS_METHOD_NAME: &str = "UnknownClass::UnknownMethod";

pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Immutable retry configuration shared by every call site that uses it.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff_ceiling: u32,
    backoff_slot_duration: Duration,
    retry_not_found: bool,
    retry_internal_error: bool,
    retry_deadline_exceeded: bool,
    on_retryable_error: Option<ErrorCallback>,
    on_unknown_error: Option<ErrorCallback>,
    observer: Option<Arc<dyn RetryObserver>>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff_ceiling", &self.backoff_ceiling)
            .field("backoff_slot_duration", &self.backoff_slot_duration)
            .field("retry_not_found", &self.retry_not_found)
            .field("retry_internal_error", &self.retry_internal_error)
            .field("retry_deadline_exceeded", &self.retry_deadline_exceeded)
            .field("on_retryable_error", &self.on_retryable_error.is_some())
            .field("on_unknown_error", &self.on_unknown_error.is_some())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    RetryImmediately,
    RetryWithBackoff,
    Surface,
    SurfaceUnknown,
}

impl RetryPolicy {
    pub fn standard() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ceiling: DEFAULT_BACKOFF_CEILING,
            backoff_slot_duration: DEFAULT_BACKOFF_SLOT,
            retry_not_found: true,
            retry_internal_error: true,
            retry_deadline_exceeded: false,
            on_retryable_error: None,
            on_unknown_error: None,
            observer: None,
        }
    }

    pub fn disabled() -> Self {
        Self::standard().max_attempts(1)
    }

    /// Total number of attempts, the first one included. Zero is raised to one.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn backoff_ceiling(mut self, backoff_ceiling: u32) -> Self {
        self.backoff_ceiling = backoff_ceiling.min(MAX_BACKOFF_CEILING);
        self
    }

    pub fn backoff_slot_duration(mut self, backoff_slot_duration: Duration) -> Self {
        self.backoff_slot_duration = backoff_slot_duration;
        self
    }

    pub fn retry_not_found(mut self, retry: bool) -> Self {
        self.retry_not_found = retry;
        self
    }

    pub fn retry_internal_error(mut self, retry: bool) -> Self {
        self.retry_internal_error = retry;
        self
    }

    /// Treats a client-side timeout as a backoff-retryable error instead of
    /// surfacing it through the unknown-error handler.
    pub fn retry_deadline_exceeded(mut self, retry: bool) -> Self {
        self.retry_deadline_exceeded = retry;
        self
    }

    pub fn on_retryable_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_retryable_error = Some(Arc::new(callback));
        self
    }

    pub fn on_unknown_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_unknown_error = Some(Arc::new(callback));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn configured_max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Exclusive upper bound of the delay drawn after `retries` failed attempts.
    pub fn backoff_upper_bound(&self, retries: usize) -> Duration {
        let exponent = (retries.min(self.backoff_ceiling as usize) as u32).min(MAX_BACKOFF_CEILING);
        let slots = 1_u32 << exponent;
        self.backoff_slot_duration.saturating_mul(slots)
    }

    /// Full-jitter delay: uniform in `[0, 2^min(retries, ceiling) * slot)`.
    pub fn backoff_for_retry(&self, retries: usize) -> Duration {
        let upper_nanos = self
            .backoff_upper_bound(retries)
            .as_nanos()
            .min(u64::MAX as u128) as u64;
        if upper_nanos == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        Duration::from_nanos(rng.random_range(0..upper_nanos))
    }

    fn action_for(&self, kind: ErrorKind) -> Action {
        match kind.disposition() {
            Disposition::RetryImmediately => Action::RetryImmediately,
            Disposition::RetryWithBackoff => Action::RetryWithBackoff,
            Disposition::Surface => Action::Surface,
            Disposition::Unknown
                if kind == ErrorKind::DeadlineExceeded && self.retry_deadline_exceeded =>
            {
                Action::RetryWithBackoff
            }
            Disposition::Unknown => Action::SurfaceUnknown,
        }
    }

    fn vetoes_immediate_retry(&self, kind: ErrorKind) -> bool {
        match kind {
            ErrorKind::NotFound => !self.retry_not_found,
            ErrorKind::InternalError => !self.retry_internal_error,
            _ => false,
        }
    }

    fn notify_retryable(&self, error: &Error) {
        if let Some(callback) = &self.on_retryable_error {
            callback(error);
        }
    }

    fn notify_unknown(&self, error: &Error) {
        if let Some(callback) = &self.on_unknown_error {
            callback(error);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Retry loop bound to a method name used in logs and observer contexts.
#[derive(Clone, Debug)]
pub struct RetryStrategy {
    method_name: Arc<str>,
    policy: RetryPolicy,
}

impl RetryStrategy {
    pub fn new(method_name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            method_name: Arc::from(method_name.into()),
            policy,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn retry<T, F, Fut>(&self, call: F) -> crate::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        run_with_retries(&self.method_name, &self.policy, call).await
    }
}

/// Runs `call` under `policy`; attempts are strictly sequential.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, call: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    run_with_retries(ANONYMOUS_METHOD_NAME, policy, call).await
}

async fn run_with_retries<T, F, Fut>(
    method_name: &str,
    policy: &RetryPolicy,
    mut call: F,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let max_attempts = policy.max_attempts;
    let mut attempt = 0_usize;

    loop {
        attempt += 1;
        let error = match call().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        let kind = error.kind();
        let context = RetryContext::new(method_name, attempt, max_attempts, kind);
        let attempts_left = context.attempts_left();

        let delay = match policy.action_for(kind) {
            Action::RetryImmediately => {
                policy.notify_retryable(&error);
                if policy.vetoes_immediate_retry(kind) {
                    debug!(
                        method = method_name,
                        kind = %kind,
                        "retries are disabled for this error, re-raising"
                    );
                    return Err(error);
                }
                RetryDelay::Immediate
            }
            Action::RetryWithBackoff => {
                policy.notify_retryable(&error);
                RetryDelay::Backoff(policy.backoff_for_retry(attempt - 1))
            }
            Action::Surface => {
                policy.notify_retryable(&error);
                return Err(error);
            }
            Action::SurfaceUnknown => {
                policy.notify_unknown(&error);
                return Err(error);
            }
        };

        if attempts_left == 0 {
            debug!(
                method = method_name,
                max_attempts, "all retries have been used, re-raising error"
            );
            if let Some(observer) = &policy.observer {
                observer.on_retries_exhausted(&context, &error);
            }
            return Err(error);
        }

        match delay {
            RetryDelay::Immediate => warn!(
                method = method_name,
                kind = %kind,
                attempts_left,
                "caught an error, retrying immediately: {error}"
            ),
            RetryDelay::Backoff(backoff) => warn!(
                method = method_name,
                kind = %kind,
                attempts_left,
                backoff_ms = backoff.as_millis() as u64,
                "caught an error, retrying with a backoff: {error}"
            ),
        }
        if let Some(observer) = &policy.observer {
            observer.on_retry_scheduled(&context, &error, delay);
        }
        if let RetryDelay::Backoff(delay) = delay {
            sleep(delay).await;
        }
    }
}
