use std::time::Duration;

use crate::error::{Error, ErrorKind};

#[derive(Clone, Debug)]
pub struct RetryContext {
    method_name: String,
    attempt: usize,
    max_attempts: usize,
    kind: ErrorKind,
}

impl RetryContext {
    pub(crate) fn new(
        method_name: impl Into<String>,
        attempt: usize,
        max_attempts: usize,
        kind: ErrorKind,
    ) -> Self {
        Self {
            method_name: method_name.into(),
            attempt,
            max_attempts,
            kind,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// One-based number of the attempt that just failed.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn attempts_left(&self) -> usize {
        self.max_attempts.saturating_sub(self.attempt)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDelay {
    Immediate,
    Backoff(Duration),
}

pub trait RetryObserver: Send + Sync {
    fn on_retry_scheduled(&self, _context: &RetryContext, _error: &Error, _delay: RetryDelay) {}

    fn on_retries_exhausted(&self, _context: &RetryContext, _error: &Error) {}
}
