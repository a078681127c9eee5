use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(600);

/// Per-call settings. Every unset field falls back to the dispatcher default.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallSettings {
    trace_id: Option<String>,
    timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    cancel_after: Option<Duration>,
}

impl CallSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propagated to the server under the trace id header.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Client-side bound on the whole call. The server keeps running the
    /// operation after this fires; zero disables the local timer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// After this long on the server an unfinished operation reports `TIMEOUT`.
    /// Its result is unknown: it may still complete or be cancelled.
    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = Some(operation_timeout);
        self
    }

    /// After this long on the server the operation is cancelled if possible
    /// and reports `CANCELLED`.
    pub fn with_cancel_after(mut self, cancel_after: Duration) -> Self {
        self.cancel_after = Some(cancel_after);
        self
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout
    }

    pub fn cancel_after(&self) -> Option<Duration> {
        self.cancel_after
    }

    pub(crate) fn resolve(settings: Option<&Self>, default_timeout: Duration) -> ResolvedSettings {
        let timeout = settings
            .and_then(|settings| settings.timeout)
            .unwrap_or(default_timeout);
        ResolvedSettings {
            trace_id: settings.and_then(|settings| settings.trace_id.clone()),
            timeout,
            operation_timeout: settings
                .and_then(|settings| settings.operation_timeout)
                .unwrap_or(timeout),
            cancel_after: settings
                .and_then(|settings| settings.cancel_after)
                .unwrap_or(timeout),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ResolvedSettings {
    pub(crate) trace_id: Option<String>,
    pub(crate) timeout: Duration,
    pub(crate) operation_timeout: Duration,
    pub(crate) cancel_after: Duration,
}

impl ResolvedSettings {
    pub(crate) fn operation_params(&self) -> OperationParams {
        OperationParams {
            operation_timeout: Some(WireDuration::from(self.operation_timeout)),
            cancel_after: Some(WireDuration::from(self.cancel_after)),
        }
    }
}

/// Duration as whole seconds plus a nanosecond remainder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDuration {
    pub seconds: i64,
    pub nanos: i32,
}

impl From<Duration> for WireDuration {
    fn from(duration: Duration) -> Self {
        Self {
            seconds: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
            nanos: duration.subsec_nanos() as i32,
        }
    }
}

impl From<WireDuration> for Duration {
    fn from(duration: WireDuration) -> Self {
        Duration::new(
            u64::try_from(duration.seconds).unwrap_or(0),
            u32::try_from(duration.nanos).unwrap_or(0),
        )
    }
}

/// Operation-control block interpreted by the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout: Option<WireDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_after: Option<WireDuration>,
}
