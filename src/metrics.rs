use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::Error;
use crate::util::lock_unpoisoned;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispatcherMetricsSnapshot {
    pub calls_started: u64,
    pub calls_succeeded: u64,
    pub calls_failed: u64,
    pub deadline_exceeded: u64,
    pub transport_errors: u64,
    pub in_flight: u64,
    pub latency_samples: u64,
    pub latency_total_ms: u64,
    pub latency_avg_ms: f64,
    pub status_counts: BTreeMap<String, u64>,
    pub error_counts: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct DispatcherMetrics {
    inner: Option<Arc<DispatcherMetricsInner>>,
}

#[derive(Debug, Default)]
struct DispatcherMetricsInner {
    calls_started: AtomicU64,
    calls_succeeded: AtomicU64,
    calls_failed: AtomicU64,
    deadline_exceeded: AtomicU64,
    transport_errors: AtomicU64,
    in_flight: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    status_counts: Mutex<BTreeMap<String, u64>>,
    error_counts: Mutex<BTreeMap<String, u64>>,
}

pub(crate) struct InFlightGuard {
    inner: Option<Arc<DispatcherMetricsInner>>,
}

impl DispatcherMetrics {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            inner: enabled.then(Arc::default),
        }
    }

    pub(crate) fn record_call_started(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.calls_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enter_in_flight(&self) -> InFlightGuard {
        if let Some(inner) = &self.inner {
            inner.in_flight.fetch_add(1, Ordering::Relaxed);
        }
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }

    pub(crate) fn record_call_completed<T>(&self, result: &Result<T, Error>, latency: Duration) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.latency_samples.fetch_add(1, Ordering::Relaxed);
        inner.latency_total_ms.fetch_add(
            latency.as_millis().min(u64::MAX as u128) as u64,
            Ordering::Relaxed,
        );

        let Err(error) = result else {
            inner.calls_succeeded.fetch_add(1, Ordering::Relaxed);
            return;
        };
        inner.calls_failed.fetch_add(1, Ordering::Relaxed);
        match error {
            Error::DeadlineExceeded { .. } => {
                inner.deadline_exceeded.fetch_add(1, Ordering::Relaxed);
            }
            Error::Transport { .. } => {
                inner.transport_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        add_count(&inner.status_counts, error.status().as_str());
        add_count(&inner.error_counts, error.kind().as_str());
    }

    pub(crate) fn snapshot(&self) -> DispatcherMetricsSnapshot {
        let Some(inner) = &self.inner else {
            return DispatcherMetricsSnapshot::default();
        };
        let latency_samples = inner.latency_samples.load(Ordering::Relaxed);
        let latency_total_ms = inner.latency_total_ms.load(Ordering::Relaxed);
        let latency_avg_ms = if latency_samples == 0 {
            0.0
        } else {
            latency_total_ms as f64 / latency_samples as f64
        };

        DispatcherMetricsSnapshot {
            calls_started: inner.calls_started.load(Ordering::Relaxed),
            calls_succeeded: inner.calls_succeeded.load(Ordering::Relaxed),
            calls_failed: inner.calls_failed.load(Ordering::Relaxed),
            deadline_exceeded: inner.deadline_exceeded.load(Ordering::Relaxed),
            transport_errors: inner.transport_errors.load(Ordering::Relaxed),
            in_flight: inner.in_flight.load(Ordering::Relaxed),
            latency_samples,
            latency_total_ms,
            latency_avg_ms,
            status_counts: lock_unpoisoned(&inner.status_counts).clone(),
            error_counts: lock_unpoisoned(&inner.error_counts).clone(),
        }
    }
}

fn add_count(counts: &Mutex<BTreeMap<String, u64>>, key: &str) {
    let mut counts = lock_unpoisoned(counts);
    *counts.entry(key.to_owned()).or_insert(0) += 1;
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(inner) = &self.inner {
            inner.in_flight.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
