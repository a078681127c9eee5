use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use callx::prelude::*;
use callx::{Operation, RetryContext, RetryDelay, RetryObserver, TRACE_ID_HEADER};
use futures_util::future::BoxFuture;
use serde::Serialize;

const SCHEME_SERVICE: &str = "Ydb.Scheme.V1.SchemeService";

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

enum Reply {
    Status(StatusCode),
    Payload(&'static [u8]),
    Fail(TransportErrorKind),
    Hang,
}

#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<UnaryCall>>,
}

impl ScriptedTransport {
    fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::default(),
        })
    }

    fn call_count(&self) -> usize {
        lock_unpoisoned(&self.calls).len()
    }
}

fn envelope_bytes(operation: Operation) -> Bytes {
    let envelope = OperationEnvelope::new(operation);
    Bytes::from(serde_json::to_vec(&envelope).expect("envelope should encode"))
}

impl Transport for ScriptedTransport {
    fn unary(&self, call: UnaryCall) -> BoxFuture<'static, Result<Bytes, TransportError>> {
        lock_unpoisoned(&self.calls).push(call);
        let reply = lock_unpoisoned(&self.replies)
            .pop_front()
            .unwrap_or(Reply::Hang);
        Box::pin(async move {
            match reply {
                Reply::Status(status) => Ok(envelope_bytes(Operation::ready(status))),
                Reply::Payload(payload) => Ok(envelope_bytes(
                    Operation::ready(StatusCode::Success).with_result(payload),
                )),
                Reply::Fail(kind) => Err(TransportError::new(kind, "scripted transport failure")),
                Reply::Hang => futures_util::future::pending().await,
            }
        })
    }
}

#[derive(Clone, Debug, Default, Serialize)]
struct ListDirectoryRequest {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation_params: Option<OperationParams>,
}

impl OperationRequest for ListDirectoryRequest {
    fn set_operation_params(&mut self, params: OperationParams) {
        self.operation_params = Some(params);
    }
}

struct ListDirectory;

impl ServiceMethod for ListDirectory {
    const NAME: &'static str = "ListDirectory";
    type Request = ListDirectoryRequest;
    type Response = OperationEnvelope;
}

fn list_request() -> ListDirectoryRequest {
    ListDirectoryRequest {
        path: "/local".to_owned(),
        ..ListDirectoryRequest::default()
    }
}

#[derive(Default)]
struct NodeEndpoint {
    pessimized: AtomicUsize,
}

impl Endpoint for NodeEndpoint {
    fn address(&self) -> &str {
        "ydb-node-3:2135"
    }

    fn pessimize(&self) {
        self.pessimized.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Session {
    endpoint: NodeEndpoint,
}

impl Pessimizable for Session {
    fn endpoint(&self) -> &dyn Endpoint {
        &self.endpoint
    }
}

#[derive(Default)]
struct DelayLog {
    delays: Mutex<Vec<RetryDelay>>,
}

impl RetryObserver for DelayLog {
    fn on_retry_scheduled(&self, _context: &RetryContext, _error: &Error, delay: RetryDelay) {
        lock_unpoisoned(&self.delays).push(delay);
    }
}

#[tokio::test]
async fn unavailable_then_success_pessimizes_the_failing_attempt_only() {
    let transport = ScriptedTransport::new([
        Reply::Status(StatusCode::Unavailable),
        Reply::Payload(b"entries"),
    ]);
    let dispatcher = Dispatcher::builder(SCHEME_SERVICE).build(Arc::clone(&transport));
    let session = Session::default();
    let policy = RetryPolicy::standard().max_attempts(3);
    let request = list_request();

    let payload = with_retries(&policy, || {
        pessimizable(
            &session,
            dispatcher.execute_operation::<ListDirectory>(request.clone(), None, &[]),
        )
    })
    .await
    .expect("second attempt should succeed");

    assert_eq!(payload, Some(Bytes::from_static(b"entries")));
    assert_eq!(transport.call_count(), 2);
    assert_eq!(session.endpoint.pessimized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn not_found_retries_never_pessimize() {
    let transport = ScriptedTransport::new([
        Reply::Status(StatusCode::NotFound),
        Reply::Status(StatusCode::NotFound),
        Reply::Status(StatusCode::NotFound),
    ]);
    let dispatcher = Dispatcher::builder(SCHEME_SERVICE).build(Arc::clone(&transport));
    let session = Session::default();
    let strategy = RetryStrategy::new(
        "SchemeService::ListDirectory",
        RetryPolicy::standard().max_attempts(3),
    );
    let request = list_request();

    let error = strategy
        .retry(|| {
            pessimizable(
                &session,
                dispatcher.execute_operation::<ListDirectory>(request.clone(), None, &[]),
            )
        })
        .await
        .expect_err("not found should surface once attempts run out");

    assert_eq!(error.status(), StatusCode::NotFound);
    assert_eq!(transport.call_count(), 3);
    assert_eq!(session.endpoint.pessimized.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn connection_errors_back_off_before_the_next_attempt() {
    let transport = ScriptedTransport::new([
        Reply::Fail(TransportErrorKind::ConnectionLost),
        Reply::Fail(TransportErrorKind::ConnectionFailure),
        Reply::Payload(b"entries"),
    ]);
    let dispatcher = Dispatcher::builder(SCHEME_SERVICE).build(Arc::clone(&transport));
    let observer = Arc::new(DelayLog::default());
    let policy = RetryPolicy::standard()
        .backoff_slot_duration(Duration::from_millis(50))
        .observer(observer.clone());
    let request = list_request();

    let payload = with_retries(&policy, || {
        dispatcher.execute_operation::<ListDirectory>(request.clone(), None, &[])
    })
    .await
    .expect("third attempt should succeed");

    assert_eq!(payload, Some(Bytes::from_static(b"entries")));
    assert_eq!(transport.call_count(), 3);
    let delays = lock_unpoisoned(&observer.delays).clone();
    assert_eq!(delays.len(), 2);
    assert!(
        delays
            .iter()
            .all(|delay| matches!(delay, RetryDelay::Backoff(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn client_timeout_is_unknown_unless_opted_in() {
    let transport = ScriptedTransport::new([Reply::Hang, Reply::Payload(b"unreached")]);
    let dispatcher = Dispatcher::builder(SCHEME_SERVICE).build(Arc::clone(&transport));
    let unknown = Arc::new(AtomicUsize::new(0));
    let unknown_in_callback = Arc::clone(&unknown);
    let policy = RetryPolicy::standard().on_unknown_error(move |_| {
        unknown_in_callback.fetch_add(1, Ordering::SeqCst);
    });
    let request = list_request();

    let error = with_retries(&policy, || {
        let settings = CallSettings::new().with_timeout(Duration::from_millis(100));
        let dispatcher = &dispatcher;
        let request = request.clone();
        async move {
            dispatcher
                .execute_operation::<ListDirectory>(request, Some(&settings), &[])
                .await
        }
    })
    .await
    .expect_err("client timeout should surface");

    assert_eq!(error.kind(), ErrorKind::DeadlineExceeded);
    assert_eq!(transport.call_count(), 1);
    assert_eq!(unknown.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn client_timeout_retries_with_backoff_when_opted_in() {
    let transport = ScriptedTransport::new([Reply::Hang, Reply::Payload(b"entries")]);
    let dispatcher = Dispatcher::builder(SCHEME_SERVICE).build(Arc::clone(&transport));
    let observer = Arc::new(DelayLog::default());
    let policy = RetryPolicy::standard()
        .retry_deadline_exceeded(true)
        .observer(observer.clone());
    let request = list_request();

    let payload = with_retries(&policy, || {
        let settings = CallSettings::new().with_timeout(Duration::from_millis(100));
        let dispatcher = &dispatcher;
        let request = request.clone();
        async move {
            dispatcher
                .execute_operation::<ListDirectory>(request, Some(&settings), &[])
                .await
        }
    })
    .await
    .expect("second attempt should succeed");

    assert_eq!(payload, Some(Bytes::from_static(b"entries")));
    assert_eq!(transport.call_count(), 2);
    assert!(matches!(
        lock_unpoisoned(&observer.delays).as_slice(),
        [RetryDelay::Backoff(_)]
    ));
}

#[tokio::test]
async fn every_attempt_gets_fresh_settings() {
    let transport = ScriptedTransport::new([
        Reply::Status(StatusCode::Aborted),
        Reply::Status(StatusCode::BadSession),
        Reply::Payload(b"done"),
    ]);
    let dispatcher = Dispatcher::builder(SCHEME_SERVICE).build(Arc::clone(&transport));
    let attempt = AtomicUsize::new(0);
    let policy = RetryPolicy::standard();
    let request = list_request();

    with_retries(&policy, || {
        let settings = CallSettings::new().with_trace_id(format!(
            "trace-{}",
            attempt.fetch_add(1, Ordering::SeqCst) + 1
        ));
        let dispatcher = &dispatcher;
        let request = request.clone();
        async move {
            dispatcher
                .execute_operation::<ListDirectory>(request, Some(&settings), &[])
                .await
        }
    })
    .await
    .expect("third attempt should succeed");

    let trace_ids: Vec<_> = lock_unpoisoned(&transport.calls)
        .iter()
        .filter_map(|call| call.metadata.get(TRACE_ID_HEADER))
        .filter_map(|value| value.to_str().ok().map(str::to_owned))
        .collect();
    assert_eq!(trace_ids, vec!["trace-1", "trace-2", "trace-3"]);
}

#[tokio::test]
async fn non_retryable_server_status_surfaces_immediately() {
    let transport = ScriptedTransport::new([
        Reply::Status(StatusCode::SchemeError),
        Reply::Payload(b"unreached"),
    ]);
    let dispatcher = Dispatcher::builder(SCHEME_SERVICE).build(Arc::clone(&transport));
    let retryable = Arc::new(AtomicUsize::new(0));
    let retryable_in_callback = Arc::clone(&retryable);
    let policy = RetryPolicy::standard().on_retryable_error(move |_| {
        retryable_in_callback.fetch_add(1, Ordering::SeqCst);
    });
    let request = list_request();

    let error = with_retries(&policy, || {
        dispatcher.execute_operation::<ListDirectory>(request.clone(), None, &[])
    })
    .await
    .expect_err("scheme error should surface");

    assert_eq!(error.status(), StatusCode::SchemeError);
    assert_eq!(error.kind(), ErrorKind::ServerError);
    assert_eq!(transport.call_count(), 1);
    assert_eq!(retryable.load(Ordering::SeqCst), 1);
}
