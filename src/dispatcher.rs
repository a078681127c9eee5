use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::HeaderName;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{Instrument, debug, info_span, warn};

use crate::TRACE_ID_HEADER;
use crate::auth::{AnonymousAuthService, AuthService};
use crate::error::{Error, StatusCode};
use crate::metrics::{DispatcherMetrics, DispatcherMetricsSnapshot};
use crate::operation::{OperationResponse, unwrap_operation};
use crate::settings::{CallSettings, DEFAULT_CLIENT_TIMEOUT, OperationParams, ResolvedSettings};
use crate::transport::{Connector, Transport, UnaryCall};
use crate::util::{EntryPoint, method_path, parse_header_value};

/// A request that carries an operation-control block.
pub trait OperationRequest: Serialize + Send {
    fn set_operation_params(&mut self, params: OperationParams);
}

/// Binds one remote method to its request and response types.
pub trait ServiceMethod {
    const NAME: &'static str;
    type Request: OperationRequest;
    type Response: DeserializeOwned + Send;
}

pub struct DispatcherBuilder {
    service_name: String,
    auth_service: Option<Arc<dyn AuthService>>,
    default_timeout: Duration,
    metrics_enabled: bool,
}

impl DispatcherBuilder {
    pub(crate) fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            auth_service: None,
            default_timeout: DEFAULT_CLIENT_TIMEOUT,
            metrics_enabled: false,
        }
    }

    pub fn auth_service(mut self, auth_service: Arc<dyn AuthService>) -> Self {
        self.auth_service = Some(auth_service);
        self
    }

    /// Client timeout for calls whose settings leave it unset.
    pub fn default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn build<T: Transport>(self, transport: T) -> Dispatcher<T> {
        let auth_service = self
            .auth_service
            .unwrap_or_else(|| Arc::new(AnonymousAuthService::new()));
        Dispatcher {
            inner: Arc::new(DispatcherInner {
                service_name: self.service_name,
                transport,
                auth_service,
                default_timeout: self.default_timeout,
                metrics: DispatcherMetrics::new(self.metrics_enabled),
            }),
        }
    }

    /// Opens a transport for `entry_point` with the auth service's SSL bundle.
    pub fn connect<C: Connector>(
        self,
        connector: &C,
        entry_point: &str,
    ) -> crate::Result<Dispatcher<C::Transport>> {
        let entry_point = EntryPoint::parse(entry_point)?;
        let ssl_credentials = self
            .auth_service
            .as_ref()
            .and_then(|auth_service| auth_service.ssl_credentials());
        let transport = connector.connect(&entry_point, ssl_credentials)?;
        debug!(
            service = %self.service_name,
            entry_point = %entry_point,
            ssl = ssl_credentials.is_some(),
            "connected service transport"
        );
        Ok(self.build(transport))
    }
}

/// Wraps a transport bound to one service. Every method goes through
/// [`Dispatcher::execute`], which applies settings, deadlines, auth metadata
/// and the client-side timeout.
pub struct Dispatcher<T> {
    inner: Arc<DispatcherInner<T>>,
}

struct DispatcherInner<T> {
    service_name: String,
    transport: T,
    auth_service: Arc<dyn AuthService>,
    default_timeout: Duration,
    metrics: DispatcherMetrics,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Dispatcher")
            .field("service_name", &self.inner.service_name)
            .field("default_timeout", &self.inner.default_timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher<()> {
    pub fn builder(service_name: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(service_name)
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    pub fn metrics_snapshot(&self) -> DispatcherMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Settings apply to this call only; `None` means every default.
    pub async fn execute<M: ServiceMethod>(
        &self,
        request: M::Request,
        settings: Option<&CallSettings>,
    ) -> crate::Result<M::Response> {
        let path = method_path(&self.inner.service_name, M::NAME);
        let settings = CallSettings::resolve(settings, self.inner.default_timeout);
        let span = info_span!(
            "callx.call",
            service = %self.inner.service_name,
            method = M::NAME,
            timeout_ms = settings.timeout.as_millis() as u64,
        );
        self.dispatch(path, request, settings).instrument(span).await
    }

    /// Executes the call and unwraps its operation envelope.
    pub async fn execute_operation<M>(
        &self,
        request: M::Request,
        settings: Option<&CallSettings>,
        suppressed: &[StatusCode],
    ) -> crate::Result<Option<Bytes>>
    where
        M: ServiceMethod,
        M::Response: OperationResponse,
    {
        let response = self.execute::<M>(request, settings).await?;
        unwrap_operation(&response, suppressed)
    }

    /// Spawns the call and hands its outcome to `callback` exactly once. A
    /// transport answer arriving after the client timeout is discarded.
    pub fn execute_with_callback<M, F>(
        &self,
        request: M::Request,
        settings: Option<CallSettings>,
        callback: F,
    ) -> JoinHandle<()>
    where
        M: ServiceMethod + 'static,
        M::Request: 'static,
        M::Response: 'static,
        F: FnOnce(crate::Result<M::Response>) + Send + 'static,
    {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let result = dispatcher.execute::<M>(request, settings.as_ref()).await;
            callback(result);
        })
    }

    async fn dispatch<Req, Resp>(
        &self,
        path: String,
        request: Req,
        settings: ResolvedSettings,
    ) -> crate::Result<Resp>
    where
        Req: OperationRequest,
        Resp: DeserializeOwned,
    {
        let metrics = &self.inner.metrics;
        metrics.record_call_started();
        let _in_flight = metrics.enter_in_flight();
        let started_at = Instant::now();

        let result = self.dispatch_once(&path, request, settings).await;
        metrics.record_call_completed(&result, started_at.elapsed());
        match &result {
            Ok(_) => debug!(path = %path, "call completed"),
            Err(error) => debug!(path = %path, kind = %error.kind(), "call failed: {error}"),
        }
        result
    }

    async fn dispatch_once<Req, Resp>(
        &self,
        path: &str,
        mut request: Req,
        settings: ResolvedSettings,
    ) -> crate::Result<Resp>
    where
        Req: OperationRequest,
        Resp: DeserializeOwned,
    {
        request.set_operation_params(settings.operation_params());

        let mut metadata = self
            .inner
            .auth_service
            .auth_metadata()
            .await
            .map_err(credential_error)?;
        if let Some(trace_id) = &settings.trace_id {
            metadata.insert(
                HeaderName::from_static(TRACE_ID_HEADER),
                parse_header_value(TRACE_ID_HEADER, trace_id)?,
            );
        }

        let body = encode_request(path, &request)?;
        debug!(path, body_bytes = body.len(), "dispatching call");
        let call = UnaryCall {
            path: path.to_owned(),
            body,
            metadata,
        };
        let response = self.race_client_timeout(path, call, settings.timeout).await?;
        decode_response(path, &response)
    }

    async fn race_client_timeout(
        &self,
        path: &str,
        call: UnaryCall,
        client_timeout: Duration,
    ) -> crate::Result<Bytes> {
        // Detached so that losing the race only abandons the wait.
        let in_flight = tokio::spawn(self.inner.transport.unary(call));
        let joined = if client_timeout.is_zero() {
            in_flight.await
        } else {
            match timeout(client_timeout, in_flight).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        path,
                        timeout_ms = client_timeout.as_millis() as u64,
                        "client-side timeout fired, server-side execution is not cancelled"
                    );
                    return Err(Error::DeadlineExceeded {
                        timeout_ms: client_timeout.as_millis(),
                        path: path.to_owned(),
                    });
                }
            }
        };

        match joined {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(error.into_error(path)),
            Err(join_error) => Err(Error::TaskFailed {
                path: path.to_owned(),
                message: join_error.to_string(),
            }),
        }
    }
}

fn credential_error(error: Error) -> Error {
    match error {
        Error::Auth { .. } => error,
        other => Error::Auth {
            source: Box::new(other),
        },
    }
}

fn encode_request<Req: Serialize>(path: &str, request: &Req) -> crate::Result<Bytes> {
    serde_json::to_vec(request)
        .map(Bytes::from)
        .map_err(|source| Error::Encode {
            path: path.to_owned(),
            source,
        })
}

fn decode_response<Resp: DeserializeOwned>(path: &str, body: &[u8]) -> crate::Result<Resp> {
    serde_json::from_slice(body).map_err(|source| Error::Decode {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::future::BoxFuture;
    use serde::{Deserialize, Serialize};

    use super::{Dispatcher, OperationRequest, ServiceMethod};
    use crate::error::{Error, TransportErrorKind};
    use crate::settings::{CallSettings, OperationParams};
    use crate::transport::{Transport, TransportError, UnaryCall};

    #[derive(Debug, Default, Serialize)]
    struct PingRequest {
        #[serde(skip_serializing_if = "Option::is_none")]
        operation_params: Option<OperationParams>,
    }

    impl OperationRequest for PingRequest {
        fn set_operation_params(&mut self, params: OperationParams) {
            self.operation_params = Some(params);
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct PingResponse {
        pong: bool,
    }

    struct Ping;

    impl ServiceMethod for Ping {
        const NAME: &'static str = "Ping";
        type Request = PingRequest;
        type Response = PingResponse;
    }

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<UnaryCall>>,
        fail: bool,
    }

    impl Transport for RecordingTransport {
        fn unary(&self, call: UnaryCall) -> BoxFuture<'static, Result<Bytes, TransportError>> {
            crate::util::lock_unpoisoned(&self.calls).push(call);
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(TransportError::new(
                        TransportErrorKind::ConnectionLost,
                        "stream reset",
                    ))
                } else {
                    Ok(Bytes::from_static(br#"{"pong":true}"#))
                }
            })
        }
    }

    #[tokio::test]
    async fn call_is_routed_to_service_method_path() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::builder("Test.V1.PingService").build(Arc::clone(&transport));

        let response = dispatcher
            .execute::<Ping>(PingRequest::default(), None)
            .await
            .expect("ping should succeed");

        assert_eq!(response, PingResponse { pong: true });
        let calls = transport.calls.lock().expect("calls lock");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/Test.V1.PingService/Ping");
        let body: serde_json::Value =
            serde_json::from_slice(&calls[0].body).expect("body should be json");
        assert_eq!(body["operation_params"]["operation_timeout"]["seconds"], 600);
        assert_eq!(body["operation_params"]["cancel_after"]["seconds"], 600);
    }

    #[tokio::test]
    async fn transport_failure_keeps_kind_and_path() {
        let transport = RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        };
        let dispatcher = Dispatcher::builder("Test.V1.PingService").build(transport);
        let settings = CallSettings::new().with_timeout(Duration::from_secs(1));

        let error = dispatcher
            .execute::<Ping>(PingRequest::default(), Some(&settings))
            .await
            .expect_err("transport should fail");

        match error {
            Error::Transport { kind, path, .. } => {
                assert_eq!(kind, TransportErrorKind::ConnectionLost);
                assert_eq!(path, "/Test.V1.PingService/Ping");
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }
}
