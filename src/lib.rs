//! `callx` is the request execution core for database RPC SDKs: it turns a bare
//! unary call into a bounded, retried and observable operation.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use callx::prelude::*;
//! use serde::Serialize;
//!
//! #[derive(Clone, Default, Serialize)]
//! struct DescribeTableRequest {
//!     path: String,
//!     operation_params: Option<OperationParams>,
//! }
//!
//! impl OperationRequest for DescribeTableRequest {
//!     fn set_operation_params(&mut self, params: OperationParams) {
//!         self.operation_params = Some(params);
//!     }
//! }
//!
//! struct DescribeTable;
//!
//! impl ServiceMethod for DescribeTable {
//!     const NAME: &'static str = "DescribeTable";
//!     type Request = DescribeTableRequest;
//!     type Response = OperationEnvelope;
//! }
//!
//! async fn describe<T: Transport>(
//!     dispatcher: &Dispatcher<T>,
//! ) -> callx::Result<Option<bytes::Bytes>> {
//!     let policy = RetryPolicy::standard()
//!         .max_attempts(5)
//!         .backoff_slot_duration(Duration::from_millis(10));
//!     let settings = CallSettings::new()
//!         .with_trace_id("trace-42")
//!         .with_timeout(Duration::from_secs(3));
//!     let request = DescribeTableRequest {
//!         path: "/local/orders".to_owned(),
//!         ..Default::default()
//!     };
//!
//!     with_retries(&policy, || {
//!         dispatcher.execute_operation::<DescribeTable>(request.clone(), Some(&settings), &[])
//!     })
//!     .await
//! }
//! ```
//!
//! # Recommended Defaults
//!
//! - Build one `RetryPolicy` at startup and pass it to every call site.
//! - Pass fresh `CallSettings` to each call; nothing carries over between calls.
//! - Wrap session-bound calls with `pessimizable` so failing nodes are reported
//!   to discovery.

pub const TRACE_ID_HEADER: &str = "x-ydb-trace-id";

mod auth;
mod dispatcher;
mod error;
mod metrics;
mod observe;
mod operation;
mod pessimization;
mod retry;
mod settings;
mod tls;
mod transport;
mod util;

pub use crate::auth::{
    AUTH_TICKET_HEADER, AnonymousAuthService, AuthService, DATABASE_HEADER, TokenAuthService,
};
pub use crate::dispatcher::{Dispatcher, DispatcherBuilder, OperationRequest, ServiceMethod};
pub use crate::error::{Disposition, Error, ErrorKind, StatusCode, TransportErrorKind, classify};
pub use crate::metrics::DispatcherMetricsSnapshot;
pub use crate::observe::{RetryContext, RetryDelay, RetryObserver};
pub use crate::operation::{
    Issue, Operation, OperationEnvelope, OperationResponse, OperationResult,
    ensure_operation_succeeded, operation_payload, unwrap_operation,
};
pub use crate::pessimization::{Endpoint, Pessimizable, pessimizable, with_endpoint_feedback};
pub use crate::retry::{ErrorCallback, RetryPolicy, RetryStrategy, with_retries};
pub use crate::settings::{CallSettings, OperationParams, WireDuration};
pub use crate::tls::SslCredentials;
pub use crate::transport::{Connector, Transport, TransportError, UnaryCall};
pub use crate::util::EntryPoint;

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        AnonymousAuthService, AuthService, CallSettings, Dispatcher, Endpoint, Error, ErrorKind,
        OperationEnvelope, OperationParams, OperationRequest, OperationResponse, Pessimizable,
        RetryPolicy, RetryStrategy, ServiceMethod, StatusCode, TokenAuthService, Transport,
        TransportError, TransportErrorKind, UnaryCall, ensure_operation_succeeded,
        operation_payload, pessimizable, unwrap_operation, with_retries,
    };
}
