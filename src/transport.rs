use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::HeaderMap;

use crate::error::{BoxError, Error, TransportErrorKind};
use crate::tls::SslCredentials;
use crate::util::EntryPoint;

/// One unary call as seen by the transport: `/service/method`, encoded
/// request and per-call metadata.
#[derive(Clone, Debug)]
pub struct UnaryCall {
    pub path: String,
    pub body: Bytes,
    pub metadata: HeaderMap,
}

#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    source: BoxError,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub(crate) fn into_error(self, path: &str) -> Error {
        Error::Transport {
            kind: self.kind,
            path: path.to_owned(),
            source: self.source,
        }
    }
}

/// Request/response transport bound to one `host:port`.
///
/// The returned future must not borrow the transport: the dispatcher runs it
/// detached so that a client-side timeout abandons the wait without tearing
/// down the server-side call.
pub trait Transport: Send + Sync + 'static {
    fn unary(&self, call: UnaryCall) -> BoxFuture<'static, Result<Bytes, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn unary(&self, call: UnaryCall) -> BoxFuture<'static, Result<Bytes, TransportError>> {
        (**self).unary(call)
    }
}

/// Opens a transport for an entry point. SSL material is consumed here, once.
pub trait Connector {
    type Transport: Transport;

    fn connect(
        &self,
        entry_point: &EntryPoint,
        ssl_credentials: Option<&SslCredentials>,
    ) -> crate::Result<Self::Transport>;
}
