use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::{Issue, render_issues};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

const SERVER_STATUSES_FIRST: u32 = 400_000;
const TRANSPORT_STATUSES_FIRST: u32 = 401_000;
const CLIENT_STATUSES_FIRST: u32 = 402_000;

/// Numeric status reported by the server operation envelope, the transport or
/// the client itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum StatusCode {
    Unspecified,
    Success,
    BadRequest,
    Unauthorized,
    InternalError,
    Aborted,
    Unavailable,
    Overloaded,
    SchemeError,
    GenericError,
    Timeout,
    BadSession,
    PreconditionFailed,
    AlreadyExists,
    NotFound,
    SessionExpired,
    Cancelled,
    Undetermined,
    Unsupported,
    SessionBusy,
    ConnectionLost,
    ConnectionFailure,
    DeadlineExceeded,
    ClientInternalError,
    Unimplemented,
    Unauthenticated,
    SessionPoolEmpty,
    Other(u32),
}

impl StatusCode {
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Unspecified => 0,
            Self::Success => SERVER_STATUSES_FIRST,
            Self::BadRequest => SERVER_STATUSES_FIRST + 10,
            Self::Unauthorized => SERVER_STATUSES_FIRST + 20,
            Self::InternalError => SERVER_STATUSES_FIRST + 30,
            Self::Aborted => SERVER_STATUSES_FIRST + 40,
            Self::Unavailable => SERVER_STATUSES_FIRST + 50,
            Self::Overloaded => SERVER_STATUSES_FIRST + 60,
            Self::SchemeError => SERVER_STATUSES_FIRST + 70,
            Self::GenericError => SERVER_STATUSES_FIRST + 80,
            Self::Timeout => SERVER_STATUSES_FIRST + 90,
            Self::BadSession => SERVER_STATUSES_FIRST + 100,
            Self::PreconditionFailed => SERVER_STATUSES_FIRST + 120,
            Self::AlreadyExists => SERVER_STATUSES_FIRST + 130,
            Self::NotFound => SERVER_STATUSES_FIRST + 140,
            Self::SessionExpired => SERVER_STATUSES_FIRST + 150,
            Self::Cancelled => SERVER_STATUSES_FIRST + 160,
            Self::Undetermined => SERVER_STATUSES_FIRST + 170,
            Self::Unsupported => SERVER_STATUSES_FIRST + 180,
            Self::SessionBusy => SERVER_STATUSES_FIRST + 190,
            Self::ConnectionLost => TRANSPORT_STATUSES_FIRST + 10,
            Self::ConnectionFailure => TRANSPORT_STATUSES_FIRST + 20,
            Self::DeadlineExceeded => TRANSPORT_STATUSES_FIRST + 30,
            Self::ClientInternalError => TRANSPORT_STATUSES_FIRST + 40,
            Self::Unimplemented => TRANSPORT_STATUSES_FIRST + 50,
            Self::Unauthenticated => CLIENT_STATUSES_FIRST + 30,
            Self::SessionPoolEmpty => CLIENT_STATUSES_FIRST + 40,
            Self::Other(code) => code,
        }
    }

    pub const fn from_u32(code: u32) -> Self {
        match code {
            0 => Self::Unspecified,
            400_000 => Self::Success,
            400_010 => Self::BadRequest,
            400_020 => Self::Unauthorized,
            400_030 => Self::InternalError,
            400_040 => Self::Aborted,
            400_050 => Self::Unavailable,
            400_060 => Self::Overloaded,
            400_070 => Self::SchemeError,
            400_080 => Self::GenericError,
            400_090 => Self::Timeout,
            400_100 => Self::BadSession,
            400_120 => Self::PreconditionFailed,
            400_130 => Self::AlreadyExists,
            400_140 => Self::NotFound,
            400_150 => Self::SessionExpired,
            400_160 => Self::Cancelled,
            400_170 => Self::Undetermined,
            400_180 => Self::Unsupported,
            400_190 => Self::SessionBusy,
            401_010 => Self::ConnectionLost,
            401_020 => Self::ConnectionFailure,
            401_030 => Self::DeadlineExceeded,
            401_040 => Self::ClientInternalError,
            401_050 => Self::Unimplemented,
            402_030 => Self::Unauthenticated,
            402_040 => Self::SessionPoolEmpty,
            other => Self::Other(other),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "STATUS_CODE_UNSPECIFIED",
            Self::Success => "SUCCESS",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Aborted => "ABORTED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Overloaded => "OVERLOADED",
            Self::SchemeError => "SCHEME_ERROR",
            Self::GenericError => "GENERIC_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::BadSession => "BAD_SESSION",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Cancelled => "CANCELLED",
            Self::Undetermined => "UNDETERMINED",
            Self::Unsupported => "UNSUPPORTED",
            Self::SessionBusy => "SESSION_BUSY",
            Self::ConnectionLost => "CONNECTION_LOST",
            Self::ConnectionFailure => "CONNECTION_FAILURE",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::ClientInternalError => "CLIENT_INTERNAL_ERROR",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::SessionPoolEmpty => "SESSION_POOL_EMPTY",
            Self::Other(_) => "UNKNOWN_STATUS",
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        Self::from_u32(code)
    }
}

impl From<StatusCode> for u32 {
    fn from(status: StatusCode) -> Self {
        status.as_u32()
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} ({})", self.as_str(), self.as_u32())
    }
}

/// Failure class reported by a [`crate::transport::Transport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    ConnectionLost,
    ConnectionFailure,
    DeadlineExceeded,
    Unimplemented,
    Unauthenticated,
    ClientInternal,
    /// The transport could not attach any status to the failure.
    Other,
}

impl TransportErrorKind {
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::ConnectionLost => StatusCode::ConnectionLost,
            Self::ConnectionFailure => StatusCode::ConnectionFailure,
            Self::DeadlineExceeded => StatusCode::DeadlineExceeded,
            Self::Unimplemented => StatusCode::Unimplemented,
            Self::Unauthenticated => StatusCode::Unauthenticated,
            Self::ClientInternal => StatusCode::ClientInternalError,
            Self::Other => StatusCode::Unspecified,
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::ConnectionLost => "connection_lost",
            Self::ConnectionFailure => "connection_failure",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Unimplemented => "unimplemented",
            Self::Unauthenticated => "unauthenticated",
            Self::ClientInternal => "client_internal",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Closed classification of every [`Error`] the crate can surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    Unavailable,
    Aborted,
    BadSession,
    NotFound,
    InternalError,
    Overloaded,
    ConnectionError,
    /// The client-side timer fired before the transport answered.
    DeadlineExceeded,
    /// Any other status produced by the server or the status machinery.
    ServerError,
    /// Anything that never went through status parsing.
    Unknown,
}

/// What the retry engine does with an error of a given kind under default policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    RetryImmediately,
    RetryWithBackoff,
    Surface,
    Unknown,
}

impl ErrorKind {
    pub const fn disposition(self) -> Disposition {
        match self {
            Self::Unavailable
            | Self::Aborted
            | Self::BadSession
            | Self::NotFound
            | Self::InternalError => Disposition::RetryImmediately,
            Self::Overloaded | Self::ConnectionError => Disposition::RetryWithBackoff,
            Self::ServerError => Disposition::Surface,
            Self::DeadlineExceeded | Self::Unknown => Disposition::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Aborted => "aborted",
            Self::BadSession => "bad_session",
            Self::NotFound => "not_found",
            Self::InternalError => "internal_error",
            Self::Overloaded => "overloaded",
            Self::ConnectionError => "connection_error",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("operation failed with status {status}: {}", render_issues(.message, .issues))]
    Status {
        status: StatusCode,
        message: String,
        issues: Vec<Issue>,
    },
    #[error("no operation in response")]
    MissingOperation,
    #[error("missing operation result value")]
    MissingValue,
    #[error("transport error ({kind}) calling {path}: {source}")]
    Transport {
        kind: TransportErrorKind,
        path: String,
        #[source]
        source: BoxError,
    },
    #[error("deadline exceeded after {timeout_ms}ms calling {path}")]
    DeadlineExceeded { timeout_ms: u128, path: String },
    #[error("failed to encode request for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to obtain auth metadata: {source}")]
    Auth {
        #[source]
        source: BoxError,
    },
    #[error("invalid metadata value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("invalid entry point {entry_point}: {reason}")]
    InvalidEntryPoint {
        entry_point: String,
        reason: &'static str,
    },
    #[error("transport task for {path} failed: {message}")]
    TaskFailed { path: String, message: String },
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            Self::MissingOperation | Self::MissingValue => StatusCode::Unspecified,
            Self::Transport { kind, .. } => kind.status_code(),
            Self::DeadlineExceeded { .. } => StatusCode::DeadlineExceeded,
            Self::Encode { .. }
            | Self::Decode { .. }
            | Self::Auth { .. }
            | Self::InvalidHeaderValue { .. }
            | Self::InvalidEntryPoint { .. }
            | Self::TaskFailed { .. } => StatusCode::ClientInternalError,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        classify(self)
    }

    pub(crate) fn from_status(status: StatusCode, issues: Vec<Issue>) -> Self {
        Self::Status {
            status,
            message: format!("operation finished with {}", status.as_str()),
            issues,
        }
    }
}

/// Maps any error to exactly one [`ErrorKind`].
pub fn classify(error: &Error) -> ErrorKind {
    match error {
        Error::Status { status, .. } => match status {
            StatusCode::Unavailable => ErrorKind::Unavailable,
            StatusCode::Aborted => ErrorKind::Aborted,
            StatusCode::BadSession => ErrorKind::BadSession,
            StatusCode::NotFound => ErrorKind::NotFound,
            StatusCode::InternalError => ErrorKind::InternalError,
            StatusCode::Overloaded => ErrorKind::Overloaded,
            _ => ErrorKind::ServerError,
        },
        Error::MissingOperation | Error::MissingValue => ErrorKind::ServerError,
        Error::Transport { kind, .. } => match kind {
            TransportErrorKind::ConnectionLost | TransportErrorKind::ConnectionFailure => {
                ErrorKind::ConnectionError
            }
            TransportErrorKind::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            TransportErrorKind::Unimplemented
            | TransportErrorKind::Unauthenticated
            | TransportErrorKind::ClientInternal => ErrorKind::ServerError,
            TransportErrorKind::Other => ErrorKind::Unknown,
        },
        Error::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
        Error::Encode { .. }
        | Error::Decode { .. }
        | Error::Auth { .. }
        | Error::InvalidHeaderValue { .. }
        | Error::InvalidEntryPoint { .. }
        | Error::TaskFailed { .. } => ErrorKind::Unknown,
    }
}
