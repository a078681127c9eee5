use futures_util::future::BoxFuture;
use http::HeaderMap;
use http::header::HeaderName;

use crate::tls::SslCredentials;
use crate::util::parse_header_value;

pub const AUTH_TICKET_HEADER: HeaderName = HeaderName::from_static("x-ydb-auth-ticket");
pub const DATABASE_HEADER: HeaderName = HeaderName::from_static("x-ydb-database");

/// Credential collaborator. Metadata is requested again for every call; the
/// dispatcher reports any failure here as `Error::Auth`.
pub trait AuthService: Send + Sync {
    fn auth_metadata(&self) -> BoxFuture<'_, crate::Result<HeaderMap>>;

    fn ssl_credentials(&self) -> Option<&SslCredentials> {
        None
    }
}

#[derive(Clone, Debug, Default)]
pub struct AnonymousAuthService {
    database: Option<String>,
    ssl_credentials: Option<SslCredentials>,
}

impl AnonymousAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_ssl_credentials(mut self, ssl_credentials: SslCredentials) -> Self {
        self.ssl_credentials = Some(ssl_credentials);
        self
    }
}

impl AuthService for AnonymousAuthService {
    fn auth_metadata(&self) -> BoxFuture<'_, crate::Result<HeaderMap>> {
        Box::pin(async move {
            let mut metadata = HeaderMap::new();
            if let Some(database) = &self.database {
                metadata.insert(
                    DATABASE_HEADER,
                    parse_header_value(DATABASE_HEADER.as_str(), database)?,
                );
            }
            Ok(metadata)
        })
    }

    fn ssl_credentials(&self) -> Option<&SslCredentials> {
        self.ssl_credentials.as_ref()
    }
}

/// Sends a fixed token with every call.
#[derive(Clone)]
pub struct TokenAuthService {
    token: String,
    database: String,
    ssl_credentials: Option<SslCredentials>,
}

impl std::fmt::Debug for TokenAuthService {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TokenAuthService")
            .field("token", &"<redacted>")
            .field("database", &self.database)
            .field("ssl_credentials", &self.ssl_credentials.is_some())
            .finish()
    }
}

impl TokenAuthService {
    pub fn new(token: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            database: database.into(),
            ssl_credentials: None,
        }
    }

    pub fn with_ssl_credentials(mut self, ssl_credentials: SslCredentials) -> Self {
        self.ssl_credentials = Some(ssl_credentials);
        self
    }
}

impl AuthService for TokenAuthService {
    fn auth_metadata(&self) -> BoxFuture<'_, crate::Result<HeaderMap>> {
        Box::pin(async move {
            let mut metadata = HeaderMap::new();
            let mut token = parse_header_value(AUTH_TICKET_HEADER.as_str(), &self.token)?;
            token.set_sensitive(true);
            metadata.insert(AUTH_TICKET_HEADER, token);
            metadata.insert(
                DATABASE_HEADER,
                parse_header_value(DATABASE_HEADER.as_str(), &self.database)?,
            );
            Ok(metadata)
        })
    }

    fn ssl_credentials(&self) -> Option<&SslCredentials> {
        self.ssl_credentials.as_ref()
    }
}
