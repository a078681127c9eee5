use std::sync::Mutex;

use http::HeaderValue;

use crate::error::Error;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    value.parse().map_err(|source| Error::InvalidHeaderValue {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn method_path(service_name: &str, method_name: &str) -> String {
    format!("/{service_name}/{method_name}")
}

/// Server address with the `grpc://` / `grpcs://` scheme stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    authority: String,
    secure: bool,
}

impl EntryPoint {
    pub fn parse(entry_point: &str) -> crate::Result<Self> {
        let (authority, secure) = if let Some(rest) = entry_point.strip_prefix("grpcs://") {
            (rest, true)
        } else if let Some(rest) = entry_point.strip_prefix("grpc://") {
            (rest, false)
        } else {
            (entry_point, false)
        };

        let invalid = |reason| Error::InvalidEntryPoint {
            entry_point: entry_point.to_owned(),
            reason,
        };
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }
        if authority.trim().len() != authority.len() || authority.contains(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }
        if authority.contains('/') || authority.contains("://") {
            return Err(invalid("unexpected path or scheme"));
        }
        if let Some((host, port)) = authority.rsplit_once(':')
            && !host.ends_with(']')
            && !host.contains(':')
        {
            if host.is_empty() {
                return Err(invalid("missing host"));
            }
            if port.parse::<u16>().is_err() {
                return Err(invalid("invalid port"));
            }
        }

        Ok(Self {
            authority: authority.to_owned(),
            secure,
        })
    }

    /// `host:port` as handed to the transport.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.secure { "grpcs" } else { "grpc" };
        write!(formatter, "{scheme}://{}", self.authority)
    }
}
