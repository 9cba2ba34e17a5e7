//! Error surface of the external collaboration API.
//!
//! The quota layer never inspects upstream request or response bodies; the
//! only thing it reads off a failed call is the HTTP-equivalent status, the
//! optional provider sub-code, and the transport failure mode. Everything a
//! protected operation can raise is normalized into [`UpstreamError`] before
//! classification.

use thiserror::Error;

/// Failure mode of the transport beneath the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    ConnectionReset,
    DnsFailure,
    Timeout,
    Other,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::ConnectionReset => "connection-reset",
            TransportKind::DnsFailure => "dns-failure",
            TransportKind::Timeout => "timeout",
            TransportKind::Other => "other",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a protected call into the external collaboration API.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The upstream API answered with an error response.
    #[error("upstream API error (HTTP {status}{}): {message}", sub_code.as_deref().map(|s| format!(", {s}")).unwrap_or_default())]
    Api {
        status: u16,
        sub_code: Option<String>,
        message: String,
    },

    /// The request never produced an upstream response.
    #[error("upstream transport failure ({kind}): {message}")]
    Transport { kind: TransportKind, message: String },
}

impl UpstreamError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        UpstreamError::Api {
            status,
            sub_code: None,
            message: message.into(),
        }
    }

    pub fn api_with_sub_code(
        status: u16,
        sub_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        UpstreamError::Api {
            status,
            sub_code: Some(sub_code.into()),
            message: message.into(),
        }
    }

    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        UpstreamError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::transport(TransportKind::Timeout, message)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Api { status, .. } => Some(*status),
            UpstreamError::Transport { .. } => None,
        }
    }

    /// Short machine-readable tag for logs. Never contains payload data.
    pub fn code(&self) -> String {
        match self {
            UpstreamError::Api {
                status,
                sub_code: Some(sub),
                ..
            } => format!("http-{status}/{sub}"),
            UpstreamError::Api { status, .. } => format!("http-{status}"),
            UpstreamError::Transport { kind, .. } => format!("transport/{kind}"),
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::timeout(err.to_string())
        } else if err.is_connect() {
            UpstreamError::transport(TransportKind::ConnectionReset, err.to_string())
        } else if let Some(status) = err.status() {
            UpstreamError::api(status.as_u16(), err.to_string())
        } else {
            UpstreamError::transport(TransportKind::Other, err.to_string())
        }
    }
}
