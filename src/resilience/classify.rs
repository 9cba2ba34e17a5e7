//! Upstream error classification.
//!
//! Classification is a pure function over the normalized [`UpstreamError`]:
//! no hidden state, same input always yields the same kind. Unknown shapes
//! fail closed (treated as permanent) so unforeseen bugs are not masked as
//! transient noise.

use crate::upstream::{TransportKind, UpstreamError};

/// Retry-relevant kind of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Expected to resolve on retry (throttling, temporary outage,
    /// expired token).
    Transient,
    /// Will not resolve by retrying (bad request, forbidden, not found).
    Permanent,
    /// Unrecognized shape; not retried, logged at elevated severity since
    /// it may indicate an upstream contract change.
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an upstream failure.
pub fn classify(error: &UpstreamError) -> ErrorKind {
    match error {
        UpstreamError::Transport { kind, .. } => match kind {
            TransportKind::ConnectionReset | TransportKind::DnsFailure | TransportKind::Timeout => {
                ErrorKind::Transient
            }
            TransportKind::Other => ErrorKind::Unknown,
        },
        UpstreamError::Api {
            status, sub_code, ..
        } => match *status {
            429 | 500 | 502..=599 => ErrorKind::Transient,
            // A 401 with a token sub-code is recoverable: the token gets
            // refreshed and the call retried.
            401 if is_token_sub_code(sub_code.as_deref()) => ErrorKind::Transient,
            400..=499 => ErrorKind::Permanent,
            _ => ErrorKind::Unknown,
        },
    }
}

fn is_token_sub_code(sub_code: Option<&str>) -> bool {
    let Some(sub) = sub_code else {
        return false;
    };
    let sub = sub.to_ascii_lowercase();
    sub.contains("token") && (sub.contains("expired") || sub.contains("invalid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> UpstreamError {
        UpstreamError::api(status, "test")
    }

    #[test]
    fn test_server_errors_are_transient() {
        for status in [429, 500, 502, 503, 504, 505, 529, 599] {
            assert_eq!(classify(&api(status)), ErrorKind::Transient, "{status}");
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 409, 422] {
            assert_eq!(classify(&api(status)), ErrorKind::Permanent, "{status}");
        }
    }

    #[test]
    fn test_expired_token_is_transient() {
        let err = UpstreamError::api_with_sub_code(401, "token_expired", "expired");
        assert_eq!(classify(&err), ErrorKind::Transient);

        let err = UpstreamError::api_with_sub_code(401, "InvalidAuthenticationToken", "bad");
        assert_eq!(classify(&err), ErrorKind::Transient);

        // Any other 401 sub-code stays permanent.
        let err = UpstreamError::api_with_sub_code(401, "ip_blocked", "blocked");
        assert_eq!(classify(&err), ErrorKind::Permanent);
    }

    #[test]
    fn test_transport_failures_are_transient() {
        for kind in [
            TransportKind::ConnectionReset,
            TransportKind::DnsFailure,
            TransportKind::Timeout,
        ] {
            let err = UpstreamError::transport(kind, "test");
            assert_eq!(classify(&err), ErrorKind::Transient);
        }
    }

    #[test]
    fn test_unrecognized_shapes_are_unknown() {
        assert_eq!(classify(&api(302)), ErrorKind::Unknown);
        // 501 sits outside the retryable server-error set.
        assert_eq!(classify(&api(501)), ErrorKind::Unknown);
        assert_eq!(classify(&api(600)), ErrorKind::Unknown);
        let err = UpstreamError::transport(TransportKind::Other, "tls handshake");
        assert_eq!(classify(&err), ErrorKind::Unknown);
    }

    #[test]
    fn test_classification_is_stable() {
        let err = api(503);
        let first = classify(&err);
        for _ in 0..10 {
            assert_eq!(classify(&err), first);
        }
    }
}
