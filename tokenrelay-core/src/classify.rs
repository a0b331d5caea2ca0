//! Error classification.
//!
//! [`classify`] maps any error (store, refresh, or remote operation) onto the
//! [`ErrorKind`] taxonomy. It never fails: anything unrecognised becomes
//! [`ErrorKind::Unknown`] with its original message.
//!
//! Precedence, first match wins:
//! 1. an existing [`ClassifiedError`] anywhere in the source chain
//! 2. status 404 or "not found" text
//! 3. status 403 or permission/forbidden text
//! 4. status 429 or rate-limit text
//! 5. status 502/503/504, a transport-level timeout/connect failure, or
//!    connection/timeout/unavailable text
//! 6. status 401 or invalid-grant text
//! 7. otherwise unknown

use std::error::Error as StdError;

use crate::error::{ClassifiedError, ErrorKind};
use crate::remote::RemoteError;

const NOT_FOUND_HINTS: &[&str] = &["not found", "notfound", "not_found", "no such", "does not exist"];

const PERMISSION_HINTS: &[&str] = &[
    "permission",
    "forbidden",
    "access denied",
    "insufficient",
];

const RATE_LIMIT_HINTS: &[&str] = &[
    "rate limit",
    "ratelimit",
    "rate_limit",
    "too many requests",
    "quota exceeded",
];

const TEMPORARY_HINTS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "econnrefused",
    "econnreset",
    "etimedout",
    "timeout",
    "timed out",
    "temporarily unavailable",
    "unavailable",
    "try again",
    "broken pipe",
];

const AUTHENTICATION_HINTS: &[&str] = &[
    "invalid_grant",
    "invalid_token",
    "unauthorized",
    "unauthenticated",
    "invalid credentials",
    "expired or revoked",
];

/// Source-chain links inspected before giving up; bounds cyclic chains.
const MAX_CHAIN_DEPTH: usize = 32;

/// Classify any error into exactly one [`ErrorKind`].
///
/// The whole `source()` chain is inspected for status codes and text hints;
/// the message of the top-level error is kept verbatim.
pub fn classify(err: &(dyn StdError + 'static)) -> ClassifiedError {
    let chain: Vec<&(dyn StdError + 'static)> = std::iter::successors(Some(err), |&e| e.source())
        .take(MAX_CHAIN_DEPTH)
        .collect();

    if let Some(marker) = chain
        .iter()
        .find_map(|e| e.downcast_ref::<ClassifiedError>())
    {
        return marker.clone();
    }

    let status = chain.iter().find_map(|e| status_of(*e));
    let transport = chain.iter().any(|e| is_transport_failure(*e));
    let text = chain
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ");

    let message = err.to_string();
    let message = if message.trim().is_empty() { text.clone() } else { message };

    let kind = if transport && status.is_none() {
        ErrorKind::Temporary
    } else {
        kind_for(status, &text)
    };

    let classified = ClassifiedError::new(kind, message);
    match status {
        Some(code) => classified.with_status(code),
        None => classified,
    }
}

/// Classify a bare status code and message, for failures that never became
/// a Rust error value (for example an error body decoded from JSON).
pub fn classify_message(status: Option<u16>, message: &str) -> ClassifiedError {
    let classified = ClassifiedError::new(kind_for(status, message), message);
    match status {
        Some(code) => classified.with_status(code),
        None => classified,
    }
}

fn kind_for(status: Option<u16>, text: &str) -> ErrorKind {
    let lower = text.to_lowercase();
    let mentions = |hints: &[&str]| hints.iter().any(|h| lower.contains(h));

    if status == Some(404) || mentions(NOT_FOUND_HINTS) {
        ErrorKind::NotFound
    } else if status == Some(403) || mentions(PERMISSION_HINTS) {
        ErrorKind::PermissionDenied
    } else if status == Some(429) || mentions(RATE_LIMIT_HINTS) {
        ErrorKind::RateLimited
    } else if matches!(status, Some(502..=504)) || mentions(TEMPORARY_HINTS) {
        ErrorKind::Temporary
    } else if status == Some(401) || mentions(AUTHENTICATION_HINTS) {
        ErrorKind::Authentication
    } else {
        ErrorKind::Unknown
    }
}

fn status_of(err: &(dyn StdError + 'static)) -> Option<u16> {
    if let Some(remote) = err.downcast_ref::<RemoteError>() {
        return remote.status_code();
    }
    #[cfg(feature = "http")]
    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        return http.status().map(|s| s.as_u16());
    }
    None
}

fn is_transport_failure(err: &(dyn StdError + 'static)) -> bool {
    if let Some(RemoteError::Transport { .. }) = err.downcast_ref::<RemoteError>() {
        return true;
    }
    #[cfg(feature = "http")]
    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        return http.is_timeout() || http.is_connect();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct Wrapped {
        message: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (404, ErrorKind::NotFound),
            (403, ErrorKind::PermissionDenied),
            (429, ErrorKind::RateLimited),
            (503, ErrorKind::Temporary),
            (401, ErrorKind::Authentication),
            (500, ErrorKind::Unknown),
            (418, ErrorKind::Unknown),
        ];
        for (status, kind) in cases {
            let err = RemoteError::status(status, "request failed");
            let classified = classify(&err);
            assert_eq!(classified.kind(), kind, "status {status}");
            assert_eq!(classified.status(), Some(status));
        }
    }

    #[test]
    fn test_text_hints() {
        let cases = [
            ("File not found: 1abc", ErrorKind::NotFound),
            ("The caller does not have permission", ErrorKind::PermissionDenied),
            ("User Rate Limit Exceeded", ErrorKind::RateLimited),
            ("connect ECONNREFUSED 127.0.0.1:443", ErrorKind::Temporary),
            ("operation timed out", ErrorKind::Temporary),
            ("invalid_grant: Token has been expired or revoked.", ErrorKind::Authentication),
            ("something odd happened", ErrorKind::Unknown),
        ];
        for (text, kind) in cases {
            assert_eq!(classify(&RemoteError::Other(text.to_string())).kind(), kind, "{text}");
        }
    }

    #[test]
    fn test_status_outranks_later_text() {
        // 404 wins over a message that would otherwise look transient.
        let err = RemoteError::status(404, "upstream timed out looking for file");
        assert_eq!(classify(&err).kind(), ErrorKind::NotFound);

        // 403 comes before rate limiting in the precedence order.
        let err = RemoteError::status(403, "rateLimitExceeded");
        assert_eq!(classify(&err).kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_classified_marker_passes_through() {
        let marker = ClassifiedError::authentication("refresh token revoked");
        let wrapped = Wrapped {
            message: "remote call failed".to_string(),
            source: Box::new(marker.clone()),
        };

        assert_eq!(classify(&wrapped), marker);
    }

    #[test]
    fn test_source_chain_is_inspected() {
        let wrapped = Wrapped {
            message: "could not load sheet".to_string(),
            source: Box::new(RemoteError::status(404, "Requested entity was not found")),
        };

        let classified = classify(&wrapped);
        assert_eq!(classified.kind(), ErrorKind::NotFound);
        assert_eq!(classified.message(), "could not load sheet");
        assert_eq!(classified.status(), Some(404));
    }

    #[test]
    fn test_transport_error_is_temporary() {
        let err = RemoteError::transport("dns lookup failed");
        assert_eq!(classify(&err).kind(), ErrorKind::Temporary);
    }

    #[test]
    fn test_unknown_keeps_message_verbatim() {
        let err = RemoteError::Other("Weird: Thing #42".to_string());
        let classified = classify(&err);
        assert_eq!(classified.kind(), ErrorKind::Unknown);
        assert_eq!(classified.message(), "Weird: Thing #42");
    }

    #[test]
    fn test_empty_message_is_never_surfaced() {
        let classified = classify(&RemoteError::Other(String::new()));
        assert_eq!(classified.kind(), ErrorKind::Unknown);
        assert!(!classified.message().is_empty());
    }

    #[test]
    fn test_classify_message() {
        let classified = classify_message(Some(429), "");
        assert_eq!(classified.kind(), ErrorKind::RateLimited);
        assert!(!classified.message().is_empty());

        assert_eq!(classify_message(None, "Not Found").kind(), ErrorKind::NotFound);
    }

    #[derive(Debug)]
    struct SelfSourced;

    impl std::fmt::Display for SelfSourced {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("loops back on itself")
        }
    }

    impl StdError for SelfSourced {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(self)
        }
    }

    #[test]
    fn test_cyclic_source_chain_terminates() {
        let classified = classify(&SelfSourced);
        assert_eq!(classified.kind(), ErrorKind::Unknown);
        assert_eq!(classified.message(), "loops back on itself");
    }

    #[test]
    fn test_nested_source_status_is_found() {
        let err = Wrapped {
            message: "search step failed".to_string(),
            source: Box::new(Wrapped {
                message: "drive request failed".to_string(),
                source: Box::new(RemoteError::status(404, "File not found")),
            }),
        };

        let classified = classify(&err);
        assert_eq!(classified.kind(), ErrorKind::NotFound);
        assert_eq!(classified.status(), Some(404));
        assert_eq!(classified.message(), "search step failed");
    }
}
