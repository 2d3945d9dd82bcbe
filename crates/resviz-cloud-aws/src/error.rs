//! AWS error classification
//!
//! Maps SDK failures onto [`FetchError`] using the service error code, so the
//! orchestrator can decide what to retry.

use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use resviz_cloud::FetchError;

/// Error codes meaning the credentials are missing, expired or not allowed
const AUTH_CODES: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "InvalidClientTokenId",
    "ExpiredToken",
    "ExpiredTokenException",
    "AccessDenied",
    "AccessDeniedException",
    "UnrecognizedClientException",
    "SignatureDoesNotMatch",
    "InvalidAccessKeyId",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "SlowDown",
    "RequestThrottled",
];

/// Server-side failures that usually clear on retry
const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "InternalFailure",
    "ServiceUnavailable",
    "RequestTimeout",
    "ServiceException",
];

/// Classify a service error by its code
pub fn classify_code(code: Option<&str>, message: Option<&str>) -> FetchError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if AUTH_CODES.contains(&c) => FetchError::Auth { message },
        Some(c) if THROTTLING_CODES.contains(&c) => FetchError::RateLimited { message },
        Some(c) if TRANSIENT_CODES.contains(&c) => FetchError::TransientNetwork { message },
        Some(c) => FetchError::Provider {
            code: c.to_string(),
            message,
        },
        None => FetchError::Provider {
            code: "Unknown".to_string(),
            message,
        },
    }
}

/// Classify any SDK operation error
pub(crate) fn classify_sdk_error<E, R>(err: &SdkError<E, R>) -> FetchError
where
    E: ProvideErrorMetadata,
    R: std::fmt::Debug,
{
    match err {
        SdkError::ServiceError(service) => {
            classify_code(service.err().code(), service.err().message())
        }
        SdkError::TimeoutError(_) => FetchError::transient("request timed out"),
        SdkError::DispatchFailure(failure) => {
            let detail = format!("{:?}", failure);
            if mentions_credentials(&detail) {
                FetchError::auth(detail)
            } else {
                FetchError::transient(detail)
            }
        }
        SdkError::ResponseError(response) => {
            FetchError::transient(format!("unreadable response: {:?}", response.raw()))
        }
        SdkError::ConstructionFailure(failure) => {
            let detail = format!("{:?}", failure);
            if mentions_credentials(&detail) {
                FetchError::auth(detail)
            } else {
                FetchError::provider("ConstructionFailure", detail)
            }
        }
        _ => FetchError::provider("Unknown", "unrecognized SDK error"),
    }
}

/// Credential resolution failures surface before any request is sent
fn mentions_credentials(detail: &str) -> bool {
    let detail = detail.to_ascii_lowercase();
    detail.contains("credential") || detail.contains("no identity")
}

/// Whether an enrichment call failure should fail the whole fetch
///
/// Per-resource lookups (tag sets, bucket ACLs) are often denied or missing
/// for individual resources; that only loses the detail. Throttling and
/// network failures propagate so the whole kind is retried.
pub(crate) fn is_fatal_for_enrichment(err: &FetchError) -> bool {
    err.is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_throttling() {
        for code in THROTTLING_CODES {
            let err = classify_code(Some(*code), Some("Rate exceeded"));
            assert!(
                matches!(err, FetchError::RateLimited { .. }),
                "Expected RateLimited for {code}"
            );
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_classify_auth() {
        for code in AUTH_CODES {
            let err = classify_code(Some(*code), None);
            assert!(
                matches!(err, FetchError::Auth { .. }),
                "Expected Auth for {code}"
            );
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_classify_transient() {
        for code in TRANSIENT_CODES {
            assert!(classify_code(Some(*code), None).is_retryable());
        }
    }

    #[test]
    fn test_classify_other_codes() {
        assert_eq!(
            classify_code(Some("NoSuchTagSet"), Some("The TagSet does not exist")),
            FetchError::provider("NoSuchTagSet", "The TagSet does not exist")
        );
        assert_eq!(
            classify_code(None, None),
            FetchError::provider("Unknown", "Unknown error")
        );
    }

    #[test]
    fn test_enrichment_fatality() {
        assert!(!is_fatal_for_enrichment(&FetchError::provider("NoSuchTagSet", "x")));
        assert!(!is_fatal_for_enrichment(&FetchError::auth("AccessDenied")));
        assert!(is_fatal_for_enrichment(&FetchError::rate_limited("SlowDown")));
        assert!(is_fatal_for_enrichment(&FetchError::transient("reset")));
    }

    #[test]
    fn test_credentials_detection() {
        assert!(mentions_credentials("failed to load Credentials from profile"));
        assert!(!mentions_credentials("connection reset by peer"));
    }
}
