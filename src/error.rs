use thiserror::Error;

use crate::decode::DecodeError;

/// Failures of a device fetch.
///
/// `HttpStatus` and `Network` describe single attempts and are absorbed by
/// the retry loop; callers of [`crate::client::DeviceClient`] only see them
/// folded into `MaxRetryExceeded`.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request is throttled. Please try again later.")]
    RequestThrottled,

    #[error("HTTP error: {0}")]
    HttpStatus(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode response: {0}")]
    Decoding(#[from] DecodeError),

    #[error("Maximum retry attempts exceeded.")]
    MaxRetryExceeded,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::HttpStatus(_) | FetchError::Network(_))
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            FetchError::RequestThrottled.to_string(),
            "Request is throttled. Please try again later."
        );
        assert_eq!(
            FetchError::MaxRetryExceeded.to_string(),
            "Maximum retry attempts exceeded."
        );
        assert_eq!(FetchError::HttpStatus(503).to_string(), "HTTP error: 503");
    }

    #[test]
    fn test_decoding_wraps_source() {
        let err: FetchError = DecodeError::Timestamp("soon".into()).into();
        assert!(err.to_string().starts_with("Failed to decode response:"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_kinds() {
        assert!(FetchError::HttpStatus(500).is_transient());
        assert!(FetchError::Network("reset".into()).is_transient());
        assert!(!FetchError::RequestThrottled.is_transient());
        assert!(!FetchError::MaxRetryExceeded.is_transient());
    }
}
