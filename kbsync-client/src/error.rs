use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("api response did not contain a document id")]
    MissingId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl ClientError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            ClientError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    /// Network failures, timeouts, throttling and server errors are retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Request(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ClientError::Api { .. } => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
            ClientError::Url(_) | ClientError::MissingId => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> ClientError {
        ClientError::Api {
            status: StatusCode::from_u16(status).unwrap(),
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        for status in [408, 409, 425, 429, 500, 502, 503] {
            assert!(api(status).is_retryable(), "{status} should retry");
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 422] {
            assert!(!api(status).is_retryable(), "{status} should not retry");
        }
        assert_eq!(api(401).classification(), Some(ApiErrorClass::Auth));
        assert!(!ClientError::MissingId.is_retryable());
    }

    #[test]
    fn not_found_is_detected() {
        assert!(api(404).is_not_found());
        assert!(!api(410).is_not_found());
    }
}
