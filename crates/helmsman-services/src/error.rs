use thiserror::Error;

/// Failures from the external network services.
///
/// The distinction that matters to callers is recoverable vs fatal: the
/// dialogue controller returns to listening on a recoverable error and
/// terminates the conversation on a fatal one.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no speech detected in the submitted audio")]
    NoSpeech,

    #[error("transient service failure: {0}")]
    Transient(String),

    #[error("service rate limited: {0}")]
    RateLimited(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("malformed service response: {0}")]
    Malformed(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ServiceError {
    /// Whether the caller may retry / return to listening rather than
    /// terminating outright.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoSpeech | Self::Transient(_) | Self::RateLimited(_) | Self::Http(_)
        )
    }

    /// Map an HTTP status + body into the error taxonomy. 5xx and 429 are
    /// retryable; the remaining 4xx are not.
    #[must_use]
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited(body)
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            Self::PermissionDenied(body)
        } else if status.is_server_error() {
            Self::Transient(body)
        } else {
            Self::Unavailable(format!("{status}: {body}"))
        }
    }
}

/// Failures from media capture acquisition or reads.
///
/// Acquisition fails fast and non-fatally: the component that wanted the
/// device disables that signal path instead of crashing the subsystem.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("capture i/o failure: {0}")]
    Io(String),
}
