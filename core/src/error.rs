use thiserror::Error;

/// Failure taxonomy for calls against the detection backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401 from any endpoint. The session is no longer valid; callers treat
    /// this as irrecoverable and hand control back to their login boundary.
    #[error("authentication required")]
    Unauthorized,
    /// Any other non-2xx response. `message` carries the backend-provided
    /// detail when one was present in the body.
    #[error("backend returned HTTP {status}")]
    Status { status: u16, message: Option<String> },
    /// Connect, timeout or body-read failure.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// 2xx response whose body did not match the expected shape.
    #[error("malformed response: {message}")]
    Decode { message: String },
}

impl ApiError {
    /// Message fit for display. Prefers the backend-provided detail; raw
    /// transport text is never surfaced.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized => "session expired, log in again".into(),
            ApiError::Status {
                message: Some(m), ..
            } => m.clone(),
            ApiError::Status { status, .. } => {
                format!("the backend rejected the request (HTTP {status})")
            }
            ApiError::Transport { .. } => "the backend could not be reached".into(),
            ApiError::Decode { .. } => "the backend sent an unreadable response".into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}
