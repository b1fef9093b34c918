//! Error types for the portal client

/// Errors that can occur in the portal client
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Form input rejected before any request was sent. The message is
    /// meant to be shown to the user as-is.
    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unexpected payload: {0}")]
    Transform(String),
}

impl PortalError {
    /// HTTP status carried by the error, if it came from a non-2xx response
    pub fn status(&self) -> Option<u16> {
        match self {
            PortalError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the backend rejected the credentials (401)
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Result type alias for portal operations
pub type Result<T> = std::result::Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_message_carries_url_and_code() {
        let err = PortalError::Status {
            url: "https://api.example.com/users".to_string(),
            status: 401,
        };
        assert_eq!(
            err.to_string(),
            "Request to https://api.example.com/users failed with status 401"
        );
        assert!(err.is_unauthorized());
    }

    #[test]
    fn other_errors_are_not_unauthorized() {
        let forbidden = PortalError::Status {
            url: "/users".to_string(),
            status: 403,
        };
        assert!(!forbidden.is_unauthorized());
        assert!(!PortalError::Http("connection refused".to_string()).is_unauthorized());
        assert_eq!(PortalError::Http("x".to_string()).status(), None);
    }

    #[test]
    fn validation_message_is_shown_verbatim() {
        let err = PortalError::Validation("Username and password are required.".to_string());
        assert_eq!(err.to_string(), "Username and password are required.");
    }
}
