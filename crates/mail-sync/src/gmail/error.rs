//! Typed errors returned by a `MailService`

/// Errors surfaced by the remote mail service
///
/// A `NotFound` from `list_history` means the stored cursor is too old to be
/// replayed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GmailError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    }
}

impl GmailError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GmailError::NotFound(_))
    }

    /// Whether a later attempt could succeed without user action
    pub fn is_transient(&self) -> bool {
        matches!(self, GmailError::RateLimited { .. } | GmailError::Server { .. })
    }
}

impl From<serde_json::Error> for GmailError {
    fn from(e: serde_json::Error) -> Self {
        GmailError::Decode(e.to_string())
    }
}

/// Result alias for mail service calls
pub type GmailResult<T> = std::result::Result<T, GmailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            GmailError::RateLimited { retry_after_secs: Some(30) }.to_string(),
            "rate limited (retry after 30s)"
        );
        assert_eq!(
            GmailError::RateLimited { retry_after_secs: None }.to_string(),
            "rate limited"
        );
        assert_eq!(
            GmailError::Server { status: 503, message: "backend".into() }.to_string(),
            "server error (503): backend"
        );
    }

    #[test]
    fn test_classification() {
        assert!(GmailError::NotFound("history".into()).is_not_found());
        assert!(GmailError::Server { status: 500, message: String::new() }.is_transient());
        assert!(!GmailError::Unauthorized("expired".into()).is_transient());
    }
}
