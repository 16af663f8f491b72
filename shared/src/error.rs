use serde::de::DeserializeOwned;
use std::time::Duration;

const BODY_EXCERPT_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Processing failed: {0}")]
    TaskFailed(String),
    #[error("Processing timed out after {} minutes", .0.as_secs() / 60)]
    Timeout(Duration),
    #[error("Cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// Text for the error banner. A cancel is not an error and shows none.
    pub fn banner(&self) -> Option<String> {
        match self {
            ApiError::Cancelled => None,
            ApiError::Validation(msg) => Some(msg.clone()),
            other => Some(format!("Error: {}", other)),
        }
    }

    /// Text for the progress line once a cycle has ended with this error.
    pub fn progress_text(&self) -> &'static str {
        if self.is_cancelled() { "Cancelled" } else { "Error" }
    }

    /// Builds a `Server` error from a non-2xx status and whatever body came with it.
    pub fn from_status(status: u16, body: &str) -> Self {
        ApiError::Server {
            status,
            message: server_message(status, body),
        }
    }
}

/// Picks the most useful human-readable message out of an error body.
///
/// The accounts API answers `{"detail": ...}` and the OCR API does the same
/// through FastAPI's `HTTPException`; other services use `message` or `error`.
/// Plain-text bodies are shown as-is, and an empty body falls back to the
/// status code.
pub fn server_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["detail", "message", "error"] {
            if let Some(serde_json::Value::String(msg)) = map.get(key) {
                return msg.clone();
            }
        }

        // Django form errors: {"field": ["problem", ...], ...}
        let field_errors: Vec<String> = map
            .iter()
            .filter_map(|(field, value)| {
                let first = value.as_array()?.first()?.as_str()?;
                Some(if field == "__all__" {
                    first.to_string()
                } else {
                    format!("{}: {}", field, first)
                })
            })
            .collect();
        if !field_errors.is_empty() {
            return field_errors.join("; ");
        }
    }

    if trimmed.is_empty() {
        format!("HTTP {}", status)
    } else {
        excerpt(trimmed)
    }
}

pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| {
        log::error!("Failed to decode response body: {}", e);
        ApiError::InvalidResponse(format!("{} ({})", e, excerpt(body)))
    })
}

fn excerpt(body: &str) -> String {
    if body.chars().count() > BODY_EXCERPT_LEN {
        let cut: String = body.chars().take(BODY_EXCERPT_LEN).collect();
        format!("{}...", cut)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Ack {
        #[allow(dead_code)]
        status: String,
    }

    #[test]
    fn test_server_message_prefers_detail() {
        let body = r#"{"detail": "Task not found", "message": "ignored"}"#;
        assert_eq!(server_message(404, body), "Task not found");
    }

    #[test]
    fn test_server_message_falls_back_to_message_and_error() {
        assert_eq!(server_message(400, r#"{"message": "bad"}"#), "bad");
        assert_eq!(server_message(400, r#"{"error": "worse"}"#), "worse");
    }

    #[test]
    fn test_server_message_reads_form_errors() {
        let body = r#"{"otp": ["OTP must contain only digits.", "second"]}"#;
        assert_eq!(server_message(400, body), "otp: OTP must contain only digits.");
        assert_eq!(server_message(400, r#"{"__all__": ["Try again."]}"#), "Try again.");
    }

    #[test]
    fn test_server_message_plain_text_and_empty() {
        assert_eq!(server_message(502, "  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(server_message(500, ""), "HTTP 500");
        assert_eq!(server_message(500, r#"{"detail": 42}"#), r#"{"detail": 42}"#);
    }

    #[test]
    fn test_decode_json_reports_invalid_response() {
        let err = decode_json::<Ack>("<html>oops</html>").unwrap_err();
        match err {
            ApiError::InvalidResponse(msg) => assert!(msg.contains("<html>oops</html>")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(decode_json::<Ack>(r#"{"status": "ok"}"#).is_ok());
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(500);
        let msg = server_message(500, &body);
        assert_eq!(msg.len(), BODY_EXCERPT_LEN + 3);
        assert!(msg.ends_with("..."));
    }

    #[test]
    fn test_display_strings() {
        assert_eq!(
            ApiError::Network("connection refused".into()).to_string(),
            "Network error: connection refused"
        );
        assert_eq!(
            ApiError::Timeout(Duration::from_secs(300)).to_string(),
            "Processing timed out after 5 minutes"
        );
        assert_eq!(
            ApiError::from_status(404, r#"{"detail":"Task not found"}"#).to_string(),
            "Server error (404): Task not found"
        );
    }

    #[test]
    fn test_cancel_is_not_shown_as_error() {
        assert_eq!(ApiError::Cancelled.banner(), None);
        assert_eq!(ApiError::Cancelled.progress_text(), "Cancelled");

        let invalid = ApiError::Validation("Passwords do not match".into());
        assert_eq!(invalid.banner().as_deref(), Some("Passwords do not match"));
        assert_eq!(invalid.progress_text(), "Error");

        let failed = ApiError::TaskFailed("corrupt PDF".into());
        assert_eq!(
            failed.banner().as_deref(),
            Some("Error: Processing failed: corrupt PDF")
        );
        assert_eq!(failed.progress_text(), "Error");
    }
}
