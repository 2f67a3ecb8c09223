use thiserror::Error;

/// Failure classification shared by every call in the client layer.
///
/// The split matters: `Transport` means no HTTP response was received
/// (the only class the default retry policy touches), while `Http`
/// means the server answered and the status decides the recovery path
/// (401 -> refresh, 503 -> delayed retry, everything else surfaces).
///
/// `Clone` because a single refresh outcome is observed by every
/// caller awaiting the shared in-flight future.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("session expired")]
    SessionExpired,
}

impl ApiError {
    pub fn from_transport(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    /// Message shown to the user. Prefers the server-supplied detail
    /// when one was present in the response body.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(_) => {
                "No response from server, please check your connection".to_string()
            }
            ApiError::SessionExpired => "Your session has expired, please log in again".to_string(),
            ApiError::Http { status, message } => {
                if !message.is_empty() {
                    return message.clone();
                }
                match status {
                    400 => "Invalid request".to_string(),
                    401 => "Please log in to continue".to_string(),
                    403 => "You don't have permission to do that".to_string(),
                    404 => "Not found".to_string(),
                    422 => "Validation failed, please check your input".to_string(),
                    429 => "Too many requests, please slow down".to_string(),
                    500 => "Internal server error".to_string(),
                    _ => format!("Server error ({status})"),
                }
            }
        }
    }
}

/// Pulls a human-readable detail out of an error response body.
/// Gateways and services answer with `{"message": ...}` or
/// `{"error": ...}`; anything unparseable yields an empty detail.
pub fn extract_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_server_detail() {
        let error = ApiError::Http {
            status: 400,
            message: "Email is already taken".to_string(),
        };
        assert_eq!(error.user_message(), "Email is already taken");
    }

    #[test]
    fn test_user_message_falls_back_per_status() {
        let cases = [
            (400, "Invalid request"),
            (401, "Please log in to continue"),
            (403, "You don't have permission to do that"),
            (404, "Not found"),
            (422, "Validation failed, please check your input"),
            (429, "Too many requests, please slow down"),
            (500, "Internal server error"),
        ];
        for (status, expected) in cases {
            let error = ApiError::Http {
                status,
                message: String::new(),
            };
            assert_eq!(error.user_message(), expected, "status {status}");
        }
    }

    #[test]
    fn test_user_message_default_includes_status() {
        let error = ApiError::Http {
            status: 502,
            message: String::new(),
        };
        assert_eq!(error.user_message(), "Server error (502)");
    }

    #[test]
    fn test_transport_message_mentions_connection() {
        let error = ApiError::Transport("connection reset".to_string());
        assert_eq!(
            error.user_message(),
            "No response from server, please check your connection"
        );
    }

    #[test]
    fn test_extract_detail_reads_message_then_error() {
        assert_eq!(extract_detail(r#"{"message":"nope"}"#), "nope");
        assert_eq!(extract_detail(r#"{"error":"bad"}"#), "bad");
        assert_eq!(extract_detail("not json"), "");
        assert_eq!(extract_detail(r#"{"other":1}"#), "");
    }
}
