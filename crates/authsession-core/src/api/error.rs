use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Failure of a single API request.
///
/// The display text is the only thing callers are meant to show. A non-2xx
/// response carries the server's message and nothing else, so a 400 and a 503
/// look the same to the session layer.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Http(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Error body convention of the API server
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
}

impl ApiError {
    /// Build an error from a non-success response.
    ///
    /// Uses the body's `detail` field when present. A string detail is used
    /// verbatim; structured details (validation error lists) are rendered as
    /// compact JSON. Anything else falls back to `HTTP error: <status>`.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.detail);

        let message = match detail {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::String(_)) | Some(Value::Null) | None => {
                format!("HTTP error: {}", status.as_u16())
            }
            Some(other) => other.to_string(),
        };

        ApiError::Http(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_uses_detail() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"detail":"Incorrect username or password"}"#,
        );
        assert_eq!(err.to_string(), "Incorrect username or password");
    }

    #[test]
    fn test_from_status_same_shape_for_client_and_server_errors() {
        let client = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"detail":"Invalid token"}"#);
        let server = ApiError::from_status(StatusCode::BAD_GATEWAY, r#"{"detail":"Invalid token"}"#);
        assert!(matches!(client, ApiError::Http(_)));
        assert!(matches!(server, ApiError::Http(_)));
        assert_eq!(client.to_string(), server.to_string());
    }

    #[test]
    fn test_from_status_fallback_without_detail() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#);
        assert_eq!(err.to_string(), "HTTP error: 500");

        let err = ApiError::from_status(StatusCode::NOT_FOUND, r#"{"detail":null}"#);
        assert_eq!(err.to_string(), "HTTP error: 404");

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"detail":""}"#);
        assert_eq!(err.to_string(), "HTTP error: 400");
    }

    #[test]
    fn test_from_status_non_json_body() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, "<html>Bad Gateway</html>");
        assert_eq!(err.to_string(), "HTTP error: 502");

        let err = ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(err.to_string(), "HTTP error: 503");
    }

    #[test]
    fn test_from_status_structured_detail() {
        let body = r#"{"detail":[{"loc":["body","email"],"msg":"field required"}]}"#;
        let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(
            err.to_string(),
            r#"[{"loc":["body","email"],"msg":"field required"}]"#
        );
    }
}
