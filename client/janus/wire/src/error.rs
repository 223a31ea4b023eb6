//! Wire-level error types and the gateway error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gateway error code for a session that no longer exists.
pub const ERROR_SESSION_NOT_FOUND: i64 = 458;

/// Gateway error code for a handle that no longer exists.
pub const ERROR_HANDLE_NOT_FOUND: i64 = 459;

/// True for error codes that routinely occur during teardown races and are
/// suppressed from diagnostic logging.
pub fn is_teardown_race(code: i64) -> bool {
    matches!(code, ERROR_SESSION_NOT_FOUND | ERROR_HANDLE_NOT_FOUND)
}

/// The `error` object carried by gateway error frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    /// Numeric gateway error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable reason, when the gateway provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Wire-level errors.
#[derive(Error, Debug)]
pub enum WireError {
    /// The frame was not a well-formed JSON object of the expected shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A request payload must serialize to a JSON object.
    #[error("request payload must be a JSON object")]
    PayloadNotObject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_race_codes() {
        assert!(is_teardown_race(ERROR_SESSION_NOT_FOUND));
        assert!(is_teardown_race(ERROR_HANDLE_NOT_FOUND));
        assert!(!is_teardown_race(0));
        assert!(!is_teardown_race(403));
    }

    #[test]
    fn gateway_error_defaults() {
        let error: GatewayError = serde_json::from_str("{}").unwrap();
        assert_eq!(error.code, 0);
        assert!(error.reason.is_none());

        let error: GatewayError =
            serde_json::from_str(r#"{"code": 458, "reason": "No such session"}"#).unwrap();
        assert_eq!(error.code, 458);
        assert_eq!(error.reason.as_deref(), Some("No such session"));
    }
}
