//! Response classification.
//!
//! Maps an HTTP status plus decoded body to success, an auth failure that
//! warrants a refresh, or a terminal [`RelayError`].

use serde_json::Value;

use orderwire_core::RelayError;

use crate::types::ApiResponse;

/// Bodies longer than this are truncated in error messages.
const MAX_BODY_CHARS: usize = 500;

/// Application error code for rejected payloads.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

/// Decides whether an HTTP 500 body actually reports an auth failure.
///
/// The body matches when its `errorcode` equals one of the configured codes,
/// or its `message` contains one of the configured keywords. Both checks are
/// case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthFailureMatcher {
    error_codes: Vec<String>,
    message_keywords: Vec<String>,
}

impl AuthFailureMatcher {
    /// Matcher for the given codes and keywords.
    pub fn new<C, K>(error_codes: &[C], message_keywords: &[K]) -> Self
    where
        C: AsRef<str>,
        K: AsRef<str>,
    {
        Self {
            error_codes: error_codes.iter().map(|c| c.as_ref().to_string()).collect(),
            message_keywords: message_keywords
                .iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Matcher that never fires.
    pub fn disabled() -> Self {
        Self {
            error_codes: Vec::new(),
            message_keywords: Vec::new(),
        }
    }

    /// Whether `body` carries an auth-failure signal.
    pub fn matches(&self, body: &Value) -> bool {
        if let Some(code) = error_code(body) {
            if self.error_codes.iter().any(|c| c.eq_ignore_ascii_case(code)) {
                return true;
            }
        }
        body.get("message")
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .is_some_and(|message| self.message_keywords.iter().any(|k| message.contains(k)))
    }
}

impl Default for AuthFailureMatcher {
    fn default() -> Self {
        Self::new(&["UNAUTHORIZED"], &["token", "unauthorized", "expired"])
    }
}

/// Outcome of a single HTTP exchange.
#[derive(Debug)]
pub(crate) enum Classified {
    Success(ApiResponse),
    AuthFailure { message: String },
    Failure(RelayError),
}

/// Classify a response.
pub(crate) fn classify(status: u16, body: Value, matcher: &AuthFailureMatcher) -> Classified {
    match status {
        200..=299 => Classified::Success(ApiResponse { status, body }),
        401 => Classified::AuthFailure {
            message: error_message(&body, "unauthorized"),
        },
        500 if matcher.matches(&body) => Classified::AuthFailure {
            message: error_message(&body, "unauthorized"),
        },
        400 if error_code(&body) == Some(VALIDATION_ERROR) => {
            Classified::Failure(RelayError::Validation {
                message: error_message(&body, "invalid request"),
            })
        }
        _ => Classified::Failure(RelayError::Server {
            status,
            code: error_code(&body).map(str::to_owned),
            message: error_message(&body, "request failed"),
        }),
    }
}

/// Decode a response body: JSON when possible, otherwise the (truncated)
/// text as a string value. Empty bodies become `null`.
pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(truncate(text)))
}

/// `errorcode` (or `errorCode`) of an envelope body.
pub(crate) fn error_code(body: &Value) -> Option<&str> {
    body.get("errorcode")
        .or_else(|| body.get("errorCode"))
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
}

/// Best human-readable message in `body`.
pub(crate) fn error_message(body: &Value, fallback: &str) -> String {
    match body {
        Value::String(text) if !text.is_empty() => text.clone(),
        _ => body
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string(),
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── AuthFailureMatcher ──────────────────────────────────────────

    #[test]
    fn matches_error_code() {
        let matcher = AuthFailureMatcher::default();
        assert!(matcher.matches(&json!({"errorcode": "UNAUTHORIZED", "message": "x"})));
        assert!(matcher.matches(&json!({"errorCode": "unauthorized"})));
    }

    #[test]
    fn matches_message_keyword_case_insensitive() {
        let matcher = AuthFailureMatcher::default();
        assert!(matcher.matches(&json!({"message": "Invalid Token"})));
        assert!(matcher.matches(&json!({"message": "Session EXPIRED"})));
    }

    #[test]
    fn unrelated_body_does_not_match() {
        let matcher = AuthFailureMatcher::default();
        assert!(!matcher.matches(&json!({"errorcode": "AB1004", "message": "Something went wrong"})));
        assert!(!matcher.matches(&Value::Null));
    }

    #[test]
    fn custom_keywords() {
        let matcher = AuthFailureMatcher::new(&["AG8001"], &["jwt"]);
        assert!(matcher.matches(&json!({"errorcode": "AG8001"})));
        assert!(matcher.matches(&json!({"message": "bad JWT"})));
        assert!(!matcher.matches(&json!({"message": "token expired"})));
    }

    #[test]
    fn disabled_never_matches() {
        let matcher = AuthFailureMatcher::disabled();
        assert!(!matcher.matches(&json!({"errorcode": "UNAUTHORIZED", "message": "token"})));
    }

    // ── classify ────────────────────────────────────────────────────

    #[test]
    fn success_range() {
        let matcher = AuthFailureMatcher::default();
        assert!(matches!(classify(200, json!({}), &matcher), Classified::Success(_)));
        assert!(matches!(classify(204, Value::Null, &matcher), Classified::Success(_)));
    }

    #[test]
    fn status_401_is_auth_failure() {
        let matcher = AuthFailureMatcher::disabled();
        let outcome = classify(401, json!({"message": "Invalid session"}), &matcher);
        assert!(matches!(outcome, Classified::AuthFailure { message } if message == "Invalid session"));
    }

    #[test]
    fn status_500_with_signal_is_auth_failure() {
        let matcher = AuthFailureMatcher::default();
        let outcome = classify(500, json!({"message": "Token expired"}), &matcher);
        assert!(matches!(outcome, Classified::AuthFailure { .. }));
    }

    #[test]
    fn status_500_without_signal_is_server_error() {
        let matcher = AuthFailureMatcher::default();
        let outcome = classify(
            500,
            json!({"errorcode": "INTERNAL_ERROR", "message": "db down"}),
            &matcher,
        );
        match outcome {
            Classified::Failure(RelayError::Server { status, code, message }) => {
                assert_eq!(status, 500);
                assert_eq!(code.as_deref(), Some("INTERNAL_ERROR"));
                assert_eq!(message, "db down");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn validation_error() {
        let matcher = AuthFailureMatcher::default();
        let outcome = classify(
            400,
            json!({"status": false, "errorcode": "VALIDATION_ERROR", "message": "qty must be positive"}),
            &matcher,
        );
        assert!(matches!(
            outcome,
            Classified::Failure(RelayError::Validation { message }) if message == "qty must be positive"
        ));
    }

    #[test]
    fn plain_400_is_server_error() {
        let matcher = AuthFailureMatcher::default();
        let outcome = classify(400, json!({"message": "bad"}), &matcher);
        assert!(matches!(outcome, Classified::Failure(RelayError::Server { status: 400, .. })));
    }

    // ── body helpers ────────────────────────────────────────────────

    #[test]
    fn parse_body_variants() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_body("gateway timeout"), json!("gateway timeout"));
    }

    #[test]
    fn long_text_body_truncated() {
        let text = "x".repeat(MAX_BODY_CHARS + 100);
        let Value::String(parsed) = parse_body(&text) else {
            panic!("expected string body");
        };
        assert_eq!(parsed.len(), MAX_BODY_CHARS + 3);
        assert!(parsed.ends_with("..."));
    }

    #[test]
    fn text_body_used_as_message() {
        assert_eq!(error_message(&json!("bad gateway"), "fallback"), "bad gateway");
        assert_eq!(error_message(&Value::Null, "fallback"), "fallback");
    }
}
