//! Canonical request signatures used as coalescing keys.

use reqwest::Method;
use serde_json::Value;

/// `(method, url, body)` identity of a request.
///
/// The body is rendered with `serde_json`'s sorted object maps, so two
/// bodies with the same members in a different order share a signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    method: Method,
    url: String,
    body: Option<String>,
}

impl RequestSignature {
    /// Signature of a request.
    pub fn new(method: &Method, url: &str, body: Option<&Value>) -> Self {
        Self {
            method: method.clone(),
            url: url.to_string(),
            body: body.map(Value::to_string),
        }
    }
}

/// Whether calls with `method` may share a single network request.
pub fn is_coalescable(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}
