use std::borrow::Cow;
use std::time::Duration;

use serde_json::Value;

/// Time spent on each phase of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timings {
    /// From sending the request until the body has been read.
    pub duration: Duration,
    /// Until the response headers arrived.
    pub waiting: Duration,
    /// Reading the body.
    pub receiving: Duration,
}

/// The outcome of a request. Transport failures are responses too, with status 0 and an error.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub(crate) status: u16,
    pub(crate) body: Vec<u8>,
    pub(crate) timings: Timings,
    pub(crate) error: Option<String>,
    pub(crate) url: String,
}

impl HttpResponse {
    pub(crate) fn transport_error(url: String, timings: Timings, error: String) -> Self {
        Self {
            status: 0,
            body: Vec::new(),
            timings,
            error: Some(error),
            url,
        }
    }

    /// The HTTP status, or 0 if no response was received.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// True for transport errors and any status of 400 or above.
    pub fn is_failed(&self) -> bool {
        is_failed_status(self.status)
    }

    pub fn json(&self) -> JsonBody {
        match serde_json::from_slice(&self.body) {
            Ok(value) => JsonBody::Parsed(value),
            Err(_) => JsonBody::Malformed,
        }
    }
}

pub(crate) fn is_failed_status(status: u16) -> bool {
    status == 0 || status >= 400
}

/// A response body read as JSON. An empty body is [JsonBody::Malformed].
#[derive(Debug, Clone, PartialEq)]
pub enum JsonBody {
    Parsed(Value),
    Malformed,
}

impl JsonBody {
    pub fn value(&self) -> Option<&Value> {
        match self {
            JsonBody::Parsed(value) => Some(value),
            JsonBody::Malformed => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.value()?.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name)?.as_str()
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        self.value()?.as_array()
    }

    /// The `id` of the first element, when the body is a non-empty array. Numeric ids are
    /// rendered as they would appear in a URL.
    pub fn first_id(&self) -> Option<String> {
        let id = self.as_array()?.first()?.get("id")?;
        match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn response(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            body: body.as_bytes().to_vec(),
            timings: Timings::default(),
            error: None,
            url: "http://localhost/".to_string(),
        }
    }

    #[test]
    fn parsed_fields() {
        let body = response(r#"{"token":"abc","user":{"id":7}}"#).json();
        assert_eq!(Some("abc"), body.str_field("token"));
        assert_eq!(Some(&json!({"id": 7})), body.field("user"));
        assert_eq!(None, body.str_field("missing"));
        assert_eq!(None, body.as_array());
    }

    #[test]
    fn malformed_body() {
        assert_eq!(JsonBody::Malformed, response("<html>").json());
        assert_eq!(JsonBody::Malformed, response("").json());
        assert_eq!(None, response("").json().first_id());
    }

    #[test]
    fn first_id_of_array() {
        assert_eq!(Some("12".to_string()), response(r#"[{"id":12},{"id":13}]"#).json().first_id());
        assert_eq!(Some("p-1".to_string()), response(r#"[{"id":"p-1"}]"#).json().first_id());
        assert_eq!(None, response("[]").json().first_id());
        assert_eq!(None, response(r#"[{"name":"x"}]"#).json().first_id());
    }

    #[test]
    fn failed_statuses() {
        assert!(is_failed_status(0));
        assert!(is_failed_status(404));
        assert!(is_failed_status(503));
        assert!(!is_failed_status(204));
        assert!(!is_failed_status(302));
    }
}
