//! Request and response envelopes crossing the transport boundary.

use crate::error::reason_phrase;
use std::collections::HashMap;

/// Request headers with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header. A repeated name replaces the earlier value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A decoded inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub verb: String,
    /// Request target as sent, including any query string.
    pub target: String,
    pub version: String,
    pub headers: Headers,
    pub body: String,
}

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub body: String,
}

impl ResponseEnvelope {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn reason(&self) -> &'static str {
        reason_phrase(self.status)
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Length", "12");
        assert_eq!(headers.get("content-length"), Some("12"));
        assert_eq!(headers.get("CONTENT-LENGTH"), Some("12"));

        headers.insert("content-length", "3");
        assert_eq!(headers.get("Content-Length"), Some("3"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_response_reason() {
        assert_eq!(ResponseEnvelope::ok("{}").reason(), "OK");
        assert_eq!(ResponseEnvelope::new(405, "{}").reason(), "Method Not Allowed");
    }
}
