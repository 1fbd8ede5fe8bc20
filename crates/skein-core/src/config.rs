//! Centralized configuration for Skein.
//!
//! Constants for the transport framing, the handle-addressed call path and
//! the client.

use std::time::Duration;

/// Transport-level configuration.
pub struct TransportConfig;

impl TransportConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8080;
    pub const HTTP_VERSION: &'static str = "HTTP/1.1";
    pub const CONTENT_TYPE: &'static str = "application/json";

    // Handle-addressed call path: `/invoke?oid={handle}`
    pub const INVOKE_PATH: &'static str = "/invoke";
    pub const HANDLE_QUERY_KEY: &'static str = "oid";

    /// Upper bound on the buffer reserved up front for a request body.
    pub const INITIAL_BODY_CAPACITY: usize = 8 * 1024;

    /// Body written when even the error envelope cannot be encoded.
    pub const FALLBACK_ERROR_BODY: &'static str = r#"{"code":500,"message":"Failed to marshal error response","type":"ResponseEncodingError"}"#;
}

/// Client-side configuration.
pub struct ClientConfig;

impl ClientConfig {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
}
