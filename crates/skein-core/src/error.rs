//! Error types for Skein.
//!
//! Every failure that can cross the dispatch boundary is an [`RpcError`]. Each
//! variant knows the HTTP-style status it maps to and the kind tag written into
//! the wire-level error envelope.

use thiserror::Error;

/// Main error type for the Skein dispatch engine.
#[derive(Debug, Error)]
pub enum RpcError {
    // Transport framing errors
    #[error("{0}")]
    MalformedRequest(String),

    #[error("Unsupported HTTP method: {0}")]
    UnrecognizedVerb(String),

    // Resolution errors
    #[error("No remote method found for URI: {0}")]
    RouteNotFound(String),

    #[error("HTTP method {verb} not supported for URI: {path}")]
    VerbNotSupported { verb: String, path: String },

    #[error("Invalid request method. Only POST is allowed.")]
    PostRequired(String),

    #[error("Handle not found: {0}")]
    HandleNotFound(String),

    // Marshalling errors
    #[error("Cannot decode parameter `{param}`: {message}")]
    ArgumentDecoding { param: String, message: String },

    #[error("Unsupported parameter type {ty} for parameter `{param}`")]
    UnsupportedParameterType { param: String, ty: String },

    #[error("Failed to encode response: {0}")]
    ResponseEncoding(String),

    // Invocation errors
    #[error("Argument `{0}` is required but was null")]
    NullArgument(String),

    #[error("{0}")]
    Invocation(String),

    // Registration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Connection errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Error envelope returned by a remote peer.
    #[error("Remote error {code} ({kind}): {message}")]
    Remote {
        code: u16,
        message: String,
        kind: String,
    },
}

/// Result type alias for Skein operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RpcError {
    /// Create a decoding error for a named parameter.
    pub fn decoding(param: impl Into<String>, message: impl Into<String>) -> Self {
        RpcError::ArgumentDecoding {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Convert to the status code written on the response line.
    ///
    /// - 400: malformed requests, unknown verbs, unknown routes, bad arguments
    /// - 405: the route exists but not for the requested verb
    /// - 500: everything raised by or after invocation
    pub fn status_code(&self) -> u16 {
        match self {
            RpcError::MalformedRequest(_)
            | RpcError::UnrecognizedVerb(_)
            | RpcError::RouteNotFound(_)
            | RpcError::ArgumentDecoding { .. }
            | RpcError::UnsupportedParameterType { .. } => 400,

            RpcError::VerbNotSupported { .. } | RpcError::PostRequired(_) => 405,

            RpcError::Remote { code, .. } => *code,

            _ => 500,
        }
    }

    /// Kind tag used in the `type` field of the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::MalformedRequest(_) => "MalformedRequest",
            RpcError::UnrecognizedVerb(_) => "UnrecognizedVerb",
            RpcError::RouteNotFound(_) => "RouteNotFound",
            RpcError::VerbNotSupported { .. } | RpcError::PostRequired(_) => "VerbNotSupported",
            RpcError::HandleNotFound(_) => "HandleNotFound",
            RpcError::ArgumentDecoding { .. } => "ArgumentDecodingError",
            RpcError::UnsupportedParameterType { .. } => "UnsupportedParameterType",
            RpcError::ResponseEncoding(_) => "ResponseEncodingError",
            RpcError::NullArgument(_) => "NullArgument",
            RpcError::Invocation(_) => "InvocationError",
            RpcError::Config { .. } => "ConfigurationError",
            RpcError::Io { .. } => "IoError",
            RpcError::Json { .. } => "JsonError",
            RpcError::Remote { .. } => "RemoteError",
        }
    }

    /// Build the error from whatever a target raised.
    ///
    /// Errors that are already an `RpcError` keep their kind, anything else
    /// becomes an [`RpcError::Invocation`].
    pub fn from_invocation(err: anyhow::Error) -> Self {
        match err.downcast::<RpcError>() {
            Ok(rpc) => rpc,
            Err(other) => RpcError::Invocation(format!("{:#}", other)),
        }
    }
}

/// Reason phrase for a status code.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown Status",
    }
}
