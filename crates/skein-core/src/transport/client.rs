//! TCP client for calling a Skein server.
//!
//! Each call opens a fresh connection, writes one framed request and reads
//! the framed response; the server closes the connection afterwards.

use super::framing::{read_response, write_request};
use crate::config::ClientConfig;
use crate::envelope::ResponseEnvelope;
use crate::handles::HandleRef;
use crate::marshal::ErrorEnvelope;
use crate::{Result, RpcError};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::debug;

async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RpcError::Io {
            message: format!("{} timed out after {:?}", what, limit),
            source: None,
        })?
}

/// Client bound to one `host:port`.
#[derive(Debug, Clone)]
pub struct RpcClient {
    host: String,
    port: u16,
}

impl RpcClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Client for the server a handle reference points at.
    pub fn for_ref(reference: &HandleRef) -> Self {
        Self::new(reference.host.clone(), reference.port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send one request and return the raw response envelope.
    ///
    /// Non-200 statuses are returned as-is, not as errors.
    pub async fn call(&self, verb: &str, target: &str, body: Option<&str>) -> Result<ResponseEnvelope> {
        let mut stream = with_timeout(ClientConfig::CONNECT_TIMEOUT, "connect", async {
            TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(RpcError::from)
        })
        .await?;

        debug!("{} {} -> {}:{}", verb, target, self.host, self.port);

        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        with_timeout(ClientConfig::RESPONSE_TIMEOUT, "request", async {
            write_request(&mut writer, verb, target, &self.host, body).await?;
            read_response(&mut reader).await
        })
        .await
    }

    /// Invoke a handle with positional parameters and return its result.
    ///
    /// A `{}` body (null result) yields `Value::Null`. A non-200 response is
    /// turned into [`RpcError::Remote`] from its error envelope.
    pub async fn invoke(&self, handle: &str, params: Vec<Value>) -> Result<Value> {
        let reference = HandleRef::new(self.host.clone(), self.port, handle);
        let body = json!({ "params": params }).to_string();
        let response = self
            .call("POST", &reference.request_target(), Some(&body))
            .await?;

        if !response.is_success() {
            return Err(remote_error(&response));
        }

        let mut value: Value = serde_json::from_str(&response.body)?;
        Ok(value
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Invoke the target a handle reference points at.
    pub async fn invoke_ref(reference: &HandleRef, params: Vec<Value>) -> Result<Value> {
        Self::for_ref(reference)
            .invoke(&reference.handle, params)
            .await
    }
}

fn remote_error(response: &ResponseEnvelope) -> RpcError {
    match serde_json::from_str::<ErrorEnvelope>(&response.body) {
        Ok(envelope) => RpcError::Remote {
            code: response.status,
            message: envelope.message,
            kind: envelope.kind,
        },
        Err(_) => RpcError::Remote {
            code: response.status,
            message: response.body.clone(),
            kind: response.reason().to_string(),
        },
    }
}
