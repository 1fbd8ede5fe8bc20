//! TCP server for the dispatch engine.
//!
//! Binds a listener, accepts connections and serves exactly one request per
//! connection before closing it.
//!
//! # Concurrency
//!
//! Each accepted connection is handled in its own spawned task that owns the
//! stream until close. There is no connection limit and no read deadline, so a
//! silent client holds its task until it disconnects or the server shuts down.
//! The `Dispatcher` is shared via `Arc`; its registry and handle tables carry
//! their own synchronization.

use super::framing::{
    content_length, parse_request_line, read_body, read_headers, read_line, write_response,
};
use crate::config::TransportConfig;
use crate::dispatch::{split_uri, Dispatcher};
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::registry::Verb;
use crate::{Result, RpcError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info};

/// Handle to a running server. Dropping shuts down the server.
pub struct RpcServerHandle {
    pub addr: SocketAddr,
    active_connections: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RpcServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Shut down the server.
    ///
    /// Stops accepting new connections and signals all connection tasks
    /// still waiting on their peer to close.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }

    /// Wait for the accept loop to finish after [`shutdown`](Self::shutdown).
    pub async fn wait(mut self) {
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Server that accepts connections and feeds requests to a [`Dispatcher`].
pub struct RpcServer;

impl RpcServer {
    /// Bind `host:port` (port 0 = OS-assigned) and start serving.
    pub async fn bind(dispatcher: Arc<Dispatcher>, host: &str, port: u16) -> Result<RpcServerHandle> {
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| RpcError::Config {
                message: format!("Invalid listen address {}:{}: {}", host, port, e),
            })?;
        Self::start(dispatcher, addr).await
    }

    /// Start serving on `addr`.
    ///
    /// Returns once the listener is bound; the accept loop runs in a
    /// background task.
    pub async fn start(dispatcher: Arc<Dispatcher>, addr: SocketAddr) -> Result<RpcServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        info!("Server started on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            dispatcher,
            shutdown_rx,
            conn_shutdown_rx,
            active_connections.clone(),
        ));

        Ok(RpcServerHandle {
            addr,
            active_connections,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        dispatcher: Arc<Dispatcher>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Server stopped.");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let active = active_connections.fetch_add(1, Ordering::Relaxed) + 1;
                            let dispatcher = dispatcher.clone();
                            let conns = active_connections.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("Connection from {} ({} active)", peer_addr, active);
                                tokio::select! {
                                    result = Self::handle_connection(stream, &dispatcher) => {
                                        if let Err(e) = result {
                                            debug!("Connection {} ended: {}", peer_addr, e);
                                        }
                                    }
                                    _ = conn_shutdown.changed() => {
                                        debug!("Connection {} closed by shutdown", peer_addr);
                                    }
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Error accepting client connection: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(mut stream: TcpStream, dispatcher: &Dispatcher) -> Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);

        let response = match Self::read_request(&mut reader).await? {
            Ok(request) => Self::process_request(request, &mut reader, dispatcher).await?,
            Err(e) => dispatcher.error_response(&e),
        };

        debug!("Responding {} {}", response.status, response.reason());
        write_response(&mut writer, &response).await?;
        writer.shutdown().await?;
        Ok(())
    }

    /// Read the request line and headers.
    ///
    /// The outer error is an I/O failure; the inner one is a malformed request
    /// that still gets a 400 response.
    async fn read_request<R: AsyncBufRead + Unpin>(
        reader: &mut R,
    ) -> Result<std::result::Result<RequestEnvelope, RpcError>> {
        let line = match read_line(reader).await? {
            Some(line) if !line.trim().is_empty() => line,
            _ => {
                return Ok(Err(RpcError::MalformedRequest(
                    "Empty request line.".to_string(),
                )))
            }
        };
        debug!("Received request: {}", line);

        let request_line = match parse_request_line(&line) {
            Ok(request_line) => request_line,
            Err(e) => return Ok(Err(e)),
        };
        let headers = read_headers(reader).await?;

        Ok(Ok(RequestEnvelope {
            verb: request_line.verb,
            target: request_line.target,
            version: request_line.version,
            headers,
            body: String::new(),
        }))
    }

    async fn process_request<R: AsyncBufRead + Unpin>(
        request: RequestEnvelope,
        reader: &mut R,
        dispatcher: &Dispatcher,
    ) -> Result<ResponseEnvelope> {
        let (path, query) = split_uri(&request.target);
        if path == TransportConfig::INVOKE_PATH {
            let handle = query.get(TransportConfig::HANDLE_QUERY_KEY).cloned();
            Self::process_invoke(request, handle, reader, dispatcher).await
        } else {
            Self::process_route(request, reader, dispatcher).await
        }
    }

    /// Handle call path: POST only, body required.
    async fn process_invoke<R: AsyncBufRead + Unpin>(
        mut request: RequestEnvelope,
        handle: Option<String>,
        reader: &mut R,
        dispatcher: &Dispatcher,
    ) -> Result<ResponseEnvelope> {
        if !request.verb.eq_ignore_ascii_case("POST") {
            return Ok(dispatcher.error_response(&RpcError::PostRequired(request.verb)));
        }

        let handle = match handle.filter(|h| !h.is_empty()) {
            Some(handle) => handle,
            None => {
                return Ok(dispatcher.error_response(&RpcError::MalformedRequest(
                    "Missing handle in request target.".to_string(),
                )))
            }
        };

        let expected = match content_length(&request.headers) {
            Ok(Some(len)) if len > 0 => len as usize,
            _ => {
                return Ok(dispatcher.error_response(&RpcError::MalformedRequest(
                    "Content-Length header is missing or invalid.".to_string(),
                )))
            }
        };

        let body = read_body(reader, expected).await?;
        if body.len() < expected {
            return Ok(dispatcher.error_response(&RpcError::MalformedRequest(format!(
                "Request body truncated: expected {} bytes, received {}.",
                expected,
                body.len()
            ))));
        }
        request.body = String::from_utf8_lossy(&body).into_owned();
        debug!("Received request body: {}", request.body);

        Ok(match dispatcher.handle_invoke(&handle, &request.body) {
            Ok(body) => ResponseEnvelope::ok(body),
            Err(e) => dispatcher.error_response_with_status(500, &e),
        })
    }

    /// Path+verb call path: body read only for POST/PUT with a positive length.
    async fn process_route<R: AsyncBufRead + Unpin>(
        mut request: RequestEnvelope,
        reader: &mut R,
        dispatcher: &Dispatcher,
    ) -> Result<ResponseEnvelope> {
        let length = match content_length(&request.headers) {
            Ok(length) => length.unwrap_or(0),
            Err(e) => return Ok(dispatcher.error_response(&e)),
        };

        let carries_body = request
            .verb
            .parse::<Verb>()
            .is_ok_and(|verb| verb.carries_body());
        if carries_body && length > 0 {
            let expected = length as usize;
            let body = read_body(reader, expected).await?;
            if body.len() < expected {
                debug!(
                    "Short request body: expected {} bytes, received {}",
                    expected,
                    body.len()
                );
            }
            request.body = String::from_utf8_lossy(&body).into_owned();
            debug!("Received request body: {}", request.body);
        }

        Ok(dispatcher.handle(&request.verb, &request.target, &request.body, &request.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::HandleManager;
    use crate::marshal::ErrorEnvelope;
    use crate::registry::{ComponentDescriptor, MethodDescriptor, ParamSpec, ParamType, Registry};
    use crate::transport::framing::read_response;
    use serde_json::json;
    use tokio::io::AsyncReadExt;

    fn echo_dispatcher() -> Arc<Dispatcher> {
        let registry = Arc::new(Registry::new());
        registry
            .register_component(
                ComponentDescriptor::new("Echo").base_path("Echo").method(
                    MethodDescriptor::new("say")
                        .verb(crate::registry::Verb::Post)
                        .param(ParamSpec::named("text", ParamType::Str))
                        .handler(|args| Ok(json!(args.string(0)?))),
                ),
            )
            .unwrap();
        Arc::new(Dispatcher::new(registry, Arc::new(HandleManager::new())))
    }

    /// Send `raw`, then close the write half so the server sees EOF.
    async fn send_raw_and_close(addr: SocketAddr, raw: &[u8]) -> ResponseEnvelope {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        stream.shutdown().await.unwrap();
        let (reader, _writer) = stream.split();
        let mut reader = BufReader::new(reader);
        read_response(&mut reader).await.unwrap()
    }

    async fn send_raw(addr: SocketAddr, raw: &[u8]) -> ResponseEnvelope {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let (reader, _writer) = stream.split();
        let mut reader = BufReader::new(reader);
        read_response(&mut reader).await.unwrap()
    }

    #[tokio::test]
    async fn test_server_start_and_shutdown() {
        let mut handle = RpcServer::bind(echo_dispatcher(), "127.0.0.1", 0)
            .await
            .unwrap();

        assert!(handle.port() > 0);
        assert_eq!(handle.addr().ip(), std::net::Ipv4Addr::LOCALHOST);

        handle.shutdown();
        handle.wait().await;
    }

    #[tokio::test]
    async fn test_invalid_listen_address() {
        let result = RpcServer::bind(echo_dispatcher(), "not-an-ip", 0).await;
        assert!(matches!(result, Err(RpcError::Config { .. })));
    }

    #[tokio::test]
    async fn test_post_body_roundtrip() {
        let handle = RpcServer::bind(echo_dispatcher(), "127.0.0.1", 0)
            .await
            .unwrap();

        let body = r#"{"text":"hello"}"#;
        let raw = format!(
            "POST /Echo/say HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let response = send_raw(handle.addr(), raw.as_bytes()).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "\"hello\"");
    }

    #[tokio::test]
    async fn test_empty_request_line_returns_400() {
        let handle = RpcServer::bind(echo_dispatcher(), "127.0.0.1", 0)
            .await
            .unwrap();

        let response = send_raw(handle.addr(), b"\r\n").await;
        assert_eq!(response.status, 400);
        let envelope: ErrorEnvelope = serde_json::from_str(&response.body).unwrap();
        assert_eq!(envelope.message, "Bad Request: Empty request line.");
    }

    #[tokio::test]
    async fn test_invalid_content_length_returns_400() {
        let handle = RpcServer::bind(echo_dispatcher(), "127.0.0.1", 0)
            .await
            .unwrap();

        let response = send_raw(
            handle.addr(),
            b"POST /Echo/say HTTP/1.1\r\nContent-Length: lots\r\n\r\n",
        )
        .await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_invoke_rejects_other_verbs_and_missing_length() {
        let handle = RpcServer::bind(echo_dispatcher(), "127.0.0.1", 0)
            .await
            .unwrap();

        let response = send_raw(handle.addr(), b"GET /invoke?oid=Echo-say-1 HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status, 405);
        let envelope: ErrorEnvelope = serde_json::from_str(&response.body).unwrap();
        assert_eq!(
            envelope.message,
            "Method Not Allowed: Invalid request method. Only POST is allowed."
        );
        assert_eq!(envelope.kind, "VerbNotSupported");

        let response = send_raw(handle.addr(), b"POST /invoke?oid=Echo-say-1 HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status, 400);
        let envelope: ErrorEnvelope = serde_json::from_str(&response.body).unwrap();
        assert_eq!(
            envelope.message,
            "Bad Request: Content-Length header is missing or invalid."
        );

        let response = send_raw(
            handle.addr(),
            b"POST /invoke HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}",
        )
        .await;
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_connection_closed_after_response() {
        let handle = RpcServer::bind(echo_dispatcher(), "127.0.0.1", 0)
            .await
            .unwrap();

        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        stream
            .write_all(b"GET /Echo/missing HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
    }

    #[tokio::test]
    async fn test_huge_content_length_does_not_take_down_server() {
        let handle = RpcServer::bind(echo_dispatcher(), "127.0.0.1", 0)
            .await
            .unwrap();

        let response = send_raw_and_close(
            handle.addr(),
            b"POST /Echo/say HTTP/1.1\r\nContent-Length: 9000000000000000\r\n\r\n{\"text\":\"hi\"}",
        )
        .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "\"hi\"");

        let response = send_raw_and_close(
            handle.addr(),
            b"POST /invoke?oid=Echo-say-1 HTTP/1.1\r\nContent-Length: 9000000000000000\r\n\r\n{}",
        )
        .await;
        assert_eq!(response.status, 400);

        // Still serving afterwards.
        let body = r#"{"text":"again"}"#;
        let raw = format!(
            "POST /Echo/say HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let response = send_raw(handle.addr(), raw.as_bytes()).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "\"again\"");
    }

    #[tokio::test]
    async fn test_short_body_accepted_on_route_path() {
        let handle = RpcServer::bind(echo_dispatcher(), "127.0.0.1", 0)
            .await
            .unwrap();

        let response = send_raw_and_close(
            handle.addr(),
            b"POST /Echo/say HTTP/1.1\r\nContent-Length: 50\r\n\r\n{\"text\":\"hi\"}",
        )
        .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "\"hi\"");
    }

    #[tokio::test]
    async fn test_short_body_rejected_on_invoke_path() {
        let dispatcher = echo_dispatcher();
        let oid = dispatcher.issue_handle("Echo", "say").unwrap();
        let handle = RpcServer::bind(dispatcher, "127.0.0.1", 0).await.unwrap();

        let body = r#"{"params":["hi"]}"#;
        let raw = format!(
            "POST /invoke?oid={} HTTP/1.1\r\nContent-Length: 50\r\n\r\n{}",
            oid, body
        );
        let response = send_raw_and_close(handle.addr(), raw.as_bytes()).await;
        assert_eq!(response.status, 400);
        let envelope: ErrorEnvelope = serde_json::from_str(&response.body).unwrap();
        assert_eq!(
            envelope.message,
            format!(
                "Bad Request: Request body truncated: expected 50 bytes, received {}.",
                body.len()
            )
        );

        // The same body with an exact length goes through.
        let raw = format!(
            "POST /invoke?oid={} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            oid,
            body.len(),
            body
        );
        let response = send_raw(handle.addr(), raw.as_bytes()).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"result":"hi"}"#);
    }

    #[tokio::test]
    async fn test_active_connections_tracks_open_streams() {
        let handle = RpcServer::bind(echo_dispatcher(), "127.0.0.1", 0)
            .await
            .unwrap();
        assert_eq!(handle.active_connections(), 0);

        let silent = TcpStream::connect(handle.addr()).await.unwrap();
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while handle.active_connections() != 1 {
            assert!(tokio::time::Instant::now() < deadline, "connection never counted");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        drop(silent);
        while handle.active_connections() != 0 {
            assert!(tokio::time::Instant::now() < deadline, "connection never released");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}
