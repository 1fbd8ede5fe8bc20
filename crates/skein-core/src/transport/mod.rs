//! Byte-stream transport.
//!
//! Minimal request/response framing over TCP, one exchange per connection.
//!
//! # Architecture
//!
//! - **Server**: accepts connections, parses requests, hands them to the `Dispatcher`
//! - **Client**: opens a connection per call, used for handle invocation
//! - **Framing**: request line, headers and `Content-Length` bodies shared by both

pub mod client;
pub mod framing;
pub mod server;

pub use client::RpcClient;
pub use framing::RequestLine;
pub use server::{RpcServer, RpcServerHandle};
