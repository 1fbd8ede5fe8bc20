//! Skein Core - a minimal RPC framework over a line-oriented TCP transport.
//!
//! Targets (component methods) are registered explicitly into a [`Registry`],
//! then reached either by path and verb (`GET /Random/randomInt?min=1&max=6`)
//! or through an opaque handle issued by the [`HandleManager`]
//! (`POST /invoke?oid=Random-randomInt-1`).
//!
//! # Example
//!
//! ```rust,ignore
//! use skein_core::{
//!     ComponentDescriptor, Dispatcher, HandleManager, MethodDescriptor, ParamSpec,
//!     ParamType, Registry, RpcServer,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> skein_core::Result<()> {
//!     let registry = Arc::new(Registry::new());
//!     registry.register_component(
//!         ComponentDescriptor::new("Echo").base_path("Echo").method(
//!             MethodDescriptor::new("say")
//!                 .param(ParamSpec::named("text", ParamType::Str))
//!                 .handler(|args| Ok(serde_json::json!(args.string(0)?))),
//!         ),
//!     )?;
//!
//!     let dispatcher = Arc::new(Dispatcher::new(registry, Arc::new(HandleManager::new())));
//!     let server = RpcServer::bind(dispatcher, "127.0.0.1", 8080).await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handles;
pub mod marshal;
pub mod registry;
pub mod transport;

// Re-export commonly used types
pub use config::{ClientConfig, TransportConfig};
pub use dispatch::Dispatcher;
pub use envelope::{Headers, RequestEnvelope, ResponseEnvelope};
pub use error::{Result, RpcError};
pub use handles::{HandleManager, HandleRef};
pub use marshal::{ErrorEnvelope, Marshaller};
pub use registry::{
    Arg, Args, ComponentDescriptor, MethodDescriptor, ParamSpec, ParamType, Registry, Route,
    RouteMatch, Target, Verb,
};
pub use transport::{RpcClient, RpcServer, RpcServerHandle};
