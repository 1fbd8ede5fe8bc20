//! Opaque handles bound to resolved targets.
//!
//! A handle lets a caller invoke one specific target later without repeating
//! name resolution. Handles are formatted `{component}-{method}-{n}` where `n`
//! comes from a counter starting at 1. Bindings are never revoked, so the
//! table grows with every issuance for the lifetime of the manager.

use crate::config::TransportConfig;
use crate::registry::Target;
use crate::{Result, RpcError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

#[derive(Default)]
struct HandleTable {
    next_id: u64,
    bindings: HashMap<String, Arc<Target>>,
    /// `component-method` -> most recently issued handle
    latest: HashMap<String, String>,
}

/// Issues handles and resolves them back to targets.
pub struct HandleManager {
    table: RwLock<HandleTable>,
}

impl Default for HandleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleManager {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HandleTable {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Issue a new handle bound to `target`.
    ///
    /// The counter increment and both inserts happen under one write lock, so
    /// concurrent issuers always receive distinct handles.
    pub fn issue(&self, component: &str, method: &str, target: Arc<Target>) -> String {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let id = table.next_id;
        table.next_id += 1;

        let key = format!("{}-{}", component, method);
        let handle = format!("{}-{}", key, id);
        table.bindings.insert(handle.clone(), target);
        table.latest.insert(key, handle.clone());

        debug!("Issued handle {}", handle);
        handle
    }

    /// Resolve a handle to the target it was bound to.
    pub fn resolve(&self, handle: &str) -> Option<Arc<Target>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.bindings.get(handle).cloned()
    }

    /// Most recently issued handle for a component method.
    pub fn lookup(&self, component: &str, method: &str) -> Option<String> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .latest
            .get(&format!("{}-{}", component, method))
            .cloned()
    }

    /// Number of handles issued so far.
    pub fn issued_count(&self) -> usize {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.bindings.len()
    }
}

/// Caller-facing pointer to a remote target:
/// `http://{host}:{port}/invoke?oid={handle}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleRef {
    pub host: String,
    pub port: u16,
    pub handle: String,
}

impl HandleRef {
    pub fn new(host: impl Into<String>, port: u16, handle: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            handle: handle.into(),
        }
    }

    /// Request target for this handle, e.g. `/invoke?oid=Random-randomInt-1`.
    pub fn request_target(&self) -> String {
        format!(
            "{}?{}={}",
            TransportConfig::INVOKE_PATH,
            TransportConfig::HANDLE_QUERY_KEY,
            self.handle
        )
    }

    pub fn to_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.request_target())
    }

    /// Parse the URL form back into a reference.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |message: String| RpcError::Config {
            message: format!("Invalid handle reference `{}`: {}", input, message),
        };

        let url = url::Url::parse(input).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.path() != TransportConfig::INVOKE_PATH {
            return Err(invalid(format!("unexpected path {}", url.path())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port".to_string()))?;
        let handle = url
            .query_pairs()
            .find(|(k, _)| k == TransportConfig::HANDLE_QUERY_KEY)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid("missing handle".to_string()))?;

        Ok(Self { host, port, handle })
    }
}

impl fmt::Display for HandleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}
