//! Server assembly: registry, handles and dispatcher wired to the transport.

use crate::services::RandomService;
use skein_core::{Dispatcher, HandleManager, Marshaller, Registry, RpcServer, RpcServerHandle};
use std::sync::Arc;
use tracing::info;

/// Build a dispatcher with every demo component registered.
pub fn build_dispatcher(pretty: bool) -> anyhow::Result<Arc<Dispatcher>> {
    let registry = Arc::new(Registry::new());
    let count = registry.register_component(RandomService::descriptor(Arc::new(RandomService)))?;
    info!("Registered {} methods", count);

    let marshaller = if pretty {
        Marshaller::pretty()
    } else {
        Marshaller::new()
    };
    Ok(Arc::new(
        Dispatcher::new(registry, Arc::new(HandleManager::new())).with_marshaller(marshaller),
    ))
}

/// Start the server and advertise one handle per registered method.
///
/// Returns the running server handle; its port is the bound port when `port` is 0.
pub async fn start_server(host: &str, port: u16, pretty: bool) -> anyhow::Result<RpcServerHandle> {
    let dispatcher = build_dispatcher(pretty)?;
    let handle = RpcServer::bind(dispatcher.clone(), host, port).await?;

    for target in dispatcher.registry().named_targets() {
        let reference =
            dispatcher.handle_ref(host, handle.port(), target.component(), target.method())?;
        info!(
            "{}.{} reachable at {}",
            target.component(),
            target.method(),
            reference
        );
    }

    Ok(handle)
}
