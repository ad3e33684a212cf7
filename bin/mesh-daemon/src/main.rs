use anyhow::Result;
use mesh_broker::{
    cleanup_socket, serve_device_broker, BrokerConfig, ConnectionBroker, SocketLifecycleManager,
};
use mesh_core::ObjectStore;
use mesh_discovery::EndpointDiscovery;
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing::info;
use tracing_subscriber::fmt::init as tracing_init;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting mesh-daemon...");

    let config = BrokerConfig::from_env();
    info!("  - Socket directory: {}", config.socket_dir.display());
    info!("  - Namespace: {}", config.namespace);
    info!("  - Advertised socket devices: {}", config.socket_count);

    let object_store = Arc::new(ObjectStore::new());
    info!("Object store initialized");

    let discovery = Arc::new(EndpointDiscovery::new().await?);
    info!("Endpoint discovery initialized");

    let broker = Arc::new(ConnectionBroker::new(
        object_store,
        discovery,
        config.namespace.clone(),
    ));
    let manager = Arc::new(SocketLifecycleManager::new(broker, config.clone()));

    // Without the device-broker socket no workload can ever reach the
    // broker, so failing to bind it takes the process down
    std::fs::create_dir_all(&config.socket_dir)?;
    let device_socket = config.device_socket_path();
    cleanup_socket(&device_socket)?;
    let listener = UnixListener::bind(&device_socket)?;
    info!(socket = %device_socket.display(), "Device broker listening");

    tokio::spawn(serve_device_broker(listener, manager));

    // Keep the process alive
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");

    Ok(())
}
