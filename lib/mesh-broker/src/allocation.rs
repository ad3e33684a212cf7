//! Socket lifecycle management for the host allocation protocol
//!
//! Each allocated device id gets a dedicated directory, a unix socket in
//! it, and its own broker server task. Re-allocating a live id first stops
//! the previous server through a synchronous rendezvous so that two servers
//! are never bound to the same path.

use crate::broker::ConnectionBroker;
use crate::config::{BrokerConfig, SOCKET_BASE_DIR, SOCKET_MODE};
use crate::server;
use crate::socket;
use mesh_api::{
    AllocateRequest, AllocateResponse, ContainerAllocateResponse, Device, DevicePluginOptions,
    Mount, PreStartContainerRequest, PreStartContainerResponse,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Stop rendezvous: the requester sends an acknowledgement slot and blocks
/// on it; the server answers only after it has released the socket
type StopSender = mpsc::Sender<oneshot::Sender<()>>;
type StopReceiver = mpsc::Receiver<oneshot::Sender<()>>;

/// Per-allocation socket descriptor
struct WorkloadSocket {
    device: Device,
    socket_path: PathBuf,
    allocated: bool,
    /// Present while a server task owns the receiving half
    stop: Option<StopSender>,
}

/// Device table, serialized behind its own lock and only reachable
/// through these operations
struct SocketTable {
    sockets: RwLock<HashMap<String, WorkloadSocket>>,
}

impl SocketTable {
    fn new(seed: HashMap<String, WorkloadSocket>) -> Self {
        Self {
            sockets: RwLock::new(seed),
        }
    }

    /// Register a descriptor for an id, replacing any previous one
    async fn register(&self, id: &str, entry: WorkloadSocket) {
        let mut sockets = self.sockets.write().await;
        sockets.insert(id.to_string(), entry);
    }

    /// Stop handle of a currently allocated id, if a server is live
    async fn stop_handle(&self, id: &str) -> Option<StopSender> {
        let sockets = self.sockets.read().await;
        sockets
            .get(id)
            .filter(|entry| entry.allocated)
            .and_then(|entry| entry.stop.clone())
    }

    /// Clear the allocation flag after a server shut down or failed to start
    async fn clear_allocated(&self, id: &str) {
        let mut sockets = self.sockets.write().await;
        if let Some(entry) = sockets.get_mut(id) {
            entry.allocated = false;
            debug!(socket = %entry.socket_path.display(), "allocation cleared");
        }
    }

    #[cfg(test)]
    async fn is_allocated(&self, id: &str) -> bool {
        let sockets = self.sockets.read().await;
        sockets.get(id).map(|entry| entry.allocated).unwrap_or(false)
    }

    /// Snapshot of the current device table
    async fn devices(&self) -> Vec<Device> {
        let sockets = self.sockets.read().await;
        sockets.values().map(|entry| entry.device.clone()).collect()
    }
}

/// SocketLifecycleManager implements the host allocation protocol and
/// provisions one broker server per allocated socket device
pub struct SocketLifecycleManager {
    broker: Arc<ConnectionBroker>,
    table: Arc<SocketTable>,
    config: BrokerConfig,
}

impl SocketLifecycleManager {
    /// Create the manager and seed the advertised pool of socket devices
    pub fn new(broker: Arc<ConnectionBroker>, config: BrokerConfig) -> Self {
        let mut seed = HashMap::new();
        for _ in 0..config.socket_count {
            let id = Uuid::new_v4().to_string();
            seed.insert(
                id.clone(),
                WorkloadSocket {
                    device: Device::healthy(&id),
                    socket_path: config.client_socket_path(&id),
                    allocated: false,
                    stop: None,
                },
            );
        }

        Self {
            broker,
            table: Arc::new(SocketTable::new(seed)),
            config,
        }
    }

    pub fn broker(&self) -> Arc<ConnectionBroker> {
        self.broker.clone()
    }

    pub fn watch_interval(&self) -> Duration {
        self.config.watch_interval
    }

    /// Discover-options call; static, no behavior
    pub fn options(&self) -> DevicePluginOptions {
        info!("GetDevicePluginOptions was called");
        DevicePluginOptions::default()
    }

    /// Pre-start hook; acknowledgement only
    pub fn pre_start(&self, _request: &PreStartContainerRequest) -> PreStartContainerResponse {
        info!("PreStartContainer was called");
        PreStartContainerResponse::default()
    }

    /// Snapshot of the device table for a watch frame
    pub async fn devices(&self) -> Vec<Device> {
        self.table.devices().await
    }

    /// Allocate a batch of device ids, one mount per id that could be
    /// provisioned. Ids whose host directory cannot be created are left
    /// out of the response.
    pub async fn allocate(&self, request: &AllocateRequest) -> AllocateResponse {
        info!("Allocate was called");
        let mut container_responses = Vec::new();
        for container in &request.container_requests {
            let mut mounts = Vec::new();
            for id in &container.device_ids {
                match self.allocate_device(id).await {
                    Ok(mount) => mounts.push(mount),
                    Err(err) => {
                        warn!(device = %id, "failed to provision socket device: {err:#}");
                    }
                }
            }
            container_responses.push(ContainerAllocateResponse { mounts });
        }
        AllocateResponse {
            container_responses,
        }
    }

    async fn allocate_device(&self, id: &str) -> anyhow::Result<Mount> {
        // A live server for this id means the teardown notification from
        // the host was missed; stop it and wait for the acknowledgement
        // before the path is bound again.
        if let Some(stop) = self.table.stop_handle(id).await {
            let (ack_tx, ack_rx) = oneshot::channel();
            if stop.send(ack_tx).await.is_ok() {
                let _ = ack_rx.await;
                info!(device = %id, "previous server stopped before re-allocation");
            }
        }

        let host_dir = self.config.workload_dir(id);
        let socket_path = self.config.client_socket_path(id);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        // Registered before the server is up; a concurrent watch snapshot
        // may observe allocated-but-not-yet-serving
        self.table
            .register(
                id,
                WorkloadSocket {
                    device: Device::healthy(id),
                    socket_path: socket_path.clone(),
                    allocated: true,
                    stop: Some(stop_tx),
                },
            )
            .await;

        std::fs::create_dir_all(&host_dir)?;

        tokio::spawn(run_workload_server(
            id.to_string(),
            socket_path,
            self.broker.clone(),
            self.table.clone(),
            stop_rx,
        ));

        Ok(Mount {
            container_path: SOCKET_BASE_DIR.to_string(),
            host_path: host_dir.display().to_string(),
            read_only: false,
        })
    }
}

/// Per-allocation server task: bind the workload socket, serve the broker
/// on it, probe readiness, then park on the stop rendezvous. Any startup
/// failure clears the allocation flag and gives up without retry.
async fn run_workload_server(
    id: String,
    socket_path: PathBuf,
    broker: Arc<ConnectionBroker>,
    table: Arc<SocketTable>,
    mut stop: StopReceiver,
) {
    if let Err(err) = socket::cleanup_socket(&socket_path) {
        error!(socket = %socket_path.display(), "failed to clean up stale socket: {err}");
        table.clear_allocated(&id).await;
        return;
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(socket = %socket_path.display(), "failed to listen on socket: {err}");
            table.clear_allocated(&id).await;
            return;
        }
    };
    if let Err(err) = socket::set_socket_permissions(&socket_path, SOCKET_MODE) {
        error!(socket = %socket_path.display(), "failed to restrict socket permissions: {err}");
        table.clear_allocated(&id).await;
        return;
    }

    info!(socket = %socket_path.display(), "starting workload broker server");
    let serve = tokio::spawn(server::serve_client_socket(listener, broker));

    if let Err(err) = socket::operation_check(&socket_path).await {
        error!(socket = %socket_path.display(), "socket readiness probe failed: {err}");
        serve.abort();
        table.clear_allocated(&id).await;
        return;
    }
    info!(socket = %socket_path.display(), "workload socket is operational");

    // Wait for shutdown; clearing the flag precedes the acknowledgement so
    // the requester observes a fully torn-down device
    if let Some(ack) = stop.recv().await {
        info!(socket = %socket_path.display(), "server received shutdown request");
        serve.abort();
        table.clear_allocated(&id).await;
        let _ = ack.send(());
    }
}
