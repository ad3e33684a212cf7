//! Per-client connection request tracking

use mesh_api::{ConnectionParameters, NetworkService};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// State of one workload's outstanding or completed request for one
/// network service
#[derive(Clone, Debug)]
pub struct ClientNetworkService {
    /// Snapshot of the service as resolved at request time
    pub network_service: NetworkService,

    /// Parameters of the programmed connection
    pub connection_parameters: ConnectionParameters,

    /// Set while dataplane programming for this pair is outstanding;
    /// duplicate requests observing it are told to retry
    pub in_progress: bool,
}

impl ClientNetworkService {
    /// New entry marking programming as outstanding
    pub fn in_progress(network_service: NetworkService) -> Self {
        Self {
            network_service,
            connection_parameters: ConnectionParameters::default(),
            in_progress: true,
        }
    }
}

/// ClientConnectionMap tracks connection requests keyed by workload
/// identity, then by network service name.
///
/// At most one entry exists per (workload, service) pair. The lock covers
/// each map operation only, never the admission logic around it.
pub struct ClientConnectionMap {
    connections: RwLock<HashMap<String, HashMap<String, ClientNetworkService>>>,
}

impl ClientConnectionMap {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of the entry for a (workload, service) pair
    pub async fn get(&self, request_id: &str, service: &str) -> Option<ClientNetworkService> {
        let connections = self.connections.read().await;
        connections
            .get(request_id)
            .and_then(|services| services.get(service))
            .cloned()
    }

    /// Record the entry for a (workload, service) pair, replacing any
    /// previous one
    pub async fn insert(&self, request_id: &str, service: &str, entry: ClientNetworkService) {
        let mut connections = self.connections.write().await;
        connections
            .entry(request_id.to_string())
            .or_default()
            .insert(service.to_string(), entry);
    }

    /// Clear the in-progress flag once programming for the pair finished;
    /// the entry stays behind to answer duplicate requests idempotently
    pub async fn complete(&self, request_id: &str, service: &str) {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections
            .get_mut(request_id)
            .and_then(|services| services.get_mut(service))
        {
            entry.in_progress = false;
        }
    }

    /// Drop all state for a workload
    pub async fn remove(&self, request_id: &str) {
        let mut connections = self.connections.write().await;
        connections.remove(request_id);
    }

    /// Number of tracked (workload, service) pairs
    pub async fn len(&self) -> usize {
        let connections = self.connections.read().await;
        connections.values().map(HashMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ClientConnectionMap {
    fn default() -> Self {
        Self::new()
    }
}
