//! Object store for registered network services and dataplane providers

use mesh_api::{DataplaneRegistration, NetworkService};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// A registered dataplane provider.
///
/// Parameters carry their own lock: the dataplane monitoring routine
/// updates them while other holders of the `Arc` read them.
#[derive(Debug)]
pub struct Dataplane {
    registered_name: String,
    socket_location: String,
    parameters: RwLock<HashMap<String, String>>,
}

impl Dataplane {
    pub fn new(
        registered_name: impl Into<String>,
        socket_location: impl Into<String>,
        parameters: HashMap<String, String>,
    ) -> Self {
        Self {
            registered_name: registered_name.into(),
            socket_location: socket_location.into(),
            parameters: RwLock::new(parameters),
        }
    }

    pub fn registered_name(&self) -> &str {
        &self.registered_name
    }

    pub fn socket_location(&self) -> &str {
        &self.socket_location
    }

    /// Snapshot of the current parameters
    pub async fn parameters(&self) -> HashMap<String, String> {
        self.parameters.read().await.clone()
    }

    /// Set one parameter, replacing any previous value
    pub async fn set_parameter(&self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.write().await.insert(key.into(), value.into());
    }
}

impl From<DataplaneRegistration> for Dataplane {
    fn from(reg: DataplaneRegistration) -> Self {
        Self::new(reg.registered_name, reg.socket_location, reg.parameters)
    }
}

/// ObjectStore holds everything registered with the broker: network
/// services keyed by name and dataplane providers keyed by registered name.
///
/// Each inner store serializes all of its operations, reads included,
/// behind its own lock; none of the operations fail, absence is a `None`
/// or empty result. Adding under an existing key is a no-op (first write
/// wins), never an overwrite.
pub struct ObjectStore {
    services: Mutex<HashMap<String, NetworkService>>,
    dataplanes: Mutex<HashMap<String, Arc<Dataplane>>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            dataplanes: Mutex::new(HashMap::new()),
        }
    }

    /// Register a network service if its name is not already taken
    pub async fn add_network_service(&self, service: NetworkService) {
        let mut services = self.services.lock().await;
        if !services.contains_key(&service.name) {
            debug!("Registered network service: {}", service.name);
            services.insert(service.name.clone(), service);
        }
    }

    /// Look up a network service by name
    pub async fn get_network_service(&self, name: &str) -> Option<NetworkService> {
        let services = self.services.lock().await;
        services.get(name).cloned()
    }

    /// Remove a network service; no-op when absent
    pub async fn delete_network_service(&self, name: &str) {
        let mut services = self.services.lock().await;
        if services.remove(name).is_some() {
            debug!("Deleted network service: {}", name);
        }
    }

    /// Snapshot of all registered network services
    pub async fn list_network_services(&self) -> Vec<NetworkService> {
        let services = self.services.lock().await;
        services.values().cloned().collect()
    }

    /// Register a dataplane if its name is not already taken
    pub async fn add_dataplane(&self, dataplane: Dataplane) {
        let mut dataplanes = self.dataplanes.lock().await;
        if !dataplanes.contains_key(dataplane.registered_name()) {
            debug!("Registered dataplane: {}", dataplane.registered_name());
            dataplanes.insert(dataplane.registered_name().to_string(), Arc::new(dataplane));
        }
    }

    /// Look up a dataplane by registered name
    pub async fn get_dataplane(&self, registered_name: &str) -> Option<Arc<Dataplane>> {
        let dataplanes = self.dataplanes.lock().await;
        dataplanes.get(registered_name).cloned()
    }

    /// Remove a dataplane; no-op when absent
    pub async fn delete_dataplane(&self, registered_name: &str) {
        let mut dataplanes = self.dataplanes.lock().await;
        if dataplanes.remove(registered_name).is_some() {
            debug!("Deleted dataplane: {}", registered_name);
        }
    }

    /// Snapshot of all registered dataplanes
    pub async fn list_dataplanes(&self) -> Vec<Arc<Dataplane>> {
        let dataplanes = self.dataplanes.lock().await;
        dataplanes.values().cloned().collect()
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}
