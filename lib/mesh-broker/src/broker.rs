//! Connection admission broker
//!
//! RequestConnection decision procedure: resolve the service, answer
//! duplicates from the per-client connection map, then consult the
//! endpoint lister before admitting.

use mesh_api::{
    AdmissionCode, ConnectionParameters, ConnectionReply, ConnectionRequest, Interface,
    NetworkService, NetworkServiceChannel,
};
use mesh_core::{ClientConnectionMap, ClientNetworkService, ObjectStore};
use mesh_discovery::EndpointLister;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of an admission decision: the structured reply sent back to the
/// workload plus the classification signalled on the transport
#[derive(Clone, Debug)]
pub struct Admission {
    pub reply: ConnectionReply,
    pub code: AdmissionCode,
}

impl Admission {
    fn accepted() -> Self {
        Self {
            reply: ConnectionReply {
                accepted: true,
                connection_parameters: Some(ConnectionParameters::default()),
                admission_error: None,
            },
            code: AdmissionCode::Ok,
        }
    }

    fn rejected(code: AdmissionCode, admission_error: String) -> Self {
        Self {
            reply: ConnectionReply {
                accepted: false,
                connection_parameters: None,
                admission_error: Some(admission_error),
            },
            code,
        }
    }
}

/// ConnectionBroker matches workloads requesting a network service to the
/// providers advertising it, deduplicating concurrent requests per
/// (workload, service) pair
pub struct ConnectionBroker {
    object_store: Arc<ObjectStore>,
    endpoints: Arc<dyn EndpointLister>,
    connections: ClientConnectionMap,
    namespace: String,
}

impl ConnectionBroker {
    pub fn new(
        object_store: Arc<ObjectStore>,
        endpoints: Arc<dyn EndpointLister>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            object_store,
            endpoints,
            connections: ClientConnectionMap::new(),
            namespace: namespace.into(),
        }
    }

    pub fn object_store(&self) -> Arc<ObjectStore> {
        self.object_store.clone()
    }

    /// Decide admission for one connection request.
    ///
    /// Never returns a transport fault; failures are expressed as a
    /// structured rejection plus the matching admission code.
    pub async fn request_connection(&self, request: &ConnectionRequest) -> Admission {
        info!(
            request_id = %request.request_id,
            network_service = %request.network_service_name,
            linux_namespace = %request.linux_namespace,
            "received connection request"
        );

        let Some(service) = self
            .object_store
            .get_network_service(&request.network_service_name)
            .await
        else {
            info!(
                network_service = %request.network_service_name,
                "network service not found"
            );
            return Admission::rejected(
                AdmissionCode::NotFound,
                format!(
                    "requested network service {} does not exist",
                    request.network_service_name
                ),
            );
        };
        debug!(
            network_service = %service.name,
            channels = service.channels.len(),
            "found network service"
        );

        if let Some(existing) = self
            .connections
            .get(&request.request_id, &request.network_service_name)
            .await
        {
            if existing.in_progress {
                // Programming is taking a while; tell the client to retry
                return Admission::rejected(
                    AdmissionCode::AlreadyExists,
                    format!(
                        "dataplane for requested network service {} is still being programmed, retry",
                        request.network_service_name
                    ),
                );
            }
            // Prior request completed; re-acknowledge without re-programming
            return Admission::accepted();
        }
        info!(request_id = %request.request_id, "new connection request");

        let endpoints = match self
            .endpoints
            .list(&request.network_service_name, &self.namespace)
            .await
        {
            Ok(endpoints) => endpoints,
            Err(err) => {
                return Admission::rejected(
                    AdmissionCode::Aborted,
                    format!(
                        "connection request {} failed to get a list of endpoints for network service {}: {err}",
                        request.request_id, request.network_service_name
                    ),
                );
            }
        };
        if endpoints.is_empty() {
            return Admission::rejected(
                AdmissionCode::NotFound,
                format!(
                    "connection request {}: no endpoints were found for network service {}",
                    request.request_id, request.network_service_name
                ),
            );
        }

        // A provider exists; admit. Channel selection and the programming
        // call to the chosen provider happen on the provisioning path,
        // which flags the pair in progress until it completes.
        Admission::accepted()
    }

    /// Flag a (workload, service) pair as being programmed; duplicates
    /// arriving while the flag is set are answered with already-exists
    pub async fn mark_in_progress(&self, request_id: &str, service: NetworkService) {
        let name = service.name.clone();
        self.connections
            .insert(
                request_id,
                &name,
                ClientNetworkService::in_progress(service),
            )
            .await;
    }

    /// Clear the in-progress flag, leaving the entry as a dedup record
    pub async fn mark_completed(&self, request_id: &str, service_name: &str) {
        self.connections.complete(request_id, service_name).await;
    }

    /// Drop all request state for a workload; called on terminal failure
    /// of the provisioning path
    pub async fn clean_connection_request(&self, request_id: &str) {
        self.connections.remove(request_id).await;
    }
}

/// Select the provider channel for a set of client interface preferences.
///
/// Preferences are ordered ascending by preference value before matching;
/// the first channel in service order exposing any of the requested
/// interface types wins.
pub fn select_channel<'a>(
    service: &'a NetworkService,
    preferences: &[Interface],
) -> Option<&'a NetworkServiceChannel> {
    let mut requested: Vec<&Interface> = preferences.iter().collect();
    requested.sort_by_key(|interface| interface.preference);

    for channel in &service.channels {
        for interface in &channel.interfaces {
            if requested
                .iter()
                .any(|req| req.interface_type == interface.interface_type)
            {
                return Some(channel);
            }
        }
    }
    None
}
