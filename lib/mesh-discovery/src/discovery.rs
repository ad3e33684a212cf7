//! Endpoint discovery against the cluster API

use async_trait::async_trait;
use kube::api::ListParams;
use kube::{Api, Client};
use mesh_api::{NetworkServiceEndpoint, ENDPOINT_SERVICE_LABEL};
use mesh_core::Result;
use tracing::debug;

/// Read-only query for the providers currently advertising a network
/// service in a namespace
#[async_trait]
pub trait EndpointLister: Send + Sync {
    async fn list(
        &self,
        network_service: &str,
        namespace: &str,
    ) -> Result<Vec<NetworkServiceEndpoint>>;
}

/// EndpointDiscovery lists endpoint advertisements by service label
pub struct EndpointDiscovery {
    client: Client,
}

impl EndpointDiscovery {
    /// Create a discovery client against the ambient cluster config
    pub async fn new() -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create a discovery client around an existing Kubernetes client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EndpointLister for EndpointDiscovery {
    async fn list(
        &self,
        network_service: &str,
        namespace: &str,
    ) -> Result<Vec<NetworkServiceEndpoint>> {
        let endpoints: Api<NetworkServiceEndpoint> =
            Api::namespaced(self.client.clone(), namespace);
        let params =
            ListParams::default().labels(&format!("{ENDPOINT_SERVICE_LABEL}={network_service}"));
        let list = endpoints.list(&params).await?;

        debug!(
            "Discovered {} endpoints for network service {}",
            list.items.len(),
            network_service
        );
        Ok(list.items)
    }
}
