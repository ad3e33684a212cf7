use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label providers put on their endpoint advertisements; the broker lists
/// endpoints for a service by selecting on it
pub const ENDPOINT_SERVICE_LABEL: &str = "mesh.datum.net/network-service";

/// NetworkServiceEndpoint advertises that a specific provider instance
/// currently serves a specific network service. Created by providers,
/// read-only for the broker.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "mesh.datum.net",
    version = "v1alpha1",
    kind = "NetworkServiceEndpoint",
    plural = "networkserviceendpoints",
    namespaced,
    derive = "Default",
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.networkServiceName"}"#,
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".spec.providerName"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkServiceEndpointSpec {
    /// Identity of the advertising provider (e.g. its pod UID)
    pub provider_name: String,

    /// Network service this endpoint serves
    pub network_service_name: String,

    /// Unix socket where the provider accepts connection programming calls
    pub socket_location: String,

    /// Local delivery mechanisms the provider supports
    #[serde(default)]
    pub local_mechanisms: Vec<LocalMechanism>,
}

/// A delivery mechanism supported by a provider on the local node
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalMechanism {
    pub mechanism_type: LocalMechanismType,

    /// Mechanism-specific parameters (interface names and the like)
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Kinds of local delivery mechanisms
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocalMechanismType {
    #[default]
    KernelInterface,
    MemInterface,
    VhostInterface,
    SriovInterface,
}
