pub mod network_service_endpoint;

pub use network_service_endpoint::{
    LocalMechanism, LocalMechanismType, NetworkServiceEndpoint, NetworkServiceEndpointSpec,
    ENDPOINT_SERVICE_LABEL,
};
