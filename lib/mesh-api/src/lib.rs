//! Mesh broker API types and CRDs for Kubernetes integration
//!
//! This library defines the shared types of the mesh control plane:
//! - NetworkService: the mesh service/channel/interface data model
//! - ConnectionRequest/ConnectionReply: the broker admission RPC
//! - Allocation protocol messages consumed by the host device broker
//! - NetworkServiceEndpoint: CRD advertising a provider for a service

pub mod allocation;
pub mod connection;
pub mod service;
pub mod v1alpha1;

pub use allocation::{
    AllocateRequest, AllocateResponse, ContainerAllocateRequest, ContainerAllocateResponse,
    Device, DevicePluginOptions, ListAndWatchResponse, Mount, PreStartContainerRequest,
    PreStartContainerResponse, DEVICE_HEALTHY,
};
pub use connection::{AdmissionCode, ConnectionParameters, ConnectionReply, ConnectionRequest};
pub use service::{
    DataplaneRegistration, Interface, InterfaceType, NetworkService, NetworkServiceChannel,
};
pub use v1alpha1::{NetworkServiceEndpoint, ENDPOINT_SERVICE_LABEL};
