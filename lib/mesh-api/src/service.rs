//! Network service data model shared across the mesh control plane

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// NetworkService is a named, mesh-wide addressable service together with
/// the ordered set of channels its providers expose. Immutable once
/// registered with the broker.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkService {
    /// Service name, unique within the registry
    pub name: String,

    /// Provider channels in advertisement order
    #[serde(default)]
    pub channels: Vec<NetworkServiceChannel>,
}

impl NetworkService {
    /// Create a service with no channels
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: Vec::new(),
        }
    }
}

/// One provider channel of a network service
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkServiceChannel {
    /// Channel name
    pub name: String,

    /// Unix socket where the provider for this channel listens
    pub socket_location: String,

    /// Interface descriptors the channel supports
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

/// Interface descriptor with a preference ranking; lower values are
/// preferred when a client supplies several
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    #[serde(rename = "type")]
    pub interface_type: InterfaceType,

    #[serde(default)]
    pub preference: u32,
}

impl Interface {
    pub fn new(interface_type: InterfaceType, preference: u32) -> Self {
        Self {
            interface_type,
            preference,
        }
    }
}

/// Mechanism by which a connection is delivered into a workload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    KernelInterface,
    MemInterface,
    VhostInterface,
    SriovInterface,
}

/// Registration message announcing a dataplane provider to the broker
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DataplaneRegistration {
    /// Name under which the dataplane is registered; unique, first
    /// registration wins
    pub registered_name: String,

    /// Unix socket where the dataplane can be reached
    pub socket_location: String,

    /// Free-form operational parameters
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}
