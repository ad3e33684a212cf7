//! Wire types for the host allocation protocol
//!
//! The host device broker grants workloads a dedicated broker socket at
//! container-creation time through this protocol: discover options,
//! allocate a batch of device ids, watch device health, pre-start hook.

use serde::{Deserialize, Serialize};

/// Health value reported for a serviceable socket device
pub const DEVICE_HEALTHY: &str = "Healthy";

/// Health value reported for a device that cannot be served
pub const DEVICE_UNHEALTHY: &str = "Unhealthy";

/// One allocatable socket device
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub health: String,
}

impl Device {
    pub fn healthy(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            health: DEVICE_HEALTHY.to_string(),
        }
    }
}

/// Static capabilities advertised to the host device broker
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePluginOptions {
    #[serde(default)]
    pub pre_start_required: bool,
}

/// Batch allocation request, one entry per container
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateRequest {
    #[serde(default)]
    pub container_requests: Vec<ContainerAllocateRequest>,
}

/// Device ids requested for one container
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAllocateRequest {
    #[serde(default)]
    pub device_ids: Vec<String>,
}

/// Batch allocation response, one entry per container
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateResponse {
    #[serde(default)]
    pub container_responses: Vec<ContainerAllocateResponse>,
}

/// Mounts prepared for one container
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAllocateResponse {
    #[serde(default)]
    pub mounts: Vec<Mount>,
}

/// Bind mount exposing an allocated socket directory to a container
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub container_path: String,
    pub host_path: String,
    pub read_only: bool,
}

/// One frame of the device-health watch stream
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListAndWatchResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Pre-start notification for a container's devices
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreStartContainerRequest {
    #[serde(default)]
    pub device_ids: Vec<String>,
}

/// Pre-start acknowledgement; carries no data
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PreStartContainerResponse {}
