//! Wire types for the broker connection RPC

use crate::service::Interface;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification of an admission decision, signalled out-of-band on the
/// transport in addition to the structured reply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdmissionCode {
    /// Request admitted
    Ok,
    /// Unknown service, or no providers advertised for it; terminal
    NotFound,
    /// A request for the same (workload, service) pair is in progress;
    /// the caller should retry later
    AlreadyExists,
    /// Endpoint lookup failed; the caller may retry
    Aborted,
}

/// Connection request sent by a workload over its allocated socket
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// Stable identity of the requesting workload (e.g. pod UID); used as
    /// the dedup key together with the service name
    pub request_id: String,

    /// Name of the requested network service
    pub network_service_name: String,

    /// Linux namespace the connection should be programmed into
    #[serde(default)]
    pub linux_namespace: String,

    /// Caller metadata (workload name, namespace)
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Interface preferences, matched against provider channels
    #[serde(default)]
    pub interface_preferences: Vec<Interface>,
}

/// Parameters of an established connection, returned on admission
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Admission reply returned to the requesting workload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionReply {
    pub accepted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_parameters: Option<ConnectionParameters>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_error: Option<String>,
}
