//! Runtime configuration for the broker daemon

use std::path::PathBuf;
use std::time::Duration;

/// Base directory where workload sockets are provisioned; also the path
/// the socket directory is mounted at inside a container
pub const SOCKET_BASE_DIR: &str = "/var/lib/servicemesh";

/// Socket filename served inside each allocated workload directory
pub const CLIENT_SOCKET_NAME: &str = "mesh.io.sock";

/// Socket filename of the fixed device-broker server
pub const DEVICE_SOCKET_NAME: &str = "mesh.device.io.sock";

/// Interval between device table snapshots pushed to a watcher
pub const WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Bound on a single programming call to a provider
pub const PROVIDER_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Permissions applied to provisioned socket files (owner only)
pub const SOCKET_MODE: u32 = 0o600;

const DEFAULT_SOCKET_COUNT: usize = 10;

/// Runtime configuration, sourced from the environment with defaults
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Directory under which all broker sockets live
    pub socket_dir: PathBuf,

    /// Namespace endpoint advertisements are looked up in
    pub namespace: String,

    /// Number of socket devices advertised to the host device broker
    pub socket_count: usize,

    /// Interval of the device-health watch stream
    pub watch_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from(SOCKET_BASE_DIR),
            namespace: "default".to_string(),
            socket_count: DEFAULT_SOCKET_COUNT,
            watch_interval: WATCH_INTERVAL,
        }
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults. `MESH_NAMESPACE` takes precedence over `INIT_NAMESPACE`
    /// (the latter is what the downward API sets on the pod).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let socket_dir = std::env::var("MESH_SOCKET_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.socket_dir);
        let namespace = std::env::var("MESH_NAMESPACE")
            .or_else(|_| std::env::var("INIT_NAMESPACE"))
            .unwrap_or(defaults.namespace);
        let socket_count = std::env::var("MESH_SOCKET_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.socket_count);

        Self {
            socket_dir,
            namespace,
            socket_count,
            watch_interval: defaults.watch_interval,
        }
    }

    /// Path of the fixed device-broker socket
    pub fn device_socket_path(&self) -> PathBuf {
        self.socket_dir.join(DEVICE_SOCKET_NAME)
    }

    /// Host directory provisioned for one allocated device id
    pub fn workload_dir(&self, device_id: &str) -> PathBuf {
        self.socket_dir.join(format!("mesh-{device_id}"))
    }

    /// Socket path a workload's broker server listens on
    pub fn client_socket_path(&self, device_id: &str) -> PathBuf {
        self.workload_dir(device_id).join(CLIENT_SOCKET_NAME)
    }
}
