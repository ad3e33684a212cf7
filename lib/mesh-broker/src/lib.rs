//! Broker runtime for the mesh control plane
//!
//! This library provides:
//! - Connection admission (the broker-facing RequestConnection RPC)
//! - Socket lifecycle management for the host allocation protocol
//! - Unix-socket HTTP servers for both surfaces

pub mod allocation;
pub mod broker;
pub mod config;
pub mod server;
pub mod socket;

pub use allocation::SocketLifecycleManager;
pub use broker::{select_channel, Admission, ConnectionBroker};
pub use config::BrokerConfig;
pub use server::{serve_client_socket, serve_device_broker};
pub use socket::{cleanup_socket, operation_check, set_socket_permissions};
