//! Unix-socket HTTP servers for the broker surfaces
//!
//! Two servers share the same shape: an accept loop that hands each
//! stream to its own task and serves JSON over HTTP/1. The admission
//! code of a connection reply is signalled as the response status.

use crate::allocation::SocketLifecycleManager;
use crate::broker::ConnectionBroker;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use mesh_api::{
    AdmissionCode, AllocateRequest, ConnectionRequest, DataplaneRegistration, ListAndWatchResponse,
    NetworkService, PreStartContainerRequest,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

type BrokerBody = BoxBody<Bytes, Infallible>;

fn full(data: impl Into<Bytes>) -> BrokerBody {
    Full::new(data.into()).boxed()
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<BrokerBody> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full(body))
        .unwrap()
}

fn text_response(status: StatusCode, message: &str) -> Response<BrokerBody> {
    Response::builder()
        .status(status)
        .body(full(format!("{message}\n")))
        .unwrap()
}

fn admission_status(code: AdmissionCode) -> StatusCode {
    match code {
        AdmissionCode::Ok => StatusCode::OK,
        AdmissionCode::NotFound => StatusCode::NOT_FOUND,
        AdmissionCode::AlreadyExists => StatusCode::CONFLICT,
        AdmissionCode::Aborted => StatusCode::BAD_GATEWAY,
    }
}

/// Serve the connection broker on an allocated workload socket
pub async fn serve_client_socket(listener: UnixListener, broker: Arc<ConnectionBroker>) {
    loop {
        let (stream, _addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Error accepting connection: {}", e);
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let broker = broker.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let broker = broker.clone();
                handle_client_request(req, broker)
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving client connection: {}", e);
            }
        });
    }
}

async fn handle_client_request(
    req: Request<Incoming>,
    broker: Arc<ConnectionBroker>,
) -> Result<Response<BrokerBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("{} {}", method, path);

    match (method, path.as_str()) {
        (Method::POST, "/v1/connect") => {
            let body = req.into_body().collect().await?.to_bytes();
            let request: ConnectionRequest = match serde_json::from_slice(&body) {
                Ok(request) => request,
                Err(e) => {
                    return Ok(text_response(
                        StatusCode::BAD_REQUEST,
                        &format!("invalid connection request: {e}"),
                    ))
                }
            };

            let admission = broker.request_connection(&request).await;
            Ok(json_response(
                admission_status(admission.code),
                &admission.reply,
            ))
        }
        (Method::GET, "/healthz") => Ok(text_response(StatusCode::OK, "OK")),
        _ => Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
    }
}

/// Serve the allocation protocol and registration calls on the fixed
/// device-broker socket
pub async fn serve_device_broker(listener: UnixListener, manager: Arc<SocketLifecycleManager>) {
    loop {
        let (stream, _addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Error accepting connection: {}", e);
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let manager = manager.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let manager = manager.clone();
                handle_device_request(req, manager)
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving device broker connection: {}", e);
            }
        });
    }
}

async fn handle_device_request(
    req: Request<Incoming>,
    manager: Arc<SocketLifecycleManager>,
) -> Result<Response<BrokerBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("{} {}", method, path);

    match (method, path.as_str()) {
        (Method::GET, "/v1/options") => Ok(json_response(StatusCode::OK, &manager.options())),
        (Method::POST, "/v1/allocate") => {
            let body = req.into_body().collect().await?.to_bytes();
            let request: AllocateRequest = match serde_json::from_slice(&body) {
                Ok(request) => request,
                Err(e) => {
                    return Ok(text_response(
                        StatusCode::BAD_REQUEST,
                        &format!("invalid allocate request: {e}"),
                    ))
                }
            };

            let response = manager.allocate(&request).await;
            Ok(json_response(StatusCode::OK, &response))
        }
        (Method::GET, "/v1/watch") => Ok(watch_stream(manager)),
        (Method::POST, "/v1/prestart") => {
            let body = req.into_body().collect().await?.to_bytes();
            let request: PreStartContainerRequest =
                serde_json::from_slice(&body).unwrap_or_default();
            Ok(json_response(StatusCode::OK, &manager.pre_start(&request)))
        }
        (Method::POST, "/v1/services") => {
            let body = req.into_body().collect().await?.to_bytes();
            let service: NetworkService = match serde_json::from_slice(&body) {
                Ok(service) => service,
                Err(e) => {
                    return Ok(text_response(
                        StatusCode::BAD_REQUEST,
                        &format!("invalid network service: {e}"),
                    ))
                }
            };

            manager
                .broker()
                .object_store()
                .add_network_service(service)
                .await;
            Ok(json_response(
                StatusCode::OK,
                &serde_json::json!({ "accepted": true }),
            ))
        }
        (Method::POST, "/v1/dataplanes") => {
            let body = req.into_body().collect().await?.to_bytes();
            let registration: DataplaneRegistration = match serde_json::from_slice(&body) {
                Ok(registration) => registration,
                Err(e) => {
                    return Ok(text_response(
                        StatusCode::BAD_REQUEST,
                        &format!("invalid dataplane registration: {e}"),
                    ))
                }
            };

            manager
                .broker()
                .object_store()
                .add_dataplane(registration.into())
                .await;
            Ok(json_response(
                StatusCode::OK,
                &serde_json::json!({ "accepted": true }),
            ))
        }
        (Method::GET, "/healthz") => Ok(text_response(StatusCode::OK, "OK")),
        _ => Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
    }
}

/// Long-lived watch stream: push a device table snapshot every interval
/// until the watcher hangs up
fn watch_stream(manager: Arc<SocketLifecycleManager>) -> Response<BrokerBody> {
    let (tx, rx) = mpsc::channel::<Result<Frame<Bytes>, Infallible>>(4);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(manager.watch_interval());
        loop {
            ticker.tick().await;
            let snapshot = ListAndWatchResponse {
                devices: manager.devices().await,
            };
            let mut line = match serde_json::to_vec(&snapshot) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to encode watch frame: {}", e);
                    break;
                }
            };
            line.push(b'\n');
            if tx.send(Ok(Frame::data(Bytes::from(line)))).await.is_err() {
                debug!("Watch stream closed by peer");
                break;
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/x-ndjson")
        .body(StreamBody::new(ReceiverStream::new(rx)).boxed())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use mesh_api::v1alpha1::NetworkServiceEndpointSpec;
    use mesh_api::{ConnectionReply, NetworkServiceEndpoint};
    use mesh_core::ObjectStore;
    use mesh_discovery::EndpointLister;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::net::UnixStream;

    struct StaticLister(Vec<NetworkServiceEndpoint>);

    #[async_trait::async_trait]
    impl EndpointLister for StaticLister {
        async fn list(
            &self,
            _network_service: &str,
            _namespace: &str,
        ) -> mesh_core::Result<Vec<NetworkServiceEndpoint>> {
            Ok(self.0.clone())
        }
    }

    fn endpoint(provider: &str, service: &str) -> NetworkServiceEndpoint {
        NetworkServiceEndpoint::new(
            &format!("{provider}-{service}"),
            NetworkServiceEndpointSpec {
                provider_name: provider.to_string(),
                network_service_name: service.to_string(),
                socket_location: format!("/var/lib/servicemesh/{provider}.sock"),
                local_mechanisms: Vec::new(),
            },
        )
    }

    async fn test_broker() -> Arc<ConnectionBroker> {
        let store = Arc::new(ObjectStore::new());
        store
            .add_network_service(NetworkService::new("gold-network"))
            .await;
        Arc::new(ConnectionBroker::new(
            store,
            Arc::new(StaticLister(vec![endpoint("nse-1", "gold-network")])),
            "default",
        ))
    }

    async fn request_over_socket(
        path: &Path,
        method: Method,
        uri: &str,
        body: Vec<u8>,
    ) -> (StatusCode, Bytes) {
        let stream = UnixStream::connect(path).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, bytes)
    }

    fn connect_body(request_id: &str, service: &str) -> Vec<u8> {
        serde_json::to_vec(&ConnectionRequest {
            request_id: request_id.to_string(),
            network_service_name: service.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_connect_rpc_over_unix_socket() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("mesh.io.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(serve_client_socket(listener, test_broker().await));

        let (status, body) = request_over_socket(
            &socket_path,
            Method::POST,
            "/v1/connect",
            connect_body("w1", "gold-network"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let reply: ConnectionReply = serde_json::from_slice(&body).unwrap();
        assert!(reply.accepted);

        // Repeated request over the same socket is admitted again
        let (status, _) = request_over_socket(
            &socket_path,
            Method::POST,
            "/v1/connect",
            connect_body("w1", "gold-network"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_connect_unknown_service_is_404() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("mesh.io.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(serve_client_socket(listener, test_broker().await));

        let (status, body) = request_over_socket(
            &socket_path,
            Method::POST,
            "/v1/connect",
            connect_body("w1", "silver-network"),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let reply: ConnectionReply = serde_json::from_slice(&body).unwrap();
        assert!(!reply.accepted);
        assert!(reply.admission_error.unwrap().contains("silver-network"));
    }

    #[tokio::test]
    async fn test_client_socket_unknown_route_and_healthz() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("mesh.io.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(serve_client_socket(listener, test_broker().await));

        let (status, _) =
            request_over_socket(&socket_path, Method::GET, "/healthz", Vec::new()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) =
            request_over_socket(&socket_path, Method::GET, "/v1/absent", Vec::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_connect_body_is_400() {
        let tmp = TempDir::new().unwrap();
        let socket_path = tmp.path().join("mesh.io.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(serve_client_socket(listener, test_broker().await));

        let (status, _) = request_over_socket(
            &socket_path,
            Method::POST,
            "/v1/connect",
            b"not json".to_vec(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    async fn start_device_broker(tmp: &TempDir) -> (Arc<SocketLifecycleManager>, std::path::PathBuf)
    {
        let config = BrokerConfig {
            socket_dir: tmp.path().to_path_buf(),
            socket_count: 2,
            ..BrokerConfig::default()
        };
        let manager = Arc::new(SocketLifecycleManager::new(test_broker().await, config.clone()));

        let socket_path = config.device_socket_path();
        let listener = UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(serve_device_broker(listener, manager.clone()));
        (manager, socket_path)
    }

    #[tokio::test]
    async fn test_device_broker_options_and_prestart() {
        let tmp = TempDir::new().unwrap();
        let (_manager, socket_path) = start_device_broker(&tmp).await;

        let (status, body) =
            request_over_socket(&socket_path, Method::GET, "/v1/options", Vec::new()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(serde_json::from_slice::<serde_json::Value>(&body).is_ok());

        let (status, _) =
            request_over_socket(&socket_path, Method::POST, "/v1/prestart", b"{}".to_vec()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_registration_routes_populate_object_store() {
        let tmp = TempDir::new().unwrap();
        let (manager, socket_path) = start_device_broker(&tmp).await;

        let service = serde_json::to_vec(&NetworkService::new("silver-network")).unwrap();
        let (status, _) =
            request_over_socket(&socket_path, Method::POST, "/v1/services", service).await;
        assert_eq!(status, StatusCode::OK);

        let registration = serde_json::to_vec(&DataplaneRegistration {
            registered_name: "vpp".to_string(),
            socket_location: "/run/vpp/api.sock".to_string(),
            parameters: Default::default(),
        })
        .unwrap();
        let (status, _) =
            request_over_socket(&socket_path, Method::POST, "/v1/dataplanes", registration).await;
        assert_eq!(status, StatusCode::OK);

        let store = manager.broker().object_store();
        assert!(store.get_network_service("silver-network").await.is_some());
        assert!(store.get_dataplane("vpp").await.is_some());
    }

    #[tokio::test]
    async fn test_allocate_then_connect_full_loop() {
        let tmp = TempDir::new().unwrap();
        let (_manager, socket_path) = start_device_broker(&tmp).await;

        let allocate = serde_json::to_vec(&AllocateRequest {
            container_requests: vec![mesh_api::ContainerAllocateRequest {
                device_ids: vec!["dev-a".to_string()],
            }],
        })
        .unwrap();
        let (status, body) =
            request_over_socket(&socket_path, Method::POST, "/v1/allocate", allocate).await;
        assert_eq!(status, StatusCode::OK);
        let response: mesh_api::AllocateResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(response.container_responses[0].mounts.len(), 1);

        // The freshly provisioned workload socket answers the connect RPC
        let workload_socket = tmp.path().join("mesh-dev-a").join("mesh.io.sock");
        for _ in 0..100 {
            if UnixStream::connect(&workload_socket).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let (status, body) = request_over_socket(
            &workload_socket,
            Method::POST,
            "/v1/connect",
            connect_body("w1", "gold-network"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let reply: ConnectionReply = serde_json::from_slice(&body).unwrap();
        assert!(reply.accepted);
    }

    #[tokio::test]
    async fn test_watch_stream_pushes_device_snapshot() {
        let tmp = TempDir::new().unwrap();
        let (_manager, socket_path) = start_device_broker(&tmp).await;

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = Request::builder()
            .method(Method::GET)
            .uri("/v1/watch")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // First snapshot arrives on the first tick, before the interval
        let mut body = resp.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        let data = frame.into_data().unwrap();
        let snapshot: ListAndWatchResponse = serde_json::from_slice(&data).unwrap();
        assert_eq!(snapshot.devices.len(), 2);
    }
}
