//! Node-side JSON-RPC endpoint serving online checkpoints

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::checkpoint::write_checkpoint;
use crate::error::{ChainError, Result};
use crate::network::rpc::{RpcRequest, RpcResponse, CREATE_CHECKPOINT_METHOD};
use crate::storage::{SqliteStore, StoreError};

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const CHECKPOINT_FAILED: i64 = -100;

/// Writes checkpoints of a running node's open store.
///
/// Only a weak handle is kept: the node owns the store and closes it on shutdown,
/// whatever the HTTP workers still hold.
pub struct CheckpointService {
    store: Weak<SqliteStore>,
    magic: u32,
    address: String,
}

impl CheckpointService {
    pub fn new(store: &Arc<SqliteStore>, magic: u32, address: impl Into<String>) -> Self {
        CheckpointService {
            store: Arc::downgrade(store),
            magic,
            address: address.into(),
        }
    }

    pub fn create_checkpoint(&self, archive_path: &Path) -> Result<()> {
        // a relative path would resolve against the node's working directory, not the caller's
        if !archive_path.is_absolute() {
            return Err(ChainError::InvalidSetting {
                name: "archive path",
                reason: format!("{} is not an absolute path", archive_path.display()),
            });
        }
        let store = self.store.upgrade().ok_or(StoreError::Closed)?;
        write_checkpoint(store.as_ref(), archive_path, self.magic, &self.address)
    }
}

async fn handle_rpc(
    request: web::Json<RpcRequest>,
    service: web::Data<Arc<CheckpointService>>,
) -> impl Responder {
    let request = request.into_inner();
    let id = request.id;

    let response = match request.method.as_str() {
        CREATE_CHECKPOINT_METHOD => match request.params.first().and_then(Value::as_str) {
            Some(path) => {
                let archive_path = PathBuf::from(path);
                let service = service.get_ref().clone();
                let target = archive_path.clone();
                match web::block(move || service.create_checkpoint(&target)).await {
                    Ok(Ok(())) => {
                        info!(archive = %archive_path.display(), "Online checkpoint created");
                        RpcResponse::success(id, Value::String(path.to_string()))
                    }
                    Ok(Err(e)) => {
                        warn!(archive = %archive_path.display(), error = %e, "Online checkpoint failed");
                        RpcResponse::failure(id, CHECKPOINT_FAILED, e.to_string())
                    }
                    Err(e) => {
                        error!(error = %e, "Checkpoint worker failed");
                        RpcResponse::failure(id, INTERNAL_ERROR, e.to_string())
                    }
                }
            }
            None => RpcResponse::failure(id, INVALID_PARAMS, "Invalid params"),
        },
        other => {
            warn!(method = other, "Unknown RPC method");
            RpcResponse::failure(id, METHOD_NOT_FOUND, "Method not found")
        }
    };
    HttpResponse::Ok().json(response)
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "healthy"}))
}

/// Bind the endpoint on loopback. Port 0 picks a free port; the bound address is returned
/// alongside the server future, which must be awaited or spawned to serve requests.
pub fn start_rpc_server(port: u16, service: Arc<CheckpointService>) -> io::Result<(Server, SocketAddr)> {
    let service_data = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(service_data.clone())
            .route("/", web::post().to(handle_rpc))
            .route("/health", web::get().to(health))
    })
    .workers(1)
    .disable_signals()
    .bind(("127.0.0.1", port))?;

    let addr = server
        .addrs()
        .first()
        .copied()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address bound"))?;
    info!(%addr, "RPC server listening");
    Ok((server.run(), addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::archive::extract_archive;
    use crate::checkpoint::metadata::address_file_name;
    use crate::network::rpc::{ChainRpcClient, JsonRpcClient};
    use crate::storage::StorageBackend;
    use std::time::Duration;

    fn service(dir: &Path) -> (Arc<SqliteStore>, Arc<CheckpointService>) {
        let store = Arc::new(SqliteStore::open(&dir.join("data")).unwrap());
        store.put(b"height", b"12").unwrap();
        let service = Arc::new(CheckpointService::new(&store, 99, "NTestAddress"));
        (store, service)
    }

    #[tokio::test]
    async fn test_endpoint_writes_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, service) = service(dir.path());
        let (server, addr) = start_rpc_server(0, service).unwrap();
        let handle = server.handle();
        tokio::spawn(server);

        let client = JsonRpcClient::new(Duration::from_secs(5)).unwrap();
        let archive = dir.path().join("online.devnet-checkpoint");
        client
            .send_checkpoint_request(&format!("http://{}", addr), &archive)
            .await
            .unwrap();

        let out = tempfile::tempdir().unwrap();
        extract_archive(&archive, out.path()).unwrap();
        let metadata = std::fs::read_to_string(out.path().join(address_file_name())).unwrap();
        assert_eq!(metadata.lines().collect::<Vec<_>>(), vec!["99", "NTestAddress"]);

        handle.stop(true).await;
    }

    #[tokio::test]
    async fn test_endpoint_errors_are_relayed_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, service) = service(dir.path());
        let (server, addr) = start_rpc_server(0, service).unwrap();
        let handle = server.handle();
        tokio::spawn(server);

        let archive = dir.path().join("taken.devnet-checkpoint");
        std::fs::write(&archive, b"occupied").unwrap();

        let client = JsonRpcClient::new(Duration::from_secs(5)).unwrap();
        let error = client
            .send_checkpoint_request(&format!("http://{}", addr), &archive)
            .await
            .unwrap_err();
        let expected = ChainError::AlreadyExists(archive.clone()).to_string();
        assert!(matches!(error, ChainError::Rpc(ref message) if *message == expected));
        assert_eq!(std::fs::read(&archive).unwrap(), b"occupied");

        handle.stop(true).await;
    }

    #[test]
    fn test_service_does_not_keep_store_open() {
        let dir = tempfile::tempdir().unwrap();
        let (store, service) = service(dir.path());
        assert_eq!(Arc::strong_count(&store), 1);

        Arc::try_unwrap(store).ok().unwrap().close().unwrap();
        let archive = dir.path().join("late.devnet-checkpoint");
        assert!(matches!(
            service.create_checkpoint(&archive),
            Err(ChainError::Storage(StoreError::Closed))
        ));
        assert!(!archive.exists());
    }

    #[test]
    fn test_relative_archive_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, service) = service(dir.path());
        assert!(matches!(
            service.create_checkpoint(Path::new("relative.devnet-checkpoint")),
            Err(ChainError::InvalidSetting { .. })
        ));
    }
}
