//! JSON-RPC client for talking to a live consensus node

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ChainError, Result};
use crate::models::ChainDescriptor;

/// Method a live node exposes for writing a checkpoint of its own store
pub const CREATE_CHECKPOINT_METHOD: &str = "expresscreatecheckpoint";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: 1,
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        RpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        RpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcErrorBody {
                code,
                message: message.into(),
            }),
        }
    }
}

/// RPC endpoint of the consensus node at `index`.
pub fn get_uri(chain: &ChainDescriptor, index: usize) -> Result<String> {
    let node = chain.node(index)?;
    Ok(format!("http://127.0.0.1:{}", node.rpc_port))
}

#[async_trait]
pub trait ChainRpcClient: Send + Sync {
    /// Ask the node at `endpoint` to write a checkpoint of its store to `archive_path`.
    async fn send_checkpoint_request(&self, endpoint: &str, archive_path: &Path) -> Result<()>;
}

pub struct JsonRpcClient {
    client: Client,
}

impl JsonRpcClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("devnet-express/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(JsonRpcClient { client })
    }

    async fn call(&self, endpoint: &str, request: &RpcRequest) -> Result<Value> {
        debug!(endpoint, method = %request.method, "Sending RPC request");
        let response = self.client.post(endpoint).json(request).send().await?;
        let status = response.status();

        // JSON-RPC servers may report errors with a non-2xx status and a valid body
        let body: RpcResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(ChainError::Rpc(format!("HTTP status: {}", status)));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(error) = body.error {
            return Err(ChainError::Rpc(error.message));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ChainRpcClient for JsonRpcClient {
    async fn send_checkpoint_request(&self, endpoint: &str, archive_path: &Path) -> Result<()> {
        let request = RpcRequest::new(
            CREATE_CHECKPOINT_METHOD,
            vec![Value::String(archive_path.to_string_lossy().into_owned())],
        );
        self.call(endpoint, &request).await?;
        info!(endpoint, archive = %archive_path.display(), "Node wrote online checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::create_network;
    use crate::config::EngineConfig;

    #[test]
    fn test_get_uri_uses_rpc_port() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::default().with_data_root(dir.path());
        let chain = create_network(4, &config).unwrap();

        assert_eq!(get_uri(&chain, 0).unwrap(), "http://127.0.0.1:49484");
        assert_eq!(get_uri(&chain, 3).unwrap(), "http://127.0.0.1:52484");
        assert!(matches!(
            get_uri(&chain, 4),
            Err(ChainError::InvalidNodeIndex { index: 4, count: 4 })
        ));
    }

    #[test]
    fn test_request_shape() {
        let request = RpcRequest::new(CREATE_CHECKPOINT_METHOD, vec![Value::from("/tmp/a.zip")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "expresscreatecheckpoint");
        assert_eq!(json["params"][0], "/tmp/a.zip");
    }

    #[test]
    fn test_failure_response_omits_result() {
        let response = RpcResponse::failure(1, -100, "boom");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["message"], "boom");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_rpc_error() {
        let client = JsonRpcClient::new(Duration::from_secs(2)).unwrap();
        // port 9 (discard) is never served on loopback in test environments
        let result = client
            .send_checkpoint_request("http://127.0.0.1:9", Path::new("/tmp/none"))
            .await;
        let error = result.unwrap_err();
        assert_eq!(error.kind(), crate::error::ErrorKind::Rpc);
    }
}
