//! Minimal node runtime: keeps the store open and serves the checkpoint endpoint

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::network::server::{start_rpc_server, CheckpointService};
use crate::node::{NodeContext, NodeRuntime};
use crate::storage::SqliteStore;

#[derive(Debug, Clone, Default)]
pub struct RpcNodeRuntime {
    port: Option<u16>,
}

impl RpcNodeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve on `port` instead of the node's configured RPC port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

#[async_trait]
impl NodeRuntime for RpcNodeRuntime {
    async fn run(
        &self,
        context: NodeContext,
        store: Arc<SqliteStore>,
        token: CancellationToken,
    ) -> Result<()> {
        let stats = store.stats()?;
        let service = Arc::new(CheckpointService::new(&store, context.magic, context.address.clone()));
        let port = self.port.unwrap_or(context.node.rpc_port);
        let (server, addr) = start_rpc_server(port, service)?;
        let handle = server.handle();
        let serving = tokio::spawn(server);

        info!(
            index = context.index,
            %addr,
            entries = stats.entries,
            bytes = stats.total_value_bytes,
            "Node running"
        );

        token.cancelled().await;
        handle.stop(true).await;
        match serving.await {
            Ok(result) => result?,
            Err(e) => warn!(error = %e, "RPC server task ended abnormally"),
        }
        Ok(())
    }
}
