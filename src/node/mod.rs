//! Consensus node lifecycle: run, run from a checkpoint, reset
//!
//! The node software itself sits behind [`NodeRuntime`]. This module owns
//! everything around it: the runtime guard, the data directory and the
//! storage handle the runtime works on.
//!
//! ## Structure
//! - `mod.rs` - lifecycle operations
//! - `rpc_runtime.rs` - minimal runtime serving the checkpoint endpoint
//! - `tests.rs` - guard and storage behaviour around a fake runtime

pub mod rpc_runtime;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::extract_validated;
use crate::config::EngineConfig;
use crate::error::{ChainError, Result};
use crate::guard::NodeRuntimeGuard;
use crate::models::{ChainDescriptor, ConsensusNode};
use crate::storage::{SqliteStore, StorageBackend, StoreError, STORE_FILE_NAME};

pub use rpc_runtime::RpcNodeRuntime;


const SCRATCH_PREFIX: &str = ".devnet-node-";

/// Everything a runtime needs to know about the node it is running.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub index: usize,
    pub magic: u32,
    pub node: ConsensusNode,
    /// Multi-sig address stamped into checkpoints
    pub address: String,
    /// Runtime guard identity held for the whole run
    pub identity: String,
    /// Directory backing `store`; a scratch directory for discarded or checkpoint runs
    pub data_path: PathBuf,
}

#[async_trait]
pub trait NodeRuntime: Send + Sync {
    /// Run the node until `token` is cancelled or the node stops on its own.
    async fn run(
        &self,
        context: NodeContext,
        store: Arc<SqliteStore>,
        token: CancellationToken,
    ) -> Result<()>;
}

fn context(chain: &ChainDescriptor, index: usize, data_path: PathBuf) -> Result<NodeContext> {
    Ok(NodeContext {
        index,
        magic: chain.magic,
        node: chain.node(index)?.clone(),
        address: chain.multi_sig_account(index)?.address(),
        identity: chain.runtime_identity(index)?,
        data_path,
    })
}

async fn run_on_store<R: NodeRuntime + ?Sized>(
    runtime: &R,
    context: NodeContext,
    token: CancellationToken,
) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&context.data_path)?);
    let data_path = context.data_path.clone();
    let outcome = runtime.run(context, store.clone(), token).await;

    match Arc::try_unwrap(store) {
        Ok(store) => store.close()?,
        Err(_) => {
            if let Err(e) = &outcome {
                warn!(error = %e, "Node stopped with an error");
            }
            return Err(StoreError::StillShared(data_path.display().to_string()).into());
        }
    }
    outcome
}

/// Run consensus node `index` until `token` is cancelled.
///
/// With `discard` the node works on a scratch copy of its data and every change is
/// dropped on exit.
pub async fn run_node<R: NodeRuntime + ?Sized>(
    runtime: &R,
    chain: &ChainDescriptor,
    index: usize,
    config: &EngineConfig,
    discard: bool,
    token: CancellationToken,
) -> Result<()> {
    let data_path = chain.node_data_path(config, index)?;
    let mut context = context(chain, index, data_path.clone())?;

    let lock = NodeRuntimeGuard::new(&config.lock_dir).acquire_async(&context.identity).await?;
    info!(index, magic = chain.magic, discard, path = %data_path.display(), "Starting node");

    let outcome = if discard {
        let scratch = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
        if data_path.join(STORE_FILE_NAME).exists() {
            let persistent = SqliteStore::open(&data_path)?;
            let exported = persistent.export_snapshot(scratch.path());
            persistent.close()?;
            exported?;
        }
        context.data_path = scratch.path().to_path_buf();
        let outcome = run_on_store(runtime, context, token).await;
        debug!(path = %scratch.path().display(), "Discarding node changes");
        outcome
    } else {
        fs::create_dir_all(&data_path)?;
        run_on_store(runtime, context, token).await
    };

    lock.release();
    info!(index, "Node stopped");
    outcome
}

/// Run the only node of `chain` on top of the checkpoint at `archive_path`.
///
/// The checkpoint is unpacked into a scratch directory that is removed on exit; the
/// node's own data directory is never touched.
pub async fn run_checkpoint<R: NodeRuntime + ?Sized>(
    runtime: &R,
    chain: &ChainDescriptor,
    archive_path: &Path,
    config: &EngineConfig,
    token: CancellationToken,
) -> Result<()> {
    chain.single_node("run")?;
    let account = chain.multi_sig_account(0)?;

    let scratch = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
    extract_validated(archive_path, scratch.path(), chain.magic, account)?;
    let context = context(chain, 0, scratch.path().to_path_buf())?;

    let lock = NodeRuntimeGuard::new(&config.lock_dir).acquire_async(&context.identity).await?;
    info!(archive = %archive_path.display(), magic = chain.magic, "Starting node from checkpoint");
    let outcome = run_on_store(runtime, context, token).await;
    lock.release();
    outcome
}

/// Delete the data directory of node `index` so it starts fresh.
pub fn reset_node(chain: &ChainDescriptor, index: usize, config: &EngineConfig) -> Result<()> {
    let data_path = chain.node_data_path(config, index)?;
    let identity = chain.runtime_identity(index)?;
    if NodeRuntimeGuard::new(&config.lock_dir).probe(&identity)? {
        return Err(ChainError::NodeRunning(identity));
    }

    if data_path.exists() {
        fs::remove_dir_all(&data_path)?;
        info!(index, path = %data_path.display(), "Node data removed");
    } else {
        debug!(index, path = %data_path.display(), "Node has no data to remove");
    }
    Ok(())
}
