//! Checkpoint creation, validation and restore
//!
//! A checkpoint is a zip archive of a single node's storage snapshot plus an
//! identity file (see [`metadata`]) binding it to one network magic and one
//! multi-sig address.
//!
//! ## Structure
//! - `mod.rs` - [`CheckpointEngine`] and the snapshot writer shared with the node endpoint
//! - `archive.rs` - zip packing and unpacking
//! - `metadata.rs` - identity file write/validate
//! - `tests.rs` - offline/online creation and restore scenarios

pub mod archive;
pub mod metadata;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ChainError, Result};
use crate::guard::NodeRuntimeGuard;
use crate::models::{Account, ChainDescriptor};
use crate::network::rpc::{get_uri, ChainRpcClient, JsonRpcClient};
use crate::storage::{SqliteStore, StorageBackend, StoreError};

pub use metadata::validate_checkpoint;


pub const CHECKPOINT_EXTENSION: &str = ".devnet-checkpoint";

const TEMP_PREFIX: &str = ".devnet-checkpoint-";

/// How a checkpoint was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    /// Written by the running node through its RPC endpoint
    Online,
    /// Read directly from storage while the node was stopped
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointOutcome {
    pub path: PathBuf,
    pub mode: CheckpointMode,
}

/// Archive path for `name`, or for a timestamp when no name is given.
///
/// The checkpoint extension is appended when missing and the result is absolute.
pub fn resolve_checkpoint_path(name: Option<&str>) -> Result<PathBuf> {
    let mut file_name = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => Local::now().format("%Y%m%d-%H%M%S").to_string(),
    };
    if !file_name.ends_with(CHECKPOINT_EXTENSION) {
        file_name.push_str(CHECKPOINT_EXTENSION);
    }
    absolute(Path::new(&file_name))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Snapshot `store` into a new archive at `archive_path` stamped with `magic` and `address`.
///
/// The staging directory is removed on every exit path; on failure no archive is left behind.
pub fn write_checkpoint<S: StorageBackend>(
    store: &S,
    archive_path: &Path,
    magic: u32,
    address: &str,
) -> Result<()> {
    if archive_path.exists() {
        return Err(ChainError::AlreadyExists(archive_path.to_path_buf()));
    }

    let staging = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?;
    store.export_snapshot(staging.path())?;
    metadata::write_metadata(staging.path(), magic, address)?;
    archive::create_archive(staging.path(), archive_path)?;

    if let Err(e) = staging.close() {
        warn!(error = %e, "Failed to remove checkpoint staging directory");
    }
    Ok(())
}

/// Creates and restores checkpoints for single-node networks.
pub struct CheckpointEngine<R: ChainRpcClient = JsonRpcClient> {
    config: EngineConfig,
    guard: NodeRuntimeGuard,
    rpc: R,
}

impl CheckpointEngine<JsonRpcClient> {
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let rpc = JsonRpcClient::new(config.rpc_timeout)?;
        Ok(Self::new(config, rpc))
    }
}

impl<R: ChainRpcClient> CheckpointEngine<R> {
    pub fn new(config: EngineConfig, rpc: R) -> Self {
        let guard = NodeRuntimeGuard::new(&config.lock_dir);
        CheckpointEngine { config, guard, rpc }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Write a checkpoint of the only node of `chain` to `archive_path`.
    ///
    /// A running node is asked to write it over RPC; otherwise its store is read directly.
    /// Cancellation is honoured while waiting for the node.
    pub async fn create(
        &self,
        chain: &ChainDescriptor,
        archive_path: &Path,
        token: &CancellationToken,
    ) -> Result<CheckpointOutcome> {
        let archive_path = absolute(archive_path)?;
        if archive_path.exists() {
            return Err(ChainError::AlreadyExists(archive_path));
        }
        chain.single_node("create")?;
        let address = chain.multi_sig_account(0)?.address();

        if self.guard.probe(&chain.runtime_identity(0)?)? {
            let endpoint = get_uri(chain, 0)?;
            info!(%endpoint, archive = %archive_path.display(), "Node is running, requesting online checkpoint");
            tokio::select! {
                result = self.rpc.send_checkpoint_request(&endpoint, &archive_path) => result?,
                _ = token.cancelled() => {
                    warn!(archive = %archive_path.display(), "Online checkpoint cancelled");
                    return Err(ChainError::Cancelled);
                }
            }
            return Ok(CheckpointOutcome {
                path: archive_path,
                mode: CheckpointMode::Online,
            });
        }

        if token.is_cancelled() {
            return Err(ChainError::Cancelled);
        }
        let data_path = chain.node_data_path(&self.config, 0)?;
        self.create_offline(&data_path, &archive_path, chain.magic, &address)?;
        Ok(CheckpointOutcome {
            path: archive_path,
            mode: CheckpointMode::Offline,
        })
    }

    fn create_offline(
        &self,
        data_path: &Path,
        archive_path: &Path,
        magic: u32,
        address: &str,
    ) -> Result<()> {
        if !data_path.is_dir() {
            return Err(StoreError::NotFound(format!("node data directory {}", data_path.display())).into());
        }
        let store = SqliteStore::open(data_path)?;
        let written = write_checkpoint(&store, archive_path, magic, address);
        let closed = store.close();
        written?;
        closed?;
        info!(archive = %archive_path.display(), magic, "Offline checkpoint created");
        Ok(())
    }

    /// Replace the only node's data directory with the contents of `archive_path`.
    ///
    /// An existing data directory is only replaced when `force` is set. The archive is
    /// extracted and validated beside the destination, then moved into place.
    pub fn restore(
        &self,
        chain: &ChainDescriptor,
        archive_path: &Path,
        force: bool,
    ) -> Result<PathBuf> {
        chain.single_node("restore")?;
        let account = chain.multi_sig_account(0)?;
        let data_path = chain.node_data_path(&self.config, 0)?;

        if data_path.exists() && !force {
            return Err(ChainError::ForceRequired(data_path));
        }
        let identity = chain.runtime_identity(0)?;
        if self.guard.probe(&identity)? {
            return Err(ChainError::NodeRunning(identity));
        }

        let parent = data_path
            .parent()
            .ok_or_else(|| ChainError::InvalidSetting {
                name: "data root",
                reason: format!("{} has no parent directory", data_path.display()),
            })?;
        let created_parent = !parent.exists();
        fs::create_dir_all(parent)?;

        let replaced = replace_from_archive(archive_path, parent, &data_path, chain.magic, account);
        if let Err(e) = replaced {
            // an empty network root would reserve the magic
            if created_parent {
                let _ = fs::remove_dir(parent);
            }
            return Err(e);
        }

        info!(
            archive = %archive_path.display(),
            path = %data_path.display(),
            magic = chain.magic,
            "Checkpoint restored"
        );
        Ok(data_path)
    }

    /// Associated form of [`validate_checkpoint`].
    pub fn validate(dir: &Path, magic: u32, account: &Account) -> Result<()> {
        validate_checkpoint(dir, magic, account)
    }
}

fn replace_from_archive(
    archive_path: &Path,
    parent: &Path,
    data_path: &Path,
    magic: u32,
    account: &Account,
) -> Result<()> {
    let staging = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir_in(parent)?;
    extract_validated(archive_path, staging.path(), magic, account)?;

    if data_path.exists() {
        debug!(path = %data_path.display(), "Removing existing node data");
        fs::remove_dir_all(data_path)?;
    }
    fs::rename(staging.path(), data_path)?;
    Ok(())
}

/// Unpack `archive_path` into `dir`, check it belongs to `magic`/`account` and strip the
/// identity file so `dir` holds only store data.
pub fn extract_validated(
    archive_path: &Path,
    dir: &Path,
    magic: u32,
    account: &Account,
) -> Result<()> {
    archive::extract_archive(archive_path, dir)?;
    validate_checkpoint(dir, magic, account)?;
    metadata::remove_metadata(dir)?;
    Ok(())
}
