//! Error types shared by every engine operation

use std::path::PathBuf;

use crate::storage::StoreError;

/// Coarse category of a [`ChainError`], used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid node count, node index, wallet name or network shape.
    Configuration,
    /// A file or directory is in a state the operation refuses to touch.
    Precondition,
    /// Checkpoint metadata is missing, malformed or bound to another network.
    InvalidCheckpoint,
    /// The node's runtime guard is held by another process.
    AlreadyRunning,
    /// Disk, archive or storage failure.
    Io,
    /// Failure reported by, or while talking to, a live node.
    Rpc,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("invalid blockchain node count {0}; supported counts are 1, 4 and 7")]
    InvalidNodeCount(usize),

    #[error("invalid node index {index}; network has {count} consensus node(s)")]
    InvalidNodeIndex { index: usize, count: usize },

    #[error("{0} is a reserved name. Choose a different wallet name.")]
    ReservedWalletName(String),

    #[error("a wallet named {0} already exists")]
    DuplicateWalletName(String),

    #[error("checkpoint {0} is only supported on single node networks")]
    SingleNodeRequired(&'static str),

    #[error("consensus node {0} has no multi-sig contract account")]
    MissingMultiSigAccount(usize),

    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("invalid configuration value for {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("you must specify force to restore a checkpoint to an existing blockchain ({})", .0.display())]
    ForceRequired(PathBuf),

    #[error("node {0} is currently running")]
    NodeRunning(String),

    #[error("Invalid checkpoint")]
    InvalidCheckpoint,

    #[error("node {0} is already running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("checkpoint archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("chain descriptor serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Rpc(String),

    #[error("rpc transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::InvalidNodeCount(_)
            | ChainError::InvalidNodeIndex { .. }
            | ChainError::ReservedWalletName(_)
            | ChainError::DuplicateWalletName(_)
            | ChainError::SingleNodeRequired(_)
            | ChainError::MissingMultiSigAccount(_)
            | ChainError::KeyMaterial(_)
            | ChainError::InvalidSetting { .. } => ErrorKind::Configuration,
            ChainError::AlreadyExists(_)
            | ChainError::ForceRequired(_)
            | ChainError::NodeRunning(_) => ErrorKind::Precondition,
            ChainError::InvalidCheckpoint => ErrorKind::InvalidCheckpoint,
            ChainError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            ChainError::Io(_)
            | ChainError::Storage(_)
            | ChainError::Archive(_)
            | ChainError::Serialization(_) => ErrorKind::Io,
            ChainError::Rpc(_) | ChainError::Http(_) => ErrorKind::Rpc,
            ChainError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, ChainError>;
