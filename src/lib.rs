//! Private blockchain network bootstrap and checkpoint tooling
//!
//! - [`chain`] creates networks and wallets from freshly generated key material
//! - [`checkpoint`] snapshots and restores a single-node network's storage
//! - [`node`] runs, resets and replays consensus nodes behind a [`guard`]

pub mod chain;
pub mod checkpoint;
pub mod config;
pub mod crypto;
pub mod error;
pub mod guard;
pub mod logger;
pub mod models;
pub mod network;
pub mod node;
pub mod storage;

pub use checkpoint::{resolve_checkpoint_path, CheckpointEngine, CheckpointMode, CheckpointOutcome};
pub use config::EngineConfig;
pub use error::{ChainError, ErrorKind, Result};
pub use guard::NodeRuntimeGuard;
pub use models::{Account, ChainDescriptor, ConsensusNode, Wallet};
pub use node::{reset_node, run_checkpoint, run_node, NodeRuntime, RpcNodeRuntime};
