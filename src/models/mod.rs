//! Persisted model of a private network
//!
//! A [`ChainDescriptor`] is owned by the operator process and handed by reference to
//! every engine operation. It is stored as pretty-printed JSON.

pub mod wallet;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::crypto::bft_threshold;
use crate::error::{ChainError, Result};
use crate::network::ports::NodePorts;

pub use wallet::{Account, MultiSigContract, Wallet};

/// Byzantine-fault-tolerant group sizes the tool can bootstrap
pub const SUPPORTED_NODE_COUNTS: [usize; 3] = [1, 4, 7];

/// Reserved wallet name resolving to the founding multi-sig identity
pub const GENESIS: &str = "genesis";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ConsensusNode {
    pub tcp_port: u16,
    pub ws_port: u16,
    pub rpc_port: u16,
    pub wallet: Wallet,
}

impl ConsensusNode {
    pub fn new(ports: NodePorts, wallet: Wallet) -> Self {
        ConsensusNode {
            tcp_port: ports.tcp,
            ws_port: ports.ws,
            rpc_port: ports.rpc,
            wallet,
        }
    }

    pub fn ports(&self) -> NodePorts {
        NodePorts {
            tcp: self.tcp_port,
            ws: self.ws_port,
            rpc: self.rpc_port,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ChainDescriptor {
    pub magic: u32,
    pub consensus_nodes: Vec<ConsensusNode>,
    #[serde(default)]
    pub wallets: Vec<Wallet>,
}

impl ChainDescriptor {
    pub fn node(&self, index: usize) -> Result<&ConsensusNode> {
        self.consensus_nodes
            .get(index)
            .ok_or(ChainError::InvalidNodeIndex {
                index,
                count: self.consensus_nodes.len(),
            })
    }

    /// The only node of a single-node network; `operation` names the caller in the error.
    pub fn single_node(&self, operation: &'static str) -> Result<&ConsensusNode> {
        match self.consensus_nodes.as_slice() {
            [node] => Ok(node),
            _ => Err(ChainError::SingleNodeRequired(operation)),
        }
    }

    /// Multi-sig account held by the node at `index`.
    pub fn multi_sig_account(&self, index: usize) -> Result<&Account> {
        self.node(index)?
            .wallet
            .multi_sig_account()
            .ok_or(ChainError::MissingMultiSigAccount(index))
    }

    /// Runtime guard identity of the node at `index`.
    ///
    /// Every node of a network shares the multi-sig address, so the index keeps
    /// the nodes of one network independent.
    pub fn runtime_identity(&self, index: usize) -> Result<String> {
        let address = self.multi_sig_account(index)?.address();
        Ok(format!("{}-{}", address, index))
    }

    /// Data directory of the node at `index`; absence means a fresh node.
    pub fn node_data_path(&self, config: &EngineConfig, index: usize) -> Result<PathBuf> {
        self.node(index)?;
        Ok(config
            .network_root(self.magic)
            .join(format!("node-{}", index)))
    }

    /// Every wallet in the descriptor, node wallets first.
    pub fn all_wallets(&self) -> impl Iterator<Item = &Wallet> {
        self.consensus_nodes
            .iter()
            .map(|node| &node.wallet)
            .chain(self.wallets.iter())
    }

    /// Check the structural invariants a loaded descriptor must satisfy.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_NODE_COUNTS.contains(&self.consensus_nodes.len()) {
            return Err(ChainError::InvalidNodeCount(self.consensus_nodes.len()));
        }
        if self.magic == 0 {
            return Err(ChainError::InvalidSetting {
                name: "magic",
                reason: "network magic must not be zero".to_string(),
            });
        }

        let mut seen: Vec<String> = Vec::new();
        for wallet in self.all_wallets() {
            let lowered = wallet.name.to_lowercase();
            if lowered == GENESIS {
                return Err(ChainError::ReservedWalletName(wallet.name.clone()));
            }
            if seen.contains(&lowered) {
                return Err(ChainError::DuplicateWalletName(wallet.name.clone()));
            }
            seen.push(lowered);
            wallet.validate()?;
        }

        self.validate_multi_sig()
    }

    /// Every node must hold the same BFT contract over exactly the node keys.
    fn validate_multi_sig(&self) -> Result<()> {
        let count = self.consensus_nodes.len();
        let shared = match self.multi_sig_account(0)?.contract.as_ref() {
            Some(contract) => contract,
            None => return Err(ChainError::MissingMultiSigAccount(0)),
        };
        if shared.public_keys.len() != count {
            return Err(ChainError::KeyMaterial(format!(
                "multi-sig contract has {} keys for {} consensus nodes",
                shared.public_keys.len(),
                count
            )));
        }
        if shared.threshold != bft_threshold(count) {
            return Err(ChainError::KeyMaterial(format!(
                "multi-sig threshold {} does not match {} for {} consensus nodes",
                shared.threshold,
                bft_threshold(count),
                count
            )));
        }
        for index in 1..count {
            if self.multi_sig_account(index)?.contract.as_ref() != Some(shared) {
                return Err(ChainError::KeyMaterial(format!(
                    "node {} holds a different multi-sig contract than node 0",
                    index
                )));
            }
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!(path = %path.display(), magic = self.magic, "Chain descriptor saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let chain: ChainDescriptor = serde_json::from_str(&contents)?;
        chain.validate()?;
        Ok(chain)
    }
}
