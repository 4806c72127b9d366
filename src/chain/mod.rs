//! Network bootstrap and wallet management
//!
//! ## Structure
//! - `mod.rs` - descriptor construction, wallet creation, account lookup
//! - `tests.rs` - bootstrap properties across all supported node counts

use std::path::Path;

use rand::Rng;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::crypto::{bft_threshold, KeyPair, PublicKey};
use crate::error::{ChainError, Result};
use crate::models::{
    Account, ChainDescriptor, ConsensusNode, MultiSigContract, Wallet, GENESIS,
    SUPPORTED_NODE_COUNTS,
};
use crate::network::ports::ports;


/// Random non-zero magic that no network under `config.data_root` already uses.
pub fn generate_magic(config: &EngineConfig) -> u32 {
    let mut rng = rand::thread_rng();
    loop {
        let magic: u32 = rng.gen();
        if magic == 0 {
            continue;
        }
        if config.network_root(magic).exists() {
            warn!(magic, "Magic value already in use on this host, drawing again");
            continue;
        }
        return magic;
    }
}

/// Build a complete descriptor for a `count`-node private network.
///
/// Nothing is written to disk; an unsupported count fails before any key is generated.
pub fn create_network(count: usize, config: &EngineConfig) -> Result<ChainDescriptor> {
    if !SUPPORTED_NODE_COUNTS.contains(&count) {
        return Err(ChainError::InvalidNodeCount(count));
    }
    let node_ports = (0..count)
        .map(|index| ports(index, config.base_port))
        .collect::<Result<Vec<_>>>()?;

    let mut participants: Vec<(Wallet, KeyPair)> = (1..=count)
        .map(|i| {
            let key = KeyPair::generate();
            let mut account = Account::single_sig(key.clone());
            account.is_default = true;
            let wallet = Wallet {
                name: format!("node{}", i),
                accounts: vec![account],
            };
            (wallet, key)
        })
        .collect();

    let keys: Vec<PublicKey> = participants.iter().map(|(_, key)| key.public_key()).collect();
    let contract = MultiSigContract::new(bft_threshold(count), &keys)?;

    for (wallet, key) in participants.iter_mut() {
        let account = Account::multi_sig(contract.clone(), Some(key.clone()))?;
        wallet.accounts.push(account);
    }

    let consensus_nodes = participants
        .into_iter()
        .zip(node_ports)
        .map(|((wallet, _), ports)| ConsensusNode::new(ports, wallet))
        .collect();

    let chain = ChainDescriptor {
        magic: generate_magic(config),
        consensus_nodes,
        wallets: Vec::new(),
    };

    info!(
        magic = chain.magic,
        nodes = count,
        threshold = contract.threshold,
        "Created private network"
    );
    Ok(chain)
}

/// Create a network and persist it at `output`, which must not exist yet.
pub fn create_network_file(
    output: &Path,
    count: usize,
    config: &EngineConfig,
) -> Result<ChainDescriptor> {
    if output.exists() {
        return Err(ChainError::AlreadyExists(output.to_path_buf()));
    }
    let chain = create_network(count, config)?;
    chain.save(output)?;
    Ok(chain)
}

fn is_reserved_name(chain: &ChainDescriptor, name: &str) -> bool {
    name.eq_ignore_ascii_case(GENESIS)
        || chain
            .consensus_nodes
            .iter()
            .any(|node| node.wallet.name.to_lowercase() == name.to_lowercase())
}

/// New ad-hoc wallet named `name`. The descriptor is left untouched.
pub fn create_wallet(chain: &ChainDescriptor, name: &str) -> Result<Wallet> {
    if name.trim().is_empty() {
        return Err(ChainError::InvalidSetting {
            name: "wallet name",
            reason: "wallet name must not be empty".to_string(),
        });
    }
    if is_reserved_name(chain, name) {
        return Err(ChainError::ReservedWalletName(name.to_string()));
    }
    if chain
        .wallets
        .iter()
        .any(|w| w.name.to_lowercase() == name.to_lowercase())
    {
        return Err(ChainError::DuplicateWalletName(name.to_string()));
    }

    let wallet = Wallet::generate(name);
    info!(wallet = name, "Created wallet");
    Ok(wallet)
}

/// Resolve a wallet name, or `genesis`, to an account.
pub fn get_account<'a>(chain: &'a ChainDescriptor, name: &str) -> Option<&'a Account> {
    let matches = |wallet: &Wallet| wallet.name.to_lowercase() == name.to_lowercase();

    if let Some(wallet) = chain.wallets.iter().find(|w| matches(w)) {
        return wallet.default_account();
    }
    if let Some(node) = chain.consensus_nodes.iter().find(|n| matches(&n.wallet)) {
        return node.wallet.default_account();
    }
    if name.eq_ignore_ascii_case(GENESIS) {
        return chain
            .consensus_nodes
            .first()
            .and_then(|node| node.wallet.multi_sig_account());
    }
    None
}
