//! Port topology for local consensus nodes
//!
//! Every node index owns a 1000-wide block starting at the base port; the three
//! listening ports sit at fixed offsets inside that block.

use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};

/// First port of the IANA "Dynamic and/or Private" range
pub const DEFAULT_BASE_PORT: u16 = 49152;

/// Largest supported network is seven nodes
pub const MAX_NODE_INDEX: usize = 6;

const BLOCK_WIDTH: u16 = 1000;
const RPC_OFFSET: u16 = 332;
const TCP_OFFSET: u16 = 333;
const WS_OFFSET: u16 = 334;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePorts {
    pub tcp: u16,
    pub ws: u16,
    pub rpc: u16,
}

/// Ports for the node at `index`, using `base_port` as the start of block zero.
pub fn ports(index: usize, base_port: u16) -> Result<NodePorts> {
    if index > MAX_NODE_INDEX {
        return Err(ChainError::InvalidNodeIndex {
            index,
            count: MAX_NODE_INDEX + 1,
        });
    }

    let block = u32::from(base_port) + index as u32 * u32::from(BLOCK_WIDTH);
    let port = |offset: u16| -> Result<u16> {
        u16::try_from(block + u32::from(offset)).map_err(|_| ChainError::InvalidSetting {
            name: "base_port",
            reason: format!("port block for node {} exceeds 65535", index),
        })
    };

    Ok(NodePorts {
        tcp: port(TCP_OFFSET)?,
        ws: port(WS_OFFSET)?,
        rpc: port(RPC_OFFSET)?,
    })
}
