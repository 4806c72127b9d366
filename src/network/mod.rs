//! Node addressing and RPC plumbing
//!
//! - `ports` - deterministic port triples per node index
//! - `rpc` - client side of the node JSON-RPC interface
//! - `server` - node side of the checkpoint endpoint

pub mod ports;
pub mod rpc;
pub mod server;

pub use ports::{ports, NodePorts};
pub use rpc::{get_uri, ChainRpcClient, JsonRpcClient};
pub use server::{start_rpc_server, CheckpointService};
