//! Key material and contract derivation

pub mod contract;
pub mod keys;

pub use contract::{
    bft_threshold, canonical_key_order, multi_sig_script, verification_script, ScriptHash,
};
pub use keys::{KeyPair, PublicKey};
