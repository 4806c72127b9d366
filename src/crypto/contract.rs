//! Verification scripts, script hashes and addresses
//!
//! Scripts follow the N3 virtual machine encoding. Everything here is a pure
//! function of its inputs: the same keys always yield the same script and address.

use std::fmt;

use ripemd::Ripemd160;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::keys::{PublicKey, PUBLIC_KEY_LENGTH};
use crate::error::{ChainError, Result};

pub const ADDRESS_VERSION: u8 = 0x35;
pub const SCRIPT_HASH_LENGTH: usize = 20;

const OP_PUSH0: u8 = 0x10;
const OP_PUSHDATA1: u8 = 0x0c;
const OP_SYSCALL: u8 = 0x41;

const CHECK_SIG: &str = "System.Crypto.CheckSig";
const CHECK_MULTISIG: &str = "System.Crypto.CheckMultisig";

/// The largest key count a single `PUSH<n>` opcode can express
pub const MAX_MULTISIG_KEYS: usize = 16;

/// Number of signatures required out of `node_count` consensus participants.
pub fn bft_threshold(node_count: usize) -> usize {
    node_count * 2 / 3 + 1
}

fn interop_id(name: &str) -> [u8; 4] {
    let digest = Sha256::digest(name.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn emit_push_small(script: &mut Vec<u8>, value: usize) {
    debug_assert!(value <= MAX_MULTISIG_KEYS);
    script.push(OP_PUSH0 + value as u8);
}

fn emit_push_key(script: &mut Vec<u8>, key: &PublicKey) {
    script.push(OP_PUSHDATA1);
    script.push(PUBLIC_KEY_LENGTH as u8);
    script.extend_from_slice(key.as_bytes());
}

fn emit_syscall(script: &mut Vec<u8>, name: &str) {
    script.push(OP_SYSCALL);
    script.extend_from_slice(&interop_id(name));
}

/// Single-signature verification script for `key`.
pub fn verification_script(key: &PublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(PUBLIC_KEY_LENGTH + 7);
    emit_push_key(&mut script, key);
    emit_syscall(&mut script, CHECK_SIG);
    script
}

/// Keys in the order they appear inside a multi-sig script.
pub fn canonical_key_order(keys: &[PublicKey]) -> Vec<PublicKey> {
    let mut ordered = keys.to_vec();
    ordered.sort();
    ordered
}

/// `threshold`-of-`keys.len()` verification script.
pub fn multi_sig_script(threshold: usize, keys: &[PublicKey]) -> Result<Vec<u8>> {
    if keys.is_empty() || keys.len() > MAX_MULTISIG_KEYS {
        return Err(ChainError::KeyMaterial(format!(
            "multi-sig contract needs between 1 and {} keys, got {}",
            MAX_MULTISIG_KEYS,
            keys.len()
        )));
    }
    if threshold == 0 || threshold > keys.len() {
        return Err(ChainError::KeyMaterial(format!(
            "threshold {} is not satisfiable with {} keys",
            threshold,
            keys.len()
        )));
    }

    let ordered = canonical_key_order(keys);
    if ordered.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(ChainError::KeyMaterial(
            "multi-sig contract keys must be distinct".to_string(),
        ));
    }

    let mut script = Vec::with_capacity(ordered.len() * (PUBLIC_KEY_LENGTH + 2) + 7);
    emit_push_small(&mut script, threshold);
    for key in &ordered {
        emit_push_key(&mut script, key);
    }
    emit_push_small(&mut script, ordered.len());
    emit_syscall(&mut script, CHECK_MULTISIG);
    Ok(script)
}

/// RIPEMD-160 over SHA-256 of a verification script.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScriptHash([u8; SCRIPT_HASH_LENGTH]);

impl ScriptHash {
    pub fn from_script(script: &[u8]) -> Self {
        let sha = Sha256::digest(script);
        let digest = Ripemd160::digest(sha);
        let mut raw = [0u8; SCRIPT_HASH_LENGTH];
        raw.copy_from_slice(&digest);
        ScriptHash(raw)
    }

    pub fn as_bytes(&self) -> &[u8; SCRIPT_HASH_LENGTH] {
        &self.0
    }

    /// Base58Check address with the network address version prefix.
    pub fn to_address(&self) -> String {
        let mut payload = Vec::with_capacity(SCRIPT_HASH_LENGTH + 1);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(&self.0);
        bs58::encode(payload).with_check().into_string()
    }

    pub fn from_address(address: &str) -> Result<Self> {
        let payload = bs58::decode(address)
            .with_check(Some(ADDRESS_VERSION))
            .into_vec()
            .map_err(|e| ChainError::KeyMaterial(format!("address {}: {}", address, e)))?;
        if payload.len() != SCRIPT_HASH_LENGTH + 1 {
            return Err(ChainError::KeyMaterial(format!(
                "address {} has an unexpected payload length",
                address
            )));
        }
        let mut raw = [0u8; SCRIPT_HASH_LENGTH];
        raw.copy_from_slice(&payload[1..]);
        Ok(ScriptHash(raw))
    }
}

/// Big-endian hex with `0x` prefix, the way explorers print script hashes.
impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptHash({})", self)
    }
}

impl Serialize for ScriptHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_address())
    }
}

impl<'de> Deserialize<'de> for ScriptHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        ScriptHash::from_address(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;

    fn keys(count: usize) -> Vec<PublicKey> {
        (0..count).map(|_| KeyPair::generate().public_key()).collect()
    }

    #[test]
    fn test_bft_threshold() {
        assert_eq!(bft_threshold(1), 1);
        assert_eq!(bft_threshold(4), 3);
        assert_eq!(bft_threshold(7), 5);
    }

    #[test]
    fn test_interop_ids() {
        // published N3 syscall ids
        assert_eq!(interop_id(CHECK_SIG), [0x56, 0xe7, 0xb3, 0x27]);
        assert_eq!(interop_id(CHECK_MULTISIG), [0x9e, 0xd0, 0xdc, 0x3a]);
    }

    #[test]
    fn test_verification_script_layout() {
        let key = KeyPair::generate().public_key();
        let script = verification_script(&key);
        assert_eq!(script.len(), 40);
        assert_eq!(script[0], OP_PUSHDATA1);
        assert_eq!(script[1], 33);
        assert_eq!(&script[2..35], key.as_bytes());
        assert_eq!(script[35], OP_SYSCALL);
    }

    #[test]
    fn test_multi_sig_script_layout() {
        let keys = keys(4);
        let script = multi_sig_script(3, &keys).unwrap();
        assert_eq!(script.len(), 1 + 4 * 35 + 1 + 5);
        assert_eq!(script[0], OP_PUSH0 + 3);
        assert_eq!(script[1 + 4 * 35], OP_PUSH0 + 4);
        assert_eq!(script[script.len() - 5], OP_SYSCALL);
    }

    #[test]
    fn test_multi_sig_script_ignores_input_order() {
        let keys = keys(7);
        let mut shuffled = keys.clone();
        shuffled.reverse();
        shuffled.swap(1, 4);
        let a = multi_sig_script(5, &keys).unwrap();
        let b = multi_sig_script(5, &shuffled).unwrap();
        assert_eq!(a, b);
        assert_eq!(ScriptHash::from_script(&a), ScriptHash::from_script(&b));
    }

    #[test]
    fn test_multi_sig_rejects_bad_threshold() {
        let keys = keys(4);
        assert!(multi_sig_script(0, &keys).is_err());
        assert!(multi_sig_script(5, &keys).is_err());
        assert!(multi_sig_script(1, &[]).is_err());
    }

    #[test]
    fn test_multi_sig_rejects_duplicate_keys() {
        let key = KeyPair::generate().public_key();
        assert!(multi_sig_script(1, &[key, key]).is_err());
    }

    #[test]
    fn test_address_round_trip() {
        let hash = ScriptHash::from_script(&verification_script(&KeyPair::generate().public_key()));
        let address = hash.to_address();
        assert!(address.starts_with('N'));
        assert_eq!(ScriptHash::from_address(&address).unwrap(), hash);
    }

    #[test]
    fn test_from_address_rejects_garbage() {
        assert!(ScriptHash::from_address("not-an-address").is_err());
    }

    #[test]
    fn test_display_is_reversed_hex() {
        let hash = ScriptHash::from_script(b"abc");
        let shown = hash.to_string();
        assert!(shown.starts_with("0x"));
        assert_eq!(shown.len(), 42);
        let mut bytes = hex::decode(&shown[2..]).unwrap();
        bytes.reverse();
        assert_eq!(&bytes[..], hash.as_bytes());
    }
}
