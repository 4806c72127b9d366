use std::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::SecretKey;
use rand::rngs::OsRng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{ChainError, Result};

pub const PUBLIC_KEY_LENGTH: usize = 33;
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// SEC1 compressed secp256r1 point.
///
/// Ordering is byte-lexicographic, which gives multi-sig scripts a canonical key order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // reject anything that does not decode to a curve point
        p256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| ChainError::KeyMaterial(format!("public key: {}", e)))?;
        let raw: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            ChainError::KeyMaterial(format!(
                "public key must be {} bytes in compressed form, got {}",
                PUBLIC_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(PublicKey(raw))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(de::Error::custom)?;
        PublicKey::from_bytes(&bytes).map_err(de::Error::custom)
    }
}

/// Signing key of one participant. The private scalar is never printed.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let keys = Self::from_secret(secret);
        debug!(pubkey = %keys.public, "Generated key pair");
        keys
    }

    pub fn from_private_key(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_LENGTH {
            return Err(ChainError::KeyMaterial(format!(
                "private key must be {} bytes, got {}",
                PRIVATE_KEY_LENGTH,
                bytes.len()
            )));
        }
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| ChainError::KeyMaterial(format!("private key: {}", e)))?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let point = secret.public_key().to_encoded_point(true);
        let mut raw = [0u8; PUBLIC_KEY_LENGTH];
        raw.copy_from_slice(point.as_bytes());
        KeyPair {
            secret,
            public: PublicKey(raw),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn private_key(&self) -> [u8; PRIVATE_KEY_LENGTH] {
        let mut raw = [0u8; PRIVATE_KEY_LENGTH];
        raw.copy_from_slice(&self.secret.to_bytes());
        raw
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public
    }
}

impl Eq for KeyPair {}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

// Development wallets keep keys unencrypted, as hex.
impl Serialize for KeyPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.private_key()))
    }
}

impl<'de> Deserialize<'de> for KeyPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(de::Error::custom)?;
        KeyPair::from_private_key(&bytes).map_err(de::Error::custom)
    }
}
