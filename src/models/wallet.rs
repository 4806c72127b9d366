use serde::{Deserialize, Serialize};

use crate::crypto::{multi_sig_script, verification_script, KeyPair, PublicKey, ScriptHash};
use crate::error::{ChainError, Result};

pub const MULTI_SIG_LABEL: &str = "MultiSigContract";

/// Threshold contract shared by every consensus node wallet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct MultiSigContract {
    pub threshold: usize,
    /// Keys in script order
    pub public_keys: Vec<PublicKey>,
}

impl MultiSigContract {
    pub fn new(threshold: usize, keys: &[PublicKey]) -> Result<Self> {
        // validates threshold and key set
        multi_sig_script(threshold, keys)?;
        Ok(MultiSigContract {
            threshold,
            public_keys: crate::crypto::canonical_key_order(keys),
        })
    }

    pub fn script(&self) -> Result<Vec<u8>> {
        multi_sig_script(self.threshold, &self.public_keys)
    }

    pub fn script_hash(&self) -> Result<ScriptHash> {
        Ok(ScriptHash::from_script(&self.script()?))
    }
}

/// Single-sig accounts carry a key and no contract; multi-sig accounts carry a contract.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Account {
    pub script_hash: ScriptHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<KeyPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<MultiSigContract>,
}

impl Account {
    pub fn single_sig(key: KeyPair) -> Self {
        let script_hash = ScriptHash::from_script(&verification_script(&key.public_key()));
        Account {
            script_hash,
            label: None,
            is_default: false,
            private_key: Some(key),
            contract: None,
        }
    }

    /// Multi-sig account over `contract`, signed locally with `key`.
    pub fn multi_sig(contract: MultiSigContract, key: Option<KeyPair>) -> Result<Self> {
        if let Some(key) = &key {
            if !contract.public_keys.contains(&key.public_key()) {
                return Err(ChainError::KeyMaterial(
                    "signing key is not part of the multi-sig contract".to_string(),
                ));
            }
        }
        Ok(Account {
            script_hash: contract.script_hash()?,
            label: Some(MULTI_SIG_LABEL.to_string()),
            is_default: false,
            private_key: key,
            contract: Some(contract),
        })
    }

    pub fn is_multi_sig(&self) -> bool {
        self.contract.is_some()
    }

    pub fn address(&self) -> String {
        self.script_hash.to_address()
    }

    pub fn verification_script(&self) -> Result<Vec<u8>> {
        match (&self.contract, &self.private_key) {
            (Some(contract), _) => contract.script(),
            (None, Some(key)) => Ok(verification_script(&key.public_key())),
            (None, None) => Err(ChainError::KeyMaterial(format!(
                "account {} has neither a key nor a contract",
                self.address()
            ))),
        }
    }

    /// The stored script hash must match the one derived from key or contract.
    pub fn validate(&self) -> Result<()> {
        let derived = ScriptHash::from_script(&self.verification_script()?);
        if derived != self.script_hash {
            return Err(ChainError::KeyMaterial(format!(
                "account {} does not match its verification script",
                self.address()
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Wallet {
    pub name: String,
    pub accounts: Vec<Account>,
}

impl Wallet {
    /// New wallet holding one freshly generated default account.
    pub fn generate(name: &str) -> Self {
        let mut account = Account::single_sig(KeyPair::generate());
        account.is_default = true;
        Wallet {
            name: name.to_string(),
            accounts: vec![account],
        }
    }

    pub fn default_account(&self) -> Option<&Account> {
        self.accounts.iter().find(|a| a.is_default)
    }

    pub fn multi_sig_account(&self) -> Option<&Account> {
        self.accounts.iter().find(|a| a.is_multi_sig())
    }

    pub fn validate(&self) -> Result<()> {
        let defaults = self.accounts.iter().filter(|a| a.is_default).count();
        if defaults != 1 {
            return Err(ChainError::KeyMaterial(format!(
                "wallet {} has {} default accounts, expected exactly one",
                self.name, defaults
            )));
        }
        for account in &self.accounts {
            account.validate()?;
        }
        Ok(())
    }
}
