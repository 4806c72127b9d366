//! Identity file binding a checkpoint to its network
//!
//! The file holds exactly two lines: the network magic in decimal and the
//! multi-sig address of the consensus node that produced the snapshot.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::PRODUCT_NAME;
use crate::error::{ChainError, Result};
use crate::models::Account;

/// Name of the metadata file at the root of every checkpoint
pub fn address_file_name() -> String {
    format!("ADDRESS.{}", PRODUCT_NAME)
}

pub fn write_metadata(dir: &Path, magic: u32, address: &str) -> Result<()> {
    let path = dir.join(address_file_name());
    fs::write(&path, format!("{}\n{}\n", magic, address))?;
    debug!(path = %path.display(), magic, address, "Checkpoint metadata written");
    Ok(())
}

fn parse_metadata(contents: &str) -> Option<(u32, &str)> {
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    match lines.as_slice() {
        [magic, address] => Some((magic.parse().ok()?, address)),
        _ => None,
    }
}

/// Confirm the extracted checkpoint in `dir` belongs to `magic` and `account`.
///
/// Every failure, missing file included, is reported as the same
/// [`ChainError::InvalidCheckpoint`].
pub fn validate_checkpoint(dir: &Path, magic: u32, account: &Account) -> Result<()> {
    let path = dir.join(address_file_name());
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Checkpoint metadata unreadable");
            return Err(ChainError::InvalidCheckpoint);
        }
    };

    match parse_metadata(&contents) {
        Some((found_magic, found_address))
            if found_magic == magic && found_address == account.address() =>
        {
            Ok(())
        }
        Some((found_magic, found_address)) => {
            warn!(
                expected_magic = magic,
                found_magic,
                expected_address = %account.address(),
                found_address,
                "Checkpoint belongs to a different network"
            );
            Err(ChainError::InvalidCheckpoint)
        }
        None => {
            warn!(path = %path.display(), "Checkpoint metadata malformed");
            Err(ChainError::InvalidCheckpoint)
        }
    }
}

pub fn remove_metadata(dir: &Path) -> Result<()> {
    fs::remove_file(dir.join(address_file_name()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn account() -> Account {
        Account::single_sig(KeyPair::generate())
    }

    #[test]
    fn test_file_name() {
        assert_eq!(address_file_name(), "ADDRESS.devnet-express");
    }

    #[test]
    fn test_write_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let account = account();
        write_metadata(dir.path(), 1_234_567, &account.address()).unwrap();

        let contents = fs::read_to_string(dir.path().join(address_file_name())).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["1234567".to_string(), account.address()]);

        assert!(validate_checkpoint(dir.path(), 1_234_567, &account).is_ok());
    }

    #[test]
    fn test_validate_rejects_mismatches() {
        let dir = tempfile::tempdir().unwrap();
        let account = account();
        write_metadata(dir.path(), 42, &account.address()).unwrap();

        assert!(matches!(
            validate_checkpoint(dir.path(), 43, &account),
            Err(ChainError::InvalidCheckpoint)
        ));
        assert!(matches!(
            validate_checkpoint(dir.path(), 42, &self::account()),
            Err(ChainError::InvalidCheckpoint)
        ));
    }

    #[test]
    fn test_validate_rejects_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let account = account();
        assert!(matches!(
            validate_checkpoint(dir.path(), 42, &account),
            Err(ChainError::InvalidCheckpoint)
        ));

        let path = dir.path().join(address_file_name());
        for bogus in [
            "".to_string(),
            "42".to_string(),
            format!("not-a-number\n{}", account.address()),
            format!("42\n{}\nextra", account.address()),
        ] {
            fs::write(&path, bogus).unwrap();
            assert!(matches!(
                validate_checkpoint(dir.path(), 42, &account),
                Err(ChainError::InvalidCheckpoint)
            ));
        }
    }

    #[test]
    fn test_remove_metadata() {
        let dir = tempfile::tempdir().unwrap();
        write_metadata(dir.path(), 7, "NAddress").unwrap();
        remove_metadata(dir.path()).unwrap();
        assert!(!dir.path().join(address_file_name()).exists());
    }
}
