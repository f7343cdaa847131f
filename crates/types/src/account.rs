//! secp256k1 account used to attest segments and sign ledger actions.
//!
//! Addresses are the last 20 bytes of keccak-256 over the uncompressed public
//! key (without the `0x04` prefix). Signatures are 65 bytes, `r ‖ s ‖ v` with
//! `v` in `{0, 1}`.
//!
//! Security considerations:
//! - Keystore files must not be readable by group or others (Unix)
//! - Secret key material is never logged or printed by `Debug`

use std::fmt;
use std::fs;
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sp_core::hashing::keccak_256;
use sp_core::H160;
use tracing::info;

use crate::error::{TypesError, TypesResult};

/// Length of a recoverable signature.
pub const SIGNATURE_LEN: usize = 65;

/// Something that can sign 32-byte digests on behalf of an account.
pub trait AccountSigner: Send + Sync {
    /// Address of the signing account.
    fn address(&self) -> H160;

    /// Sign a prehashed 32-byte digest.
    fn sign_digest(&self, digest: &[u8; 32]) -> TypesResult<[u8; SIGNATURE_LEN]>;
}

/// In-process account holding its secret key.
pub struct LocalAccount {
    secp: Secp256k1<All>,
    secret: SecretKey,
    address: H160,
}

impl LocalAccount {
    /// Generate a fresh account from OS randomness.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        loop {
            OsRng.fill_bytes(&mut bytes);
            // Rejection only happens for zero or >= curve order
            if let Ok(account) = Self::from_secret_bytes(&bytes) {
                return account;
            }
        }
    }

    /// Build from 32 raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> TypesResult<Self> {
        let secp = Secp256k1::new();
        let secret =
            SecretKey::from_slice(bytes).map_err(|e| TypesError::InvalidKey(e.to_string()))?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self {
            secp,
            secret,
            address: address_from_public(&public),
        })
    }

    /// Build from a hex encoded secret key (optional `0x`).
    pub fn from_hex(value: &str) -> TypesResult<Self> {
        let bytes = hex::decode(value.trim().trim_start_matches("0x"))
            .map_err(|e| TypesError::InvalidKey(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }
}

impl AccountSigner for LocalAccount {
    fn address(&self) -> H160 {
        self.address
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> TypesResult<[u8; SIGNATURE_LEN]> {
        let message = Message::from_digest_slice(digest)
            .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;
        let (recovery_id, compact) = self
            .secp
            .sign_ecdsa_recoverable(&message, &self.secret)
            .serialize_compact();

        let mut out = [0u8; SIGNATURE_LEN];
        out[..64].copy_from_slice(&compact);
        out[64] = recovery_id.to_i32() as u8;
        Ok(out)
    }
}

impl fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAccount")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Address of a public key.
pub fn address_from_public(public: &PublicKey) -> H160 {
    let uncompressed = public.serialize_uncompressed();
    let digest = keccak_256(&uncompressed[1..]);
    H160::from_slice(&digest[12..])
}

/// Recover the signing address of `signature` over `digest`.
///
/// Accepts `v` as `0/1` or `27/28`.
pub fn recover_address(digest: &[u8; 32], signature: &[u8]) -> TypesResult<H160> {
    if signature.len() != SIGNATURE_LEN {
        return Err(TypesError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }

    let v = match signature[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        other => {
            return Err(TypesError::InvalidSignature(format!(
                "invalid recovery id {other}"
            )))
        }
    };

    let recovery_id = RecoveryId::from_i32(i32::from(v))
        .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;
    let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;
    let message = Message::from_digest_slice(digest)
        .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;

    let public = Secp256k1::verification_only()
        .recover_ecdsa(&message, &signature)
        .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;
    Ok(address_from_public(&public))
}

/// JSON layout of a keystore file.
#[derive(Debug, Serialize, Deserialize)]
struct KeystoreJson {
    /// `0x` prefixed address, checked against the key on load.
    address: String,
    /// Hex encoded 32-byte secret key.
    secret_key: String,
}

/// Loads and stores the node account.
pub struct Keystore;

impl Keystore {
    /// Load an account from a JSON keystore file.
    ///
    /// # Errors
    /// Returns error if:
    /// - File doesn't exist
    /// - File has insecure permissions (readable by group/others on Unix)
    /// - Invalid JSON format or key bytes
    /// - Stored address does not match the key
    pub fn load(path: impl AsRef<Path>) -> TypesResult<LocalAccount> {
        let path = path.as_ref();

        info!("Loading account keystore from {:?}", path);

        if !path.exists() {
            return Err(TypesError::Keystore(format!(
                "Keystore file not found: {:?}",
                path
            )));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(path)?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(TypesError::Keystore(format!(
                    "Insecure keystore file permissions: {:o}. Expected 0600 or stricter",
                    mode & 0o777
                )));
            }
        }

        let content = fs::read_to_string(path)?;
        let json: KeystoreJson = serde_json::from_str(&content)
            .map_err(|e| TypesError::Keystore(format!("Invalid keystore JSON: {}", e)))?;

        let account = LocalAccount::from_hex(&json.secret_key)?;
        let expected = format!("{:#x}", account.address());
        if !json.address.eq_ignore_ascii_case(&expected) {
            return Err(TypesError::Keystore(format!(
                "Keystore address {} does not match key address {}",
                json.address, expected
            )));
        }

        info!(address = %expected, "Account loaded");
        Ok(account)
    }

    /// Write `account` to `path` with owner-only permissions.
    pub fn save(account: &LocalAccount, path: impl AsRef<Path>) -> TypesResult<()> {
        let path = path.as_ref();
        let json = KeystoreJson {
            address: format!("{:#x}", account.address()),
            secret_key: account.secret_hex(),
        };
        let content = serde_json::to_string_pretty(&json)
            .map_err(|e| TypesError::Keystore(e.to_string()))?;
        fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Well known devnet key, address from the standard derivation.
    const DEV_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const DEV_ADDRESS: &str = "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23";

    #[test]
    fn test_address_derivation() {
        let account = LocalAccount::from_hex(DEV_KEY).unwrap();
        assert_eq!(format!("{:#x}", account.address()), DEV_ADDRESS);
    }

    #[test]
    fn test_sign_and_recover() {
        let account = LocalAccount::generate();
        let digest = keccak_256(b"segment");
        let signature = account.sign_digest(&digest).unwrap();

        assert!(signature[64] <= 1);
        assert_eq!(recover_address(&digest, &signature).unwrap(), account.address());

        let mut legacy = signature;
        legacy[64] += 27;
        assert_eq!(recover_address(&digest, &legacy).unwrap(), account.address());
    }

    #[test]
    fn test_recover_other_digest_yields_other_address() {
        let account = LocalAccount::generate();
        let signature = account.sign_digest(&keccak_256(b"a")).unwrap();
        let recovered = recover_address(&keccak_256(b"b"), &signature).unwrap();
        assert_ne!(recovered, account.address());
    }

    #[test]
    fn test_recover_rejects_malformed() {
        let digest = keccak_256(b"x");
        assert!(recover_address(&digest, &[0u8; 64]).is_err());

        let mut bad_v = [1u8; SIGNATURE_LEN];
        bad_v[64] = 9;
        assert!(recover_address(&digest, &bad_v).is_err());
    }

    #[test]
    fn test_invalid_secret() {
        assert!(LocalAccount::from_secret_bytes(&[0u8; 32]).is_err());
        assert!(LocalAccount::from_hex("zz").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let account = LocalAccount::from_hex(DEV_KEY).unwrap();
        let debug = format!("{:?}", account);
        assert!(debug.contains("redacted"));
        assert!(!debug.contains(DEV_KEY));
    }

    #[test]
    fn test_keystore_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("account.json");
        let account = LocalAccount::generate();

        Keystore::save(&account, &path).unwrap();
        let loaded = Keystore::load(&path).unwrap();
        assert_eq!(loaded.address(), account.address());
    }

    #[test]
    fn test_keystore_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Keystore::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(TypesError::Keystore(_))));
    }

    #[test]
    fn test_keystore_address_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("account.json");
        let content = format!(
            r#"{{"address":"0x0000000000000000000000000000000000000001","secret_key":"{}"}}"#,
            DEV_KEY
        );
        fs::write(&path, content).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        }

        assert!(matches!(Keystore::load(&path), Err(TypesError::Keystore(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_keystore_insecure_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("account.json");
        Keystore::save(&LocalAccount::generate(), &path).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let err = Keystore::load(&path).unwrap_err();
        assert!(err.to_string().contains("Insecure"));
    }
}
