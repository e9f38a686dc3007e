//! Password-based key derivation and key material handling.
//!
//! Keys are derived with Argon2id. The parameters in [`KdfParams::default`]
//! are fixed for a deployment: a key derived under other values will not
//! verify.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::constants::{
    ARGON2_LANES, ARGON2_MEMORY_KIB, ARGON2_TIME_COST, KDF_CONTEXT_KEY_FINGERPRINT, KEY_SIZE,
    MIN_SALT_SIZE, SALT_SIZE,
};
use crate::error::CryptoError;

/// Fallback salt used by `verify` so malformed input costs a full derivation.
const DUMMY_SALT: [u8; SALT_SIZE] = [0x5a; SALT_SIZE];

// ── Parameters ────────────────────────────────────────────────────────────────

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub lanes: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: ARGON2_MEMORY_KIB,
            time_cost: ARGON2_TIME_COST,
            lanes: ARGON2_LANES,
        }
    }
}

impl KdfParams {
    fn to_argon2(self) -> Result<Params, CryptoError> {
        Params::new(self.memory_kib, self.time_cost, self.lanes, Some(KEY_SIZE))
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
    }
}

// ── Salt ──────────────────────────────────────────────────────────────────────

/// Per-profile salt. Not secret; persisted next to whatever it protects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Fresh random 16-byte salt.
    pub fn generate() -> Self {
        let mut salt = vec![0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        check_salt(bytes)?;
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(&BASE64.decode(encoded.trim())?)
    }
}

fn check_salt(salt: &[u8]) -> Result<(), CryptoError> {
    if salt.len() < MIN_SALT_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "salt must be at least {MIN_SALT_SIZE} bytes, got {}",
            salt.len()
        )));
    }
    Ok(())
}

// ── Key ───────────────────────────────────────────────────────────────────────

/// 32-byte symmetric key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Random key, for callers that manage key storage themselves.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short, non-reversible identifier safe to print or log.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_KEY_FINGERPRINT);
        hasher.update(&self.0);
        hex::encode(&hasher.finalize().as_bytes()[..8])
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.0))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(BASE64.decode(encoded.trim())?);
        Self::from_slice(&bytes)
    }

    /// Write the key (base64) to `path`, readable by the owner only.
    pub fn save_to_file(&self, path: &Path) -> Result<(), CryptoError> {
        let encoded = self.to_base64();
        let staging = path.with_extension("staging");

        {
            let mut options = OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&staging)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(encoded.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&staging, path)?;
        tracing::info!(path = %path.display(), fingerprint = %self.fingerprint(), "key saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, CryptoError> {
        let contents = Zeroizing::new(fs::read_to_string(path)?);
        Self::from_base64(&contents)
            .map_err(|e| CryptoError::KeyFile(format!("{}: {e}", path.display())))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey({})", self.fingerprint())
    }
}

// ── Derivation ────────────────────────────────────────────────────────────────

/// Argon2id key derivation with fixed parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyDerivation {
    params: KdfParams,
}

impl KeyDerivation {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Derive a 32-byte key. Same `(secret, salt)` always gives the same key.
    pub fn derive(&self, secret: &[u8], salt: &[u8]) -> Result<EncryptionKey, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::InvalidInput("secret cannot be empty".into()));
        }
        check_salt(salt)?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.to_argon2()?);
        let mut output = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(secret, salt, &mut output)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        let key = EncryptionKey(output);
        output.zeroize();
        Ok(key)
    }

    pub fn derive_and_generate_salt(
        &self,
        secret: &[u8],
    ) -> Result<(Salt, EncryptionKey), CryptoError> {
        let salt = Salt::generate();
        let key = self.derive(secret, salt.as_bytes())?;
        Ok((salt, key))
    }

    /// Re-derive and compare in constant time.
    ///
    /// Malformed input still runs a full derivation so the result does not
    /// reveal through timing which check failed.
    pub fn verify(&self, secret: &[u8], salt: &[u8], expected_key: &[u8]) -> bool {
        let inputs_ok = !secret.is_empty() && salt.len() >= MIN_SALT_SIZE;
        let (secret, salt) = if inputs_ok {
            (secret, salt)
        } else {
            (b"\0".as_slice(), DUMMY_SALT.as_slice())
        };

        let Ok(derived) = self.derive(secret, salt) else {
            return false;
        };
        let matches: bool = derived.as_bytes().as_slice().ct_eq(expected_key).into();
        matches && inputs_ok
    }
}
