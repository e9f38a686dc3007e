/// Application name used for directory resolution.
pub const APP_NAME: &str = "tweakio";

/// ChaCha20-Poly1305 (IETF) nonce size in bytes
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes
pub const KEY_SIZE: usize = 32;

/// Salt size produced by `Salt::generate`
pub const SALT_SIZE: usize = 16;

/// Shortest salt accepted for derivation
pub const MIN_SALT_SIZE: usize = 8;

/// Argon2id defaults. Changing any of these invalidates every key derived
/// under the old values.
pub const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
pub const ARGON2_TIME_COST: u32 = 3;
pub const ARGON2_LANES: u32 = 1;

/// Name recorded in profile metadata next to the salt.
pub const KDF_NAME: &str = "argon2id";

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_KEY_FINGERPRINT: &str = "tweakio-key-fingerprint-v1";
