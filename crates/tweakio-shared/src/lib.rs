//! # tweakio-shared
//!
//! Primitives shared by every tweakio crate: password-based key derivation,
//! authenticated encryption of message payloads, the producer-facing
//! [`Message`] type and the error taxonomy the other crates map onto.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod kdf;
pub mod message;

pub use constants::{KEY_SIZE, NONCE_SIZE, SALT_SIZE};
pub use crypto::{ChaChaCipher, MessageCipher, NonceBytes};
pub use error::{CryptoError, ErrorKind, MessageError};
pub use kdf::{EncryptionKey, KdfParams, KeyDerivation, Salt};
pub use message::{Direction, EncryptedPayload, Message};
