//! Authenticated encryption for stored message payloads.
//!
//! ChaCha20-Poly1305 (IETF): 32-byte key, random 12-byte nonce per call,
//! 16-byte tag appended to the ciphertext. The nonce is returned separately so
//! it can live in its own column next to the ciphertext.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use tracing::debug;

use crate::constants::{KEY_SIZE, NONCE_SIZE};
use crate::error::CryptoError;
use crate::kdf::EncryptionKey;
use crate::message::EncryptedPayload;

pub type NonceBytes = [u8; NONCE_SIZE];

pub fn generate_nonce() -> NonceBytes {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

fn cipher_for(key: &[u8]) -> Result<ChaCha20Poly1305, CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        });
    }
    ChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: key.len(),
    })
}

/// Encrypt `plaintext` under a fresh random nonce.
///
/// Returns `(nonce, ciphertext || tag)`. Empty plaintext is rejected.
pub fn encrypt(
    key: &[u8],
    plaintext: &[u8],
    aad: Option<&[u8]>,
) -> Result<(NonceBytes, Vec<u8>), CryptoError> {
    let cipher = cipher_for(key)?;
    if plaintext.is_empty() {
        return Err(CryptoError::InvalidInput("plaintext cannot be empty".into()));
    }

    let nonce = generate_nonce();
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: aad.unwrap_or_default(),
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok((nonce, ciphertext))
}

/// Decrypt and verify. Any mismatch of key, nonce, associated data or
/// ciphertext yields `AuthenticationFailed` and no plaintext.
pub fn decrypt(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(key)?;
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }
    if ciphertext.is_empty() {
        return Err(CryptoError::InvalidInput("ciphertext cannot be empty".into()));
    }

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: aad.unwrap_or_default(),
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Like [`decrypt`], but tag failures and malformed input become `Ok(None)`.
/// A wrong-length key is still an error: that is a caller bug, not bad data.
pub fn decrypt_safe(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: Option<&[u8]>,
) -> Result<Option<Vec<u8>>, CryptoError> {
    match decrypt(key, nonce, ciphertext, aad) {
        Ok(plaintext) => Ok(Some(plaintext)),
        Err(CryptoError::AuthenticationFailed) | Err(CryptoError::InvalidInput(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn message_aad(message_id: Option<&str>) -> Option<&[u8]> {
    message_id.filter(|id| !id.is_empty()).map(str::as_bytes)
}

/// Encrypt/decrypt contract used by the storage engine.
pub trait MessageCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>)
        -> Result<(NonceBytes, Vec<u8>), CryptoError>;

    fn decrypt(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Best-effort decryption for display paths.
    fn decrypt_safe(&self, nonce: &[u8], ciphertext: &[u8], aad: Option<&[u8]>) -> Option<Vec<u8>> {
        match self.decrypt(nonce, ciphertext, aad) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                debug!(error = %e, "payload could not be decrypted");
                None
            }
        }
    }

    /// Encrypt message text, binding it to `message_id` as associated data.
    fn encrypt_message(
        &self,
        text: &str,
        message_id: Option<&str>,
    ) -> Result<EncryptedPayload, CryptoError> {
        let (nonce, ciphertext) = self.encrypt(text.as_bytes(), message_aad(message_id))?;
        Ok(EncryptedPayload { nonce, ciphertext })
    }

    fn decrypt_message(
        &self,
        payload: &EncryptedPayload,
        message_id: Option<&str>,
    ) -> Result<String, CryptoError> {
        let plaintext = self.decrypt(&payload.nonce, &payload.ciphertext, message_aad(message_id))?;
        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::InvalidInput("plaintext is not valid UTF-8".into()))
    }
}

/// ChaCha20-Poly1305 bound to one key.
pub struct ChaChaCipher {
    key: EncryptionKey,
}

impl ChaChaCipher {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    pub fn from_slice(key: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self::new(EncryptionKey::from_slice(key)?))
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }
}

impl MessageCipher for ChaChaCipher {
    fn encrypt(
        &self,
        plaintext: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<(NonceBytes, Vec<u8>), CryptoError> {
        encrypt(self.key.as_bytes(), plaintext, aad)
    }

    fn decrypt(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        decrypt(self.key.as_bytes(), nonce, ciphertext, aad)
    }
}

impl std::fmt::Debug for ChaChaCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaChaCipher")
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::constants::TAG_SIZE;
    use crate::error::ErrorKind;

    fn key() -> EncryptionKey {
        EncryptionKey::generate()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = key();
        let plaintext = b"Hello, World!";

        let (nonce, ciphertext) = encrypt(key.as_bytes(), plaintext, None).unwrap();
        let decrypted = decrypt(key.as_bytes(), &nonce, &ciphertext, None).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_roundtrip_with_associated_data() {
        let key = key();
        let aad = b"message_id_123".as_slice();

        let (nonce, ciphertext) = encrypt(key.as_bytes(), b"Secret message", Some(aad)).unwrap();
        let decrypted = decrypt(key.as_bytes(), &nonce, &ciphertext, Some(aad)).unwrap();

        assert_eq!(decrypted, b"Secret message");
    }

    #[test]
    fn test_wrong_key_fails() {
        let (nonce, ciphertext) = encrypt(key().as_bytes(), b"Secret", None).unwrap();
        let err = decrypt(key().as_bytes(), &nonce, &ciphertext, None).unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
    }

    #[test]
    fn test_any_flipped_bit_is_detected() {
        let key = key();
        let aad = b"m1".to_vec();
        let (nonce, ciphertext) = encrypt(key.as_bytes(), b"hello", Some(aad.as_slice())).unwrap();

        for i in 0..ciphertext.len() * 8 {
            let mut tampered = ciphertext.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            let err = decrypt(key.as_bytes(), &nonce, &tampered, Some(aad.as_slice())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        }

        for i in 0..NONCE_SIZE * 8 {
            let mut tampered = nonce;
            tampered[i / 8] ^= 1 << (i % 8);
            let err = decrypt(key.as_bytes(), &tampered, &ciphertext, Some(aad.as_slice())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        }

        for i in 0..aad.len() * 8 {
            let mut tampered = aad.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            let err = decrypt(key.as_bytes(), &nonce, &ciphertext, Some(tampered.as_slice())).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        }
    }

    #[test]
    fn test_missing_associated_data_fails() {
        let key = key();
        let (nonce, ciphertext) = encrypt(key.as_bytes(), b"bound", Some(b"m1".as_slice())).unwrap();
        assert!(decrypt(key.as_bytes(), &nonce, &ciphertext, None).is_err());
    }

    #[test]
    fn test_nonces_are_unique() {
        let key = key();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let (nonce, _) = encrypt(key.as_bytes(), b"x", None).unwrap();
            assert!(seen.insert(nonce), "nonce reused");
        }
    }

    #[test]
    fn test_invalid_key_length() {
        let err = encrypt(b"short_key", b"data", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);

        let err = decrypt(&[0u8; 16], &[0u8; NONCE_SIZE], b"data", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn test_empty_plaintext_rejected() {
        let err = encrypt(key().as_bytes(), b"", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_bad_nonce_and_empty_ciphertext_rejected() {
        let key = key();
        let err = decrypt(key.as_bytes(), &[0u8; 8], b"abc", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = decrypt(key.as_bytes(), &[0u8; NONCE_SIZE], b"", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_decrypt_safe_absorbs_bad_data() {
        let key = key();
        let (nonce, mut ciphertext) = encrypt(key.as_bytes(), b"hello", None).unwrap();

        let ok = decrypt_safe(key.as_bytes(), &nonce, &ciphertext, None).unwrap();
        assert_eq!(ok.as_deref(), Some(b"hello".as_slice()));

        ciphertext[0] ^= 0xFF;
        assert!(decrypt_safe(key.as_bytes(), &nonce, &ciphertext, None)
            .unwrap()
            .is_none());
        assert!(decrypt_safe(key.as_bytes(), &[1, 2, 3], &ciphertext, None)
            .unwrap()
            .is_none());

        // A wrong-length key is still reported.
        assert!(decrypt_safe(b"short", &nonce, &ciphertext, None).is_err());
    }

    #[test]
    fn test_cipher_message_helpers() {
        let cipher = ChaChaCipher::new(key());

        let payload = cipher.encrypt_message("Test message", Some("msg_456")).unwrap();
        let text = cipher.decrypt_message(&payload, Some("msg_456")).unwrap();
        assert_eq!(text, "Test message");

        // Swapping ciphertexts between messages is detected.
        let err = cipher.decrypt_message(&payload, Some("msg_789")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert!(cipher
            .decrypt_safe(&payload.nonce, &payload.ciphertext, Some(b"msg_789".as_slice()))
            .is_none());
    }

    #[test]
    fn test_cipher_from_slice_validates_length() {
        assert!(ChaChaCipher::from_slice(&[7u8; KEY_SIZE]).is_ok());
        let err = ChaChaCipher::from_slice(&[7u8; 31]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }
}
