//! Row types for the `messages` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tweakio_shared::{Direction, EncryptedPayload, Message, MessageCipher, NONCE_SIZE};

/// A row as the writer inserts it.
///
/// Built from a producer [`Message`]; the engine fills in the ciphertext
/// columns when encryption is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub message_id: String,
    pub raw_data: String,
    pub encrypted_message: Option<Vec<u8>>,
    pub encryption_nonce: Option<Vec<u8>>,
    pub data_type: Option<String>,
    pub direction: Direction,
    pub parent_chat_name: String,
    pub parent_chat_id: String,
    pub system_hit_time: f64,
}

impl NewMessage {
    pub fn is_encrypted(&self) -> bool {
        self.encrypted_message.is_some()
    }
}

impl From<Message> for NewMessage {
    fn from(message: Message) -> Self {
        let (encrypted_message, encryption_nonce) = match message.encrypted_payload {
            Some(payload) => (Some(payload.ciphertext), Some(payload.nonce.to_vec())),
            None => (None, None),
        };

        Self {
            message_id: message.message_id,
            raw_data: message.raw_data,
            encrypted_message,
            encryption_nonce,
            data_type: message.data_type,
            direction: message.direction,
            parent_chat_name: message.parent_chat_name,
            parent_chat_id: message.parent_chat_id,
            system_hit_time: message.system_hit_time,
        }
    }
}

/// A stored message, as read back from the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Insertion sequence number.
    pub id: i64,
    pub message_id: String,
    pub raw_data: String,
    pub encrypted_message: Option<Vec<u8>>,
    pub encryption_nonce: Option<Vec<u8>>,
    pub data_type: Option<String>,
    /// `None` when the column holds something other than `in`/`out`.
    pub direction: Option<Direction>,
    pub parent_chat_name: String,
    pub parent_chat_id: String,
    pub system_hit_time: f64,
    pub created_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// Ciphertext and nonce, if both are present and the nonce is well formed.
    pub fn encrypted_payload(&self) -> Option<EncryptedPayload> {
        let ciphertext = self.encrypted_message.as_ref()?;
        let nonce: [u8; NONCE_SIZE] = self.encryption_nonce.as_deref()?.try_into().ok()?;
        Some(EncryptedPayload {
            nonce,
            ciphertext: ciphertext.clone(),
        })
    }

    /// Best-effort decryption of the stored payload.
    ///
    /// The message id is the associated data, so a payload copied onto a
    /// different row does not open. Returns `None` for rows without a payload,
    /// for tampered or foreign ciphertext and for non UTF-8 plaintext.
    pub fn decrypt_with(&self, cipher: &dyn MessageCipher) -> Option<String> {
        let payload = self.encrypted_payload()?;
        let plaintext = cipher.decrypt_safe(
            &payload.nonce,
            &payload.ciphertext,
            Some(self.message_id.as_bytes()),
        )?;
        String::from_utf8(plaintext).ok()
    }

    /// Plaintext if stored, otherwise the decrypted payload.
    pub fn text(&self, cipher: Option<&dyn MessageCipher>) -> Option<String> {
        if !self.raw_data.is_empty() {
            return Some(self.raw_data.clone());
        }
        cipher.and_then(|c| self.decrypt_with(c))
    }
}
