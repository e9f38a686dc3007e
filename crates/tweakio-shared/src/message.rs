//! The message value producers hand to the storage engine.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::crypto::NonceBytes;
use crate::error::MessageError;

/// Which way a captured message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "in")]
    Inbound,
    #[serde(rename = "out")]
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "in",
            Direction::Outbound => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "inbound" | "incoming" => Ok(Direction::Inbound),
            "out" | "outbound" | "outgoing" => Ok(Direction::Outbound),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Ciphertext and the nonce it was sealed with. They only travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub nonce: NonceBytes,
    pub ciphertext: Vec<u8>,
}

/// A captured chat message.
///
/// `message_id` is the stable external identity; the store keeps at most one
/// row per id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    /// Plaintext body. May be empty when only the encrypted form is kept.
    #[serde(default)]
    pub raw_data: String,
    pub direction: Direction,
    pub parent_chat_name: String,
    pub parent_chat_id: String,
    /// Capture time, seconds since the Unix epoch.
    pub system_hit_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_payload: Option<EncryptedPayload>,
}

impl Message {
    /// Build a message stamped with the current time.
    pub fn new(
        message_id: impl Into<String>,
        raw_data: impl Into<String>,
        direction: Direction,
        parent_chat_name: impl Into<String>,
        parent_chat_id: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            raw_data: raw_data.into(),
            direction,
            parent_chat_name: parent_chat_name.into(),
            parent_chat_id: parent_chat_id.into(),
            system_hit_time: now_secs(),
            data_type: None,
            encrypted_payload: None,
        }
    }

    pub fn with_hit_time(mut self, system_hit_time: f64) -> Self {
        self.system_hit_time = system_hit_time;
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_encrypted_payload(mut self, payload: EncryptedPayload) -> Self {
        self.encrypted_payload = Some(payload);
        self
    }

    /// Reject messages that cannot be stored.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.message_id.trim().is_empty() {
            return Err(MessageError::EmptyId);
        }
        if !self.system_hit_time.is_finite() || self.system_hit_time < 0.0 {
            return Err(MessageError::InvalidHitTime(self.system_hit_time));
        }
        Ok(())
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::new("m1", "hello", Direction::Inbound, "Alice", "chat-1")
    }

    #[test]
    fn test_new_message_is_valid() {
        let msg = sample();
        assert!(msg.system_hit_time > 0.0);
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut msg = sample();
        msg.message_id = "   ".into();
        assert_eq!(msg.validate(), Err(MessageError::EmptyId));
    }

    #[test]
    fn test_bad_hit_time_rejected() {
        assert!(sample().with_hit_time(f64::NAN).validate().is_err());
        assert!(sample().with_hit_time(-1.0).validate().is_err());
        assert!(sample().with_hit_time(0.0).validate().is_ok());
    }

    #[test]
    fn test_direction_wire_format() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains(r#""direction":"in""#));
        assert!(!json.contains("encrypted_payload"));

        assert_eq!("outgoing".parse::<Direction>().unwrap(), Direction::Outbound);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_deserialize_minimal_producer_json() {
        let json = r#"{
            "message_id": "abc",
            "direction": "out",
            "parent_chat_name": "Bob",
            "parent_chat_id": "42",
            "system_hit_time": 1700000000.5
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.raw_data, "");
        assert_eq!(msg.direction, Direction::Outbound);
        assert!(msg.encrypted_payload.is_none());
    }
}
