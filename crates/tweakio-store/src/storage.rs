//! Backend-agnostic storage contract.

use async_trait::async_trait;
use tweakio_shared::Message;

use crate::engine::StorageEngine;
use crate::error::Result;
use crate::models::MessageRecord;

/// What producers and readers need from a message store.
///
/// [`StorageEngine`] is the SQLite-backed implementation.
#[async_trait]
pub trait MessageStorage: Send + Sync {
    async fn start(&self) -> Result<()>;

    fn enqueue(&self, messages: Vec<Message>) -> Result<()>;

    async fn exists(&self, message_id: &str) -> Result<bool>;

    async fn read_all(&self, limit: u32, offset: u32) -> Result<Vec<MessageRecord>>;

    async fn read_by_chat(&self, chat_name: &str, limit: u32) -> Result<Vec<MessageRecord>>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl MessageStorage for StorageEngine {
    async fn start(&self) -> Result<()> {
        StorageEngine::start(self).await
    }

    fn enqueue(&self, messages: Vec<Message>) -> Result<()> {
        StorageEngine::enqueue(self, messages)
    }

    async fn exists(&self, message_id: &str) -> Result<bool> {
        StorageEngine::exists(self, message_id).await
    }

    async fn read_all(&self, limit: u32, offset: u32) -> Result<Vec<MessageRecord>> {
        StorageEngine::read_all(self, limit, offset).await
    }

    async fn read_by_chat(&self, chat_name: &str, limit: u32) -> Result<Vec<MessageRecord>> {
        StorageEngine::read_by_chat(self, chat_name, limit).await
    }

    async fn close(&self) -> Result<()> {
        StorageEngine::close(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tweakio_shared::Direction;

    use super::*;
    use crate::config::StorageConfig;

    async fn ingest(store: &dyn MessageStorage, id: &str) -> Result<()> {
        store.enqueue(vec![Message::new(id, "x", Direction::Outbound, "Bob", "b")])
    }

    #[tokio::test]
    async fn test_engine_behind_trait_object() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(dir.path().join("messages.db"))
            .with_flush_interval(Duration::from_millis(20));
        let store: Box<dyn MessageStorage> = Box::new(StorageEngine::new(config, None));

        assert!(ingest(store.as_ref(), "m1").await.is_err());
        store.start().await.unwrap();
        ingest(store.as_ref(), "m1").await.unwrap();
        store.close().await.unwrap();
        assert!(store.close().await.is_err());
    }
}
