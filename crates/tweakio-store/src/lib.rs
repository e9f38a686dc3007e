//! # tweakio-store
//!
//! Local message storage backed by SQLite.
//!
//! Producers push [`Message`](tweakio_shared::Message) values into a
//! [`StorageEngine`]; a single background writer owns the write connection,
//! batches the queue and inserts with insert-or-ignore semantics on
//! `message_id`. Reads go through short-lived connections so they never
//! contend with the writer for the same handle.

pub mod config;
pub mod database;
pub mod engine;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod storage;

mod error;

pub use config::StorageConfig;
pub use database::Database;
pub use engine::{EngineState, MessageSink, StorageEngine};
pub use error::{Result, StoreError};
pub use models::{MessageRecord, NewMessage};
pub use storage::MessageStorage;
