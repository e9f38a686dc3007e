//! Queue-fed batched writer.
//!
//! Producers push messages onto an unbounded queue and return immediately.
//! One background task owns the write connection, drains the queue into a
//! batch and flushes it when the batch is full or the flush interval has
//! passed. Reads open their own short-lived connection.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};
use tweakio_shared::{CryptoError, Message, MessageCipher};

use crate::config::StorageConfig;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{MessageRecord, NewMessage};

/// Lifecycle of a [`StorageEngine`], observable through [`StorageEngine::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    /// Flushes keep failing. The writer is still retrying with the batch held
    /// in memory.
    Degraded {
        consecutive_failures: u32,
        last_error: String,
    },
    Draining,
    Closed,
}

impl EngineState {
    pub fn accepts_messages(&self) -> bool {
        matches!(self, EngineState::Ready | EngineState::Degraded { .. })
    }

    pub fn is_readable(&self) -> bool {
        matches!(
            self,
            EngineState::Ready | EngineState::Degraded { .. } | EngineState::Draining
        )
    }
}

enum Lifecycle {
    Idle {
        rx: mpsc::UnboundedReceiver<Vec<Message>>,
    },
    Running {
        shutdown: oneshot::Sender<()>,
        writer: JoinHandle<Result<()>>,
    },
    Finished,
}

/// Batched, idempotent message store.
pub struct StorageEngine {
    config: StorageConfig,
    cipher: Option<Arc<dyn MessageCipher>>,
    tx: mpsc::UnboundedSender<Vec<Message>>,
    state: Arc<watch::Sender<EngineState>>,
    lifecycle: Mutex<Lifecycle>,
}

impl StorageEngine {
    /// Build an engine. Nothing touches disk until [`start`](Self::start).
    ///
    /// With a cipher, every message that arrives with plaintext and no
    /// payload is encrypted by the writer, using its `message_id` as
    /// associated data.
    pub fn new(config: StorageConfig, cipher: Option<Arc<dyn MessageCipher>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Self {
            config,
            cipher,
            tx,
            state: Arc::new(state),
            lifecycle: Mutex::new(Lifecycle::Idle { rx }),
        }
    }

    /// Build and start in one step.
    pub async fn open(
        config: StorageConfig,
        cipher: Option<Arc<dyn MessageCipher>>,
    ) -> Result<Self> {
        let engine = Self::new(config, cipher);
        engine.start().await?;
        Ok(engine)
    }

    /// Open the database, apply migrations and spawn the writer.
    ///
    /// Calling it on a running engine is a no-op. A failed start leaves the
    /// engine `Uninitialized` so it can be retried.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let rx = match std::mem::replace(&mut *lifecycle, Lifecycle::Finished) {
            Lifecycle::Idle { rx } => rx,
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                return Ok(());
            }
            Lifecycle::Finished => return Err(StoreError::AlreadyClosed),
        };

        let db_path = self.config.db_path.clone();
        let db = match tokio::task::spawn_blocking(move || Database::open_at(&db_path)).await {
            Ok(Ok(db)) => db,
            Ok(Err(e)) => {
                *lifecycle = Lifecycle::Idle { rx };
                return Err(e);
            }
            Err(e) => {
                *lifecycle = Lifecycle::Idle { rx };
                return Err(e.into());
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let writer = Writer {
            db: Some(db),
            rx,
            shutdown: shutdown_rx,
            cipher: self.cipher.clone(),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            batch: Vec::new(),
            consecutive_failures: 0,
        };

        self.state.send_replace(EngineState::Ready);
        let handle = tokio::spawn(writer.run());
        *lifecycle = Lifecycle::Running {
            shutdown: shutdown_tx,
            writer: handle,
        };

        info!(
            path = %self.config.db_path.display(),
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            encrypted = self.cipher.is_some(),
            "storage engine started"
        );
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// A cloneable handle producers can hold without borrowing the engine.
    pub fn sink(&self) -> MessageSink {
        MessageSink {
            tx: self.tx.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Queue messages for the writer. Never waits on storage.
    ///
    /// Every message is validated first; if any is rejected nothing from the
    /// call is queued.
    pub fn enqueue(&self, messages: Vec<Message>) -> Result<()> {
        self.sink().send(messages)
    }

    /// Whether `message_id` has been committed. Queued but unflushed messages
    /// are not visible yet.
    pub async fn exists(&self, message_id: &str) -> Result<bool> {
        let path = self.readable_path()?;
        let message_id = message_id.to_owned();
        tokio::task::spawn_blocking(move || {
            Database::open_read_only(&path)?.message_exists(&message_id)
        })
        .await?
    }

    /// Newest first, offset-paginated.
    pub async fn read_all(&self, limit: u32, offset: u32) -> Result<Vec<MessageRecord>> {
        let path = self.readable_path()?;
        tokio::task::spawn_blocking(move || {
            Database::open_read_only(&path)?.list_messages(limit, offset)
        })
        .await?
    }

    pub async fn read_by_chat(&self, chat_name: &str, limit: u32) -> Result<Vec<MessageRecord>> {
        let path = self.readable_path()?;
        let chat_name = chat_name.to_owned();
        tokio::task::spawn_blocking(move || {
            Database::open_read_only(&path)?.list_messages_by_chat(&chat_name, limit)
        })
        .await?
    }

    pub async fn count(&self) -> Result<u64> {
        let path = self.readable_path()?;
        tokio::task::spawn_blocking(move || Database::open_read_only(&path)?.count_messages())
            .await?
    }

    /// Stop the writer after it has flushed everything already queued.
    ///
    /// Returns `WriteFailure` if the residual batch could not be written, and
    /// `AlreadyClosed` on every call after the first.
    pub async fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match std::mem::replace(&mut *lifecycle, Lifecycle::Finished) {
            Lifecycle::Finished => Err(StoreError::AlreadyClosed),
            Lifecycle::Idle { rx } => {
                drop(rx);
                self.state.send_replace(EngineState::Closed);
                Ok(())
            }
            Lifecycle::Running { shutdown, writer } => {
                self.state.send_replace(EngineState::Draining);
                // The writer also drains if this end is dropped, so a send
                // error here is harmless.
                let _ = shutdown.send(());
                let outcome = writer.await;
                self.state.send_replace(EngineState::Closed);
                match outcome {
                    Ok(result) => result,
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn readable_path(&self) -> Result<PathBuf> {
        if self.state.borrow().is_readable() {
            Ok(self.config.db_path.clone())
        } else {
            Err(StoreError::Unavailable("storage engine is not running"))
        }
    }
}

/// Producer-side handle onto the ingestion queue.
#[derive(Clone)]
pub struct MessageSink {
    tx: mpsc::UnboundedSender<Vec<Message>>,
    state: watch::Receiver<EngineState>,
}

impl MessageSink {
    /// Queue one call's messages as a single unit: either all of them reach
    /// the writer or, if the engine closed first, none do.
    pub fn send(&self, messages: Vec<Message>) -> Result<()> {
        if !self.state.borrow().accepts_messages() {
            return Err(StoreError::Unavailable("storage engine is not accepting messages"));
        }
        for message in &messages {
            message.validate()?;
        }

        let count = messages.len();
        if count == 0 {
            return Ok(());
        }
        self.tx
            .send(messages)
            .map_err(|_| StoreError::Unavailable("ingestion queue is closed"))?;
        debug!(count, "messages enqueued");
        Ok(())
    }

    pub fn send_one(&self, message: Message) -> Result<()> {
        self.send(vec![message])
    }
}

struct Writer {
    db: Option<Database>,
    rx: mpsc::UnboundedReceiver<Vec<Message>>,
    shutdown: oneshot::Receiver<()>,
    cipher: Option<Arc<dyn MessageCipher>>,
    config: StorageConfig,
    state: Arc<watch::Sender<EngineState>>,
    batch: Vec<NewMessage>,
    consecutive_failures: u32,
}

impl Writer {
    async fn run(mut self) -> Result<()> {
        let mut last_flush = Instant::now();

        loop {
            let received = tokio::select! {
                biased;
                _ = &mut self.shutdown => break,
                received = timeout(self.config.flush_interval, self.rx.recv()) => received,
            };

            match received {
                Ok(Some(messages)) => messages.into_iter().for_each(|m| self.push(m)),
                // Every sender is gone; nothing more can arrive.
                Ok(None) => break,
                Err(_elapsed) => {}
            }

            let full = self.batch.len() >= self.config.batch_size;
            let stale =
                !self.batch.is_empty() && last_flush.elapsed() >= self.config.flush_interval;
            if full || stale {
                let failed = self.flush().await.is_err();
                last_flush = Instant::now();
                if failed {
                    tokio::select! {
                        biased;
                        _ = &mut self.shutdown => break,
                        _ = sleep(self.config.retry_backoff) => {}
                    }
                }
            }
        }

        self.drain().await
    }

    fn push(&mut self, message: Message) {
        let message_id = message.message_id.clone();
        match self.prepare(message) {
            Ok(row) => self.batch.push(row),
            // Storing the plaintext instead would defeat the configured encryption.
            Err(e) => error!(%message_id, error = %e, "message dropped: encryption failed"),
        }
    }

    fn prepare(&self, message: Message) -> std::result::Result<NewMessage, CryptoError> {
        let mut row = NewMessage::from(message);

        if let Some(cipher) = &self.cipher {
            if !row.is_encrypted() && !row.raw_data.is_empty() {
                let (nonce, ciphertext) =
                    cipher.encrypt(row.raw_data.as_bytes(), Some(row.message_id.as_bytes()))?;
                row.encrypted_message = Some(ciphertext);
                row.encryption_nonce = Some(nonce.to_vec());
                if !self.config.retain_plaintext {
                    row.raw_data.clear();
                }
            }
        }

        Ok(row)
    }

    /// Write the pending batch. On failure the batch stays pending.
    async fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let Some(mut db) = self.db.take() else {
            let err = StoreError::Unavailable("writer connection was lost");
            self.record_failure(&err);
            return Err(err);
        };

        let rows = std::mem::take(&mut self.batch);
        let size = rows.len();
        let joined = tokio::task::spawn_blocking(move || {
            let result = db.insert_batch(&rows);
            (db, rows, result)
        })
        .await;

        let (db, rows, result) = match joined {
            Ok(parts) => parts,
            Err(e) => {
                error!(lost = size, error = %e, "batch write task failed");
                let err = StoreError::from(e);
                self.record_failure(&err);
                return Err(err);
            }
        };
        self.db = Some(db);

        match result {
            Ok(inserted) => {
                debug!(
                    batch = size,
                    inserted,
                    duplicates = size - inserted,
                    "batch flushed"
                );
                self.record_success();
                Ok(())
            }
            Err(e) => {
                self.batch = rows;
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            info!(
                after_failures = self.consecutive_failures,
                "batch writes recovered"
            );
        }
        self.consecutive_failures = 0;
        self.state.send_if_modified(|state| {
            if matches!(state, EngineState::Degraded { .. }) {
                *state = EngineState::Ready;
                true
            } else {
                false
            }
        });
    }

    fn record_failure(&mut self, err: &StoreError) {
        self.consecutive_failures += 1;
        warn!(
            attempt = self.consecutive_failures,
            pending = self.batch.len(),
            error = %err,
            "batch write failed, will retry"
        );

        if self.consecutive_failures < self.config.degrade_after {
            return;
        }
        let consecutive_failures = self.consecutive_failures;
        let last_error = err.to_string();
        let entered = self.state.send_if_modified(|state| match state {
            EngineState::Ready => {
                *state = EngineState::Degraded {
                    consecutive_failures,
                    last_error,
                };
                true
            }
            EngineState::Degraded { .. } => {
                *state = EngineState::Degraded {
                    consecutive_failures,
                    last_error,
                };
                false
            }
            _ => false,
        });
        if entered {
            error!(
                consecutive_failures,
                "storage engine degraded: batch writes keep failing"
            );
        }
    }

    async fn drain(mut self) -> Result<()> {
        self.state.send_if_modified(|state| {
            if *state == EngineState::Draining {
                false
            } else {
                *state = EngineState::Draining;
                true
            }
        });

        self.rx.close();
        while let Ok(messages) = self.rx.try_recv() {
            messages.into_iter().for_each(|m| self.push(m));
        }

        let pending = self.batch.len();
        let mut outcome = Ok(());
        if pending > 0 {
            debug!(pending, "flushing residual batch");
            for attempt in 1..=self.config.final_flush_attempts {
                outcome = self.flush().await;
                if outcome.is_ok() {
                    break;
                }
                if attempt < self.config.final_flush_attempts {
                    sleep(self.config.retry_backoff).await;
                }
            }
        }

        // Release the write connection before reporting closed.
        self.db = None;
        self.state.send_replace(EngineState::Closed);

        match outcome {
            Ok(()) => {
                info!(flushed = pending, "storage engine closed");
                Ok(())
            }
            Err(e) => {
                let lost = self.batch.len();
                error!(lost, error = %e, "residual batch could not be written");
                Err(StoreError::WriteFailure(format!(
                    "{lost} queued messages were not written: {e}"
                )))
            }
        }
    }
}
