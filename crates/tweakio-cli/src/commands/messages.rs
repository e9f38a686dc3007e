use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Subcommand;
use serde_json::json;
use tracing::{info, warn};
use tweakio_shared::{ChaChaCipher, Message, MessageCipher};
use tweakio_store::{Database, MessageRecord, StorageConfig, StorageEngine};

use super::{derive_profile_key, Context, ProfileArgs};

const UNDECRYPTABLE: &str = "<undecryptable>";

#[derive(Subcommand)]
pub enum MessagesCommand {
    /// Import a JSON array of messages into the profile's store
    Import {
        #[command(flatten)]
        profile: ProfileArgs,
        file: PathBuf,
        /// Encrypt message bodies with the profile key
        #[arg(long)]
        encrypt: bool,
    },

    /// Print stored messages, newest first
    List {
        #[command(flatten)]
        profile: ProfileArgs,
        /// Only messages from this chat
        #[arg(long)]
        chat: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

pub async fn run(ctx: &Context, cmd: MessagesCommand) -> Result<()> {
    match cmd {
        MessagesCommand::Import {
            profile,
            file,
            encrypt,
        } => {
            let info = ctx.profile(&profile)?;
            let raw = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let messages: Vec<Message> = serde_json::from_slice(&raw)
                .with_context(|| format!("{} is not a JSON array of messages", file.display()))?;

            let cipher: Option<Arc<dyn MessageCipher>> = if encrypt {
                let key = derive_profile_key(&info, ctx.require_password()?)?;
                Some(Arc::new(ChaChaCipher::new(key)))
            } else {
                None
            };

            let db_path = info.database_file();
            let engine = StorageEngine::open(StorageConfig::from_env(&db_path), cipher).await?;
            let submitted = messages.len();
            engine.enqueue(messages)?;
            engine.close().await?;

            let stored = tokio::task::spawn_blocking(move || {
                Database::open_read_only(&db_path)?.count_messages()
            })
            .await??;
            info!(profile = %info.key, submitted, stored, "import finished");
            println!("submitted {submitted} messages; {stored} stored in total");
        }
        MessagesCommand::List {
            profile,
            chat,
            limit,
            offset,
        } => {
            let info = ctx.profile(&profile)?;
            let cipher = match ctx.config.password.as_deref() {
                Some(password) if info.metadata.encryption.is_configured() => {
                    Some(ChaChaCipher::new(derive_profile_key(&info, password)?))
                }
                _ => None,
            };

            if chat.is_some() && offset > 0 {
                warn!("--offset is ignored together with --chat");
            }

            let db_path = info.database_file();
            let records = tokio::task::spawn_blocking(move || {
                read_records(&db_path, chat.as_deref(), limit, offset)
            })
            .await??;

            match records {
                None => println!("no messages"),
                Some(records) => {
                    for record in records {
                        let cipher = cipher.as_ref().map(|c| c as &dyn MessageCipher);
                        println!("{}", render(&record, cipher));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Read through a read-only connection so listing never competes with a
/// writer. `None` when the profile has no message database yet.
fn read_records(
    db_path: &Path,
    chat: Option<&str>,
    limit: u32,
    offset: u32,
) -> tweakio_store::Result<Option<Vec<MessageRecord>>> {
    if !db_path.is_file() {
        return Ok(None);
    }
    let db = Database::open_read_only(db_path)?;
    let records = match chat {
        Some(chat) => db.list_messages_by_chat(chat, limit)?,
        None => db.list_messages(limit, offset)?,
    };
    Ok(Some(records))
}

fn render(record: &MessageRecord, cipher: Option<&dyn MessageCipher>) -> serde_json::Value {
    let text = record
        .text(cipher)
        .unwrap_or_else(|| UNDECRYPTABLE.to_string());
    json!({
        "id": record.id,
        "message_id": record.message_id,
        "direction": record.direction.map(|d| d.as_str()),
        "chat": record.parent_chat_name,
        "chat_id": record.parent_chat_id,
        "hit_time": record.system_hit_time,
        "data_type": record.data_type,
        "nonce": record.encryption_nonce.as_deref().map(hex::encode),
        "text": text,
    })
}
