use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::{MessageRecord, NewMessage};

const SELECT_COLUMNS: &str = "SELECT id, message_id, raw_data, encrypted_message, encryption_nonce,
            data_type, direction, parent_chat_name, parent_chat_id, system_hit_time, created_at
     FROM messages";

impl Database {
    /// Insert a batch in one transaction, ignoring rows whose `message_id`
    /// is already stored. Returns how many rows were actually inserted.
    ///
    /// On error the transaction is rolled back and nothing from the batch is
    /// committed.
    pub fn insert_batch(&mut self, rows: &[NewMessage]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let created_at = Utc::now().to_rfc3339();
        let tx = self.conn_mut().transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO messages
                    (message_id, raw_data, encrypted_message, encryption_nonce, data_type,
                     direction, parent_chat_name, parent_chat_id, system_hit_time, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;

            for row in rows {
                inserted += stmt.execute(params![
                    row.message_id,
                    row.raw_data,
                    row.encrypted_message,
                    row.encryption_nonce,
                    row.data_type,
                    row.direction.as_str(),
                    row.parent_chat_name,
                    row.parent_chat_id,
                    row.system_hit_time,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    pub fn message_exists(&self, message_id: &str) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM messages WHERE message_id = ?1 LIMIT 1",
                params![message_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Newest first, by insertion order.
    pub fn list_messages(&self, limit: u32, offset: u32) -> Result<Vec<MessageRecord>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1 OFFSET ?2"))?;
        let rows = stmt.query_map(params![limit, offset], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn list_messages_by_chat(&self, chat_name: &str, limit: u32) -> Result<Vec<MessageRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS} WHERE parent_chat_name = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![chat_name, limit], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn count_messages(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let direction: Option<String> = row.get(6)?;
    let created_at: Option<String> = row.get(10)?;

    let created_at = match created_at {
        Some(raw) => Some(parse_timestamp(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(MessageRecord {
        id: row.get(0)?,
        message_id: row.get(1)?,
        raw_data: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        encrypted_message: row.get(3)?,
        encryption_nonce: row.get(4)?,
        data_type: row.get(5)?,
        direction: direction.and_then(|d| d.parse().ok()),
        parent_chat_name: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        parent_chat_id: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        system_hit_time: row.get::<_, Option<f64>>(9)?.unwrap_or_default(),
        created_at,
    })
}

// Rows written by this crate use RFC 3339; SQLite's CURRENT_TIMESTAMP format
// is accepted for rows written by other tools.
fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

#[cfg(test)]
mod tests {
    use tweakio_shared::{Direction, Message};

    use super::*;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("messages.db")).unwrap();
        (dir, db)
    }

    fn row(id: &str, chat: &str) -> NewMessage {
        Message::new(id, format!("body of {id}"), Direction::Inbound, chat, "chat-id").into()
    }

    #[test]
    fn test_insert_and_exists() {
        let (_dir, mut db) = open();
        assert_eq!(db.insert_batch(&[row("m1", "Alice")]).unwrap(), 1);
        assert!(db.message_exists("m1").unwrap());
        assert!(!db.message_exists("m2").unwrap());
    }

    #[test]
    fn test_duplicates_ignored_first_write_wins() {
        let (_dir, mut db) = open();
        db.insert_batch(&[row("m1", "Alice")]).unwrap();

        let mut dup = row("m1", "Alice");
        dup.raw_data = "rewritten".into();
        let inserted = db.insert_batch(&[dup, row("m2", "Alice")]).unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(db.count_messages().unwrap(), 2);
        let m1 = db
            .list_messages(10, 0)
            .unwrap()
            .into_iter()
            .find(|r| r.message_id == "m1")
            .unwrap();
        assert_eq!(m1.raw_data, "body of m1");
    }

    #[test]
    fn test_duplicate_within_one_batch() {
        let (_dir, mut db) = open();
        let inserted = db.insert_batch(&[row("m1", "A"), row("m1", "A")]).unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(db.count_messages().unwrap(), 1);
    }

    #[test]
    fn test_list_newest_first_with_offset() {
        let (_dir, mut db) = open();
        let rows: Vec<_> = (0..5).map(|i| row(&format!("m{i}"), "Alice")).collect();
        db.insert_batch(&rows).unwrap();

        let page: Vec<_> = db
            .list_messages(2, 1)
            .unwrap()
            .into_iter()
            .map(|r| r.message_id)
            .collect();
        assert_eq!(page, vec!["m3", "m2"]);
    }

    #[test]
    fn test_list_by_chat() {
        let (_dir, mut db) = open();
        db.insert_batch(&[row("a1", "Alice"), row("b1", "Bob"), row("a2", "Alice")])
            .unwrap();

        let alice = db.list_messages_by_chat("Alice", 10).unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].message_id, "a2");
        assert_eq!(alice[0].direction, Some(Direction::Inbound));
        assert!(alice[0].created_at.is_some());
        assert!(db.list_messages_by_chat("Carol", 10).unwrap().is_empty());
    }

    #[test]
    fn test_rows_from_other_writers() {
        let (_dir, db) = open();
        db.conn()
            .execute(
                "INSERT INTO messages (message_id, direction, created_at)
                 VALUES ('x', 'sideways', CURRENT_TIMESTAMP)",
                [],
            )
            .unwrap();

        let records = db.list_messages(1, 0).unwrap();
        assert_eq!(records[0].direction, None);
        assert_eq!(records[0].raw_data, "");
        assert!(records[0].created_at.is_some());
    }
}
