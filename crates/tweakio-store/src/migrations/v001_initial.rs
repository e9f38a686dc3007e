//! v001 -- Initial schema creation.
//!
//! Creates the `messages` table and its lookup indexes.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
pub(crate) const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id        TEXT UNIQUE NOT NULL,
    raw_data          TEXT,
    encrypted_message BLOB,
    encryption_nonce  BLOB,
    data_type         TEXT,
    direction         TEXT,                   -- 'in' | 'out'
    parent_chat_name  TEXT,
    parent_chat_id    TEXT,
    system_hit_time   REAL,                   -- seconds since the Unix epoch
    created_at        TIMESTAMP               -- RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_message_id
    ON messages (message_id);

CREATE INDEX IF NOT EXISTS idx_chat_name_time
    ON messages (parent_chat_name, created_at);

CREATE INDEX IF NOT EXISTS idx_chat_id_time
    ON messages (parent_chat_id, created_at);
"#;

/// Apply the initial schema.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
