//! Persisted translation store (L2) backed by SQLite.
//! Natural key (message_id, target_language); no TTL because translations
//! are immutable for a given key. Complements the in-memory L1 cache for
//! cross-session persistence.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::TranslationStore;
use crate::language::Language;

pub struct SqliteTranslationStore {
    conn: Mutex<Connection>,
}

impl SqliteTranslationStore {
    /// Open (or create) the translation database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, String> {
        let conn = Connection::open(db_path)
            .map_err(|e| format!("failed to open translation store: {e}"))?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| format!("PRAGMA failed: {e}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS message_translations (
                message_id TEXT NOT NULL,
                target_language TEXT NOT NULL,
                translated_text TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (message_id, target_language)
            );",
        )
        .map_err(|e| format!("create table failed: {e}"))?;

        info!(path = %db_path.display(), "translation store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests and ephemeral sessions.
    pub fn open_in_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory()
            .map_err(|e| format!("failed to open in-memory store: {e}"))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS message_translations (
                message_id TEXT NOT NULL,
                target_language TEXT NOT NULL,
                translated_text TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (message_id, target_language)
            );",
        )
        .map_err(|e| format!("create table failed: {e}"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl TranslationStore for SqliteTranslationStore {
    async fn get(&self, message_id: Uuid, target: Language) -> Option<String> {
        let conn = self.conn.lock();
        let result: Option<String> = conn
            .query_row(
                "SELECT translated_text FROM message_translations
                 WHERE message_id = ?1 AND target_language = ?2",
                params![message_id.to_string(), target.tag()],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten();

        if result.is_some() {
            debug!(%message_id, target = %target, "translation store hit");
        }
        result
    }

    async fn get_many(&self, message_ids: &[Uuid], target: Language) -> HashMap<Uuid, String> {
        let mut out = HashMap::new();
        if message_ids.is_empty() {
            return out;
        }

        let placeholders = vec!["?"; message_ids.len()].join(",");
        let sql = format!(
            "SELECT message_id, translated_text FROM message_translations
             WHERE target_language = ? AND message_id IN ({placeholders})"
        );

        let conn = self.conn.lock();
        let mut stmt = match conn.prepare(&sql) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "translation batch query prepare failed");
                return out;
            }
        };

        let mut bindings: Vec<String> = Vec::with_capacity(message_ids.len() + 1);
        bindings.push(target.tag().to_string());
        bindings.extend(message_ids.iter().map(|id| id.to_string()));

        let rows = stmt.query_map(rusqlite::params_from_iter(bindings.iter()), |row| {
            let id: String = row.get(0)?;
            let text: String = row.get(1)?;
            Ok((id, text))
        });

        match rows {
            Ok(iter) => {
                for row in iter.flatten() {
                    if let Ok(id) = Uuid::parse_str(&row.0) {
                        out.insert(id, row.1);
                    }
                }
            }
            Err(e) => warn!(error = %e, "translation batch query failed"),
        }

        out
    }

    async fn put(&self, message_id: Uuid, target: Language, text: &str) {
        let conn = self.conn.lock();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO message_translations
             (message_id, target_language, translated_text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![message_id.to_string(), target.tag(), text, now_unix()],
        ) {
            warn!(error = %e, "translation store insert failed");
        }
    }

    async fn clear(&self) {
        let conn = self.conn.lock();
        match conn.execute("DELETE FROM message_translations", []) {
            Ok(count) => {
                if count > 0 {
                    info!(removed = count, "translation store cleared");
                }
            }
            Err(e) => warn!(error = %e, "translation store clear failed"),
        }
    }
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_and_batch_probe() {
        let store = SqliteTranslationStore::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let missing = Uuid::new_v4();

        store.put(a, Language::En, "Hello").await;
        store.put(b, Language::En, "Goodbye").await;
        store.put(a, Language::Zh, "你好").await;

        assert_eq!(store.get(a, Language::En).await.as_deref(), Some("Hello"));
        assert_eq!(store.get(a, Language::Es).await, None);

        let many = store.get_many(&[a, b, missing], Language::En).await;
        assert_eq!(many.len(), 2);
        assert_eq!(many.get(&a).map(String::as_str), Some("Hello"));
        assert_eq!(many.get(&b).map(String::as_str), Some("Goodbye"));
        assert!(!many.contains_key(&missing));
    }

    #[tokio::test]
    async fn clear_removes_all_rows() {
        let store = SqliteTranslationStore::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        store.put(id, Language::Es, "Hola").await;
        store.clear().await;
        assert_eq!(store.get(id, Language::Es).await, None);
    }
}
