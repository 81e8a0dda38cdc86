//! Durable visitor identity and session bootstrap.
//! The visitor id lives behind an injected key-value storage port; a
//! fallback id is minted and persisted when nothing is stored. Role and
//! nickname come from the backend directory and degrade to customer
//! defaults when the lookup fails.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use crate::debounce::Debouncer;
use crate::language::Language;
use crate::model::Role;
use crate::store::MessageStore;

const VISITOR_ID_KEY: &str = "visitor_id";
const LANGUAGE_KEY: &str = "language";

/// Key-value storage port for identity persistence. Injected so the core
/// never touches ambient global state directly.
pub trait IdentityStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Volatile storage, for tests and incognito-style sessions.
#[derive(Default)]
pub struct MemoryIdentityStore {
    values: Mutex<std::collections::HashMap<String, String>>,
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.into(), value.into());
    }

    fn remove(&self, key: &str) {
        self.values.lock().remove(key);
    }
}

/// SQLite-backed storage for durable identity across sessions.
pub struct SqliteIdentityStore {
    conn: Mutex<Connection>,
}

impl SqliteIdentityStore {
    pub fn open(db_path: &std::path::Path) -> Result<Self, String> {
        let conn = Connection::open(db_path)
            .map_err(|e| format!("failed to open identity store: {e}"))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;
             CREATE TABLE IF NOT EXISTS identity_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
             );",
        )
        .map_err(|e| format!("identity schema failed: {e}"))?;
        info!(path = %db_path.display(), "identity store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl IdentityStore for SqliteIdentityStore {
    fn get(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM identity_kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .ok()
        .flatten()
    }

    fn set(&self, key: &str, value: &str) {
        let conn = self.conn.lock();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO identity_kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        ) {
            warn!(error = %e, key, "identity store write failed");
        }
    }

    fn remove(&self, key: &str) {
        let conn = self.conn.lock();
        if let Err(e) = conn.execute("DELETE FROM identity_kv WHERE key = ?1", params![key]) {
            warn!(error = %e, key, "identity store delete failed");
        }
    }
}

/// The resolved session identity consumed by the sync core.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub nickname: String,
    pub language: Language,
}

pub struct IdentityService {
    storage: Arc<dyn IdentityStore>,
    directory: Arc<dyn MessageStore>,
    cached: Mutex<Option<Uuid>>,
}

impl IdentityService {
    pub fn new(storage: Arc<dyn IdentityStore>, directory: Arc<dyn MessageStore>) -> Self {
        Self {
            storage,
            directory,
            cached: Mutex::new(None),
        }
    }

    /// The durable visitor id: memory cache, then storage, then a freshly
    /// minted fallback that is persisted for next time.
    pub fn visitor_id(&self) -> Uuid {
        let mut cached = self.cached.lock();
        if let Some(id) = *cached {
            return id;
        }
        let id = self
            .storage
            .get(VISITOR_ID_KEY)
            .and_then(|v| Uuid::parse_str(&v).ok())
            .unwrap_or_else(|| {
                let minted = Uuid::new_v4();
                self.storage.set(VISITOR_ID_KEY, &minted.to_string());
                info!(visitor_id = %minted, "minted fallback visitor id");
                minted
            });
        *cached = Some(id);
        id
    }

    /// Resolve the full identity. Directory failures degrade to customer
    /// defaults; bootstrap never blocks on a broken backend.
    pub async fn resolve(&self) -> Identity {
        let user_id = self.visitor_id();
        let language = self
            .storage
            .get(LANGUAGE_KEY)
            .map(|v| Language::from_tag(&v))
            .unwrap_or_default();

        match self.directory.author(user_id).await {
            Ok(Some(author)) => Identity {
                user_id,
                role: author.role,
                nickname: author.nickname,
                language,
            },
            Ok(None) => Identity {
                user_id,
                role: Role::Customer,
                nickname: String::new(),
                language,
            },
            Err(e) => {
                warn!(error = %e, "identity directory lookup failed, using defaults");
                Identity {
                    user_id,
                    role: Role::Customer,
                    nickname: String::new(),
                    language,
                }
            }
        }
    }

    /// Persist the viewer's language preference.
    pub fn set_language(&self, language: Language) {
        self.storage.set(LANGUAGE_KEY, language.tag());
    }

    /// Drop the stored identity (logout).
    pub fn forget(&self) {
        self.storage.remove(VISITOR_ID_KEY);
        self.storage.remove(LANGUAGE_KEY);
        *self.cached.lock() = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicknameVerdict {
    Available,
    Taken,
    TooShort,
    TooLong,
    InvalidChars,
    CheckFailed,
}

fn nickname_format() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]{3,20}$").expect("nickname regex"))
}

/// Debounced nickname availability checking: format problems answer
/// immediately, backend checks wait out the quiet period and only the
/// latest submission is applied.
pub struct NicknameChecker {
    directory: Arc<dyn MessageStore>,
    debouncer: Debouncer,
}

impl NicknameChecker {
    pub fn new(directory: Arc<dyn MessageStore>, quiet: Duration) -> Self {
        Self {
            directory,
            debouncer: Debouncer::new(quiet),
        }
    }

    /// `None` means this check was superseded by a newer input.
    pub async fn check(&self, nickname: &str) -> Option<NicknameVerdict> {
        let nickname = nickname.trim();
        if nickname.chars().count() < 3 {
            return Some(NicknameVerdict::TooShort);
        }
        if nickname.chars().count() > 20 {
            return Some(NicknameVerdict::TooLong);
        }
        if !nickname_format().is_match(nickname) {
            return Some(NicknameVerdict::InvalidChars);
        }

        self.debouncer
            .run(|| async {
                match self.directory.nickname_available(nickname).await {
                    Ok(true) => NicknameVerdict::Available,
                    Ok(false) => NicknameVerdict::Taken,
                    Err(e) => {
                        warn!(error = %e, "nickname availability check failed");
                        NicknameVerdict::CheckFailed
                    }
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, EnrichedMessage, Message, Room};
    use crate::store::{NewMessage, StoreError};
    use async_trait::async_trait;

    struct StubDirectory {
        author: Option<Author>,
        taken: Vec<String>,
    }

    #[async_trait]
    impl MessageStore for StubDirectory {
        async fn room_messages(&self, _room: Uuid) -> Result<Vec<EnrichedMessage>, StoreError> {
            Ok(Vec::new())
        }

        async fn message(&self, _id: Uuid) -> Result<Option<Message>, StoreError> {
            Ok(None)
        }

        async fn author(&self, _id: Uuid) -> Result<Option<Author>, StoreError> {
            Ok(self.author.clone())
        }

        async fn rooms(&self) -> Result<Vec<Room>, StoreError> {
            Ok(Vec::new())
        }

        async fn insert_message(&self, _message: &NewMessage) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_message(&self, _id: Uuid) -> Result<(), StoreError> {
            Ok(())
        }

        async fn nickname_available(&self, nickname: &str) -> Result<bool, StoreError> {
            Ok(!self.taken.iter().any(|n| n == nickname))
        }
    }

    #[tokio::test]
    async fn visitor_id_is_minted_once_and_persisted() {
        let storage = Arc::new(MemoryIdentityStore::default());
        let service = IdentityService::new(
            storage.clone(),
            Arc::new(StubDirectory {
                author: None,
                taken: vec![],
            }),
        );

        let first = service.visitor_id();
        let second = service.visitor_id();
        assert_eq!(first, second);
        assert_eq!(
            storage.get(VISITOR_ID_KEY).as_deref(),
            Some(first.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn stored_id_is_trusted() {
        let storage = Arc::new(MemoryIdentityStore::default());
        let known = Uuid::new_v4();
        storage.set(VISITOR_ID_KEY, &known.to_string());

        let service = IdentityService::new(
            storage,
            Arc::new(StubDirectory {
                author: None,
                taken: vec![],
            }),
        );
        assert_eq!(service.visitor_id(), known);
    }

    #[tokio::test]
    async fn resolve_degrades_to_customer_defaults() {
        let service = IdentityService::new(
            Arc::new(MemoryIdentityStore::default()),
            Arc::new(StubDirectory {
                author: None,
                taken: vec![],
            }),
        );
        let identity = service.resolve().await;
        assert_eq!(identity.role, Role::Customer);
        assert!(identity.nickname.is_empty());
        assert_eq!(identity.language, Language::En);
    }

    #[tokio::test]
    async fn nickname_format_rejections_are_immediate() {
        let checker = NicknameChecker::new(
            Arc::new(StubDirectory {
                author: None,
                taken: vec![],
            }),
            Duration::from_millis(1),
        );
        assert_eq!(checker.check("ab").await, Some(NicknameVerdict::TooShort));
        assert_eq!(
            checker.check("has spaces!").await,
            Some(NicknameVerdict::InvalidChars)
        );
        assert_eq!(
            checker.check(&"x".repeat(25)).await,
            Some(NicknameVerdict::TooLong)
        );
    }

    #[tokio::test]
    async fn nickname_availability_hits_the_directory() {
        let checker = NicknameChecker::new(
            Arc::new(StubDirectory {
                author: None,
                taken: vec!["mario".into()],
            }),
            Duration::from_millis(1),
        );
        assert_eq!(checker.check("mario").await, Some(NicknameVerdict::Taken));
        assert_eq!(checker.check("luigi").await, Some(NicknameVerdict::Available));
    }
}
