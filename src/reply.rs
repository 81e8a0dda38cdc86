//! Reply-target resolution at live-event time: two sequential point
//! lookups (target message, then its author) that fail independently.
//! Failures substitute placeholders; the reply relationship is never
//! dropped, and the snapshot keeps the target id stable for navigation.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::model::ReplySnapshot;
use crate::store::MessageStore;

pub struct ReplyResolver {
    store: Arc<dyn MessageStore>,
}

impl ReplyResolver {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, target_id: Uuid) -> ReplySnapshot {
        let target = match self.store.message(target_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(%target_id, error = %e, "reply target lookup failed");
                None
            }
        };

        let Some(target) = target else {
            // Target deleted (or unreachable): placeholder block.
            return ReplySnapshot {
                id: target_id,
                text: String::new(),
                language: None,
                author_name: "Unknown".into(),
            };
        };

        let author_name = match self.store.author(target.author_id).await {
            Ok(Some(author)) => author.nickname,
            Ok(None) => "Unknown".into(),
            Err(e) => {
                warn!(author_id = %target.author_id, error = %e, "reply author lookup failed");
                "Unknown".into()
            }
        };

        ReplySnapshot {
            id: target_id,
            text: target.text,
            language: target.language,
            author_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::model::{Author, EnrichedMessage, Message, Role, Room};
    use crate::store::{NewMessage, StoreError};
    use async_trait::async_trait;

    struct StubStore {
        message: Option<Message>,
        author: Option<Author>,
        author_fails: bool,
    }

    #[async_trait]
    impl MessageStore for StubStore {
        async fn room_messages(&self, _room: Uuid) -> Result<Vec<EnrichedMessage>, StoreError> {
            Ok(Vec::new())
        }

        async fn message(&self, _id: Uuid) -> Result<Option<Message>, StoreError> {
            Ok(self.message.clone())
        }

        async fn author(&self, _id: Uuid) -> Result<Option<Author>, StoreError> {
            if self.author_fails {
                return Err(StoreError::Backend("author lookup down".into()));
            }
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

        async fn nickname_available(&self, _nickname: &str) -> Result<bool, StoreError> {
            Ok(true)
        }
    }

    fn message(author_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            author_id,
            text: "la secadora está rota".into(),
            image_url: None,
            language: Some(Language::Es),
            is_staff: false,
            created_at: 100,
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn resolves_target_and_author() {
        let author_id = Uuid::new_v4();
        let resolver = ReplyResolver::new(Arc::new(StubStore {
            message: Some(message(author_id)),
            author: Some(Author {
                id: author_id,
                nickname: "ana".into(),
                role: Role::Customer,
            }),
            author_fails: false,
        }));

        let target_id = Uuid::new_v4();
        let snapshot = resolver.resolve(target_id).await;
        assert_eq!(snapshot.id, target_id);
        assert_eq!(snapshot.text, "la secadora está rota");
        assert_eq!(snapshot.language, Some(Language::Es));
        assert_eq!(snapshot.author_name, "ana");
    }

    #[tokio::test]
    async fn deleted_target_keeps_placeholder_block() {
        let resolver = ReplyResolver::new(Arc::new(StubStore {
            message: None,
            author: None,
            author_fails: false,
        }));

        let target_id = Uuid::new_v4();
        let snapshot = resolver.resolve(target_id).await;
        // The reply block survives with placeholders; the id stays stable.
        assert_eq!(snapshot.id, target_id);
        assert_eq!(snapshot.author_name, "Unknown");
        assert!(snapshot.text.is_empty());
    }

    #[tokio::test]
    async fn author_failure_degrades_independently() {
        let resolver = ReplyResolver::new(Arc::new(StubStore {
            message: Some(message(Uuid::new_v4())),
            author: None,
            author_fails: true,
        }));

        let snapshot = resolver.resolve(Uuid::new_v4()).await;
        assert_eq!(snapshot.text, "la secadora está rota");
        assert_eq!(snapshot.author_name, "Unknown");
    }
}
