//! Presentation-facing view model: derives per-message display rows and
//! day groups from the authoritative list, and exposes the mutation hooks
//! the rendering layer needs (toggle original, delete, reply selection,
//! send). No rendering concerns live here.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::identity::Identity;
use crate::language::Language;
use crate::model::{EnrichedMessage, ReplySnapshot, Room};
use crate::reconcile::Reconciler;
use crate::store::{MessageStore, NewMessage, StoreError};
use crate::translate::resolver::TranslationResolver;

const MS_PER_DAY: i64 = 86_400_000;

/// One rendered message row.
#[derive(Debug, Clone)]
pub struct DisplayMessage {
    pub id: Uuid,
    pub author_name: String,
    pub is_staff: bool,
    pub is_own: bool,
    /// Display-precedence text: translation when resolved and wanted,
    /// original otherwise.
    pub text: String,
    pub original_text: String,
    /// Whether the translation toggle applies to this message at all.
    pub needs_translation: bool,
    pub image_url: Option<String>,
    pub reply_to: Option<ReplySnapshot>,
    pub created_at: i64,
}

/// Messages of one UTC day, in list order.
#[derive(Debug, Clone)]
pub struct DayGroup {
    /// Midnight of the day, unix milliseconds.
    pub day_start: i64,
    pub messages: Vec<DisplayMessage>,
}

pub struct ViewModel {
    reconciler: Arc<Reconciler>,
    translations: Arc<TranslationResolver>,
    store: Arc<dyn MessageStore>,
    viewer: Identity,
}

impl ViewModel {
    pub fn new(
        reconciler: Arc<Reconciler>,
        translations: Arc<TranslationResolver>,
        store: Arc<dyn MessageStore>,
        viewer: Identity,
    ) -> Self {
        Self {
            reconciler,
            translations,
            store,
            viewer,
        }
    }

    /// Current list as display rows.
    pub fn display_messages(&self) -> Vec<DisplayMessage> {
        let snapshot = self.reconciler.snapshot();
        derive_display_rows(
            &snapshot.messages,
            &self.translations,
            self.viewer.user_id,
            snapshot.target_language,
        )
    }

    /// Current list grouped by UTC day.
    pub fn day_groups(&self) -> Vec<DayGroup> {
        group_by_day(self.display_messages())
    }

    /// Flip the show-original preference for a message.
    pub fn toggle_original(&self, message_id: Uuid) {
        self.translations.toggle_original(message_id);
    }

    /// Stable reply-target id for scroll-to navigation, if the message is
    /// a reply.
    pub fn select_reply_target(&self, message_id: Uuid) -> Option<Uuid> {
        let snapshot = self.reconciler.snapshot();
        snapshot
            .messages
            .iter()
            .find(|m| m.id() == message_id)
            .and_then(|m| m.reply_to.as_ref())
            .map(|reply| reply.id)
    }

    /// Moderation delete: backend first, then local removal. The event
    /// stream's own delete is absorbed as an idempotent no-op later.
    pub async fn delete_message(&self, message_id: Uuid) -> Result<(), StoreError> {
        if !self.viewer.role.is_staff() {
            return Err(StoreError::Backend("moderation requires staff role".into()));
        }
        self.store.delete_message(message_id).await?;
        self.reconciler.remove_message(message_id);
        Ok(())
    }

    /// Send a message. The authoritative copy (id, timestamp) arrives back
    /// through the live event stream.
    pub async fn send_message(
        &self,
        room_id: Uuid,
        text: &str,
        image_url: Option<String>,
        reply_to: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let trimmed = text.trim();
        if trimmed.is_empty() && image_url.is_none() {
            return Ok(());
        }
        let language = (!trimmed.is_empty()).then(|| Language::detect(trimmed));
        self.store
            .insert_message(&NewMessage {
                room_id,
                author_id: self.viewer.user_id,
                text: trimmed.to_string(),
                image_url,
                language,
                is_staff: self.viewer.role.is_staff(),
                reply_to,
            })
            .await
    }

    /// Rooms visible to this viewer, with localized display names.
    pub async fn visible_rooms(&self) -> Result<Vec<(Room, String)>, StoreError> {
        let rooms = self.store.rooms().await.map_err(|e| {
            warn!(error = %e, "room directory fetch failed");
            e
        })?;
        let language = self.reconciler.snapshot().target_language;
        Ok(rooms
            .into_iter()
            .filter(|room| room.visible_to(self.viewer.role))
            .map(|room| {
                let name = room.display_name(language).to_string();
                (room, name)
            })
            .collect())
    }
}

/// Derive display rows for a list. Split out of the view model so the
/// precedence rules are testable without a live reconciler.
pub(crate) fn derive_display_rows(
    messages: &[EnrichedMessage],
    translations: &TranslationResolver,
    viewer_id: Uuid,
    target: Language,
) -> Vec<DisplayMessage> {
    messages
        .iter()
        .map(|m| {
            let needs_translation = translations.is_enabled()
                && m.message
                    .language
                    .map(|lang| lang != target)
                    .unwrap_or(false);
            DisplayMessage {
                id: m.id(),
                author_name: m.author.nickname.clone(),
                is_staff: m.message.is_staff,
                is_own: m.message.author_id == viewer_id,
                text: translations.display_text(m, target),
                original_text: m.message.text.clone(),
                needs_translation,
                image_url: m.message.image_url.clone(),
                reply_to: m.reply_to.clone(),
                created_at: m.created_at(),
            }
        })
        .collect()
}

/// Group consecutive rows sharing a UTC day. Input is already in
/// chronological order, so runs and days coincide.
pub(crate) fn group_by_day(messages: Vec<DisplayMessage>) -> Vec<DayGroup> {
    let mut groups: Vec<DayGroup> = Vec::new();
    for message in messages {
        let day_start = message.created_at.div_euclid(MS_PER_DAY) * MS_PER_DAY;
        match groups.last_mut() {
            Some(group) if group.day_start == day_start => group.messages.push(message),
            _ => groups.push(DayGroup {
                day_start,
                messages: vec![message],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Message, Role};
    use crate::translate::resolver::TranslationResolver;
    use crate::translate::{TranslateError, TranslationStore, Translator};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    struct NoopStore;

    #[async_trait]
    impl TranslationStore for NoopStore {
        async fn get(&self, _id: Uuid, _target: Language) -> Option<String> {
            None
        }

        async fn get_many(&self, _ids: &[Uuid], _target: Language) -> HashMap<Uuid, String> {
            HashMap::new()
        }

        async fn put(&self, _id: Uuid, _target: Language, _text: &str) {}

        async fn clear(&self) {}
    }

    struct EchoTranslator;

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(
            &self,
            text: &str,
            _source: Language,
            target: Language,
            _cancel: &CancellationToken,
        ) -> Result<String, TranslateError> {
            Ok(format!("[{target}] {text}"))
        }
    }

    fn resolver() -> TranslationResolver {
        TranslationResolver::new(true, 32, Arc::new(NoopStore), Arc::new(EchoTranslator))
    }

    fn enriched(text: &str, language: Language, created_at: i64, author_id: Uuid) -> EnrichedMessage {
        EnrichedMessage {
            message: Message {
                id: Uuid::new_v4(),
                room_id: Uuid::new_v4(),
                author_id,
                text: text.into(),
                image_url: None,
                language: Some(language),
                is_staff: false,
                created_at,
                reply_to: None,
            },
            author: Author {
                id: author_id,
                nickname: "ana".into(),
                role: Role::Customer,
            },
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn rows_carry_display_precedence_and_ownership() {
        let resolver = resolver();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let msgs = vec![
            enriched("hola", Language::Es, 1, other),
            enriched("hi there", Language::En, 2, me),
        ];
        resolver.resolve_batch(&msgs, Language::En).await;

        let rows = derive_display_rows(&msgs, &resolver, me, Language::En);
        assert_eq!(rows[0].text, "[en] hola");
        assert_eq!(rows[0].original_text, "hola");
        assert!(rows[0].needs_translation);
        assert!(!rows[0].is_own);
        assert_eq!(rows[1].text, "hi there");
        assert!(!rows[1].needs_translation);
        assert!(rows[1].is_own);
    }

    #[tokio::test]
    async fn toggled_rows_show_the_original() {
        let resolver = resolver();
        let viewer = Uuid::new_v4();
        let msgs = vec![enriched("hola", Language::Es, 1, Uuid::new_v4())];
        resolver.resolve_batch(&msgs, Language::En).await;
        resolver.toggle_original(msgs[0].id());

        let rows = derive_display_rows(&msgs, &resolver, viewer, Language::En);
        assert_eq!(rows[0].text, "hola");
    }

    #[test]
    fn day_grouping_splits_on_utc_midnight() {
        let viewer = Uuid::new_v4();
        let resolver = resolver();
        let day1 = MS_PER_DAY + 1000;
        let day1_later = MS_PER_DAY + 50_000;
        let day2 = 2 * MS_PER_DAY + 10;
        let msgs = vec![
            enriched("a", Language::En, day1, viewer),
            enriched("b", Language::En, day1_later, viewer),
            enriched("c", Language::En, day2, viewer),
        ];
        let rows = derive_display_rows(&msgs, &resolver, viewer, Language::En);
        let groups = group_by_day(rows);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].day_start, MS_PER_DAY);
        assert_eq!(groups[0].messages.len(), 2);
        assert_eq!(groups[1].day_start, 2 * MS_PER_DAY);
        assert_eq!(groups[1].messages.len(), 1);
    }
}
