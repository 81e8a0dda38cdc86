//! Full-stack scenario: bulk load, live out-of-order insert, translation
//! resolution, display precedence, and notification side effects, driven
//! through the public client API against in-memory fakes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use suds::identity::MemoryIdentityStore;
use suds::model::{Author, EnrichedMessage, Message, Role, Room};
use suds::store::{LiveEvents, NewMessage};
use suds::translate::TranslateError;
use suds::{
    ChatClient, Config, EventStream, Language, MessageStore, RoomEvent, StoreError,
    TranslationStore, Translator,
};

struct FakeBackend {
    messages: Mutex<Vec<EnrichedMessage>>,
    authors: Mutex<HashMap<Uuid, Author>>,
}

#[async_trait]
impl MessageStore for FakeBackend {
    async fn room_messages(&self, room_id: Uuid) -> Result<Vec<EnrichedMessage>, StoreError> {
        Ok(self
            .messages
            .lock()
            .iter()
            .filter(|m| m.message.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn message(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        Ok(self
            .messages
            .lock()
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.message.clone()))
    }

    async fn author(&self, id: Uuid) -> Result<Option<Author>, StoreError> {
        Ok(self.authors.lock().get(&id).cloned())
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

struct FakeEvents {
    senders: Mutex<Vec<mpsc::Sender<RoomEvent>>>,
}

impl FakeEvents {
    async fn emit(&self, event: RoomEvent) {
        let tx = self
            .senders
            .lock()
            .last()
            .cloned()
            .expect("no subscription open");
        tx.send(event).await.expect("subscription closed");
    }
}

#[async_trait]
impl EventStream for FakeEvents {
    async fn subscribe(&self, _room_id: Uuid) -> Result<LiveEvents, StoreError> {
        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().push(tx);
        Ok(LiveEvents {
            events: rx,
            shutdown: CancellationToken::new(),
        })
    }
}

#[derive(Default)]
struct MemoryTranslations {
    rows: Mutex<HashMap<(Uuid, Language), String>>,
}

#[async_trait]
impl TranslationStore for MemoryTranslations {
    async fn get(&self, message_id: Uuid, target: Language) -> Option<String> {
        self.rows.lock().get(&(message_id, target)).cloned()
    }

    async fn get_many(&self, message_ids: &[Uuid], target: Language) -> HashMap<Uuid, String> {
        let rows = self.rows.lock();
        message_ids
            .iter()
            .filter_map(|id| rows.get(&(*id, target)).map(|t| (*id, t.clone())))
            .collect()
    }

    async fn put(&self, message_id: Uuid, target: Language, text: &str) {
        self.rows
            .lock()
            .insert((message_id, target), text.to_string());
    }

    async fn clear(&self) {
        self.rows.lock().clear();
    }
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

fn enriched(room_id: Uuid, author: &Author, created_at: i64, text: &str, language: Language) -> EnrichedMessage {
    EnrichedMessage {
        message: Message {
            id: Uuid::new_v4(),
            room_id,
            author_id: author.id,
            text: text.into(),
            image_url: None,
            language: Some(language),
            is_staff: false,
            created_at,
            reply_to: None,
        },
        author: author.clone(),
        reply_to: None,
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, pred: F) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !pred() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[tokio::test]
async fn live_room_sync_with_translations() {
    let room_id = Uuid::new_v4();
    let ana = Author {
        id: Uuid::new_v4(),
        nickname: "ana".into(),
        role: Role::Customer,
    };

    let a = enriched(room_id, &ana, 1, "hello there", Language::En);
    let b = enriched(room_id, &ana, 3, "hola amigo", Language::Es);

    let backend = Arc::new(FakeBackend {
        messages: Mutex::new(vec![a.clone(), b.clone()]),
        authors: Mutex::new(HashMap::from([(ana.id, ana.clone())])),
    });
    let events = Arc::new(FakeEvents {
        senders: Mutex::new(Vec::new()),
    });

    let client = ChatClient::connect(
        Config::default(),
        Arc::clone(&backend) as Arc<dyn MessageStore>,
        Arc::clone(&events) as Arc<dyn EventStream>,
        Arc::new(MemoryTranslations::default()),
        Arc::new(EchoTranslator),
        Arc::new(MemoryIdentityStore::default()),
    )
    .await;

    // Bulk load: [A, B] in creation order, viewer target language en.
    client.reconciler.open(room_id);
    wait_until("bulk load", || {
        client.reconciler.snapshot().messages.len() == 2
    })
    .await;
    {
        let snapshot = client.reconciler.snapshot();
        let ids: Vec<Uuid> = snapshot.messages.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    // The Spanish message picks up a provider translation; the English one
    // needs none.
    wait_until("batch translation of B", || {
        client.translations.translation_for(b.id()).is_some()
    })
    .await;
    assert_eq!(
        client.translations.translation_for(b.id()).as_deref(),
        Some("[en] hola amigo")
    );
    assert_eq!(client.translations.translation_for(a.id()), None);

    // A live event lands out of creation order: C was created between A
    // and B but arrives after both.
    let c = Message {
        id: Uuid::new_v4(),
        room_id,
        author_id: ana.id,
        text: "adiós, gracias".into(),
        image_url: None,
        language: Some(Language::Es),
        is_staff: false,
        created_at: 2,
        reply_to: None,
    };
    events.emit(RoomEvent::Inserted(c.clone())).await;

    wait_until("live insert", || {
        client.reconciler.snapshot().messages.len() == 3
    })
    .await;
    {
        let snapshot = client.reconciler.snapshot();
        let ids: Vec<Uuid> = snapshot.messages.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec![a.id(), c.id, b.id()]);
    }

    // The late arrival gets its own incremental resolution.
    wait_until("incremental translation of C", || {
        client.translations.translation_for(c.id).is_some()
    })
    .await;

    // Viewer is not the author, so the insert raised a notification.
    let notification = client.notifications.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(notification.message_id, c.id);
    assert_eq!(notification.body, "adiós, gracias");

    // Display precedence: translated text by default, original once
    // toggled, translated again when toggled back.
    let rows = client.view.display_messages();
    assert_eq!(rows[1].text, "[en] adiós, gracias");
    assert!(rows[1].needs_translation);
    assert_eq!(rows[0].text, "hello there");
    assert!(!rows[0].needs_translation);

    client.view.toggle_original(c.id);
    let rows = client.view.display_messages();
    assert_eq!(rows[1].text, "adiós, gracias");

    client.view.toggle_original(c.id);
    let rows = client.view.display_messages();
    assert_eq!(rows[1].text, "[en] adiós, gracias");

    // Everything landed on the same UTC day.
    let groups = client.view.day_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].messages.len(), 3);

    client.close();
    wait_until("teardown", || {
        client.reconciler.state() == suds::SyncState::Closed
    })
    .await;
}

#[tokio::test]
async fn language_switch_rewrites_translations() {
    let room_id = Uuid::new_v4();
    let ana = Author {
        id: Uuid::new_v4(),
        nickname: "ana".into(),
        role: Role::Customer,
    };
    let spanish = enriched(room_id, &ana, 1, "hola", Language::Es);

    let backend = Arc::new(FakeBackend {
        messages: Mutex::new(vec![spanish.clone()]),
        authors: Mutex::new(HashMap::from([(ana.id, ana.clone())])),
    });
    let events = Arc::new(FakeEvents {
        senders: Mutex::new(Vec::new()),
    });

    let client = ChatClient::connect(
        Config::default(),
        Arc::clone(&backend) as Arc<dyn MessageStore>,
        events,
        Arc::new(MemoryTranslations::default()),
        Arc::new(EchoTranslator),
        Arc::new(MemoryIdentityStore::default()),
    )
    .await;

    client.reconciler.open(room_id);
    wait_until("en translation", || {
        client.translations.translation_for(spanish.id()).as_deref() == Some("[en] hola")
    })
    .await;

    // Switching the viewer to Chinese re-resolves the whole list.
    client.set_language(Language::Zh);
    wait_until("zh translation", || {
        client.translations.translation_for(spanish.id()).as_deref() == Some("[zh] hola")
    })
    .await;

    // Switching to the message's own language leaves it untranslated.
    client.set_language(Language::Es);
    wait_until("no translation needed", || {
        client.translations.translation_for(spanish.id()).is_none()
    })
    .await;
}
