//! Suds: a real-time multilingual chat client core.
//! Merges a bulk history load with an unbounded live event stream into one
//! consistent ordered view, resolves per-message translations through
//! layered caches with cancellation-on-supersede, detects backend purges,
//! and derives the display state the rendering layer consumes.

pub mod cancellation;
pub mod config;
pub mod debounce;
pub mod identity;
pub mod language;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod reply;
pub mod store;
pub mod translate;
pub mod view;

use std::sync::Arc;

use tracing::info;

pub use config::Config;
pub use identity::{Identity, IdentityService, IdentityStore, NicknameChecker};
pub use language::Language;
pub use model::{Author, EnrichedMessage, Message, Role, Room, RoomKind};
pub use notify::Notification;
pub use reconcile::{state::SyncState, ListSnapshot, Reconciler};
pub use store::{EventStream, MessageStore, NewMessage, RoomEvent, StoreError};
pub use translate::{resolver::TranslationResolver, TranslationStore, Translator};
pub use view::ViewModel;

/// The assembled client: identity resolved, reconciler live-ready, view
/// model wired. Everything behind the traits is injected.
pub struct ChatClient {
    pub identity: Identity,
    pub reconciler: Arc<Reconciler>,
    pub translations: Arc<TranslationResolver>,
    pub view: ViewModel,
    /// Drain for new-message notifications.
    pub notifications: crossbeam_channel::Receiver<Notification>,
    pub nicknames: NicknameChecker,
    identity_service: IdentityService,
}

impl ChatClient {
    /// Resolve identity, then assemble the sync core. The caller opens a
    /// room on the returned reconciler to go live.
    pub async fn connect(
        config: Config,
        store: Arc<dyn MessageStore>,
        events: Arc<dyn EventStream>,
        translation_store: Arc<dyn TranslationStore>,
        provider: Arc<dyn Translator>,
        identity_storage: Arc<dyn IdentityStore>,
    ) -> Self {
        let identity_service = IdentityService::new(identity_storage, Arc::clone(&store));
        let identity = identity_service.resolve().await;
        info!(user_id = %identity.user_id, role = ?identity.role, "identity resolved");

        let translations = Arc::new(TranslationResolver::new(
            config.translations_enabled,
            config.l1_capacity,
            translation_store,
            provider,
        ));

        let (notifier, notifications) = notify::Notifier::new(config.notification_preview_len);

        let reconciler = Arc::new(Reconciler::spawn(
            Arc::clone(&store),
            events,
            Arc::clone(&translations),
            notifier,
            identity.user_id,
            identity.language,
            config.purge_drop_threshold,
        ));

        let view = ViewModel::new(
            Arc::clone(&reconciler),
            Arc::clone(&translations),
            Arc::clone(&store),
            identity.clone(),
        );

        let nicknames = NicknameChecker::new(store, config.debounce_quiet);

        Self {
            identity,
            reconciler,
            translations,
            view,
            notifications,
            nicknames,
            identity_service,
        }
    }

    /// Switch the viewer's target language: persists the preference and
    /// triggers a full translation re-resolution.
    pub fn set_language(&self, language: Language) {
        self.identity_service.set_language(language);
        self.reconciler.set_target_language(language);
    }

    /// Tear down the live subscription.
    pub fn close(&self) {
        self.reconciler.close();
    }
}

/// Initialize tracing from `RUST_LOG`, defaulting to debug for this crate.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "suds=debug".parse().unwrap()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}
