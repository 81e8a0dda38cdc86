//! Stream reconciliation: merges the initial bulk load and the live event
//! stream into one chronologically ordered, de-duplicated authoritative
//! list per room.
//!
//! All list mutations flow through a single-owner worker loop; live
//! events are pumped into the same command channel, so no two events are
//! ever applied concurrently. Inserts are idempotent by id and positioned
//! by creation time, which absorbs duplicate and out-of-order delivery.

pub mod state;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::language::Language;
use crate::model::{Author, EnrichedMessage, Message};
use crate::notify::Notifier;
use crate::reply::ReplyResolver;
use crate::store::{EventStream, MessageStore, RoomEvent};
use crate::translate::resolver::TranslationResolver;

use state::{SyncLifecycle, SyncState};

/// Published view of the authoritative list plus its error flags.
#[derive(Clone)]
pub struct ListSnapshot {
    pub room_id: Option<Uuid>,
    pub messages: Arc<Vec<EnrichedMessage>>,
    pub target_language: Language,
    /// Set when the last bulk read failed; retry with `open`.
    pub load_failed: bool,
    /// Last in-band transport error, if any. Cleared on resubscription.
    pub transport_error: Option<String>,
}

impl Default for ListSnapshot {
    fn default() -> Self {
        Self {
            room_id: None,
            messages: Arc::new(Vec::new()),
            target_language: Language::En,
            load_failed: false,
            transport_error: None,
        }
    }
}

enum Command {
    Open(Uuid),
    Refresh,
    Live { room_id: Uuid, event: RoomEvent },
    Remove(Uuid),
    SetTargetLanguage(Language),
    Close,
}

/// Handle to the reconciliation worker. Cheap to clone the channels out
/// of; all operations are fire-and-forget commands applied in order.
pub struct Reconciler {
    commands: mpsc::UnboundedSender<Command>,
    lifecycle: Arc<SyncLifecycle>,
    snapshot_rx: watch::Receiver<ListSnapshot>,
}

impl Reconciler {
    pub fn spawn(
        store: Arc<dyn MessageStore>,
        events: Arc<dyn EventStream>,
        translations: Arc<TranslationResolver>,
        notifier: Notifier,
        viewer_id: Uuid,
        target_language: Language,
        purge_threshold: usize,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let lifecycle = Arc::new(SyncLifecycle::new());
        let (snapshot_tx, snapshot_rx) = watch::channel(ListSnapshot {
            target_language,
            ..ListSnapshot::default()
        });

        let worker = Worker {
            store: Arc::clone(&store),
            events,
            translations,
            notifier,
            reply: ReplyResolver::new(store),
            viewer_id,
            target_language,
            purge_threshold,
            room_id: None,
            list: Vec::new(),
            load_failed: false,
            transport_error: None,
            subscription: None,
            pump: None,
            lifecycle: Arc::clone(&lifecycle),
            snapshot_tx,
            commands: commands.clone(),
        };
        tokio::spawn(worker.run(rx));

        Self {
            commands,
            lifecycle,
            snapshot_rx,
        }
    }

    /// Open a room: tears down any current subscription, bulk loads, then
    /// goes live on the room's event stream.
    pub fn open(&self, room_id: Uuid) {
        let _ = self.commands.send(Command::Open(room_id));
    }

    /// Re-run the bulk read for the current room, replacing the list in a
    /// single step. This is the path on which an external purge becomes
    /// visible as one large count drop.
    pub fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh);
    }

    /// Remove a message locally (moderation already deleted it remotely).
    pub fn remove_message(&self, message_id: Uuid) {
        let _ = self.commands.send(Command::Remove(message_id));
    }

    /// Switch the viewer's target language and re-resolve translations
    /// for the whole list.
    pub fn set_target_language(&self, language: Language) {
        let _ = self.commands.send(Command::SetTargetLanguage(language));
    }

    /// Tear down the live subscription. Safe to call repeatedly; `open`
    /// works again afterwards.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    pub fn state(&self) -> SyncState {
        self.lifecycle.current()
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.lifecycle.subscribe()
    }

    pub fn snapshot(&self) -> ListSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<ListSnapshot> {
        self.snapshot_rx.clone()
    }
}

struct Worker {
    store: Arc<dyn MessageStore>,
    events: Arc<dyn EventStream>,
    translations: Arc<TranslationResolver>,
    notifier: Notifier,
    reply: ReplyResolver,
    viewer_id: Uuid,
    target_language: Language,
    purge_threshold: usize,
    room_id: Option<Uuid>,
    list: Vec<EnrichedMessage>,
    load_failed: bool,
    transport_error: Option<String>,
    subscription: Option<CancellationToken>,
    pump: Option<JoinHandle<()>>,
    lifecycle: Arc<SyncLifecycle>,
    snapshot_tx: watch::Sender<ListSnapshot>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!("reconciler worker started");
        while let Some(command) = rx.recv().await {
            match command {
                Command::Open(room_id) => self.handle_open(room_id).await,
                Command::Refresh => self.handle_refresh().await,
                Command::Live { room_id, event } => {
                    // Guard against cross-room leakage from a subscription
                    // torn down after events were already queued.
                    if self.room_id != Some(room_id) {
                        debug!(%room_id, "dropping event for inactive room");
                        continue;
                    }
                    match event {
                        RoomEvent::Inserted(raw) => self.handle_insert(raw).await,
                        RoomEvent::Deleted(id) => self.handle_remove(id),
                        RoomEvent::TransportError(err) => {
                            warn!(error = %err, "subscription transport error");
                            self.transport_error = Some(err);
                            self.publish();
                        }
                    }
                }
                Command::Remove(id) => self.handle_remove(id),
                Command::SetTargetLanguage(language) => self.handle_language_change(language),
                Command::Close => self.handle_close().await,
            }
        }
        self.teardown_subscription().await;
        info!("reconciler worker exiting");
    }

    async fn handle_open(&mut self, room_id: Uuid) {
        self.teardown_subscription().await;
        if self.room_id != Some(room_id) {
            // Room change: view-local translation state does not carry over.
            self.translations.clear();
        }

        let _ = self.lifecycle.transition(SyncState::Loading);
        self.room_id = Some(room_id);
        self.transport_error = None;

        match self.store.room_messages(room_id).await {
            Ok(mut messages) => {
                messages.sort_by_key(EnrichedMessage::created_at);
                self.list = messages;
                self.load_failed = false;
            }
            Err(e) => {
                warn!(%room_id, error = %e, "bulk load failed");
                self.list = Vec::new();
                self.load_failed = true;
                let _ = self.lifecycle.transition(SyncState::Idle);
                self.publish();
                return;
            }
        }

        match self.events.subscribe(room_id).await {
            Ok(live) => {
                self.subscription = Some(live.shutdown.clone());
                self.pump = Some(spawn_pump(room_id, live, self.commands.clone()));
            }
            Err(e) => {
                warn!(%room_id, error = %e, "subscribe failed");
                self.transport_error = Some(e.to_string());
            }
        }

        let _ = self.lifecycle.transition(SyncState::Live);
        info!(%room_id, count = self.list.len(), "room opened");
        self.publish();
        self.spawn_batch_resolution();
    }

    async fn handle_refresh(&mut self) {
        let Some(room_id) = self.room_id else {
            return;
        };
        let old_len = self.list.len();
        match self.store.room_messages(room_id).await {
            Ok(mut messages) => {
                messages.sort_by_key(EnrichedMessage::created_at);
                self.list = messages;
                self.load_failed = false;
                self.finish_change(old_len);
                self.spawn_batch_resolution();
            }
            Err(e) => {
                // Keep the current list: a failed refresh must not look
                // like a purge.
                warn!(%room_id, error = %e, "refresh failed");
                self.load_failed = true;
                self.publish();
            }
        }
    }

    async fn handle_insert(&mut self, raw: Message) {
        // Idempotent: duplicate delivery and optimistic-echo races collapse
        // into the first arrival.
        if self.list.iter().any(|m| m.id() == raw.id) {
            debug!(message_id = %raw.id, "duplicate insert ignored");
            return;
        }

        let author = match self.store.author(raw.author_id).await {
            Ok(Some(author)) => author,
            Ok(None) => Author::unknown(raw.author_id),
            Err(e) => {
                warn!(author_id = %raw.author_id, error = %e, "author lookup failed");
                Author::unknown(raw.author_id)
            }
        };

        let reply_to = match raw.reply_to {
            Some(target_id) => Some(self.reply.resolve(target_id).await),
            None => None,
        };

        let enriched = EnrichedMessage {
            message: raw,
            author,
            reply_to,
        };

        let old_len = self.list.len();
        let position = self
            .list
            .partition_point(|m| m.created_at() <= enriched.created_at());
        self.list.insert(position, enriched.clone());

        if enriched.message.author_id != self.viewer_id {
            self.notifier.push(
                enriched.message.room_id,
                enriched.id(),
                &enriched.author.nickname,
                &enriched.message.text,
            );
        }

        if let Some(language) = enriched.message.language {
            if language != self.target_language {
                let translations = Arc::clone(&self.translations);
                let target = self.target_language;
                tokio::spawn(async move {
                    translations.resolve_one(&enriched, target).await;
                });
            }
        }

        self.finish_change(old_len);
    }

    fn handle_remove(&mut self, message_id: Uuid) {
        let old_len = self.list.len();
        self.list.retain(|m| m.id() != message_id);
        if self.list.len() == old_len {
            // Unknown id: duplicate delete delivery, no-op.
            return;
        }
        self.finish_change(old_len);
    }

    fn handle_language_change(&mut self, language: Language) {
        if self.target_language == language {
            return;
        }
        info!(from = %self.target_language, to = %language, "target language changed");
        self.target_language = language;
        // Locale change tears down view-local translation state before the
        // full re-resolution.
        self.translations.clear();
        self.publish();
        self.spawn_batch_resolution();
    }

    async fn handle_close(&mut self) {
        self.teardown_subscription().await;
        self.translations.clear();
        self.room_id = None;
        self.list = Vec::new();
        self.load_failed = false;
        self.transport_error = None;
        self.lifecycle.force_closed();
        self.publish();
    }

    /// Fully stop the live subscription before anything else proceeds:
    /// cancel the transport, then wait for the pump to drain out.
    async fn teardown_subscription(&mut self) {
        if let Some(token) = self.subscription.take() {
            token.cancel();
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
    }

    fn spawn_batch_resolution(&self) {
        let translations = Arc::clone(&self.translations);
        let messages = self.list.clone();
        let target = self.target_language;
        tokio::spawn(async move {
            translations.resolve_batch(&messages, target).await;
        });
    }

    /// Post-mutation bookkeeping: purge detection on one-step count drops,
    /// then snapshot publication.
    fn finish_change(&mut self, old_len: usize) {
        let new_len = self.list.len();
        if old_len > new_len && old_len - new_len > self.purge_threshold {
            info!(
                from = old_len,
                to = new_len,
                "purge detected, invalidating translation caches"
            );
            let translations = Arc::clone(&self.translations);
            tokio::spawn(async move {
                translations.purge().await;
            });
        }
        self.publish();
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(ListSnapshot {
            room_id: self.room_id,
            messages: Arc::new(self.list.clone()),
            target_language: self.target_language,
            load_failed: self.load_failed,
            transport_error: self.transport_error.clone(),
        });
    }
}

fn spawn_pump(
    room_id: Uuid,
    mut live: crate::store::LiveEvents,
    commands: mpsc::UnboundedSender<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = live.shutdown.cancelled() => break,
                event = live.events.recv() => match event {
                    Some(event) => {
                        if commands.send(Command::Live { room_id, event }).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!(%room_id, "event pump stopped");
    })
}
