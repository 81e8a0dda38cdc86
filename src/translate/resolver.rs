//! The translation resolver: reconciles the cache layers and the provider
//! into per-message resolved text, under generation-based cancellation.
//!
//! Batch resolution replaces the resolved map wholesale (room entry,
//! language switch); incremental resolution merges a single late arrival.
//! Either way a result is applied only while its fetch guard is current,
//! so a superseded target language can never leak into view state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::TranslationCache;
use super::{TranslateError, TranslationStore, Translator};
use crate::cancellation::{FetchGeneration, FetchGuard};
use crate::language::Language;
use crate::model::EnrichedMessage;

#[derive(Default)]
struct ResolvedState {
    translations: HashMap<Uuid, String>,
    show_original: HashSet<Uuid>,
}

pub struct TranslationResolver {
    enabled: bool,
    l1: TranslationCache,
    store: Arc<dyn TranslationStore>,
    provider: Arc<dyn Translator>,
    generation: FetchGeneration,
    state: Mutex<ResolvedState>,
    /// Bumped on every visible state change so views can re-derive.
    revision_tx: watch::Sender<u64>,
    revision_rx: watch::Receiver<u64>,
}

impl TranslationResolver {
    pub fn new(
        enabled: bool,
        l1_capacity: usize,
        store: Arc<dyn TranslationStore>,
        provider: Arc<dyn Translator>,
    ) -> Self {
        let (revision_tx, revision_rx) = watch::channel(0);
        Self {
            enabled,
            l1: TranslationCache::new(l1_capacity),
            store,
            provider,
            generation: FetchGeneration::new(),
            state: Mutex::new(ResolvedState::default()),
            revision_tx,
            revision_rx,
        }
    }

    fn bump_revision(&self) {
        self.revision_tx.send_modify(|rev| *rev += 1);
    }

    /// Observe resolved-state changes (new translations, toggles, clears).
    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision_rx.clone()
    }

    /// Resolve every message whose detected language differs from `target`
    /// and atomically replace the resolved map with the outcome. Issuing a
    /// newer call for a different target language cancels this one; its
    /// results are then discarded.
    pub async fn resolve_batch(&self, messages: &[EnrichedMessage], target: Language) {
        if !self.enabled {
            return;
        }

        let guard = self.generation.acquire(target);

        let needing: Vec<(Uuid, String, Language)> = messages
            .iter()
            .filter_map(|m| {
                let source = m.message.language?;
                (source != target).then(|| (m.id(), m.message.text.clone(), source))
            })
            .collect();

        if needing.is_empty() {
            if guard.should_apply() {
                self.state.lock().translations.clear();
                self.bump_revision();
            }
            return;
        }

        // L1 probe.
        let mut resolved: HashMap<Uuid, String> = HashMap::new();
        let mut misses: Vec<(Uuid, String, Language)> = Vec::new();
        for entry in needing {
            match self.l1.get(entry.0, target) {
                Some(text) => {
                    resolved.insert(entry.0, text);
                }
                None => misses.push(entry),
            }
        }

        // Persisted-store batch probe for the rest.
        if !misses.is_empty() {
            let ids: Vec<Uuid> = misses.iter().map(|(id, _, _)| *id).collect();
            let stored = self.store.get_many(&ids, target).await;
            misses.retain(|(id, _, _)| {
                if let Some(text) = stored.get(id) {
                    self.l1.insert(*id, target, text.clone());
                    resolved.insert(*id, text.clone());
                    false
                } else {
                    true
                }
            });
        }

        // Provider fan-out for the true misses, one in-flight call per
        // message, all sharing this generation's token.
        let fetched = join_all(misses.into_iter().map(|(id, text, source)| {
            let guard = guard.clone();
            async move {
                self.fetch_and_persist(id, &text, source, target, &guard)
                    .await
                    .map(|translated| (id, translated))
            }
        }))
        .await;

        if !guard.should_apply() {
            debug!(target = %target, "batch resolution superseded, discarding");
            return;
        }

        for (id, text) in fetched.into_iter().flatten() {
            resolved.insert(id, text);
        }

        {
            let mut state = self.state.lock();
            if !guard.should_apply() {
                return;
            }
            info!(count = resolved.len(), target = %target, "batch translations resolved");
            state.translations = resolved;
        }
        self.bump_revision();
    }

    /// Cache-then-provider resolution for a single message arriving after
    /// the initial batch. Joins the current generation; does not cancel
    /// sibling work.
    pub async fn resolve_one(&self, message: &EnrichedMessage, target: Language) {
        if !self.enabled {
            return;
        }
        let source = match message.message.language {
            Some(lang) if lang != target => lang,
            _ => return,
        };

        let guard = self.generation.acquire(target);
        let id = message.id();

        let text = if let Some(hit) = self.l1.get(id, target) {
            Some(hit)
        } else if let Some(hit) = self.store.get(id, target).await {
            self.l1.insert(id, target, hit.clone());
            Some(hit)
        } else {
            self.fetch_and_persist(id, &message.message.text, source, target, &guard)
                .await
        };

        if let Some(text) = text {
            {
                let mut state = self.state.lock();
                if !guard.should_apply() {
                    return;
                }
                state.translations.insert(id, text);
            }
            self.bump_revision();
        }
    }

    /// One provider call. Completed results are persisted to both cache
    /// layers even when the display generation has moved on; translations
    /// are immutable, so the caches stay valid either way.
    async fn fetch_and_persist(
        &self,
        id: Uuid,
        text: &str,
        source: Language,
        target: Language,
        guard: &FetchGuard,
    ) -> Option<String> {
        match self
            .provider
            .translate(text, source, target, guard.token())
            .await
        {
            Ok(translated) => {
                self.store.put(id, target, &translated).await;
                self.l1.insert(id, target, translated.clone());
                Some(translated)
            }
            Err(TranslateError::Cancelled) => {
                debug!(message_id = %id, "translation cancelled");
                None
            }
            Err(e) => {
                // Per-message failure: leave untranslated, the original
                // text renders instead.
                warn!(message_id = %id, error = %e, "translation failed");
                None
            }
        }
    }

    /// Flip the per-message show-original preference.
    pub fn toggle_original(&self, message_id: Uuid) {
        {
            let mut state = self.state.lock();
            if !state.show_original.remove(&message_id) {
                state.show_original.insert(message_id);
            }
        }
        self.bump_revision();
    }

    /// Discard resolved translations and toggle state and cancel in-flight
    /// work. Room/locale change teardown.
    pub fn clear(&self) {
        self.generation.cancel_all();
        {
            let mut state = self.state.lock();
            state.translations.clear();
            state.show_original.clear();
        }
        self.bump_revision();
    }

    /// Purge invalidation: everything `clear` does, plus both cache layers,
    /// whose rows reference message ids that no longer exist.
    pub async fn purge(&self) {
        info!("purging translation caches");
        self.clear();
        self.l1.clear();
        self.store.clear().await;
    }

    /// Display precedence: original when translations are disabled, the
    /// message needs none, or the viewer toggled it; otherwise the resolved
    /// translation when present; otherwise the original as fallback.
    pub fn display_text(&self, message: &EnrichedMessage, target: Language) -> String {
        let original = &message.message.text;
        if !self.enabled {
            return original.clone();
        }
        match message.message.language {
            Some(lang) if lang != target => {}
            _ => return original.clone(),
        }
        let state = self.state.lock();
        if state.show_original.contains(&message.id()) {
            return original.clone();
        }
        state
            .translations
            .get(&message.id())
            .cloned()
            .unwrap_or_else(|| original.clone())
    }

    /// Resolved translation, if any. Exposed for the view layer.
    pub fn translation_for(&self, message_id: Uuid) -> Option<String> {
        self.state.lock().translations.get(&message_id).cloned()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
