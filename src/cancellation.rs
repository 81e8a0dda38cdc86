//! Cancellation of superseded translation fetches.
//! A generation is keyed by target-language identity: acquiring a guard
//! for a different language cancels everything in flight for the old one
//! and advances the counter, so stale completions can never write state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::language::Language;

struct Slot {
    token: CancellationToken,
    language: Option<Language>,
}

/// Tracks the current fetch generation and its target language.
pub struct FetchGeneration {
    slot: RwLock<Slot>,
    counter: Arc<AtomicU64>,
}

impl FetchGeneration {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot {
                token: CancellationToken::new(),
                language: None,
            }),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Join the current generation for `language`, superseding it first if
    /// the in-flight work targets a different language. Same-language
    /// acquisitions share a generation, so an incremental resolve does not
    /// cancel a sibling batch.
    pub fn acquire(&self, language: Language) -> FetchGuard {
        let mut slot = self.slot.write();
        if slot.language != Some(language) {
            slot.token.cancel();
            slot.token = CancellationToken::new();
            slot.language = Some(language);
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
        FetchGuard {
            token: slot.token.child_token(),
            generation: self.counter.load(Ordering::SeqCst),
            counter: Arc::clone(&self.counter),
        }
    }

    /// Cancel all in-flight work and invalidate every outstanding guard.
    /// Used on purge and on teardown.
    pub fn cancel_all(&self) {
        let mut slot = self.slot.write();
        slot.token.cancel();
        slot.token = CancellationToken::new();
        slot.language = None;
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for FetchGeneration {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a fetch task; checked before any result is written to state.
#[derive(Clone)]
pub struct FetchGuard {
    token: CancellationToken,
    generation: u64,
    counter: Arc<AtomicU64>,
}

impl FetchGuard {
    #[inline]
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task's results may still be applied.
    #[inline]
    pub fn should_apply(&self) -> bool {
        !self.is_cancelled() && self.is_current()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
