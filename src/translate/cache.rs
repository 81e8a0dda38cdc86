//! In-memory LRU translation cache (L1).
//! Key: blake3 hash of (message id | target language). Translations are
//! immutable per key, so entries carry no TTL and are evicted only by
//! capacity pressure or an explicit clear.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::language::Language;

pub struct TranslationCache {
    inner: Mutex<LruCache<[u8; 32], String>>,
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("cache capacity must be > 0"),
            )),
        }
    }

    fn compute_key(message_id: Uuid, target: Language) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(message_id.as_bytes());
        hasher.update(b"|");
        hasher.update(target.tag().as_bytes());
        *hasher.finalize().as_bytes()
    }

    pub fn get(&self, message_id: Uuid, target: Language) -> Option<String> {
        let key = Self::compute_key(message_id, target);
        self.inner.lock().get(&key).cloned()
    }

    pub fn insert(&self, message_id: Uuid, target: Language, translated_text: String) {
        let key = Self::compute_key(message_id, target);
        self.inner.lock().put(key, translated_text);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
