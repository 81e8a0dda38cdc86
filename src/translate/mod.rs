//! Translation engine: provider interface, cache layers, and the resolver
//! that reconciles cached and freshly fetched translations into view state.

pub mod cache;
pub mod provider;
pub mod resolver;
pub mod sqlite_cache;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::language::Language;

#[derive(Debug)]
pub enum TranslateError {
    Api(String),
    RateLimited { retry_after_ms: u64 },
    Timeout,
    Cancelled,
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::Api(msg) => write!(f, "API error: {msg}"),
            TranslateError::RateLimited { retry_after_ms } => {
                write!(f, "rate limited, retry after {retry_after_ms}ms")
            }
            TranslateError::Timeout => write!(f, "translation timeout"),
            TranslateError::Cancelled => write!(f, "translation cancelled"),
        }
    }
}

impl std::error::Error for TranslateError {}

/// The external text-in/text-out provider. Assumed slow and fallible;
/// results are immutable and cacheable indefinitely.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
        cancel: &CancellationToken,
    ) -> Result<String, TranslateError>;
}

/// Persisted translation cache keyed by `(message_id, target_language)`.
/// Absence means "not yet computed"; entries never expire.
#[async_trait]
pub trait TranslationStore: Send + Sync {
    async fn get(&self, message_id: Uuid, target: Language) -> Option<String>;

    /// Batch probe for a whole room's worth of ids.
    async fn get_many(&self, message_ids: &[Uuid], target: Language) -> HashMap<Uuid, String>;

    async fn put(&self, message_id: Uuid, target: Language, text: &str);

    /// Drop everything. Called when the backing messages were purged and
    /// the cached rows reference ids that no longer exist.
    async fn clear(&self);
}
