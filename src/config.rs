//! Runtime configuration, sourced from environment variables with
//! compiled-in defaults. Read once at startup and passed by value.

use std::time::Duration;

use crate::language::Language;

/// Drop in authoritative-list size (in one step) above which the change is
/// treated as a backend purge rather than individual moderation.
pub const DEFAULT_PURGE_DROP_THRESHOLD: usize = 5;

/// Notification preview bodies are truncated to this many characters.
pub const DEFAULT_NOTIFICATION_PREVIEW_LEN: usize = 50;

/// L1 translation cache capacity (entries).
pub const DEFAULT_L1_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct Config {
    /// Feature flag: when false, no provider calls are made and original
    /// text is always displayed.
    pub translations_enabled: bool,
    /// Viewer language used until identity resolution supplies one.
    pub default_language: Language,
    pub purge_drop_threshold: usize,
    pub notification_preview_len: usize,
    pub l1_capacity: usize,
    /// Quiet period for debounced input validation.
    pub debounce_quiet: Duration,
    pub provider: ProviderConfig,
}

/// Translation provider endpoint settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    /// Minimum interval between provider requests (token bucket).
    pub min_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.cognitive.microsofttranslator.com".into(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            min_interval: Duration::from_millis(100),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translations_enabled: true,
            default_language: Language::En,
            purge_drop_threshold: DEFAULT_PURGE_DROP_THRESHOLD,
            notification_preview_len: DEFAULT_NOTIFICATION_PREVIEW_LEN,
            l1_capacity: DEFAULT_L1_CAPACITY,
            debounce_quiet: Duration::from_millis(500),
            provider: ProviderConfig::default(),
        }
    }
}

impl Config {
    /// Build from `SUDS_*` environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(enabled) = env_bool("SUDS_ENABLE_TRANSLATIONS") {
            config.translations_enabled = enabled;
        }
        if let Ok(tag) = std::env::var("SUDS_DEFAULT_LANGUAGE") {
            config.default_language = Language::from_tag(&tag);
        }
        if let Some(threshold) = env_usize("SUDS_PURGE_DROP_THRESHOLD") {
            config.purge_drop_threshold = threshold;
        }
        if let Some(len) = env_usize("SUDS_NOTIFICATION_PREVIEW_LEN") {
            config.notification_preview_len = len;
        }
        if let Some(capacity) = env_usize("SUDS_L1_CAPACITY") {
            config.l1_capacity = capacity;
        }
        if let Some(ms) = env_usize("SUDS_DEBOUNCE_QUIET_MS") {
            config.debounce_quiet = Duration::from_millis(ms as u64);
        }
        if let Ok(endpoint) = std::env::var("SUDS_TRANSLATOR_ENDPOINT") {
            config.provider.endpoint = endpoint;
        }
        config.provider.api_key = std::env::var("SUDS_TRANSLATOR_KEY").ok();
        config
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
