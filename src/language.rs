//! Language tags and heuristic source-language detection.
//! Closed three-way classification: ideographic scan, then Spanish
//! diacritics / function words, then the English default.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The closed set of languages the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
    Es,
}

impl Default for Language {
    fn default() -> Self {
        Language::En
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Spanish function words checked with word boundaries. Diacritic-free on
/// purpose: the diacritic scan already catches accented text.
const ES_FUNCTION_WORDS: &str =
    r"(?i)\b(?:el|la|los|las|una?|unos|unas|que|de|del|es|en|con|para|por|pero|como|gracias|hola|donde|cuando|porque|muy|esta|este|usted)\b";

fn es_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ES_FUNCTION_WORDS).expect("spanish word regex"))
}

impl Language {
    pub fn tag(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
            Language::Es => "es",
        }
    }

    /// Parse a tag, mapping anything unknown to the default.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "zh" => Language::Zh,
            "es" => Language::Es,
            _ => Language::En,
        }
    }

    /// Classify free text. Total: empty or unrecognized input maps to the
    /// default tag. Ideographic detection always wins over the Spanish
    /// rules, which in turn win over the default.
    pub fn detect(text: &str) -> Language {
        let text = text.trim();
        if text.is_empty() {
            return Language::En;
        }
        if text.chars().any(is_ideographic) {
            return Language::Zh;
        }
        if text.chars().any(is_spanish_diacritic) || es_word_regex().is_match(text) {
            return Language::Es;
        }
        Language::En
    }
}

/// CJK unified ideographs.
fn is_ideographic(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}')
}

fn is_spanish_diacritic(c: char) -> bool {
    matches!(
        c,
        'á' | 'é' | 'í' | 'ó' | 'ú' | 'ñ' | 'ü' | 'Á' | 'É' | 'Í' | 'Ó' | 'Ú' | 'Ñ' | 'Ü'
    )
}
