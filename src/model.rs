//! Core chat entities as they arrive from the backend, plus the enriched
//! (joined) forms the reconciler maintains.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::language::Language;

/// Viewer/author role. Support rooms and moderation tools are gated on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Staff,
    Admin,
}

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Customer
    }
}

/// A message row as delivered by the backend. Core fields are never
/// mutated client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    /// May be empty when an image is attached.
    pub text: String,
    pub image_url: Option<String>,
    /// Detected source language; `None` when detection was skipped.
    pub language: Option<Language>,
    pub is_staff: bool,
    /// Creation time, unix milliseconds. Server-assigned; ids are NOT
    /// sortable, this field is the only ordering key.
    pub created_at: i64,
    /// Reply target, if this message quotes another.
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    pub nickname: String,
    pub role: Role,
}

impl Author {
    /// Placeholder used when the author lookup fails; the message is still
    /// delivered to the view.
    pub fn unknown(id: Uuid) -> Self {
        Self {
            id,
            nickname: "Unknown".into(),
            role: Role::Customer,
        }
    }
}

/// Snapshot of a reply target taken at fetch time. Not updated if the
/// target changes later (editing is unsupported).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub id: Uuid,
    pub text: String,
    pub language: Option<Language>,
    pub author_name: String,
}

/// A message joined with its author and reply context, as held in the
/// authoritative list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedMessage {
    pub message: Message,
    pub author: Author,
    pub reply_to: Option<ReplySnapshot>,
}

impl EnrichedMessage {
    pub fn id(&self) -> Uuid {
        self.message.id
    }

    pub fn created_at(&self) -> i64 {
        self.message.created_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    General,
    /// Staff-only; hidden from customer viewers.
    Support,
}

/// A chat room with localized display names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    /// Canonical name, used when no localized variant exists.
    pub name: String,
    pub name_en: Option<String>,
    pub name_zh: Option<String>,
    pub name_es: Option<String>,
    pub kind: RoomKind,
}

impl Room {
    /// Localized display name for the viewer's language, falling back to
    /// the English variant and then the canonical name.
    pub fn display_name(&self, language: Language) -> &str {
        let localized = match language {
            Language::Zh => self.name_zh.as_deref(),
            Language::Es => self.name_es.as_deref(),
            Language::En => self.name_en.as_deref(),
        };
        localized
            .or(self.name_en.as_deref())
            .unwrap_or(&self.name)
    }

    /// Whether a viewer with `role` may see this room.
    pub fn visible_to(&self, role: Role) -> bool {
        match self.kind {
            RoomKind::General => true,
            RoomKind::Support => role.is_staff(),
        }
    }
}
