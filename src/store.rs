//! Interfaces to the storage/streaming backend. The engine only ever
//! talks to these traits; the backing implementation (managed Postgres,
//! test fakes) is injected by the embedding application.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use serde::{Deserialize, Serialize};

use crate::language::Language;
use crate::model::{Author, EnrichedMessage, Message, Room};

#[derive(Debug)]
pub enum StoreError {
    /// Backend rejected or failed the request.
    Backend(String),
    /// The live subscription transport could not be established.
    Subscribe(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "backend error: {msg}"),
            StoreError::Subscribe(msg) => write!(f, "subscribe failed: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// An outgoing message. Id and creation timestamp are assigned by the
/// backend; the authoritative row comes back through the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub image_url: Option<String>,
    pub language: Option<Language>,
    pub is_staff: bool,
    pub reply_to: Option<Uuid>,
}

/// Point and range reads plus the few writes the client performs.
/// Delivery guarantees are the backend's; reads here are non-transactional
/// snapshots.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All messages for a room, joined with author and reply-target data,
    /// ordered by creation time ascending.
    async fn room_messages(&self, room_id: Uuid) -> Result<Vec<EnrichedMessage>, StoreError>;

    /// Point lookup; `Ok(None)` when the message does not (or no longer)
    /// exist.
    async fn message(&self, id: Uuid) -> Result<Option<Message>, StoreError>;

    async fn author(&self, id: Uuid) -> Result<Option<Author>, StoreError>;

    /// Room directory, in creation order.
    async fn rooms(&self) -> Result<Vec<Room>, StoreError>;

    /// Send passthrough. The authoritative copy arrives back through the
    /// live event stream; callers must not insert locally.
    async fn insert_message(&self, message: &NewMessage) -> Result<(), StoreError>;

    /// Staff moderation delete. Dependent translations cascade server-side.
    async fn delete_message(&self, id: Uuid) -> Result<(), StoreError>;

    async fn nickname_available(&self, nickname: &str) -> Result<bool, StoreError>;
}

/// Row-level events for one room. Delivered at least once: duplicates and
/// out-of-order arrival are expected and absorbed by the reconciler.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Inserted(Message),
    Deleted(Uuid),
    /// Transport trouble reported in-band. Recoverable: the caller may
    /// keep the subscription or re-open the room.
    TransportError(String),
}

/// A live subscription: an event receiver plus the token that closes it.
pub struct LiveEvents {
    pub events: mpsc::Receiver<RoomEvent>,
    pub shutdown: CancellationToken,
}

#[async_trait]
pub trait EventStream: Send + Sync {
    /// Open a subscription filtered to `room_id`. Dropping the receiver or
    /// cancelling `shutdown` closes it.
    async fn subscribe(&self, room_id: Uuid) -> Result<LiveEvents, StoreError>;
}
