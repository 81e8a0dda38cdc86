//! New-message notification side effects.
//! An unbounded crossbeam channel so the reconciler never blocks on a slow
//! or absent consumer; the embedding shell drains the receiver.

use crossbeam_channel as cb;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub room_id: Uuid,
    pub message_id: Uuid,
    pub author: String,
    /// Message body truncated to the configured preview length.
    pub body: String,
}

pub struct Notifier {
    tx: cb::Sender<Notification>,
    preview_len: usize,
}

impl Notifier {
    pub fn new(preview_len: usize) -> (Self, cb::Receiver<Notification>) {
        let (tx, rx) = cb::unbounded();
        (Self { tx, preview_len }, rx)
    }

    /// Queue a notification. Never blocks; a dropped receiver is ignored.
    pub fn push(&self, room_id: Uuid, message_id: Uuid, author: &str, text: &str) {
        let _ = self.tx.send(Notification {
            room_id,
            message_id,
            author: author.to_string(),
            body: truncate_preview(text, self.preview_len),
        });
    }
}

fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_truncated_with_ellipsis() {
        let (notifier, rx) = Notifier::new(10);
        notifier.push(Uuid::new_v4(), Uuid::new_v4(), "ana", "0123456789abcdef");
        let n = rx.try_recv().unwrap();
        assert_eq!(n.body, "0123456789...");
    }

    #[test]
    fn short_bodies_pass_through() {
        let (notifier, rx) = Notifier::new(50);
        notifier.push(Uuid::new_v4(), Uuid::new_v4(), "ana", "hola");
        assert_eq!(rx.try_recv().unwrap().body, "hola");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let (notifier, rx) = Notifier::new(2);
        notifier.push(Uuid::new_v4(), Uuid::new_v4(), "li", "你好世界");
        assert_eq!(rx.try_recv().unwrap().body, "你好...");
    }
}
