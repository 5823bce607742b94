// ── Message mailbox ──
//
// One slot per (chat, user) holding that user's latest plain message.
// Filled by the dispatcher, drained by `Context::wait_for_message`.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// How long a message stays claimable.
pub const MAILBOX_TTL: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
struct Slot {
    content: String,
    expires: Instant,
}

/// Single-slot mailbox keyed by `(chat_id, user_id)`.
#[derive(Debug)]
pub struct Mailbox {
    slots: DashMap<(String, String), Slot>,
    ttl: Duration,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new(MAILBOX_TTL)
    }
}

impl Mailbox {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            ttl,
        }
    }

    /// Store a message, replacing whatever the slot held.
    pub fn put(&self, chat_id: &str, user_id: &str, content: impl Into<String>) {
        self.slots.insert(
            (chat_id.to_owned(), user_id.to_owned()),
            Slot {
                content: content.into(),
                expires: Instant::now() + self.ttl,
            },
        );
    }

    /// Atomically take the slot and compare it with `expected`.
    ///
    /// `None` when the slot is empty or expired, otherwise whether the
    /// taken message matched. A message is observed by at most one caller.
    pub fn take_compare(&self, chat_id: &str, user_id: &str, expected: &str) -> Option<bool> {
        let now = Instant::now();
        let (_, slot) = self
            .slots
            .remove(&(chat_id.to_owned(), user_id.to_owned()))?;
        if slot.expires <= now {
            return None;
        }
        Some(slot.content == expected)
    }

    /// Drop the slot regardless of its content.
    pub fn evict(&self, chat_id: &str, user_id: &str) {
        self.slots.remove(&(chat_id.to_owned(), user_id.to_owned()));
    }

    /// Peek at a live slot without consuming it.
    pub fn peek(&self, chat_id: &str, user_id: &str) -> Option<String> {
        let now = Instant::now();
        self.slots
            .get(&(chat_id.to_owned(), user_id.to_owned()))
            .filter(|slot| slot.expires > now)
            .map(|slot| slot.content.clone())
    }

    /// Remove expired slots.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.slots.retain(|_, slot| slot.expires > now);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn take_compare_consumes_the_slot() {
        let mailbox = Mailbox::default();
        mailbox.put("chat", "user", "$verify");

        assert_eq!(mailbox.take_compare("chat", "user", "$verify"), Some(true));
        assert_eq!(mailbox.take_compare("chat", "user", "$verify"), None);
        assert!(mailbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_is_reported_and_evicted() {
        let mailbox = Mailbox::default();
        mailbox.put("chat", "user", "hello");
        assert_eq!(mailbox.take_compare("chat", "user", "$verify"), Some(false));
        assert!(mailbox.peek("chat", "user").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_message_replaces_older() {
        let mailbox = Mailbox::default();
        mailbox.put("chat", "user", "first");
        mailbox.put("chat", "user", "second");
        assert_eq!(mailbox.len(), 1);
        assert_eq!(mailbox.peek("chat", "user").as_deref(), Some("second"));

        // Slots are per user.
        mailbox.put("chat", "other", "third");
        assert_eq!(mailbox.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slots_expire() {
        let mailbox = Mailbox::default();
        mailbox.put("chat", "user", "late");
        tokio::time::advance(MAILBOX_TTL + Duration::from_secs(1)).await;

        assert!(mailbox.peek("chat", "user").is_none());
        assert_eq!(mailbox.take_compare("chat", "user", "late"), None);

        mailbox.put("chat", "user", "again");
        tokio::time::advance(MAILBOX_TTL).await;
        mailbox.purge_expired();
        assert!(mailbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_takers_see_one_message() {
        let mailbox = Arc::new(Mailbox::default());
        mailbox.put("chat", "user", "$verify");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mailbox = Arc::clone(&mailbox);
                tokio::spawn(async move { mailbox.take_compare("chat", "user", "$verify") })
            })
            .collect();

        let mut hits = 0;
        for handle in handles {
            if handle.await.unwrap() == Some(true) {
                hits += 1;
            }
        }
        assert_eq!(hits, 1);
    }
}
