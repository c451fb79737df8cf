//! Chat synchronization: the authoritative, gap-free message list of one conversation

pub mod grouping;
pub mod session;

use std::collections::HashSet;

use chrono::{DateTime, TimeZone};

use crate::channel::ConnectionState;
use crate::models::{Message, ReadReceipt};

pub use grouping::{group_by_day, DayGroup};
pub use session::{ChatBackend, ChatSession, SendMode, SessionUpdate};

#[derive(Debug, Clone)]
struct Entry {
    message: Message,
    arrival: u64,
}

/// Merges REST history and live channel events for one conversation.
///
/// The list is ordered by `(created_at, arrival)`, never holds two entries
/// with the same id, and `is_read` never goes back to `false`.
#[derive(Debug)]
pub struct ChatSynchronizer {
    conversation_id: String,
    entries: Vec<Entry>,
    next_arrival: u64,
    // Receipts that named ids we have not seen yet.
    pending_read: HashSet<String>,
    connection_state: ConnectionState,
}

impl ChatSynchronizer {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            entries: Vec::new(),
            next_arrival: 0,
            pending_read: HashSet::new(),
            connection_state: ConnectionState::Connecting,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
    }

    /// Merge fetched history into the list. Live messages already present are kept.
    pub fn seed_history(&mut self, history: Vec<Message>) {
        let count = history.len();
        for message in history {
            self.insert(message);
        }
        tracing::debug!(
            "Seeded {} history messages into {} ({} total)",
            count,
            self.conversation_id,
            self.entries.len()
        );
    }

    /// Apply a live message. Returns `true` if it was newly inserted.
    ///
    /// Messages stamped with another conversation id are dropped.
    pub fn apply_message(&mut self, message: Message) -> bool {
        if let Some(conv) = message.conversation_id.as_deref() {
            if conv != self.conversation_id {
                tracing::debug!(
                    "Dropping message {} for conversation {} (active: {})",
                    message.id,
                    conv,
                    self.conversation_id
                );
                return false;
            }
        }
        self.insert(message)
    }

    /// Apply a read receipt. Returns the number of messages that became read.
    pub fn apply_receipt(&mut self, receipt: &ReadReceipt) -> usize {
        match receipt {
            ReadReceipt::Messages(ids) => {
                let mut changed = 0;
                for id in ids {
                    match self.entries.iter_mut().find(|e| &e.message.id == id) {
                        Some(entry) => {
                            if !entry.message.is_read {
                                entry.message.is_read = true;
                                changed += 1;
                            }
                        }
                        None => {
                            self.pending_read.insert(id.clone());
                        }
                    }
                }
                changed
            }
            ReadReceipt::Conversation(conv) if conv == &self.conversation_id => {
                let mut changed = 0;
                for entry in self.entries.iter_mut().filter(|e| !e.message.is_read) {
                    entry.message.is_read = true;
                    changed += 1;
                }
                changed
            }
            ReadReceipt::Conversation(conv) => {
                tracing::debug!("Ignoring read receipt for conversation {}", conv);
                0
            }
        }
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages().find(|m| m.id == id)
    }

    /// Day groups relative to `now`, in `now`'s timezone.
    pub fn groups<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<DayGroup<'_>> {
        group_by_day(self.messages(), now)
    }

    fn insert(&mut self, mut message: Message) -> bool {
        if self.pending_read.remove(&message.id) {
            message.is_read = true;
        }

        if let Some(existing) = self.entries.iter_mut().find(|e| e.message.id == message.id) {
            // Only the read flag may change after the first sighting.
            existing.message.is_read |= message.is_read;
            return false;
        }

        let arrival = self.next_arrival;
        self.next_arrival += 1;

        let key = (message.created_at, arrival);
        let pos = self
            .entries
            .partition_point(|e| (e.message.created_at, e.arrival) <= key);
        self.entries.insert(pos, Entry { message, arrival });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::{Duration, Utc};

    fn msg(id: &str, secs: i64) -> Message {
        Message {
            id: id.into(),
            conversation_id: Some("apt_1".into()),
            sender_id: Some("doctor_1".into()),
            sender_role: Some(Role::Doctor),
            body: format!("body {}", id),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            is_read: false,
        }
    }

    fn ids(sync: &ChatSynchronizer) -> Vec<&str> {
        sync.messages().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_live_then_history_merges_without_duplicates() {
        let mut sync = ChatSynchronizer::new("apt_1");
        assert!(sync.apply_message(msg("m3", 30)));
        sync.seed_history(vec![msg("m1", 10), msg("m2", 20), msg("m3", 30)]);
        assert_eq!(ids(&sync), vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_history_then_live_merges_without_duplicates() {
        let mut sync = ChatSynchronizer::new("apt_1");
        sync.seed_history(vec![msg("m1", 10), msg("m2", 20)]);
        assert!(!sync.apply_message(msg("m2", 20)));
        assert!(sync.apply_message(msg("m4", 40)));
        assert_eq!(ids(&sync), vec!["m1", "m2", "m4"]);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut sync = ChatSynchronizer::new("apt_1");
        sync.apply_message(msg("b", 10));
        sync.apply_message(msg("a", 10));
        sync.apply_message(msg("early", 5));
        assert_eq!(ids(&sync), vec!["early", "b", "a"]);
    }

    #[test]
    fn test_duplicate_delivery_keeps_one_entry_with_latest_read_state() {
        let mut sync = ChatSynchronizer::new("apt_1");
        sync.apply_message(msg("m1", 10));
        let mut again = msg("m1", 10);
        again.is_read = true;
        again.body = "rewritten".into();
        assert!(!sync.apply_message(again));

        assert_eq!(sync.len(), 1);
        let m = sync.get("m1").unwrap();
        assert!(m.is_read);
        assert_eq!(m.body, "body m1");
    }

    #[test]
    fn test_read_state_is_monotonic() {
        let mut sync = ChatSynchronizer::new("apt_1");
        let mut read = msg("m1", 10);
        read.is_read = true;
        sync.apply_message(read);
        // Stale unread copy from a slower history fetch.
        sync.seed_history(vec![msg("m1", 10)]);
        assert!(sync.get("m1").unwrap().is_read);
        assert_eq!(sync.apply_receipt(&ReadReceipt::Messages(vec!["m1".into()])), 0);
        assert!(sync.get("m1").unwrap().is_read);
    }

    #[test]
    fn test_receipt_before_message_is_remembered() {
        let mut sync = ChatSynchronizer::new("apt_1");
        assert_eq!(sync.apply_receipt(&ReadReceipt::Messages(vec!["m9".into()])), 0);
        sync.apply_message(msg("m9", 90));
        assert!(sync.get("m9").unwrap().is_read);
    }

    #[test]
    fn test_conversation_receipt_marks_everything() {
        let mut sync = ChatSynchronizer::new("apt_1");
        sync.seed_history(vec![msg("m1", 10), msg("m2", 20)]);
        assert_eq!(sync.apply_receipt(&ReadReceipt::Conversation("apt_other".into())), 0);
        assert_eq!(sync.apply_receipt(&ReadReceipt::Conversation("apt_1".into())), 2);
        assert!(sync.messages().all(|m| m.is_read));
    }

    #[test]
    fn test_foreign_conversation_messages_are_dropped() {
        let mut sync = ChatSynchronizer::new("apt_1");
        let mut foreign = msg("x1", 10);
        foreign.conversation_id = Some("apt_2".into());
        assert!(!sync.apply_message(foreign));
        let mut unscoped = msg("x2", 10);
        unscoped.conversation_id = None;
        assert!(sync.apply_message(unscoped));
        assert_eq!(ids(&sync), vec!["x2"]);
    }

    #[test]
    fn test_groups_follow_message_order() {
        let now = Utc::now();
        let mut sync = ChatSynchronizer::new("apt_1");
        let mut today = msg("t", 0);
        today.created_at = now;
        let mut yesterday = msg("y", 0);
        yesterday.created_at = now - Duration::days(1);
        sync.apply_message(today);
        sync.apply_message(yesterday);

        let groups = sync.groups(&now);
        let labels: Vec<_> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Yesterday", "Today"]);
    }
}
