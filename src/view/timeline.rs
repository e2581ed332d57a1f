use std::collections::HashSet;

use crate::chat::{ChatMessage, MessageId};

/// Ordered, id-deduplicated message list
#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<ChatMessage>,
    seen: HashSet<MessageId>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a history page. Returns how many messages were new.
    ///
    /// Afterwards the list is ordered by creation time; messages with equal
    /// timestamps keep their relative order and unparsed timestamps sort last.
    pub fn merge_history(&mut self, history: Vec<ChatMessage>) -> usize {
        let mut inserted = 0;
        for message in history {
            if self.seen.insert(message.id.clone()) {
                self.messages.push(message);
                inserted += 1;
            }
        }
        if inserted > 0 {
            self.messages.sort_by_key(|m| {
                let at = m.created_at.utc();
                (at.is_none(), at)
            });
        }
        inserted
    }

    /// Append a live message. Returns false if its id is already present.
    pub fn push_live(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// All messages, deleted ones included
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages to render
    pub fn visible(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| !m.is_deleted())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
