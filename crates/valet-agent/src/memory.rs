use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use valet_core::types::ChatMessage;

/// Short-term conversation memory: a bounded ring buffer per chat.
/// Long-term history lives in the store; this only feeds the response
/// pass with the last few turns.
pub struct ShortTermMemory {
    buffers: Mutex<HashMap<i64, VecDeque<ChatMessage>>>,
    capacity: usize,
}

impl ShortTermMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn remember(&self, chat_id: i64, role: &str, content: &str) {
        let mut buffers = self.buffers.lock().unwrap();
        let buffer = buffers.entry(chat_id).or_default();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(ChatMessage::text(role, content));
    }

    /// The last `limit` turns, oldest first.
    pub fn recent(&self, chat_id: i64, limit: usize) -> Vec<ChatMessage> {
        let buffers = self.buffers.lock().unwrap();
        match buffers.get(&chat_id) {
            Some(buffer) => {
                let skip = buffer.len().saturating_sub(limit);
                buffer.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn clear(&self, chat_id: i64) {
        self.buffers.lock().unwrap().remove(&chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let memory = ShortTermMemory::new(3);
        for i in 0..5 {
            memory.remember(1, "user", &format!("message {i}"));
        }

        let recent = memory.recent(1, 10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "message 2");
        assert_eq!(recent[2].content, "message 4");
    }

    #[test]
    fn test_recent_respects_limit_and_order() {
        let memory = ShortTermMemory::new(10);
        memory.remember(1, "user", "first");
        memory.remember(1, "assistant", "second");
        memory.remember(1, "user", "third");

        let recent = memory.recent(1, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "second");
        assert_eq!(recent[1].content, "third");
    }

    #[test]
    fn test_chats_are_isolated() {
        let memory = ShortTermMemory::new(5);
        memory.remember(1, "user", "for one");
        memory.remember(2, "user", "for two");

        assert_eq!(memory.recent(1, 5).len(), 1);
        assert_eq!(memory.recent(2, 5)[0].content, "for two");

        memory.clear(1);
        assert!(memory.recent(1, 5).is_empty());
        assert_eq!(memory.recent(2, 5).len(), 1);
    }
}
