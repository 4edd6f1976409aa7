//! Bounded conversational memory.
//!
//! Holds the last N completed turns (3 by default) in arrival order. Adding
//! a turn to a full memory evicts the oldest one. Nothing is persisted.

use std::collections::VecDeque;

use crate::models::ConversationTurn;

pub const DEFAULT_MEMORY_TURNS: usize = 3;

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl ConversationMemory {
    /// Capacity below 1 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a turn, returning the evicted one if memory was full.
    pub fn push(&mut self, turn: ConversationTurn) -> Option<ConversationTurn> {
        self.turns.push_back(turn);
        if self.turns.len() > self.capacity {
            self.turns.pop_front()
        } else {
            None
        }
    }

    /// Turns oldest first, as a contiguous slice copy.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_TURNS)
    }
}
