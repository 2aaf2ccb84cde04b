//! Bounded conversation memory held by a session

use crate::history::{ChatRole, ChatTurn};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Sliding window of the most recent turns
#[derive(Debug)]
pub struct ConversationMemory {
    window: usize,
    turns: Mutex<VecDeque<ChatTurn>>,
}

impl ConversationMemory {
    /// Empty memory keeping at most `window` turns
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window,
            turns: Mutex::new(VecDeque::with_capacity(window)),
        }
    }

    /// Memory seeded from history, oldest first
    ///
    /// A trailing user turn is the request currently in flight and is left
    /// out; the caller pushes it once the session is in hand.
    #[must_use]
    pub fn hydrate(window: usize, mut turns: Vec<ChatTurn>) -> Self {
        if turns.last().is_some_and(|t| t.role == ChatRole::User) {
            turns.pop();
        }
        let memory = Self::new(window);
        memory.extend(turns);
        memory
    }

    /// Append a turn, evicting the oldest beyond the window
    pub fn push(&self, turn: ChatTurn) {
        let mut turns = self.turns.lock();
        turns.push_back(turn);
        while turns.len() > self.window {
            turns.pop_front();
        }
    }

    /// Append several turns in order
    pub fn extend(&self, new_turns: impl IntoIterator<Item = ChatTurn>) {
        let mut turns = self.turns.lock();
        turns.extend(new_turns);
        let excess = turns.len().saturating_sub(self.window);
        turns.drain(..excess);
    }

    /// Copy of the current window, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatTurn> {
        self.turns.lock().iter().cloned().collect()
    }

    /// Turns held
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.lock().len()
    }

    /// True when no turn is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.lock().is_empty()
    }

    /// Window size
    #[inline]
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(memory: &ConversationMemory) -> Vec<String> {
        memory.snapshot().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn push_evicts_oldest() {
        let memory = ConversationMemory::new(2);
        memory.push(ChatTurn::user("a"));
        memory.push(ChatTurn::ai("b"));
        memory.push(ChatTurn::user("c"));
        assert_eq!(texts(&memory), vec!["b", "c"]);
    }

    #[test]
    fn hydrate_drops_in_flight_user_turn() {
        let memory = ConversationMemory::hydrate(
            20,
            vec![ChatTurn::user("q1"), ChatTurn::ai("a1"), ChatTurn::user("q2")],
        );
        assert_eq!(texts(&memory), vec!["q1", "a1"]);
    }

    #[test]
    fn hydrate_keeps_trailing_ai_turn() {
        let memory = ConversationMemory::hydrate(20, vec![ChatTurn::user("q1"), ChatTurn::ai("a1")]);
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn hydrate_caps_at_window() {
        let turns = (0..30).map(|i| ChatTurn::ai(format!("t{i}"))).collect();
        let memory = ConversationMemory::hydrate(20, turns);
        assert_eq!(memory.len(), 20);
        assert_eq!(texts(&memory).first().map(String::as_str), Some("t10"));
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_window(window in 1usize..8, pushes in 0usize..40) {
            let memory = ConversationMemory::new(window);
            for i in 0..pushes {
                memory.push(ChatTurn::user(i.to_string()));
            }
            prop_assert_eq!(memory.len(), pushes.min(window));
            if pushes > 0 {
                let last = (pushes - 1).to_string();
                let all = texts(&memory);
                prop_assert_eq!(all.last(), Some(&last));
            }
        }
    }
}
