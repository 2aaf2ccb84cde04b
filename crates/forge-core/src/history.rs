//! Chat history store seam
//!
//! The pipeline reads recent turns when a session is created and appends each
//! prompt and reply. Storage lives outside the pipeline; [`InMemoryChatHistory`]
//! backs tests and the CLI.

use crate::error::HistoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use forge_artifact::SubjectId;
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Ai,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    /// Turn stamped now
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    /// User turn stamped now
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    /// Model turn stamped now
    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Ai, text)
    }
}

/// Conversation history storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    /// Most recent `limit` turns for a subject, oldest first
    async fn load_recent(
        &self,
        subject: SubjectId,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, HistoryError>;

    /// Append a turn
    async fn append(
        &self,
        subject: SubjectId,
        role: ChatRole,
        text: &str,
    ) -> Result<(), HistoryError>;
}

/// Process-local history
#[derive(Debug, Default)]
pub struct InMemoryChatHistory {
    turns: DashMap<SubjectId, Vec<ChatTurn>>,
}

impl InMemoryChatHistory {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a subject with turns (oldest first)
    pub fn seed(&self, subject: SubjectId, turns: impl IntoIterator<Item = ChatTurn>) {
        self.turns.entry(subject).or_default().extend(turns);
    }

    /// All turns for a subject, oldest first
    #[must_use]
    pub fn all(&self, subject: SubjectId) -> Vec<ChatTurn> {
        self.turns
            .get(&subject)
            .map(|turns| turns.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatHistoryStore for InMemoryChatHistory {
    async fn load_recent(
        &self,
        subject: SubjectId,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, HistoryError> {
        Ok(self
            .turns
            .get(&subject)
            .map(|turns| {
                let start = turns.len().saturating_sub(limit);
                turns[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn append(
        &self,
        subject: SubjectId,
        role: ChatRole,
        text: &str,
    ) -> Result<(), HistoryError> {
        self.turns
            .entry(subject)
            .or_default()
            .push(ChatTurn::new(role, text));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: i64) -> SubjectId {
        SubjectId::new(id).unwrap()
    }

    #[tokio::test]
    async fn load_recent_returns_tail_oldest_first() {
        let store = InMemoryChatHistory::new();
        for i in 0..5 {
            store.append(subject(1), ChatRole::User, &format!("m{i}")).await.unwrap();
        }

        let recent = store.load_recent(subject(1), 3).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn subjects_are_isolated() {
        let store = InMemoryChatHistory::new();
        store.append(subject(1), ChatRole::User, "one").await.unwrap();

        assert!(store.load_recent(subject(2), 10).await.unwrap().is_empty());
        assert_eq!(store.all(subject(1)).len(), 1);
    }

    #[test]
    fn chat_turn_serializes_role_snake_case() {
        let turn = ChatTurn::ai("hi");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "ai");
        assert_eq!(json["text"], "hi");
    }
}
