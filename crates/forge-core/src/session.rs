//! Generation session: memory plus model binding for one `(subject, type)`

use crate::memory::ConversationMemory;
use crate::model::ModelBinding;
use forge_artifact::ArtifactKey;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Long-lived state for one key
pub struct GenerationSession {
    key: ArtifactKey,
    binding: Arc<dyn ModelBinding>,
    memory: ConversationMemory,
    gate: Arc<Mutex<()>>,
}

/// Held for the whole of one generation on a session
#[must_use = "the session is released when the guard drops"]
#[derive(Debug)]
pub struct GenerationGuard {
    _permit: OwnedMutexGuard<()>,
}

impl GenerationSession {
    /// Create session
    pub fn new(key: ArtifactKey, binding: Arc<dyn ModelBinding>, memory: ConversationMemory) -> Self {
        Self {
            key,
            binding,
            memory,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Session key
    #[inline]
    #[must_use]
    pub fn key(&self) -> ArtifactKey {
        self.key
    }

    /// Model binding
    #[inline]
    #[must_use]
    pub fn binding(&self) -> &Arc<dyn ModelBinding> {
        &self.binding
    }

    /// Conversation memory
    #[inline]
    #[must_use]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Wait until no other generation runs on this session
    pub async fn begin(&self) -> GenerationGuard {
        GenerationGuard {
            _permit: Arc::clone(&self.gate).lock_owned().await,
        }
    }

    /// Whether a generation currently holds the session
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }
}

impl fmt::Debug for GenerationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationSession")
            .field("key", &self.key)
            .field("memory_len", &self.memory.len())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}
