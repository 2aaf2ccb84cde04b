//! Generation session cache using moka
//!
//! Sessions are keyed by `(type, subject)` and created on first use:
//! - Get-or-create is atomic per key (one creation, one hydration)
//! - Bounded entry count with size-based eviction
//! - Expiry after a write window or an access window, whichever comes first
//!
//! moka enforces the windows on wall time. The same windows are also checked
//! against the injected [`Clock`] on every lookup, so a manual clock drives
//! expiry deterministically.

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::PipelineError;
use crate::history::ChatHistoryStore;
use crate::memory::ConversationMemory;
use crate::model::ModelProvider;
use crate::session::GenerationSession;
use forge_artifact::{ArtifactKey, ArtifactType, SubjectId};
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Sessions created (each hydrated once)
    pub created: u64,
    /// Lookups served by a live session
    pub hits: u64,
    /// Hydrations that failed and started empty
    pub hydration_failures: u64,
    /// Sessions dropped because a window elapsed on the injected clock
    pub expired: u64,
    /// Sessions held, as last reported by moka
    pub entries: u64,
}

struct CacheEntry {
    session: Arc<GenerationSession>,
    written_at: Instant,
    accessed_at: Mutex<Instant>,
}

impl CacheEntry {
    fn new(session: GenerationSession, now: Instant) -> Self {
        Self {
            session: Arc::new(session),
            written_at: now,
            accessed_at: Mutex::new(now),
        }
    }

    fn touch(&self, now: Instant) {
        *self.accessed_at.lock() = now;
    }
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    hits: AtomicU64,
    hydration_failures: AtomicU64,
    expired: AtomicU64,
}

/// Bounded, time-windowed session store
pub struct GenerationSessionCache {
    inner: Cache<ArtifactKey, Arc<CacheEntry>>,
    config: CacheConfig,
    provider: Arc<dyn ModelProvider>,
    history: Arc<dyn ChatHistoryStore>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl GenerationSessionCache {
    /// Create cache
    #[must_use]
    pub fn new(
        config: CacheConfig,
        provider: Arc<dyn ModelProvider>,
        history: Arc<dyn ChatHistoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_sessions)
            .time_to_live(config.expire_after_write())
            .time_to_idle(config.expire_after_access())
            .eviction_listener(|key: Arc<ArtifactKey>, _value, cause| {
                tracing::debug!(key = %key, cause = ?cause, "session evicted");
            })
            .build();

        Self {
            inner,
            config,
            provider,
            history,
            clock,
            counters: Counters::default(),
        }
    }

    /// Session for `(subject, kind)`, created and hydrated if absent
    ///
    /// # Errors
    /// [`PipelineError::Session`] if no model can be bound for the key.
    pub async fn get(
        &self,
        subject: SubjectId,
        kind: ArtifactType,
    ) -> Result<Arc<GenerationSession>, PipelineError> {
        let key = ArtifactKey::new(kind, subject);
        let now = self.clock.now();

        let result = self
            .inner
            .entry(key)
            .and_try_compute_with(|current| async move {
                if let Some(entry) = current {
                    let entry = entry.into_value();
                    if !self.is_expired(&entry, now) {
                        entry.touch(now);
                        return Ok::<_, PipelineError>(Op::Nop);
                    }
                    self.counters.expired.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "session window elapsed, replacing");
                }
                let session = self.create(key).await?;
                Ok(Op::Put(Arc::new(CacheEntry::new(session, now))))
            })
            .await?;

        match result {
            CompResult::Unchanged(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Arc::clone(&entry.value().session))
            }
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => {
                Ok(Arc::clone(&entry.value().session))
            }
            CompResult::StillNone(_) | CompResult::Removed(_) => Err(PipelineError::Session(
                format!("session for {key} was not stored"),
            )),
        }
    }

    /// Whether a live session exists for the key
    ///
    /// The session's access time on the injected clock is left as is.
    pub async fn contains(&self, subject: SubjectId, kind: ArtifactType) -> bool {
        let now = self.clock.now();
        self.inner
            .get(&ArtifactKey::new(kind, subject))
            .await
            .is_some_and(|entry| !self.is_expired(&entry, now))
    }

    /// Drop the session for a key
    pub async fn invalidate(&self, subject: SubjectId, kind: ArtifactType) {
        self.inner.invalidate(&ArtifactKey::new(kind, subject)).await;
    }

    /// Remove every session whose window elapsed; returns how many
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<ArtifactKey> = self
            .inner
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            self.inner.invalidate(key).await;
        }
        self.inner.run_pending_tasks().await;

        if !expired.is_empty() {
            self.counters
                .expired
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
            tracing::debug!(count = expired.len(), "purged expired sessions");
        }
        expired.len()
    }

    /// Sessions held once pending evictions are applied
    ///
    /// Sessions whose window elapsed on the injected clock count until they
    /// are looked up again or purged.
    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }

    /// Counters snapshot
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            created: self.counters.created.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            hydration_failures: self.counters.hydration_failures.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            entries: self.inner.entry_count(),
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        let since_write = now.saturating_duration_since(entry.written_at);
        let since_access = now.saturating_duration_since(*entry.accessed_at.lock());
        since_write >= self.config.expire_after_write()
            || since_access >= self.config.expire_after_access()
    }

    async fn create(&self, key: ArtifactKey) -> Result<GenerationSession, PipelineError> {
        let binding = self
            .provider
            .bind(key.subject, key.kind)
            .map_err(|e| PipelineError::Session(format!("cannot bind model for {key}: {e}")))?;

        let window = self.config.memory_window;
        // One extra turn: the newest user turn is the request in flight
        let memory = match self.history.load_recent(key.subject, window + 1).await {
            Ok(turns) => ConversationMemory::hydrate(window, turns),
            Err(e) => {
                self.counters
                    .hydration_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "HydrationFailure: session starts with empty memory"
                );
                ConversationMemory::new(window)
            }
        };

        self.counters.created.fetch_add(1, Ordering::Relaxed);
        tracing::info!(key = %key, turns = memory.len(), "session created");
        Ok(GenerationSession::new(key, binding, memory))
    }
}

impl std::fmt::Debug for GenerationSessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSessionCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{HistoryError, ModelError};
    use crate::history::{ChatTurn, InMemoryChatHistory, MockChatHistoryStore};
    use crate::model::{EventStream, GenerationRequest, ModelBinding};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl ModelBinding for Echo {
        async fn generate(&self, request: GenerationRequest) -> Result<String, ModelError> {
            Ok(request.prompt)
        }

        async fn stream(&self, _request: GenerationRequest) -> Result<EventStream, ModelError> {
            Err(ModelError::Unsupported("stream".into()))
        }
    }

    struct EchoProvider;

    impl ModelProvider for EchoProvider {
        fn bind(
            &self,
            _subject: SubjectId,
            _kind: ArtifactType,
        ) -> Result<Arc<dyn ModelBinding>, ModelError> {
            Ok(Arc::new(Echo))
        }
    }

    struct NoModels;

    impl ModelProvider for NoModels {
        fn bind(
            &self,
            _subject: SubjectId,
            kind: ArtifactType,
        ) -> Result<Arc<dyn ModelBinding>, ModelError> {
            Err(ModelError::Rejected(format!("no model for {kind}")))
        }
    }

    fn subject(id: i64) -> SubjectId {
        SubjectId::new(id).unwrap()
    }

    fn cache_with(
        history: Arc<dyn ChatHistoryStore>,
        clock: Arc<ManualClock>,
    ) -> GenerationSessionCache {
        GenerationSessionCache::new(CacheConfig::default(), Arc::new(EchoProvider), history, clock)
    }

    #[tokio::test]
    async fn get_reuses_session() {
        let cache = cache_with(Arc::new(InMemoryChatHistory::new()), Arc::new(ManualClock::new()));

        let a = cache.get(subject(1), ArtifactType::MultiFile).await.unwrap();
        let b = cache.get(subject(1), ArtifactType::MultiFile).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        let stats = cache.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(cache.entry_count().await, 1);
    }

    #[tokio::test]
    async fn types_do_not_share_sessions() {
        let cache = cache_with(Arc::new(InMemoryChatHistory::new()), Arc::new(ManualClock::new()));

        let single = cache.get(subject(1), ArtifactType::SingleFile).await.unwrap();
        let multi = cache.get(subject(1), ArtifactType::MultiFile).await.unwrap();

        assert!(!Arc::ptr_eq(&single, &multi));
        assert_eq!(cache.entry_count().await, 2);
    }

    #[tokio::test]
    async fn hydrates_from_history_without_in_flight_prompt() {
        let history = Arc::new(InMemoryChatHistory::new());
        history.seed(
            subject(4),
            [ChatTurn::user("make a page"), ChatTurn::ai("done"), ChatTurn::user("make it blue")],
        );
        let cache = cache_with(history, Arc::new(ManualClock::new()));

        let session = cache.get(subject(4), ArtifactType::SingleFile).await.unwrap();
        let texts: Vec<_> = session.memory().snapshot().into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["make a page", "done"]);
    }

    #[tokio::test]
    async fn hydration_failure_is_not_fatal() {
        let mut history = MockChatHistoryStore::new();
        history
            .expect_load_recent()
            .times(1)
            .returning(|_, _| Err(HistoryError::Unavailable("db down".into())));
        let cache = cache_with(Arc::new(history), Arc::new(ManualClock::new()));

        let session = cache.get(subject(2), ArtifactType::SingleFile).await.unwrap();
        assert!(session.memory().is_empty());
        assert_eq!(cache.stats().hydration_failures, 1);
    }

    #[tokio::test]
    async fn hydration_requests_one_extra_turn() {
        let mut history = MockChatHistoryStore::new();
        history
            .expect_load_recent()
            .withf(|subject, limit| subject.get() == 3 && *limit == 21)
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        let cache = cache_with(Arc::new(history), Arc::new(ManualClock::new()));

        cache.get(subject(3), ArtifactType::MultiFile).await.unwrap();
    }

    #[tokio::test]
    async fn idle_window_expires_on_manual_clock() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(Arc::new(InMemoryChatHistory::new()), Arc::clone(&clock));

        let first = cache.get(subject(5), ArtifactType::SingleFile).await.unwrap();
        clock.advance(Duration::from_secs(9 * 60));
        assert!(cache.contains(subject(5), ArtifactType::SingleFile).await);

        clock.advance(Duration::from_secs(60));
        assert!(!cache.contains(subject(5), ArtifactType::SingleFile).await);

        let second = cache.get(subject(5), ArtifactType::SingleFile).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().created, 2);
    }

    #[tokio::test]
    async fn access_refreshes_idle_window_but_not_write_window() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(Arc::new(InMemoryChatHistory::new()), Arc::clone(&clock));

        let first = cache.get(subject(6), ArtifactType::MultiFile).await.unwrap();
        for _ in 0..3 {
            clock.advance(Duration::from_secs(9 * 60));
            let again = cache.get(subject(6), ArtifactType::MultiFile).await.unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }

        clock.advance(Duration::from_secs(4 * 60));
        let replaced = cache.get(subject(6), ArtifactType::MultiFile).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &replaced));
    }

    #[tokio::test]
    async fn purge_removes_expired_entries() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(Arc::new(InMemoryChatHistory::new()), Arc::clone(&clock));

        cache.get(subject(1), ArtifactType::SingleFile).await.unwrap();
        cache.get(subject(2), ArtifactType::SingleFile).await.unwrap();
        clock.advance(Duration::from_secs(11 * 60));
        cache.get(subject(3), ArtifactType::SingleFile).await.unwrap();

        assert_eq!(cache.purge_expired().await, 2);
        assert_eq!(cache.entry_count().await, 1);
        assert!(cache.contains(subject(3), ArtifactType::SingleFile).await);
    }

    #[tokio::test]
    async fn contains_leaves_idle_window_alone() {
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(Arc::new(InMemoryChatHistory::new()), Arc::clone(&clock));
        cache.get(subject(7), ArtifactType::MultiFile).await.unwrap();

        for _ in 0..3 {
            clock.advance(Duration::from_secs(4 * 60));
            cache.contains(subject(7), ArtifactType::MultiFile).await;
        }

        assert!(!cache.contains(subject(7), ArtifactType::MultiFile).await);
        assert_eq!(cache.stats().hits, 0);
    }

    #[tokio::test]
    async fn invalidate_drops_session() {
        let cache = cache_with(Arc::new(InMemoryChatHistory::new()), Arc::new(ManualClock::new()));
        cache.get(subject(8), ArtifactType::Scaffold).await.unwrap();

        cache.invalidate(subject(8), ArtifactType::Scaffold).await;
        assert!(!cache.contains(subject(8), ArtifactType::Scaffold).await);
    }

    #[tokio::test]
    async fn bind_failure_is_session_error() {
        let cache = GenerationSessionCache::new(
            CacheConfig::default(),
            Arc::new(NoModels),
            Arc::new(InMemoryChatHistory::new()),
            Arc::new(ManualClock::new()),
        );

        let err = cache.get(subject(1), ArtifactType::Scaffold).await.unwrap_err();
        assert!(matches!(err, PipelineError::Session(_)));
        assert_eq!(cache.entry_count().await, 0);
    }
}
