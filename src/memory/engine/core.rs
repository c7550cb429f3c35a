//! Memory service orchestration: deduplicated ingestion and cached retrieval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::accelerator::{AcceleratorClient, EmbeddedMemory, RelevantMemory};
use crate::cache::{CacheStats, TtlCache};
use crate::core::clock::Clock;
use crate::core::config::MemoryServiceConfig;
use crate::core::errors::CoachResult;
use crate::core::ids::{ConversationId, MemoryId, UserId};
use crate::core::outcome::Outcome;
use crate::memory::core::item::MemoryEntry;
use crate::memory::ingest::classifier::MemoryClassifier;
use crate::memory::ingest::dedupe::{hash_fragment, semantic_hash};
use crate::memory::storage::memory_store::MemoryStore;
use crate::monitoring::PerformanceMonitor;

const DEDUPE_OPERATION: &str = "memory.dedupe";
const CONTEXT_OPERATION: &str = "memory.context";
const CONTEXT_CACHE: &str = "memory.context";

/// What happened to an incoming message.
#[derive(Clone, Debug, PartialEq)]
pub enum DedupeDecision {
    /// An active memory already carries this message's hash.
    Duplicate {
        /// Matching memory.
        existing: MemoryId,
        /// Semantic hash of the message.
        hash: String,
    },
    /// A new memory was stored.
    Saved(MemoryEntry),
    /// Nothing in the message is worth remembering.
    NotMemorable {
        /// Semantic hash of the message.
        hash: String,
    },
    /// Processing stopped because a dependency failed.
    Skipped,
}

impl DedupeDecision {
    /// Whether the message was a duplicate.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Stored entry, if one was saved.
    #[must_use]
    pub const fn saved(&self) -> Option<&MemoryEntry> {
        match self {
            Self::Saved(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Memory service for the coach chat flow.
///
/// Never fails the caller: storage errors are logged and surface as
/// degraded outcomes.
pub struct MemoryService {
    config: MemoryServiceConfig,
    store: Arc<dyn MemoryStore>,
    classifier: MemoryClassifier,
    context_cache: TtlCache<Vec<MemoryEntry>>,
    clock: Arc<dyn Clock>,
    monitor: Option<Arc<PerformanceMonitor>>,
    accelerator: Option<Arc<AcceleratorClient>>,
}

impl MemoryService {
    /// Create a service over `store`.
    ///
    /// # Errors
    /// Returns an error if the classifier patterns fail to compile.
    pub fn new(
        config: MemoryServiceConfig,
        store: Arc<dyn MemoryStore>,
        clock: Arc<dyn Clock>,
    ) -> CoachResult<Self> {
        let mut context_cache = TtlCache::new(
            Duration::from_secs(config.context_ttl_seconds),
            Arc::clone(&clock),
        );
        if let Some(max_entries) = config.max_cache_entries {
            context_cache = context_cache.with_max_entries(max_entries);
        }

        Ok(Self {
            config,
            store,
            classifier: MemoryClassifier::new()?,
            context_cache,
            clock,
            monitor: None,
            accelerator: None,
        })
    }

    /// Report latency and cache figures to `monitor`.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Use `accelerator` for similarity-ranked retrieval when it is available.
    #[must_use]
    pub fn with_accelerator(mut self, accelerator: Arc<AcceleratorClient>) -> Self {
        self.accelerator = Some(accelerator);
        self
    }

    /// Remember `message` unless an equivalent memory already exists.
    ///
    /// The message's semantic hash is looked up by its leading fragment among
    /// the user's active memories. New memorable messages are stored with the
    /// full hash as a reference marker, and the user's cached retrieval results
    /// are dropped.
    pub async fn process_with_deduplication(
        &self,
        user_id: UserId,
        message: &str,
        conversation_id: Option<ConversationId>,
    ) -> Outcome<DedupeDecision> {
        let started = Instant::now();
        let outcome = self.dedupe_and_store(user_id, message, conversation_id).await;

        if let Some(monitor) = &self.monitor {
            if outcome.is_degraded() {
                monitor.record_error(DEDUPE_OPERATION);
            } else {
                monitor.record(DEDUPE_OPERATION, started.elapsed());
            }
        }
        outcome
    }

    async fn dedupe_and_store(
        &self,
        user_id: UserId,
        message: &str,
        conversation_id: Option<ConversationId>,
    ) -> Outcome<DedupeDecision> {
        let hash = semantic_hash(message);
        let fragment = hash_fragment(&hash, self.config.hash_fragment_len);

        let existing = match self.store.find_active_containing(user_id, fragment).await {
            Ok(existing) => existing,
            Err(err) => {
                warn!(%user_id, error = %err, "Duplicate lookup failed, skipping memory");
                return Outcome::degraded(DedupeDecision::Skipped, err.to_string());
            }
        };

        if let Some(entry) = existing.first() {
            debug!(%user_id, %hash, existing = %entry.id, "Duplicate memory skipped");
            return Outcome::Success(DedupeDecision::Duplicate {
                existing: entry.id,
                hash,
            });
        }

        let classification = self.classifier.classify(message);
        if !classification.should_remember {
            return Outcome::Success(DedupeDecision::NotMemorable { hash });
        }

        let entry = match MemoryEntry::new(
            user_id,
            message,
            &hash,
            classification.category,
            classification.importance,
            classification.keywords,
            self.clock.now(),
        ) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%user_id, error = %err, "Rejected memory entry");
                return Outcome::degraded(DedupeDecision::Skipped, err.to_string());
            }
        };

        if let Err(err) = self.store.insert(entry.clone()).await {
            warn!(%user_id, error = %err, "Failed to persist memory");
            return Outcome::degraded(DedupeDecision::Skipped, err.to_string());
        }

        let dropped = self.invalidate_user_context(user_id);
        info!(
            %user_id,
            conversation_id = ?conversation_id.map(|id| id.to_string()),
            category = %entry.category,
            dropped_cache_entries = dropped,
            "Stored new memory"
        );
        Outcome::Success(DedupeDecision::Saved(entry))
    }

    /// Cache key for a user's query.
    ///
    /// The digest covers the user and the query prefix. The user prefix lets a
    /// save drop every cached query of that user.
    #[must_use]
    pub fn context_cache_key(&self, user_id: UserId, query: &str) -> String {
        let prefix: String = query.chars().take(self.config.query_prefix_chars).collect();
        let digest = Sha256::digest(format!("{user_id}:{prefix}").as_bytes());
        format!("ctx:{user_id}:{}", hex::encode(digest))
    }

    /// Most important active memories of a user for `query`.
    ///
    /// Results are cached per user and query prefix. Store failures return an
    /// empty degraded list that is not cached.
    pub async fn get_contextual_memories(
        &self,
        user_id: UserId,
        query: &str,
    ) -> Outcome<Vec<MemoryEntry>> {
        let key = self.context_cache_key(user_id, query);
        if let Some(cached) = self.context_cache.get(&key) {
            if let Some(monitor) = &self.monitor {
                monitor.record_cache_hit(CONTEXT_CACHE);
            }
            return Outcome::Success(cached);
        }
        if let Some(monitor) = &self.monitor {
            monitor.record_cache_miss(CONTEXT_CACHE);
        }

        let lookup = self.store.top_active(user_id, self.config.context_limit);
        let fetched = match &self.monitor {
            Some(monitor) => monitor.track(CONTEXT_OPERATION, lookup).await,
            None => lookup.await,
        };

        match fetched {
            Ok(memories) => {
                self.context_cache.set(key, memories.clone());
                Outcome::Success(memories)
            }
            Err(err) => {
                warn!(%user_id, error = %err, "Contextual memory lookup failed");
                Outcome::degraded(Vec::new(), err.to_string())
            }
        }
    }

    /// Similarity-ranked memories from the accelerator, falling back to
    /// [`Self::get_contextual_memories`].
    ///
    /// Local results carry a similarity of `0.0` and their importance as
    /// relevance score.
    pub async fn get_contextual_memories_accelerated(
        &self,
        user_id: UserId,
        query: &str,
        context_embedding: &[f32],
        candidates: &[EmbeddedMemory],
    ) -> Outcome<Vec<RelevantMemory>> {
        if let Some(accelerator) = self.accelerator.as_ref().filter(|a| a.is_available()) {
            match accelerator
                .contextual_memories(
                    user_id,
                    context_embedding,
                    candidates,
                    self.config.similarity_threshold,
                    self.config.context_limit,
                )
                .await
            {
                Ok(memories) => return Outcome::Success(memories),
                Err(err) => {
                    warn!(%user_id, error = %err, "Accelerator retrieval failed, using local ranking");
                }
            }
        }

        self.get_contextual_memories(user_id, query)
            .await
            .map(|entries| entries.iter().map(relevant_from_entry).collect())
    }

    /// Deactivate a memory and drop the user's cached results.
    ///
    /// # Errors
    /// Returns an error if the store update fails.
    pub async fn forget(&self, user_id: UserId, memory_id: MemoryId) -> CoachResult<bool> {
        let changed = self.store.deactivate(memory_id).await?;
        if changed {
            self.invalidate_user_context(user_id);
        }
        Ok(changed)
    }

    /// Drop every cached retrieval result of a user.
    pub fn invalidate_user_context(&self, user_id: UserId) -> usize {
        self.context_cache
            .invalidate_prefix(&format!("ctx:{user_id}:"))
    }

    /// Retrieval cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.context_cache.stats()
    }
}

fn relevant_from_entry(entry: &MemoryEntry) -> RelevantMemory {
    RelevantMemory {
        id: entry.id.to_string(),
        content: entry.display_content().to_string(),
        similarity: 0.0,
        relevance_score: Some(entry.importance_score),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::accelerator::AcceleratorConfig;
    use crate::core::StoreFuture;
    use crate::core::clock::ManualClock;
    use crate::core::config::MonitoringConfig;
    use crate::core::errors::CoachError;
    use crate::memory::core::kinds::MemoryCategory;
    use crate::memory::storage::memory_store::SqliteMemoryStore;

    async fn service() -> (MemoryService, Arc<SqliteMemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(SqliteMemoryStore::in_memory().await.unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service =
            MemoryService::new(MemoryServiceConfig::default(), store.clone(), clock.clone()).unwrap();
        (service, store, clock)
    }

    /// Wraps a real store and can be told to fail.
    struct FlakyStore {
        inner: SqliteMemoryStore,
        failing: AtomicBool,
        top_calls: AtomicUsize,
    }

    impl FlakyStore {
        async fn new() -> Self {
            Self {
                inner: SqliteMemoryStore::in_memory().await.unwrap(),
                failing: AtomicBool::new(false),
                top_calls: AtomicUsize::new(0),
            }
        }

        fn check(&self) -> CoachResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(CoachError::InvalidRecord("database is locked".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl MemoryStore for FlakyStore {
        fn insert(&self, entry: MemoryEntry) -> StoreFuture<'_, CoachResult<()>> {
            Box::pin(async move {
                self.check()?;
                self.inner.insert(entry).await
            })
        }

        fn find_active_containing(
            &self,
            user_id: UserId,
            fragment: &str,
        ) -> StoreFuture<'_, CoachResult<Vec<MemoryEntry>>> {
            let fragment = fragment.to_string();
            Box::pin(async move {
                self.check()?;
                self.inner.find_active_containing(user_id, &fragment).await
            })
        }

        fn top_active(
            &self,
            user_id: UserId,
            limit: usize,
        ) -> StoreFuture<'_, CoachResult<Vec<MemoryEntry>>> {
            Box::pin(async move {
                self.top_calls.fetch_add(1, Ordering::SeqCst);
                self.check()?;
                self.inner.top_active(user_id, limit).await
            })
        }

        fn deactivate(&self, id: MemoryId) -> StoreFuture<'_, CoachResult<bool>> {
            Box::pin(async move {
                self.check()?;
                self.inner.deactivate(id).await
            })
        }
    }

    #[tokio::test]
    async fn test_equivalent_messages_are_deduplicated() {
        let (service, _store, _clock) = service().await;
        let user = UserId::new();

        let first = service
            .process_with_deduplication(user, "I want to lose 10 pounds", None)
            .await;
        let saved = first.value().saved().cloned().unwrap();
        assert_eq!(saved.category, MemoryCategory::Goals);
        assert_eq!(saved.display_content(), "I want to lose 10 pounds");

        let second = service
            .process_with_deduplication(user, "i WANT TO  lose   10 pounds!!", Some(ConversationId::new()))
            .await;
        assert_eq!(
            second,
            Outcome::Success(DedupeDecision::Duplicate {
                existing: saved.id,
                hash: semantic_hash("I want to lose 10 pounds"),
            })
        );
    }

    #[tokio::test]
    async fn test_duplicates_are_per_user() {
        let (service, _store, _clock) = service().await;
        let message = "I'm allergic to peanuts";

        let alice = service
            .process_with_deduplication(UserId::new(), message, None)
            .await;
        let bob = service
            .process_with_deduplication(UserId::new(), message, None)
            .await;
        assert!(alice.value().saved().is_some());
        assert!(bob.value().saved().is_some());
    }

    #[tokio::test]
    async fn test_small_talk_is_not_saved() {
        let (service, store, _clock) = service().await;
        let user = UserId::new();

        let outcome = service
            .process_with_deduplication(user, "Thanks, talk soon!", None)
            .await;
        assert!(matches!(
            outcome,
            Outcome::Success(DedupeDecision::NotMemorable { .. })
        ));
        assert!(store.top_active(user, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_degrades_and_skips_save() {
        let store = Arc::new(FlakyStore::new().await);
        store.failing.store(true, Ordering::SeqCst);
        let service = MemoryService::new(
            MemoryServiceConfig::default(),
            store.clone(),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .unwrap();
        let user = UserId::new();

        let outcome = service
            .process_with_deduplication(user, "My doctor changed my medication", None)
            .await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.value(), &DedupeDecision::Skipped);

        store.failing.store(false, Ordering::SeqCst);
        assert!(store.inner.top_active(user, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_contextual_memories_are_cached_and_ranked() {
        let store = Arc::new(FlakyStore::new().await);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service =
            MemoryService::new(MemoryServiceConfig::default(), store.clone(), clock.clone()).unwrap();
        let user = UserId::new();

        for message in [
            "I prefer morning workouts",
            "I have asthma",
            "I want to run a marathon",
        ] {
            let _ = service.process_with_deduplication(user, message, None).await;
            clock.advance(Duration::from_secs(1));
        }

        let first = service.get_contextual_memories(user, "what should I train today").await;
        let memories = first.into_value();
        let categories: Vec<_> = memories.iter().map(|m| m.category).collect();
        assert_eq!(
            categories,
            vec![MemoryCategory::Health, MemoryCategory::Goals, MemoryCategory::Preferences]
        );

        let _ = service.get_contextual_memories(user, "what should I train today").await;
        assert_eq!(store.top_calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(300));
        let _ = service.get_contextual_memories(user, "what should I train today").await;
        assert_eq!(store.top_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_save_invalidates_user_context() {
        let store = Arc::new(FlakyStore::new().await);
        let service = MemoryService::new(
            MemoryServiceConfig::default(),
            store.clone(),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .unwrap();
        let user = UserId::new();

        assert!(service.get_contextual_memories(user, "hi").await.into_value().is_empty());
        let _ = service
            .process_with_deduplication(user, "I'm vegetarian", None)
            .await;

        let refreshed = service.get_contextual_memories(user, "hi").await.into_value();
        assert_eq!(refreshed.len(), 1);
        assert_eq!(store.top_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_cached() {
        let store = Arc::new(FlakyStore::new().await);
        store.failing.store(true, Ordering::SeqCst);
        let service = MemoryService::new(
            MemoryServiceConfig::default(),
            store.clone(),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .unwrap();
        let user = UserId::new();

        let outcome = service.get_contextual_memories(user, "hello").await;
        assert!(outcome.is_degraded());
        assert!(outcome.value().is_empty());

        store.failing.store(false, Ordering::SeqCst);
        assert!(!service.get_contextual_memories(user, "hello").await.is_degraded());
        assert_eq!(store.top_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_key_uses_query_prefix() {
        let (service, _store, _clock) = service().await;
        let user = UserId::new();
        let long_a = format!("{}{}", "a".repeat(50), "tail one");
        let long_b = format!("{}{}", "a".repeat(50), "tail two");

        assert_eq!(
            service.context_cache_key(user, &long_a),
            service.context_cache_key(user, &long_b)
        );
        assert_ne!(
            service.context_cache_key(user, "short"),
            service.context_cache_key(UserId::new(), "short")
        );
    }

    #[tokio::test]
    async fn test_forget_hides_memory() {
        let (service, _store, _clock) = service().await;
        let user = UserId::new();
        let saved = service
            .process_with_deduplication(user, "I can't eat gluten", None)
            .await
            .into_value();
        let id = saved.saved().map(|e| e.id).unwrap();

        assert_eq!(service.get_contextual_memories(user, "q").await.into_value().len(), 1);
        assert!(service.forget(user, id).await.unwrap());
        assert!(service.get_contextual_memories(user, "q").await.into_value().is_empty());

        let again = service
            .process_with_deduplication(user, "I can't eat gluten", None)
            .await;
        assert!(again.value().saved().is_some());
    }

    #[tokio::test]
    async fn test_monitor_sees_dedupe_and_cache_traffic() {
        let monitor = Arc::new(PerformanceMonitor::new(
            MonitoringConfig::default(),
            Arc::new(ManualClock::new(Utc::now())),
        ));
        let (service, _store, _clock) = service().await;
        let service = service.with_monitor(monitor.clone());
        let user = UserId::new();

        let _ = service.process_with_deduplication(user, "I love yoga", None).await;
        let _ = service.get_contextual_memories(user, "q").await;
        let _ = service.get_contextual_memories(user, "q").await;

        assert_eq!(monitor.stats(DEDUPE_OPERATION).unwrap().count, 1);
        assert_eq!(monitor.stats(CONTEXT_OPERATION).unwrap().count, 1);
        let counters = monitor.cache_counters(CONTEXT_CACHE);
        assert_eq!((counters.hits, counters.misses), (1, 1));
    }

    #[tokio::test]
    async fn test_accelerated_retrieval_falls_back_locally() {
        let (service, _store, _clock) = service().await;
        let user = UserId::new();
        let _ = service
            .process_with_deduplication(user, "I have asthma", None)
            .await;

        let local = service
            .get_contextual_memories_accelerated(user, "q", &[0.1, 0.2], &[])
            .await
            .into_value();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].content, "I have asthma");
        assert_eq!(local[0].relevance_score, Some(0.9));

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/memory/contextual"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = AcceleratorConfig::enabled_at(server.uri())
            .with_retries(0, Duration::from_millis(1));
        let accelerator = Arc::new(AcceleratorClient::new(config, clock).unwrap());
        assert!(accelerator.check_health().await);

        let service = service.with_accelerator(accelerator);
        let fallback = service
            .get_contextual_memories_accelerated(user, "q", &[0.1, 0.2], &[])
            .await;
        assert!(!fallback.is_degraded());
        assert_eq!(fallback.value().len(), 1);
    }

    #[tokio::test]
    async fn test_accelerated_retrieval_uses_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/memory/contextual"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "m9", "content": "likes tea", "similarity": 0.88}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let accelerator = Arc::new(
            AcceleratorClient::new(AcceleratorConfig::enabled_at(server.uri()), clock).unwrap(),
        );
        assert!(accelerator.check_health().await);

        let (service, _store, _clock) = service().await;
        let service = service.with_accelerator(accelerator);
        let found = service
            .get_contextual_memories_accelerated(UserId::new(), "q", &[1.0], &[])
            .await
            .into_value();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "m9");
    }
}
