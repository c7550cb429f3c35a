//! Application state shared by the coach services.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::accelerator::AcceleratorClient;
use crate::attachments::{
    AttachmentClassifier, AttachmentSource, LocalFileStore, RetentionEvaluator,
    SqliteAttachmentSource,
};
use crate::core::{Clock, CoachConfig, Outcome, SystemClock, UserId};
use crate::memory::engine::MemoryService;
use crate::memory::prompt::{CoachContextParts, build_coach_context, enforce_budget};
use crate::memory::storage::SqliteMemoryStore;
use crate::monitoring::PerformanceMonitor;
use crate::nutrition::{NutritionAggregator, SqliteHealthRecordStore};

/// Shared application state.
pub struct AppState {
    /// Validated configuration.
    pub config: CoachConfig,
    /// Time source shared by every service.
    pub clock: Arc<dyn Clock>,
    /// Latency, error, and cache figures.
    pub monitor: Arc<PerformanceMonitor>,
    /// Memory deduplication and retrieval.
    pub memory: MemoryService,
    /// Nutrition summaries.
    pub nutrition: NutritionAggregator,
    /// Attachment records, also used to register uploads.
    pub attachments: Arc<SqliteAttachmentSource>,
    /// Attachment retention policy.
    pub retention: Arc<RetentionEvaluator>,
    /// Remote accelerator, when enabled.
    pub accelerator: Option<Arc<AcceleratorClient>>,
}

impl AppState {
    /// Build every service from `config` with the system clock.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or a store cannot be opened.
    pub async fn new(config: CoachConfig) -> anyhow::Result<Arc<Self>> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Build every service from `config` with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or a store cannot be opened.
    pub async fn with_clock(config: CoachConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Arc<Self>> {
        config.validate().context("invalid configuration")?;

        let monitor = Arc::new(PerformanceMonitor::new(
            config.monitoring.clone(),
            Arc::clone(&clock),
        ));

        let accelerator = if config.accelerator.enabled {
            let client = AcceleratorClient::new(config.accelerator.clone(), Arc::clone(&clock))
                .context("failed to create accelerator client")?;
            info!(base_url = %config.accelerator.base_url, "Accelerator enabled");
            Some(Arc::new(client))
        } else {
            None
        };

        let memory_store = SqliteMemoryStore::new(&config.storage)
            .await
            .context("failed to open memory store")?;
        let mut memory = MemoryService::new(
            config.memory.clone(),
            Arc::new(memory_store),
            Arc::clone(&clock),
        )?
        .with_monitor(Arc::clone(&monitor));
        if let Some(client) = &accelerator {
            memory = memory.with_accelerator(Arc::clone(client));
        }

        let health_store = SqliteHealthRecordStore::new(&config.storage)
            .await
            .context("failed to open health record store")?;
        let nutrition =
            NutritionAggregator::new(Arc::new(health_store), &config.nutrition, Arc::clone(&clock))?
                .with_monitor(Arc::clone(&monitor));

        let attachments = Arc::new(
            SqliteAttachmentSource::new(&config.storage)
                .await
                .context("failed to open attachment store")?,
        );
        let retention = Arc::new(RetentionEvaluator::new(
            Arc::clone(&attachments) as Arc<dyn AttachmentSource>,
            Arc::new(LocalFileStore::new(config.retention.uploads_dir.clone())),
            AttachmentClassifier::new()?,
            Arc::clone(&clock),
        ));

        info!(
            sqlite = %config.storage.sqlite_path.display(),
            uploads = %config.retention.uploads_dir.display(),
            "Coach services ready"
        );

        Ok(Arc::new(Self {
            config,
            clock,
            monitor,
            memory,
            nutrition,
            attachments,
            retention,
            accelerator,
        }))
    }

    /// Context block for the coach model: the user's memories, today's
    /// nutrition, and the message, trimmed to the prompt budget.
    ///
    /// Degrades when either lookup degraded; the block is still usable.
    pub async fn prepare_coach_context(&self, user_id: UserId, message: &str) -> Outcome<String> {
        let today = self.nutrition.today();
        let (memories, nutrition) = tokio::join!(
            self.memory.get_contextual_memories(user_id, message),
            self.nutrition.daily_summary(user_id, today),
        );

        let mut reasons = Vec::new();
        if let Some(reason) = memories.reason() {
            reasons.push(format!("memories: {reason}"));
        }
        let nutrition = match nutrition {
            Outcome::Success(summary) => Some(summary),
            Outcome::Degraded { reason, .. } => {
                reasons.push(format!("nutrition: {reason}"));
                None
            }
        };

        let parts = CoachContextParts {
            memories: memories.into_value(),
            nutrition,
            user_message: message.to_string(),
        };
        let block = build_coach_context(&enforce_budget(parts, self.config.prompt.max_chars));

        if reasons.is_empty() {
            Outcome::Success(block)
        } else {
            warn!(%user_id, reasons = ?reasons, "Coach context built from partial data");
            Outcome::degraded(block, reasons.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::core::ManualClock;
    use crate::nutrition::{MealType, NutrientTotals, NutritionEntry};

    fn config(dir: &std::path::Path) -> CoachConfig {
        let mut config = CoachConfig::default();
        config.storage.sqlite_path = dir.join("coach.sqlite");
        config.retention.uploads_dir = dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.memory.context_limit = 0;
        assert!(AppState::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_coach_context_combines_memory_and_nutrition() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
        ));
        let state = AppState::with_clock(config(dir.path()), clock.clone()).await.unwrap();
        assert!(state.accelerator.is_none());

        let user = UserId::new();
        let saved = state
            .memory
            .process_with_deduplication(user, "I have asthma", None)
            .await;
        assert!(saved.value().saved().is_some());

        let logged = state
            .nutrition
            .record_entry(
                user,
                NutritionEntry {
                    meal_type: MealType::Breakfast,
                    food_name: Some("oats".to_string()),
                    calories: 350.0,
                    nutrients: NutrientTotals {
                        protein: 12.0,
                        ..NutrientTotals::default()
                    },
                    eaten_at: clock.now(),
                },
            )
            .await;
        assert_eq!(logged, Outcome::Success(true));

        let block = state
            .prepare_coach_context(user, "Can I train today?")
            .await;
        assert!(!block.is_degraded());
        let text = block.into_value();
        assert!(text.contains("* (health) I have asthma [importance: 0.9]"));
        assert!(text.contains("2024-03-10: 350 kcal, protein 12.0 g"));
        assert!(text.ends_with("[USER_MESSAGE]\nCan I train today?\n"));
    }

    #[tokio::test]
    async fn test_coach_context_respects_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.prompt.max_chars = 64;
        let state = AppState::new(config).await.unwrap();

        let user = UserId::new();
        let _ = state
            .memory
            .process_with_deduplication(user, "I have asthma", None)
            .await;

        let text = state.prepare_coach_context(user, "hi").await.into_value();
        assert_eq!(text, "[COACH_MEMORIES]\n[NUTRITION_TODAY]\n[USER_MESSAGE]\nhi\n");
    }
}
