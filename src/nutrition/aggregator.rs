//! Cached daily nutrition aggregation.
//!
//! Daily summaries are computed from `nutrition` health records and cached per
//! `(user, local date)`. Days are local to a fixed UTC offset and span
//! `00:00:00.000..=23:59:59.999`. Writes through [`NutritionAggregator::record_entry`]
//! invalidate the affected day.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::cache::{CacheStats, TtlCache};
use crate::core::clock::Clock;
use crate::core::config::NutritionConfig;
use crate::core::errors::{CoachError, CoachResult};
use crate::core::ids::UserId;
use crate::core::outcome::Outcome;
use crate::monitoring::PerformanceMonitor;
use crate::nutrition::store::HealthRecordStore;
use crate::nutrition::types::{
    DailyNutritionSummary, HealthRecord, NUTRITION_CATEGORY, NutrientTotals, NutritionEntry,
    NutritionMetadata, WeeklyNutritionAverages,
};

const CACHE_NAME: &str = "nutrition";
const OPERATION: &str = "nutrition.daily_summary";

/// Aggregates meal records into daily summaries.
pub struct NutritionAggregator {
    store: Arc<dyn HealthRecordStore>,
    cache: TtlCache<DailyNutritionSummary>,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl NutritionAggregator {
    /// Create an aggregator.
    ///
    /// # Errors
    /// Returns an error if the configured UTC offset is out of range.
    pub fn new(
        store: Arc<dyn HealthRecordStore>,
        config: &NutritionConfig,
        clock: Arc<dyn Clock>,
    ) -> CoachResult<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            CoachError::InvalidConfig(format!(
                "nutrition.utc_offset_minutes out of range: {}",
                config.utc_offset_minutes
            ))
        })?;

        Ok(Self {
            store,
            cache: TtlCache::new(
                Duration::from_secs(config.cache_ttl_seconds),
                Arc::clone(&clock),
            ),
            offset,
            clock,
            monitor: None,
        })
    }

    /// Report cache and latency figures to `monitor`.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Cache key of one user-day.
    #[must_use]
    pub fn cache_key(user_id: UserId, date: NaiveDate) -> String {
        format!("nutrition:{user_id}:{date}")
    }

    /// Local date of `at`.
    #[must_use]
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// Local date right now.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.local_date(self.clock.now())
    }

    /// UTC bounds of a local day, both inclusive.
    ///
    /// # Errors
    /// Returns an error if the date is at the edge of the representable range.
    pub fn day_bounds(&self, date: NaiveDate) -> CoachResult<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.to_utc(date.and_hms_milli_opt(0, 0, 0, 0))?;
        let end = self.to_utc(date.and_hms_milli_opt(23, 59, 59, 999))?;
        Ok((start, end))
    }

    fn to_utc(&self, local: Option<NaiveDateTime>) -> CoachResult<DateTime<Utc>> {
        local
            .and_then(|naive| self.offset.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| CoachError::InvalidRecord("local day out of range".to_string()))
    }

    /// Summary of one local day.
    ///
    /// Store failures return an empty degraded summary that is not cached.
    pub async fn daily_summary(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Outcome<DailyNutritionSummary> {
        let key = Self::cache_key(user_id, date);
        if let Some(summary) = self.cache.get(&key) {
            if let Some(monitor) = &self.monitor {
                monitor.record_cache_hit(CACHE_NAME);
            }
            return Outcome::Success(summary);
        }
        if let Some(monitor) = &self.monitor {
            monitor.record_cache_miss(CACHE_NAME);
        }

        let fetched = match &self.monitor {
            Some(monitor) => monitor.track(OPERATION, self.fetch_day(user_id, date)).await,
            None => self.fetch_day(user_id, date).await,
        };

        match fetched {
            Ok(records) => {
                let summary = summarize(user_id, date, &records);
                self.cache.set(key, summary.clone());
                Outcome::Success(summary)
            }
            Err(err) => {
                warn!(%user_id, %date, error = %err, "Nutrition summary degraded");
                Outcome::degraded(DailyNutritionSummary::empty(user_id, date), err.to_string())
            }
        }
    }

    async fn fetch_day(&self, user_id: UserId, date: NaiveDate) -> CoachResult<Vec<HealthRecord>> {
        let (start, end) = self.day_bounds(date)?;
        self.store
            .records_between(user_id, NUTRITION_CATEGORY, start, end)
            .await
    }

    /// Summaries for every day of `start..=end`.
    ///
    /// Degraded if any day is degraded.
    pub async fn range_summaries(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Outcome<Vec<DailyNutritionSummary>> {
        let mut summaries = Vec::new();
        let mut reason = None;

        for date in start.iter_days().take_while(|date| *date <= end) {
            match self.daily_summary(user_id, date).await {
                Outcome::Success(summary) => summaries.push(summary),
                Outcome::Degraded { value, reason: why } => {
                    summaries.push(value);
                    reason.get_or_insert(why);
                }
            }
        }

        match reason {
            Some(reason) => Outcome::degraded(summaries, reason),
            None => Outcome::Success(summaries),
        }
    }

    /// Averages over the seven days starting at `week_start`.
    ///
    /// Averages are taken over days with at least one entry.
    pub async fn weekly_averages(
        &self,
        user_id: UserId,
        week_start: NaiveDate,
    ) -> Outcome<WeeklyNutritionAverages> {
        let end_date = week_start
            .checked_add_days(Days::new(6))
            .unwrap_or(NaiveDate::MAX);

        self.range_summaries(user_id, week_start, end_date)
            .await
            .map(|days| {
                let mut totals = NutrientTotals::default();
                let mut days_logged = 0_usize;
                for day in days.iter().filter(|day| day.entry_count > 0) {
                    totals.add(&day.totals);
                    days_logged += 1;
                }

                #[allow(clippy::cast_precision_loss)]
                let daily_average = totals.divided_by(days_logged as f64);

                WeeklyNutritionAverages {
                    user_id,
                    start_date: week_start,
                    end_date,
                    days_logged,
                    totals,
                    daily_average,
                }
            })
    }

    /// Store a meal and invalidate its day.
    ///
    /// Returns `false` in a degraded outcome if the write failed.
    pub async fn record_entry(&self, user_id: UserId, entry: NutritionEntry) -> Outcome<bool> {
        if !entry.calories.is_finite() || entry.calories < 0.0 {
            return Outcome::degraded(false, format!("invalid calories: {}", entry.calories));
        }

        let date = self.local_date(entry.eaten_at);
        match self.store.insert(entry.into_record(user_id)).await {
            Ok(()) => {
                self.invalidate_day(user_id, date);
                Outcome::Success(true)
            }
            Err(err) => {
                warn!(%user_id, %date, error = %err, "Failed to record nutrition entry");
                Outcome::degraded(false, err.to_string())
            }
        }
    }

    /// Drop the cached summary of one day.
    pub fn invalidate_day(&self, user_id: UserId, date: NaiveDate) -> bool {
        self.cache.invalidate(&Self::cache_key(user_id, date))
    }

    /// Drop every cached summary of a user.
    pub fn invalidate_user(&self, user_id: UserId) -> usize {
        self.cache.invalidate_prefix(&format!("nutrition:{user_id}:"))
    }

    /// Cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn summarize(user_id: UserId, date: NaiveDate, records: &[HealthRecord]) -> DailyNutritionSummary {
    let mut summary = DailyNutritionSummary::empty(user_id, date);

    for record in records {
        let calories = match record.value.trim().parse::<f64>() {
            Ok(calories) if calories.is_finite() => calories,
            _ => {
                debug!(id = %record.id, value = %record.value, "Skipping unparseable nutrition value");
                continue;
            }
        };

        let metadata = NutritionMetadata::from_value(&record.metadata);
        summary.add_entry(metadata.meal(), &metadata.nutrients(calories));
    }

    summary
}
