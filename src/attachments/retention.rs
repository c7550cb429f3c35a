//! Retention decisions and the attachment sweep.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::attachments::classifier::AttachmentClassifier;
use crate::attachments::file_store::FileStore;
use crate::attachments::source::AttachmentSource;
use crate::core::clock::Clock;
use crate::core::outcome::Outcome;

/// Whether a file of `age_days` exceeds `retention_days`.
///
/// A negative retention keeps the file forever. A file exactly at the
/// boundary is kept.
#[must_use]
pub const fn should_delete(age_days: i64, retention_days: i64) -> bool {
    retention_days >= 0 && age_days > retention_days
}

/// Whole days between `modified` and `now`, rounded down.
#[must_use]
pub fn file_age_days(modified: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(modified).num_days()
}

/// Aggregate result of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Distinct files examined.
    pub files_scanned: usize,
    /// Files removed.
    pub files_deleted: usize,
    /// Bytes removed.
    pub bytes_freed: u64,
    /// Files that could not be inspected or deleted.
    pub failures: usize,
}

/// Applies tier retention to every stored attachment.
pub struct RetentionEvaluator {
    source: Arc<dyn AttachmentSource>,
    files: Arc<dyn FileStore>,
    classifier: AttachmentClassifier,
    clock: Arc<dyn Clock>,
}

impl RetentionEvaluator {
    /// Create an evaluator.
    #[must_use]
    pub fn new(
        source: Arc<dyn AttachmentSource>,
        files: Arc<dyn FileStore>,
        classifier: AttachmentClassifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            files,
            classifier,
            clock,
        }
    }

    /// Run one sweep.
    ///
    /// Each filename is evaluated once even when several records point at it.
    /// Per-file failures are counted and skipped; if the records cannot be
    /// listed the report is empty and degraded.
    pub async fn sweep(&self) -> Outcome<SweepReport> {
        let records = match self.source.list_all().await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "Retention sweep could not list attachments");
                return Outcome::degraded(SweepReport::default(), err.to_string());
            }
        };

        let now = self.clock.now();
        let mut seen = HashSet::new();
        let mut report = SweepReport::default();

        for record in records {
            let filename = record.metadata.filename.as_str();
            if !seen.insert(filename.to_string()) {
                continue;
            }

            let stat = match self.files.stat(filename).await {
                Ok(Some(stat)) => stat,
                Ok(None) => continue,
                Err(err) => {
                    warn!(filename, error = %err, "Could not inspect attachment");
                    report.failures += 1;
                    continue;
                }
            };
            report.files_scanned += 1;

            let classification = self.classifier.classify_metadata(&record.metadata);
            let age_days = file_age_days(stat.modified, now);
            if !should_delete(age_days, classification.retention_days) {
                continue;
            }

            match self.files.delete(filename).await {
                Ok(()) => {
                    debug!(
                        filename,
                        age_days,
                        tier = %classification.tier,
                        "Deleted expired attachment"
                    );
                    report.files_deleted += 1;
                    report.bytes_freed += stat.size_bytes;
                }
                Err(err) => {
                    warn!(filename, error = %err, "Could not delete attachment");
                    report.failures += 1;
                }
            }
        }

        info!(
            scanned = report.files_scanned,
            deleted = report.files_deleted,
            bytes_freed = report.bytes_freed,
            failures = report.failures,
            "Retention sweep completed"
        );
        Outcome::Success(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::attachments::file_store::FileStat;
    use crate::attachments::metadata::{AttachmentMetadata, AttachmentRecord};
    use crate::core::StoreFuture;
    use crate::core::clock::ManualClock;
    use crate::core::errors::{CoachError, CoachResult};
    use crate::core::ids::{RecordId, UserId};

    #[derive(Default)]
    struct FakeFiles {
        files: Mutex<HashMap<String, FileStat>>,
        undeletable: HashSet<String>,
        stat_calls: Mutex<usize>,
    }

    impl FileStore for FakeFiles {
        fn stat(&self, filename: &str) -> StoreFuture<'_, CoachResult<Option<FileStat>>> {
            let filename = filename.to_string();
            Box::pin(async move {
                *self.stat_calls.lock().unwrap() += 1;
                Ok(self.files.lock().unwrap().get(&filename).copied())
            })
        }

        fn delete(&self, filename: &str) -> StoreFuture<'_, CoachResult<()>> {
            let filename = filename.to_string();
            Box::pin(async move {
                if self.undeletable.contains(&filename) {
                    return Err(CoachError::Io(std::io::Error::other("permission denied")));
                }
                self.files.lock().unwrap().remove(&filename);
                Ok(())
            })
        }
    }

    struct FixedSource(Option<Vec<AttachmentRecord>>);

    impl AttachmentSource for FixedSource {
        fn list_all(&self) -> StoreFuture<'_, CoachResult<Vec<AttachmentRecord>>> {
            Box::pin(async move {
                self.0
                    .clone()
                    .ok_or_else(|| CoachError::InvalidRecord("table missing".to_string()))
            })
        }
    }

    fn record(filename: &str, mime: &str) -> AttachmentRecord {
        AttachmentRecord {
            id: RecordId::new(),
            user_id: UserId::new(),
            metadata: AttachmentMetadata::new(filename).with_mime_type(mime),
            uploaded_at: Utc::now(),
        }
    }

    fn evaluator(
        records: Option<Vec<AttachmentRecord>>,
        files: Arc<FakeFiles>,
        clock: Arc<ManualClock>,
    ) -> RetentionEvaluator {
        RetentionEvaluator::new(
            Arc::new(FixedSource(records)),
            files,
            AttachmentClassifier::new().unwrap(),
            clock,
        )
    }

    fn stat(now: DateTime<Utc>, age_days: u64, size_bytes: u64) -> FileStat {
        FileStat {
            modified: now - chrono::Duration::days(i64::try_from(age_days).unwrap()),
            size_bytes,
        }
    }

    #[test]
    fn test_retention_boundary() {
        assert!(!should_delete(30, 30));
        assert!(should_delete(31, 30));
        assert!(!should_delete(29, 30));
        assert!(!should_delete(10_000, -1));
    }

    #[test]
    fn test_file_age_rounds_down() {
        let now = Utc::now();
        assert_eq!(file_age_days(now - chrono::Duration::hours(47), now), 1);
        assert_eq!(file_age_days(now - chrono::Duration::days(3), now), 3);
        assert_eq!(file_age_days(now + chrono::Duration::hours(1), now), 0);
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();
        let files = Arc::new(FakeFiles::default());
        {
            let mut map = files.files.lock().unwrap();
            map.insert("blood_test_results.pdf".to_string(), stat(now, 5000, 10));
            map.insert("vacation.jpg".to_string(), stat(now, 91, 200));
            map.insert("sunset.jpg".to_string(), stat(now, 90, 300));
            map.insert("notes.txt".to_string(), stat(now, 31, 40));
        }

        let records = vec![
            record("blood_test_results.pdf", "application/pdf"),
            record("vacation.jpg", "image/jpeg"),
            record("sunset.jpg", "image/jpeg"),
            record("notes.txt", "text/plain"),
            record("gone.txt", "text/plain"),
        ];

        let outcome = evaluator(Some(records), files.clone(), clock).sweep().await;
        assert!(!outcome.is_degraded());
        let report = outcome.into_value();
        assert_eq!(report.files_scanned, 4);
        assert_eq!(report.files_deleted, 2);
        assert_eq!(report.bytes_freed, 240);
        assert_eq!(report.failures, 0);

        let remaining = files.files.lock().unwrap();
        assert!(remaining.contains_key("blood_test_results.pdf"));
        assert!(remaining.contains_key("sunset.jpg"));
    }

    #[tokio::test]
    async fn test_sweep_deduplicates_filenames() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let files = Arc::new(FakeFiles::default());
        files
            .files
            .lock()
            .unwrap()
            .insert("notes.txt".to_string(), stat(clock.now(), 60, 7));

        let records = vec![record("notes.txt", "text/plain"), record("notes.txt", "text/plain")];
        let report = evaluator(Some(records), files.clone(), clock)
            .sweep()
            .await
            .into_value();

        assert_eq!(*files.stat_calls.lock().unwrap(), 1);
        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.bytes_freed, 7);
    }

    #[tokio::test]
    async fn test_sweep_continues_after_delete_failure() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();
        let mut fake = FakeFiles::default();
        fake.undeletable.insert("locked.txt".to_string());
        {
            let mut map = fake.files.lock().unwrap();
            map.insert("locked.txt".to_string(), stat(now, 60, 1));
            map.insert("old.txt".to_string(), stat(now, 60, 2));
        }
        let files = Arc::new(fake);

        let records = vec![record("locked.txt", "text/plain"), record("old.txt", "text/plain")];
        let report = evaluator(Some(records), files, clock).sweep().await.into_value();
        assert_eq!(report.failures, 1);
        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.bytes_freed, 2);
    }

    #[tokio::test]
    async fn test_sweep_degrades_when_listing_fails() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let outcome = evaluator(None, Arc::new(FakeFiles::default()), clock)
            .sweep()
            .await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.value(), &SweepReport::default());
    }

    #[tokio::test]
    async fn test_age_tracks_clock() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let files = Arc::new(FakeFiles::default());
        files
            .files
            .lock()
            .unwrap()
            .insert("notes.txt".to_string(), stat(start, 30, 1));
        let evaluator = evaluator(Some(vec![record("notes.txt", "text/plain")]), files, clock.clone());

        assert_eq!(evaluator.sweep().await.into_value().files_deleted, 0);
        clock.advance(Duration::from_secs(86_400));
        assert_eq!(evaluator.sweep().await.into_value().files_deleted, 1);
    }
}
